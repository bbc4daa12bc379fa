use std::fmt;

/// A parsed directive operand.
///
/// `name` is a variable lookup; `name.member` looks the receiver up and then
/// accesses `member` on it. Longer chains fold left, one member at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Variable(String),
    Chain {
        receiver: String,
        members: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid expression \"{text}\": {reason}")]
pub struct ExpressionError {
    pub text: String,
    pub reason: &'static str,
}

impl Expression {
    pub fn parse(text: &str) -> Result<Self, ExpressionError> {
        let text = text.trim();
        let error = |reason| ExpressionError {
            text: text.to_string(),
            reason,
        };

        if text.is_empty() {
            return Err(error("empty operand"));
        }

        let mut segments = text.split('.');
        let receiver = segments.next().unwrap_or_default();
        check_segment(receiver).map_err(error)?;

        let members = segments
            .map(|segment| check_segment(segment).map(|_| segment.to_string()))
            .collect::<Result<Vec<_>, _>>()
            .map_err(error)?;

        if members.is_empty() {
            Ok(Expression::Variable(receiver.to_string()))
        } else {
            Ok(Expression::Chain {
                receiver: receiver.to_string(),
                members,
            })
        }
    }

    /// The context key this expression starts from.
    pub fn root_name(&self) -> &str {
        match self {
            Expression::Variable(name) => name,
            Expression::Chain { receiver, .. } => receiver,
        }
    }
}

fn check_segment(segment: &str) -> Result<(), &'static str> {
    if segment.is_empty() {
        return Err("empty path segment");
    }
    if segment
        .chars()
        .any(|c| c.is_whitespace() || matches!(c, '(' | ')'))
    {
        return Err("path segments cannot contain whitespace or parentheses");
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Variable(name) => write!(f, "{}", name),
            Expression::Chain { receiver, members } => {
                write!(f, "{}", receiver)?;
                for member in members {
                    write!(f, ".{}", member)?;
                }
                Ok(())
            }
        }
    }
}
