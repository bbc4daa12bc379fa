use std::fmt;
use std::ops::Range;

use docmerge::expression::ExpressionError;
use docmerge::parser::ParseError;

/// The template itself is malformed: directives do not pair up or do not fit
/// any block structure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TemplateError {
    #[error("could not find end field for «{start}», was looking for «{end}»")]
    MissingEndField { start: String, end: String },

    #[error("no row, paragraph or inline block encloses «{start}» and «{end}»")]
    UnresolvableBlock { start: String, end: String },

    #[error("«{marker}» cannot follow the else branch of «{start}»")]
    MisplacedBranch { start: String, marker: String },

    #[error(transparent)]
    InvalidExpression(#[from] ExpressionError),
}

/// The template is fine but the context does not fit it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("«{expression}» should evaluate to an enumerable but was {type_name}")]
    NotEnumerable {
        expression: String,
        type_name: String,
    },

    #[error("«{expression}» should evaluate to an image but was {type_name}")]
    NotAnImage {
        expression: String,
        type_name: String,
    },

    #[error("undefined member `{member}` for {type_name} in «{expression}»")]
    UnknownMember {
        expression: String,
        member: String,
        type_name: String,
    },

    #[error("undefined predicate `{predicate}` for {type_name} in «{expression}»")]
    UnknownPredicate {
        expression: String,
        predicate: String,
        type_name: String,
    },

    #[error("undefined variable `{name}` in «{expression}»")]
    UndefinedVariable { name: String, expression: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("a handler named `{0}` is already registered")]
    DuplicateHandler(String),
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Context(#[from] ContextError),

    #[error("XML error: {0}")]
    Parse(#[from] ParseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A runtime error enriched with the source location of the offending field.
#[derive(Debug)]
pub struct DiagnosticError {
    pub error: RuntimeError,
    pub span: Option<Range<usize>>,
    pub source_id: usize,
}

impl DiagnosticError {
    /// Attach a source span unless one is already known.
    pub fn at(mut self, span: Range<usize>) -> Self {
        if self.span.is_none() && !span.is_empty() {
            self.span = Some(span);
        }
        self
    }

    pub fn with_source(mut self, source_id: usize) -> Self {
        self.source_id = source_id;
        self
    }

    pub fn is_template_error(&self) -> bool {
        matches!(self.error, RuntimeError::Template(_))
    }

    pub fn is_context_error(&self) -> bool {
        matches!(self.error, RuntimeError::Context(_))
    }
}

impl From<RuntimeError> for DiagnosticError {
    fn from(error: RuntimeError) -> Self {
        DiagnosticError {
            error,
            span: None,
            source_id: 0,
        }
    }
}

impl From<TemplateError> for DiagnosticError {
    fn from(error: TemplateError) -> Self {
        RuntimeError::from(error).into()
    }
}

impl From<ContextError> for DiagnosticError {
    fn from(error: ContextError) -> Self {
        RuntimeError::from(error).into()
    }
}

impl From<ParseError> for DiagnosticError {
    fn from(error: ParseError) -> Self {
        let span = error.span.clone();
        let source_id = error.file_id;
        DiagnosticError {
            error: RuntimeError::from(error),
            span: Some(span),
            source_id,
        }
    }
}

impl From<std::io::Error> for DiagnosticError {
    fn from(error: std::io::Error) -> Self {
        RuntimeError::from(error).into()
    }
}

impl fmt::Display for DiagnosticError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for DiagnosticError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
