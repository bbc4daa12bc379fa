use docmerge::expression::Expression;

use crate::environment::{Environment, MissingPolicy};
use crate::error::ContextError;
use crate::runtime_value::RuntimeValue;

/// Resolve an expression against the environment.
///
/// The receiver is looked up innermost scope first; each member is then
/// applied to the previous result, left to right.
pub fn evaluate(expression: &Expression, env: &Environment) -> Result<RuntimeValue, ContextError> {
    let receiver = lookup(expression, expression.root_name(), env)?;

    match expression {
        Expression::Variable(_) => Ok(receiver),
        Expression::Chain { members, .. } => {
            members.iter().try_fold(receiver, |value, member| {
                value
                    .member(member)
                    .ok_or_else(|| ContextError::UnknownMember {
                        expression: expression.to_string(),
                        member: member.clone(),
                        type_name: value.type_name().to_string(),
                    })
            })
        }
    }
}

/// Evaluate and apply a `?` predicate to the result.
pub fn evaluate_predicate(
    expression: &Expression,
    predicate: &str,
    env: &Environment,
) -> Result<bool, ContextError> {
    let value = evaluate(expression, env)?;
    value
        .predicate(predicate)
        .ok_or_else(|| ContextError::UnknownPredicate {
            expression: expression.to_string(),
            predicate: predicate.to_string(),
            type_name: value.type_name().to_string(),
        })
}

/// Evaluate and demand the enumeration contract.
pub fn evaluate_enumerable(
    expression: &Expression,
    env: &Environment,
) -> Result<Vec<RuntimeValue>, ContextError> {
    let value = evaluate(expression, env)?;
    value.enumerate().ok_or_else(|| ContextError::NotEnumerable {
        expression: expression.to_string(),
        type_name: value.type_name().to_string(),
    })
}

fn lookup(
    expression: &Expression,
    name: &str,
    env: &Environment,
) -> Result<RuntimeValue, ContextError> {
    match env.get_variable(name) {
        Some(value) => Ok(value.clone()),
        None => match env.policy() {
            MissingPolicy::Lenient => Ok(RuntimeValue::Nil),
            MissingPolicy::Strict => Err(ContextError::UndefinedVariable {
                name: name.to_string(),
                expression: expression.to_string(),
            }),
        },
    }
}
