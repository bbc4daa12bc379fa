use docmerge::document::{Document, names};
use docmerge::expression::Expression;
use docmerge::field::FieldRef;
use tracing::debug;

use crate::block::Block;
use crate::content::{Content, Text};
use crate::environment::{Environment, Scope};
use crate::error::{ContextError, DiagnosticError, RuntimeError};
use crate::evaluator;
use crate::handler::HandlerRegistry;
use crate::runtime_value::RuntimeValue;

/// One branch of a conditional: the guard and the block it keeps.
#[derive(Debug)]
pub struct Condition {
    pub expression: Expression,
    /// Zero-argument predicate applied to the value, e.g. `empty?`.
    pub predicate: Option<String>,
    pub block: Block,
}

impl Condition {
    /// Whether the guard holds against `env`.
    pub fn holds(&self, env: &Environment) -> Result<bool, DiagnosticError> {
        let span = self.block.start_field().span.clone();
        let result = match &self.predicate {
            Some(predicate) => evaluator::evaluate_predicate(&self.expression, predicate, env),
            None => evaluator::evaluate(&self.expression, env).map(|v| v.is_truthy()),
        };
        result.map_err(|e| DiagnosticError::from(e).at(span))
    }
}

#[derive(Debug)]
pub enum Statement {
    /// `=expr`
    Insertion {
        field: FieldRef,
        expression: Expression,
    },
    /// `list:each(item)`, expanded once per item.
    Loop {
        list_expression: Expression,
        iterator_name: String,
        block: Block,
    },
    Condition(Condition),
    /// `if` with `elsif`/`else` branches. The first branch that holds wins.
    Choice {
        branches: Vec<Condition>,
        otherwise: Option<Block>,
    },
    /// `@name:start`, retargets the picture inside the block.
    Image {
        expression: Expression,
        block: Block,
    },
    Comment {
        block: Block,
    },
}

impl Statement {
    pub fn name(&self) -> &'static str {
        match self {
            Statement::Insertion { .. } => "insertion",
            Statement::Loop { .. } => "loop",
            Statement::Condition(_) => "condition",
            Statement::Choice { .. } => "choice",
            Statement::Image { .. } => "image",
            Statement::Comment { .. } => "comment",
        }
    }

    /// Apply the statement to the document. Either the whole statement
    /// takes effect or the error is returned.
    pub fn evaluate(
        &self,
        document: &mut Document,
        env: &mut Environment,
        registry: &HandlerRegistry,
    ) -> Result<(), DiagnosticError> {
        match self {
            Statement::Insertion { field, expression } => {
                let value = evaluator::evaluate(expression, env)
                    .map_err(|e| DiagnosticError::from(e).at(field.span.clone()))?;
                debug!(expression = %expression, value = %value, "insert");
                let at = |e: RuntimeError| DiagnosticError::from(e).at(field.span.clone());
                match value {
                    RuntimeValue::Nil | RuntimeValue::Boolean(false) => field.remove(document),
                    RuntimeValue::Content(content) => {
                        content.append_to(document, field, env).map_err(at)?
                    }
                    other => Text::new(other.to_string())
                        .append_to(document, field, env)
                        .map_err(at)?,
                }
                Ok(())
            }

            Statement::Loop {
                list_expression,
                iterator_name,
                block,
            } => {
                let span = block.start_field().span.clone();
                let items = evaluator::evaluate_enumerable(list_expression, env)
                    .map_err(|e| DiagnosticError::from(e).at(span))?;
                debug!(list = %list_expression, items = items.len(), "loop");

                let mut content = Vec::new();
                for item in items {
                    env.push_scope(Scope::binding(iterator_name.clone(), item));
                    let result = block.process(document, env, registry);
                    env.pop_scope();
                    content.extend(result?);
                }
                block.replace(document, &content);
                Ok(())
            }

            Statement::Condition(condition) => {
                let content = if condition.holds(env)? {
                    condition.block.process(document, env, registry)?
                } else {
                    Vec::new()
                };
                condition.block.replace(document, &content);
                Ok(())
            }

            Statement::Choice {
                branches,
                otherwise,
            } => {
                let mut chosen = None;
                for (index, branch) in branches.iter().enumerate() {
                    if branch.holds(env)? {
                        chosen = Some(index);
                        break;
                    }
                }

                let content = match (chosen, otherwise) {
                    (Some(index), _) => branches[index].block.process(document, env, registry)?,
                    (None, Some(block)) => block.process(document, env, registry)?,
                    (None, None) => Vec::new(),
                };

                for (index, branch) in branches.iter().enumerate() {
                    if chosen == Some(index) {
                        branch.block.replace(document, &content);
                    } else {
                        branch.block.replace(document, &[]);
                    }
                }
                if let Some(block) = otherwise {
                    if chosen.is_none() {
                        block.replace(document, &content);
                    } else {
                        block.replace(document, &[]);
                    }
                }
                Ok(())
            }

            Statement::Image { expression, block } => {
                let span = block.start_field().span.clone();
                let value = evaluator::evaluate(expression, env)
                    .map_err(|e| DiagnosticError::from(e).at(span.clone()))?;

                let image = match &value {
                    RuntimeValue::Content(content) => content.as_image(),
                    _ => None,
                };
                match image {
                    Some(image) => {
                        let rid = match &image.rid {
                            Some(rid) => rid.clone(),
                            None => env.media_mut().register(image),
                        };
                        debug!(name = %image.name, rid = %rid, "image");
                        for node in block.nodes() {
                            for target in std::iter::once(node).chain(document.descendants(node)) {
                                if document.is_element(target, names::PICTURE_PROPERTIES) {
                                    document.set_attribute(target, "name", image.name.clone());
                                } else if document.is_element(target, names::BLIP) {
                                    document.set_attribute(target, names::EMBED, rid.clone());
                                }
                            }
                        }
                    }
                    None if value.is_nil() => {
                        debug!(expression = %expression, "no image, placeholder kept")
                    }
                    None => {
                        let error = ContextError::NotAnImage {
                            expression: expression.to_string(),
                            type_name: value.type_name().to_string(),
                        };
                        return Err(DiagnosticError::from(error).at(span));
                    }
                }

                block.replace(document, &[]);
                Ok(())
            }

            Statement::Comment { block } => {
                block.replace(document, &[]);
                Ok(())
            }
        }
    }
}
