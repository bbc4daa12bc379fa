use std::fmt;
use std::rc::Rc;
use std::sync::LazyLock;

use docmerge::field::{Field, FieldRef};
use regex::Regex;

use crate::builder::OperationBuilder;
use crate::error::{DiagnosticError, RegistryError, TemplateError};
use crate::statement::{Condition, Statement};

static INSERTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^=(.+)$").expect("insertion pattern is valid"));
static EACH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^ ]+):each\(([^ )]+)\)$").expect("each pattern is valid")
});
static IF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^ ]+):if(?:\(([^)]+)\))?$").expect("if pattern is valid")
});
static ELSIF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^ ]+):elsif(?:\(([^)]+)\))?$").expect("elsif pattern is valid")
});
static IMAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^@([^: ]+):start$").expect("image pattern is valid"));

/// Turns a directive field into a statement.
///
/// `build` receives the builder so block handlers can pull the fields up to
/// their end marker out of the queue.
pub trait FieldHandler: fmt::Debug {
    fn matches(&self, field: &Field) -> bool;

    fn build(
        &self,
        builder: &mut OperationBuilder<'_>,
        field: FieldRef,
        allow_insertion: bool,
    ) -> Result<Option<Statement>, DiagnosticError>;
}

/// `=expr`
#[derive(Debug, Default)]
pub struct InsertionHandler;

impl FieldHandler for InsertionHandler {
    fn matches(&self, field: &Field) -> bool {
        INSERTION.is_match(field.expression())
    }

    fn build(
        &self,
        _builder: &mut OperationBuilder<'_>,
        field: FieldRef,
        allow_insertion: bool,
    ) -> Result<Option<Statement>, DiagnosticError> {
        if !allow_insertion {
            return Ok(None);
        }
        let expression = OperationBuilder::expression(&field, &field.expression()[1..])?;
        Ok(Some(Statement::Insertion { field, expression }))
    }
}

/// `list:each(item)` .. `list:endEach`
#[derive(Debug, Default)]
pub struct EachLoopHandler;

impl FieldHandler for EachLoopHandler {
    fn matches(&self, field: &Field) -> bool {
        EACH.is_match(field.expression())
    }

    fn build(
        &self,
        builder: &mut OperationBuilder<'_>,
        field: FieldRef,
        _allow_insertion: bool,
    ) -> Result<Option<Statement>, DiagnosticError> {
        let Some(captures) = EACH.captures(field.expression()) else {
            return Ok(None);
        };
        let list = captures[1].to_string();
        let iterator_name = captures[2].to_string();

        let end = builder.consume_block(&field, &format!("{}:endEach", list))?;
        let list_expression = OperationBuilder::expression(&field, &list)?;
        let block = builder.enclose(field, end)?;

        Ok(Some(Statement::Loop {
            list_expression,
            iterator_name,
            block,
        }))
    }
}

/// `cond:if` / `cond:if(pred?)` .. `cond:endIf`, with optional
/// `other:elsif[(pred?)]` and `cond:else` branches in between.
#[derive(Debug, Default)]
pub struct ConditionalHandler;

impl FieldHandler for ConditionalHandler {
    fn matches(&self, field: &Field) -> bool {
        IF.is_match(field.expression())
    }

    fn build(
        &self,
        builder: &mut OperationBuilder<'_>,
        field: FieldRef,
        _allow_insertion: bool,
    ) -> Result<Option<Statement>, DiagnosticError> {
        let Some(captures) = IF.captures(field.expression()) else {
            return Ok(None);
        };
        let name = captures[1].to_string();
        let end = format!("{}:endIf", name);
        let else_marker = format!("{}:else", name);

        let boundaries = builder.consume_multi_block(&field, &end, |expression| {
            expression == else_marker || ELSIF.is_match(expression)
        })?;

        if let [from, to] = boundaries.as_slice() {
            let condition = branch(builder, &IF, from, to.clone())?;
            return Ok(Some(Statement::Condition(condition)));
        }

        let mut branches = Vec::new();
        let mut otherwise = None;
        for pair in boundaries.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            if otherwise.is_some() {
                return Err(DiagnosticError::from(TemplateError::MisplacedBranch {
                    start: field.expression().to_string(),
                    marker: from.expression().to_string(),
                })
                .at(from.span.clone()));
            }
            if from.expression() == else_marker {
                otherwise = Some(builder.enclose(from.clone(), to.clone())?);
            } else if Rc::ptr_eq(from, &field) {
                branches.push(branch(builder, &IF, from, to.clone())?);
            } else {
                branches.push(branch(builder, &ELSIF, from, to.clone())?);
            }
        }

        Ok(Some(Statement::Choice {
            branches,
            otherwise,
        }))
    }
}

fn branch(
    builder: &OperationBuilder<'_>,
    pattern: &Regex,
    from: &FieldRef,
    to: FieldRef,
) -> Result<Condition, DiagnosticError> {
    let (expression, predicate) = match pattern.captures(from.expression()) {
        Some(captures) => (
            captures[1].to_string(),
            captures.get(2).map(|m| m.as_str().to_string()),
        ),
        None => (from.expression().to_string(), None),
    };
    Ok(Condition {
        expression: OperationBuilder::expression(from, &expression)?,
        predicate,
        block: builder.enclose(from.clone(), to)?,
    })
}

/// `@name:start` .. `@name:end`
#[derive(Debug, Default)]
pub struct ImageHandler;

impl FieldHandler for ImageHandler {
    fn matches(&self, field: &Field) -> bool {
        IMAGE.is_match(field.expression())
    }

    fn build(
        &self,
        builder: &mut OperationBuilder<'_>,
        field: FieldRef,
        _allow_insertion: bool,
    ) -> Result<Option<Statement>, DiagnosticError> {
        let Some(captures) = IMAGE.captures(field.expression()) else {
            return Ok(None);
        };
        let name = captures[1].to_string();

        let end = builder.consume_block(&field, &format!("@{}:end", name))?;
        let expression = OperationBuilder::expression(&field, &name)?;
        let block = builder.enclose(field, end)?;

        Ok(Some(Statement::Image { expression, block }))
    }
}

/// `comment` .. `endComment`
#[derive(Debug, Default)]
pub struct CommentHandler;

impl FieldHandler for CommentHandler {
    fn matches(&self, field: &Field) -> bool {
        field.expression() == "comment"
    }

    fn build(
        &self,
        builder: &mut OperationBuilder<'_>,
        field: FieldRef,
        _allow_insertion: bool,
    ) -> Result<Option<Statement>, DiagnosticError> {
        let end = builder.consume_block(&field, "endComment")?;
        let block = builder.enclose(field, end)?;
        Ok(Some(Statement::Comment { block }))
    }
}

/// Ordered, named field handlers plus an optional fallback.
///
/// The first handler whose `matches` accepts a field builds it. Fields no
/// handler accepts go to the fallback; without one they are dropped.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    handlers: Vec<(String, Box<dyn FieldHandler>)>,
    default: Option<Box<dyn FieldHandler>>,
}

impl HandlerRegistry {
    /// An empty registry. See [`HandlerRegistry::with_defaults`] for the stock directives.
    pub fn new() -> Self {
        HandlerRegistry::default()
    }

    /// Insertion, each, conditional, image and comment, in that order.
    pub fn with_defaults() -> Self {
        HandlerRegistry {
            handlers: vec![
                entry("insertion", InsertionHandler),
                entry("each", EachLoopHandler),
                entry("conditional", ConditionalHandler),
                entry("image", ImageHandler),
                entry("comment", CommentHandler),
            ],
            default: None,
        }
    }

    /// Append a handler under a new name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Box<dyn FieldHandler>,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if self.position(&name).is_some() {
            return Err(RegistryError::DuplicateHandler(name));
        }
        self.handlers.push((name, handler));
        Ok(())
    }

    /// Swap the handler registered under `name`, keeping its position, or
    /// append it if the name is new. Returns the handler it displaced.
    pub fn replace(
        &mut self,
        name: impl Into<String>,
        handler: Box<dyn FieldHandler>,
    ) -> Option<Box<dyn FieldHandler>> {
        let name = name.into();
        match self.position(&name) {
            Some(index) => Some(std::mem::replace(&mut self.handlers[index].1, handler)),
            None => {
                self.handlers.push((name, handler));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Box<dyn FieldHandler>> {
        let index = self.position(name)?;
        Some(self.handlers.remove(index).1)
    }

    pub fn set_default(
        &mut self,
        handler: Option<Box<dyn FieldHandler>>,
    ) -> Option<Box<dyn FieldHandler>> {
        std::mem::replace(&mut self.default, handler)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handlers.iter().map(|(name, _)| name.as_str())
    }

    pub fn handler_for(&self, field: &Field) -> Option<&dyn FieldHandler> {
        self.handlers
            .iter()
            .find(|(_, handler)| handler.matches(field))
            .map(|(_, handler)| &**handler)
            .or(self.default.as_deref())
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.handlers.iter().position(|(n, _)| n == name)
    }
}

fn entry(name: &str, handler: impl FieldHandler + 'static) -> (String, Box<dyn FieldHandler>) {
    (name.to_string(), Box::new(handler))
}
