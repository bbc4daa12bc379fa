use std::collections::VecDeque;
use std::rc::Rc;

use docmerge::document::Document;
use docmerge::expression::Expression;
use docmerge::field::{Field, FieldRef};
use tracing::{debug, trace};

use crate::block::{Block, Boundaries};
use crate::error::{DiagnosticError, TemplateError};
use crate::handler::HandlerRegistry;
use crate::statement::Statement;

/// Turns the fields of one subtree into statements.
///
/// Fields are consumed front to back. Block handlers keep pulling fields
/// until they reach their end marker, so nested directives end up inside the
/// block they belong to and are only built for real when that block is
/// processed.
pub struct OperationBuilder<'a> {
    document: &'a Document,
    registry: &'a HandlerRegistry,
    fields: VecDeque<FieldRef>,
    boundaries: Rc<Boundaries>,
    /// How many block bodies are being consumed right now.
    depth: usize,
}

impl<'a> OperationBuilder<'a> {
    pub fn new(document: &'a Document, registry: &'a HandlerRegistry, fields: Vec<Field>) -> Self {
        OperationBuilder {
            document,
            registry,
            fields: fields.into_iter().map(Rc::new).collect(),
            boundaries: Boundaries::new(),
            depth: 0,
        }
    }

    pub fn document(&self) -> &'a Document {
        self.document
    }

    /// Build all top-level statements.
    pub fn build(mut self) -> Result<Vec<Statement>, DiagnosticError> {
        let mut statements = Vec::new();
        while !self.fields.is_empty() {
            if let Some(statement) = self.consume(true)? {
                debug!(statement = statement.name(), "statement built");
                statements.push(statement);
            }
        }
        Ok(statements)
    }

    /// Pop the next field and hand it to its handler. `None` when no fields
    /// remain or the handler declined the field.
    pub fn consume(&mut self, allow_insertion: bool) -> Result<Option<Statement>, DiagnosticError> {
        let Some(field) = self.fields.pop_front() else {
            return Ok(None);
        };
        let registry = self.registry;
        match registry.handler_for(&field) {
            Some(handler) => handler.build(self, field, allow_insertion),
            None => {
                trace!(expression = field.expression(), "no handler, field dropped");
                Ok(None)
            }
        }
    }

    /// Consume fields until the one whose expression is `end`, and return it.
    /// Fields in between are built with insertion disabled, so any nested
    /// blocks swallow their own end markers.
    pub fn consume_block(&mut self, start: &FieldRef, end: &str) -> Result<FieldRef, DiagnosticError> {
        let mut boundaries = self.consume_multi_block(start, end, |_| false)?;
        boundaries
            .pop()
            .ok_or_else(|| missing_end_field(start, end))
    }

    /// Like [`consume_block`](Self::consume_block) but also stops at every
    /// field at this nesting level for which `is_marker` holds. Returns the
    /// start field, the markers in order, then the end field.
    pub fn consume_multi_block(
        &mut self,
        start: &FieldRef,
        end: &str,
        is_marker: impl Fn(&str) -> bool,
    ) -> Result<Vec<FieldRef>, DiagnosticError> {
        self.depth += 1;
        let result = self.collect_boundaries(start, end, is_marker);
        self.depth -= 1;
        result
    }

    fn collect_boundaries(
        &mut self,
        start: &FieldRef,
        end: &str,
        is_marker: impl Fn(&str) -> bool,
    ) -> Result<Vec<FieldRef>, DiagnosticError> {
        let mut boundaries = vec![start.clone()];
        loop {
            let Some(next) = self.fields.front() else {
                return Err(missing_end_field(start, end));
            };
            if next.expression() == end || is_marker(next.expression()) {
                let done = next.expression() == end;
                if let Some(field) = self.fields.pop_front() {
                    boundaries.push(field);
                }
                if done {
                    return Ok(boundaries);
                }
            } else {
                self.consume(false)?;
            }
        }
    }

    /// Resolve the block between two fields, reporting failures at the start field.
    ///
    /// Blocks nested in another block's body are only built to find their
    /// end markers; they are rebuilt from the body copy, so they count their
    /// boundaries apart from the blocks that are evaluated here.
    pub fn enclose(&self, start: FieldRef, end: FieldRef) -> Result<Block, DiagnosticError> {
        let span = start.span.clone();
        let boundaries = if self.depth > 0 {
            Boundaries::new()
        } else {
            Rc::clone(&self.boundaries)
        };
        Block::enclosed_by(self.document, start, end, &boundaries)
            .map_err(|e| DiagnosticError::from(e).at(span))
    }

    /// Parse a directive operand, reporting failures at `field`.
    pub fn expression(field: &Field, text: &str) -> Result<Expression, DiagnosticError> {
        Expression::parse(text).map_err(|e| {
            DiagnosticError::from(TemplateError::InvalidExpression(e)).at(field.span.clone())
        })
    }
}

fn missing_end_field(start: &FieldRef, end: &str) -> DiagnosticError {
    DiagnosticError::from(TemplateError::MissingEndField {
        start: start.expression().to_string(),
        end: end.to_string(),
    })
    .at(start.span.clone())
}
