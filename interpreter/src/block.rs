use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use docmerge::document::{Document, NodeId, names};
use docmerge::field::FieldRef;
use tracing::trace;

use crate::environment::Environment;
use crate::error::{DiagnosticError, TemplateError};
use crate::handler::HandlerRegistry;
use crate::processor;

/// Which structure a pair of directive fields spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// `@name:start` .. `@name:end`, bounded by the surrounding paragraphs.
    Image,
    /// Start and end sit in different table rows.
    Row,
    /// Start and end sit in different paragraphs.
    Paragraph,
    /// Start and end share one paragraph.
    InlineParagraph,
}

/// Reference counts for the rows and paragraphs that blocks built from one
/// scan use as boundaries.
///
/// Two blocks abutting in one paragraph both hold it; it is only detached
/// once the last of them is replaced. Paragraphs that also carry an inline
/// or image block are pinned and never detached.
#[derive(Debug, Default)]
pub struct Boundaries {
    references: RefCell<HashMap<NodeId, usize>>,
    pinned: RefCell<HashSet<NodeId>>,
}

impl Boundaries {
    pub fn new() -> Rc<Self> {
        Rc::new(Boundaries::default())
    }

    fn is_pinned(&self, node: NodeId) -> bool {
        self.pinned.borrow().contains(&node)
    }

    fn add(&self, node: NodeId) {
        *self.references.borrow_mut().entry(node).or_insert(0) += 1;
    }

    fn pin(&self, node: NodeId) {
        self.pinned.borrow_mut().insert(node);
    }

    /// Drop one reference. True when the node is now free to detach.
    fn release(&self, node: NodeId) -> bool {
        let mut references = self.references.borrow_mut();
        let remaining = references.get(&node).copied().unwrap_or(0).saturating_sub(1);
        references.insert(node, remaining);
        remaining == 0 && !self.is_pinned(node)
    }
}

/// The span of the document between a start and an end field.
#[derive(Debug)]
pub struct Block {
    kind: BlockKind,
    start_field: FieldRef,
    end_field: FieldRef,
    start_node: NodeId,
    end_node: NodeId,
    body: Vec<NodeId>,
    boundaries: Rc<Boundaries>,
}

impl Block {
    /// Resolve the block spanned by two fields. The first kind whose shape
    /// fits wins. Row, paragraph and inline boundaries must be siblings with
    /// the end following the start.
    pub fn enclosed_by(
        document: &Document,
        start_field: FieldRef,
        end_field: FieldRef,
        boundaries: &Rc<Boundaries>,
    ) -> Result<Block, TemplateError> {
        let unresolvable = || TemplateError::UnresolvableBlock {
            start: start_field.expression().to_string(),
            end: end_field.expression().to_string(),
        };
        let (kind, start_node, end_node) =
            resolve(document, &start_field, &end_field).ok_or_else(unresolvable)?;
        let body = match body_between(document, start_node, end_node) {
            Some(body) => body,
            None if kind == BlockKind::Image => Vec::new(),
            None => return Err(unresolvable()),
        };

        trace!(
            start = start_field.expression(),
            end = end_field.expression(),
            ?kind,
            "block resolved"
        );

        start_field.add_block_reference();
        end_field.add_block_reference();
        match kind {
            BlockKind::Row | BlockKind::Paragraph => {
                boundaries.add(start_node);
                boundaries.add(end_node);
            }
            BlockKind::InlineParagraph | BlockKind::Image => {
                for field in [&start_field, &end_field] {
                    if let Some(paragraph) = field.ancestor(document, names::PARAGRAPH) {
                        boundaries.pin(paragraph);
                    }
                }
            }
        }

        Ok(Block {
            kind,
            start_field,
            end_field,
            start_node,
            end_node,
            body,
            boundaries: Rc::clone(boundaries),
        })
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn start_field(&self) -> &FieldRef {
        &self.start_field
    }

    pub fn end_field(&self) -> &FieldRef {
        &self.end_field
    }

    /// Element siblings strictly between the boundary nodes.
    pub fn body(&self) -> &[NodeId] {
        &self.body
    }

    /// Start boundary, body and end boundary, without repeating a boundary
    /// shared by both ends.
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes = vec![self.start_node];
        nodes.extend_from_slice(&self.body);
        if self.end_node != self.start_node {
            nodes.push(self.end_node);
        }
        nodes
    }

    /// Expand a fresh copy of the body against `env` and return the
    /// resulting detached nodes.
    pub fn process(
        &self,
        document: &mut Document,
        env: &mut Environment,
        registry: &HandlerRegistry,
    ) -> Result<Vec<NodeId>, DiagnosticError> {
        let container = document.create_element("docmerge:block");
        for node in &self.body {
            let copy = document.deep_copy(*node);
            document.append_child(container, copy);
        }

        processor::run(document, container, env, registry)?;

        let nodes = document.children(container).to_vec();
        for node in &nodes {
            document.detach(*node);
        }
        Ok(nodes)
    }

    /// Put `content` in place of the block and drop the boundaries no other
    /// block still refers to. Image blocks keep their body and boundaries and
    /// only lose the field markers.
    pub fn replace(&self, document: &mut Document, content: &[NodeId]) {
        let mut anchor = self.start_node;
        for node in content {
            document.insert_after(anchor, *node);
            anchor = *node;
        }

        if self.kind != BlockKind::Image {
            for node in &self.body {
                document.detach(*node);
            }
        }

        self.remove_boundary(document, &self.start_field, self.start_node);
        self.remove_boundary(document, &self.end_field, self.end_node);
    }

    fn remove_boundary(&self, document: &mut Document, field: &FieldRef, node: NodeId) {
        let field_released = field.release_block_reference();
        if matches!(self.kind, BlockKind::Row | BlockKind::Paragraph)
            && self.boundaries.release(node)
        {
            document.detach(node);
        } else if field_released {
            field.remove(document);
        } else {
            trace!(field = field.expression(), "boundary still shared, kept");
        }
    }
}

fn resolve(
    document: &Document,
    start: &FieldRef,
    end: &FieldRef,
) -> Option<(BlockKind, NodeId, NodeId)> {
    let start_paragraph = start.ancestor(document, names::PARAGRAPH);
    let end_paragraph = end.ancestor(document, names::PARAGRAPH);

    if start.expression().starts_with('@') {
        return Some((
            BlockKind::Image,
            start_paragraph.unwrap_or_else(|| start.start_node()),
            end_paragraph.unwrap_or_else(|| end.end_node()),
        ));
    }

    let start_row = start.ancestor(document, names::TABLE_ROW);
    let end_row = end.ancestor(document, names::TABLE_ROW);
    if let (Some(s), Some(e)) = (start_row, end_row) {
        if s != e && document.parent(s) == document.parent(e) {
            return Some((BlockKind::Row, s, e));
        }
    }

    match (start_paragraph, end_paragraph) {
        (Some(s), Some(e)) if s != e && document.parent(s) == document.parent(e) => {
            Some((BlockKind::Paragraph, s, e))
        }
        (Some(s), Some(e)) if s == e => Some((
            BlockKind::InlineParagraph,
            start.end_node(),
            end.start_node(),
        )),
        _ => None,
    }
}

/// Element siblings after `start` up to, not including, `end`. Empty when
/// the two are the same node, `None` when `end` is not a later sibling.
fn body_between(document: &Document, start: NodeId, end: NodeId) -> Option<Vec<NodeId>> {
    let mut body = Vec::new();
    if start == end {
        return Some(body);
    }
    let mut cursor = start;
    while let Some(next) = document.next_element_sibling(cursor) {
        if next == end {
            return Some(body);
        }
        body.push(next);
        cursor = next;
    }
    None
}
