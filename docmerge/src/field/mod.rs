pub mod scanner;

use std::cell::Cell;
use std::ops::Range;
use std::rc::Rc;

use crate::document::{Document, NodeId, names};

/// A field shared between the statements and blocks that reference it.
pub type FieldRef = Rc<Field>;

/// The two on-the-wire shapes a merge field can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// `<w:fldSimple w:instr="...">` carrying the instruction as an attribute.
    Simple,
    /// begin / instrText / separate / display / end runs.
    Complex,
}

/// A located merge-field directive.
#[derive(Debug)]
pub struct Field {
    /// The directive text, e.g. `=person.name` or `items:each(item)`.
    pub raw_expression: String,
    /// The nodes that together make up the field, in document order.
    pub anchor_nodes: Vec<NodeId>,
    pub shape: FieldShape,
    pub valid: bool,
    /// Byte span of the field in the source XML.
    pub span: Range<usize>,
    block_reference_count: Cell<usize>,
}

impl Field {
    pub fn new(
        raw_expression: impl Into<String>,
        anchor_nodes: Vec<NodeId>,
        shape: FieldShape,
        valid: bool,
        span: Range<usize>,
    ) -> Self {
        Field {
            raw_expression: raw_expression.into(),
            anchor_nodes,
            shape,
            valid,
            span,
            block_reference_count: Cell::new(0),
        }
    }

    pub fn expression(&self) -> &str {
        &self.raw_expression
    }

    pub fn start_node(&self) -> NodeId {
        self.anchor_nodes[0]
    }

    pub fn end_node(&self) -> NodeId {
        self.anchor_nodes[self.anchor_nodes.len() - 1]
    }

    /// Nearest ancestor element with the given name, looked up from the start node.
    pub fn ancestor(&self, document: &Document, name: &str) -> Option<NodeId> {
        document.find_ancestor(self.start_node(), name)
    }

    /// The node holding the field's displayed result: the run after the
    /// separator for complex fields, the field element itself for simple ones.
    pub fn display_node(&self, document: &Document) -> Option<NodeId> {
        match self.shape {
            FieldShape::Simple => Some(self.start_node()),
            FieldShape::Complex => {
                let separator = self
                    .anchor_nodes
                    .iter()
                    .position(|n| contains_field_char(document, *n, "separate"))?;
                let display = *self.anchor_nodes.get(separator + 1)?;
                if display == self.end_node() && contains_field_char(document, display, "end") {
                    None
                } else {
                    Some(display)
                }
            }
        }
    }

    pub fn block_reference_count(&self) -> usize {
        self.block_reference_count.get()
    }

    /// Called once for every block that uses this field as a boundary.
    pub fn add_block_reference(&self) {
        self.block_reference_count
            .set(self.block_reference_count.get() + 1);
    }

    /// Drop one block reference. Returns true once no block references the field
    /// any more, meaning the caller is the one that must remove it.
    pub fn release_block_reference(&self) -> bool {
        let remaining = self.block_reference_count.get().saturating_sub(1);
        self.block_reference_count.set(remaining);
        remaining == 0
    }

    /// Detach every anchor node from the tree.
    pub fn remove(&self, document: &mut Document) {
        for node in &self.anchor_nodes {
            document.detach(*node);
        }
    }
}

/// True if `node` is or contains a `w:fldChar` of the given type.
pub(crate) fn contains_field_char(document: &Document, node: NodeId, char_type: &str) -> bool {
    std::iter::once(node)
        .chain(document.descendants(node))
        .any(|n| {
            document.is_element(n, names::FIELD_CHAR)
                && document.attribute(n, names::FIELD_CHAR_TYPE) == Some(char_type)
        })
}
