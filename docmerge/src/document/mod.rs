pub mod names;

use std::fmt;
use std::ops::Range;

use quick_xml::escape::{escape, partial_escape};

/// Index of a node inside a [`Document`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// What a node is. Element names keep their namespace prefix (`w:p`, `a:blip`).
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// The synthetic container holding the top-level items of a part.
    Document,
    Element {
        name: String,
        attributes: Vec<(String, String)>,
    },
    /// Unescaped character data.
    Text(String),
    CData(String),
    /// Raw comment body, written back verbatim.
    Comment(String),
    ProcessingInstruction(String),
    Declaration(String),
    DocType(String),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    /// Byte span in the source XML. Empty for nodes created at runtime.
    pub span: Range<usize>,
}

/// A document part as an arena of nodes.
///
/// The arena owns every node ever created for the part. Removing a node only
/// detaches it from its parent, so a `NodeId` handed out earlier never dangles;
/// it just stops being reachable from [`Document::root`].
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Document {
            nodes: vec![Node {
                kind: NodeKind::Document,
                parent: None,
                children: Vec::new(),
                span: 0..0,
            }],
            root: NodeId(0),
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    /// The first element below the document container (`w:document`, `w:hdr`, ...).
    pub fn root_element(&self) -> Option<NodeId> {
        self.element_children(self.root).next()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.len() <= 1
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn span(&self, id: NodeId) -> Range<usize> {
        self.nodes[id.0].span.clone()
    }

    pub(crate) fn set_span(&mut self, id: NodeId, span: Range<usize>) {
        self.nodes[id.0].span = span;
    }

    pub(crate) fn extend_span(&mut self, id: NodeId, end: usize) {
        let node = &mut self.nodes[id.0];
        node.span = node.span.start..end.max(node.span.start);
    }

    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { name, .. } => Some(name),
            _ => None,
        }
    }

    pub fn is_element(&self, id: NodeId, name: &str) -> bool {
        self.name(id) == Some(name)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub fn element_children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes[id.0]
            .children
            .iter()
            .copied()
            .filter(|child| self.name(*child).is_some())
    }

    pub fn next_element_sibling(&self, id: NodeId) -> Option<NodeId> {
        let parent = self.parent(id)?;
        let siblings = self.children(parent);
        let position = siblings.iter().position(|s| *s == id)?;
        siblings[position + 1..]
            .iter()
            .copied()
            .find(|s| self.name(*s).is_some())
    }

    /// Ancestors from the nearest outwards, excluding `id` itself.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_> {
        Ancestors {
            document: self,
            next: self.parent(id),
        }
    }

    pub fn find_ancestor(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.ancestors(id).find(|a| self.is_element(*a, name))
    }

    /// All nodes below `id` in document order, excluding `id` itself.
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.children(id).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    pub fn find_descendant(&self, id: NodeId, name: &str) -> Option<NodeId> {
        self.descendants(id)
            .into_iter()
            .find(|d| self.is_element(*d, name))
    }

    pub fn attribute(&self, id: NodeId, key: &str) -> Option<&str> {
        match &self.nodes[id.0].kind {
            NodeKind::Element { attributes, .. } => attributes
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str()),
            _ => None,
        }
    }

    /// Sets an attribute on an element. Non-element nodes are left alone.
    pub fn set_attribute(&mut self, id: NodeId, key: &str, value: impl Into<String>) {
        if let NodeKind::Element { attributes, .. } = &mut self.nodes[id.0].kind {
            let value = value.into();
            match attributes.iter_mut().find(|(k, _)| k == key) {
                Some(slot) => slot.1 = value,
                None => attributes.push((key.to_string(), value)),
            }
        }
    }

    /// Concatenated character data of `id` and everything below it.
    pub fn text_content(&self, id: NodeId) -> String {
        let mut text = String::new();
        let nodes = std::iter::once(id).chain(self.descendants(id));
        for node in nodes {
            match &self.nodes[node.0].kind {
                NodeKind::Text(s) | NodeKind::CData(s) => text.push_str(s),
                _ => {}
            }
        }
        text
    }

    /// Replace the content of a text node, or the children of an element with one text node.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) {
        let text = text.into();
        match &mut self.nodes[id.0].kind {
            NodeKind::Text(s) | NodeKind::CData(s) => {
                *s = text;
                return;
            }
            NodeKind::Element { .. } => {}
            _ => return,
        }
        for child in self.nodes[id.0].children.clone() {
            self.detach(child);
        }
        let text_node = self.create_text(text);
        self.append_child(id, text_node);
    }

    pub fn create_node(&mut self, kind: NodeKind) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            kind,
            parent: None,
            children: Vec::new(),
            span: 0..0,
        });
        id
    }

    pub fn create_element(&mut self, name: impl Into<String>) -> NodeId {
        self.create_node(NodeKind::Element {
            name: name.into(),
            attributes: Vec::new(),
        })
    }

    pub fn create_text(&mut self, text: impl Into<String>) -> NodeId {
        self.create_node(NodeKind::Text(text.into()))
    }

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    pub fn prepend_child(&mut self, parent: NodeId, child: NodeId) {
        self.detach(child);
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(0, child);
    }

    /// Insert `node` as the next sibling of `anchor`. No-op if `anchor` has no parent.
    pub fn insert_after(&mut self, anchor: NodeId, node: NodeId) {
        self.insert_relative(anchor, node, 1);
    }

    /// Insert `node` as the previous sibling of `anchor`. No-op if `anchor` has no parent.
    pub fn insert_before(&mut self, anchor: NodeId, node: NodeId) {
        self.insert_relative(anchor, node, 0);
    }

    fn insert_relative(&mut self, anchor: NodeId, node: NodeId, offset: usize) {
        if anchor == node {
            return;
        }
        let Some(parent) = self.parent(anchor) else {
            return;
        };
        self.detach(node);
        let Some(position) = self.nodes[parent.0]
            .children
            .iter()
            .position(|c| *c == anchor)
        else {
            return;
        };
        self.nodes[node.0].parent = Some(parent);
        self.nodes[parent.0].children.insert(position + offset, node);
    }

    /// Unlink `id` from its parent. The node and its subtree stay in the arena.
    pub fn detach(&mut self, id: NodeId) {
        if let Some(parent) = self.nodes[id.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != id);
        }
    }

    /// Replace `id` with its own children, in place.
    pub fn unwrap_node(&mut self, id: NodeId) {
        let mut anchor = id;
        for child in self.nodes[id.0].children.clone() {
            self.insert_after(anchor, child);
            anchor = child;
        }
        self.detach(id);
    }

    /// Copy the subtree rooted at `id`. The copy is detached and keeps the source spans.
    pub fn deep_copy(&mut self, id: NodeId) -> NodeId {
        let source = &self.nodes[id.0];
        let kind = source.kind.clone();
        let span = source.span.clone();
        let children = source.children.clone();

        let copy = self.create_node(kind);
        self.nodes[copy.0].span = span;
        for child in children {
            let child_copy = self.deep_copy(child);
            self.nodes[child_copy.0].parent = Some(copy);
            self.nodes[copy.0].children.push(child_copy);
        }
        copy
    }

    /// True if `id` is reachable from the document root.
    pub fn is_attached(&self, id: NodeId) -> bool {
        id == self.root || self.ancestors(id).any(|a| a == self.root)
    }

    /// Serialize the whole part back to XML.
    pub fn to_xml(&self) -> String {
        self.subtree_to_xml(self.root)
    }

    pub fn subtree_to_xml(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_node(id, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id.0];
        match &node.kind {
            NodeKind::Document => {
                for child in &node.children {
                    self.write_node(*child, out);
                }
            }
            NodeKind::Element { name, attributes } => {
                out.push('<');
                out.push_str(name);
                for (key, value) in attributes {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape(value.as_str()));
                    out.push('"');
                }
                if node.children.is_empty() {
                    out.push_str("/>");
                } else {
                    out.push('>');
                    for child in &node.children {
                        self.write_node(*child, out);
                    }
                    out.push_str("</");
                    out.push_str(name);
                    out.push('>');
                }
            }
            NodeKind::Text(text) => out.push_str(&partial_escape(text.as_str())),
            NodeKind::CData(text) => {
                out.push_str("<![CDATA[");
                out.push_str(text);
                out.push_str("]]>");
            }
            NodeKind::Comment(text) => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::ProcessingInstruction(text) | NodeKind::Declaration(text) => {
                out.push_str("<?");
                out.push_str(text);
                out.push_str("?>");
            }
            NodeKind::DocType(text) => {
                out.push_str("<!DOCTYPE ");
                out.push_str(text);
                out.push('>');
            }
        }
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_xml())
    }
}

pub struct Ancestors<'a> {
    document: &'a Document,
    next: Option<NodeId>,
}

impl Iterator for Ancestors<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let current = self.next?;
        self.next = self.document.parent(current);
        Some(current)
    }
}
