use std::fmt;

use docmerge::document::{Document, NodeId, names};
use docmerge::field::{Field, FieldShape};
use docmerge::parser;

use crate::environment::Environment;
use crate::error::RuntimeError;

/// Something that can splice itself into the document in place of a field.
///
/// Implementations insert their nodes at the field's display node and then
/// remove the field markers.
pub trait Content: fmt::Debug {
    fn kind(&self) -> &str;

    fn append_to(
        &self,
        document: &mut Document,
        field: &Field,
        env: &mut Environment,
    ) -> Result<(), RuntimeError>;

    fn as_image(&self) -> Option<&Image> {
        None
    }
}

/// Plain text. Newlines become line breaks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Text(pub String);

impl Text {
    pub fn new(text: impl Into<String>) -> Self {
        Text(text.into())
    }
}

impl Content for Text {
    fn kind(&self) -> &str {
        "Text"
    }

    fn append_to(
        &self,
        document: &mut Document,
        field: &Field,
        _env: &mut Environment,
    ) -> Result<(), RuntimeError> {
        let target = DisplayTarget::locate(document, field);

        let mut anchor = target.text;
        for (i, line) in self.0.split('\n').enumerate() {
            if i > 0 {
                let br = document.create_element(names::BREAK);
                document.insert_after(anchor, br);
                anchor = br;
            }
            let node = document.deep_copy(target.text);
            document.set_text(node, line);
            if line.starts_with(char::is_whitespace) || line.ends_with(char::is_whitespace) {
                document.set_attribute(node, names::XML_SPACE, "preserve");
            }
            document.insert_after(anchor, node);
            anchor = node;
        }
        document.detach(target.text);

        target.finish(document, field);
        Ok(())
    }
}

/// A raw WordprocessingML fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordMl {
    pub xml: String,
}

impl WordMl {
    pub fn new(xml: impl Into<String>) -> Self {
        WordMl { xml: xml.into() }
    }
}

impl Content for WordMl {
    fn kind(&self) -> &str {
        "WordMl"
    }

    fn append_to(
        &self,
        document: &mut Document,
        field: &Field,
        _env: &mut Environment,
    ) -> Result<(), RuntimeError> {
        let container = document.create_element("docmerge:fragment");
        parser::read_into(document, container, &self.xml, 0)?;
        let nodes: Vec<NodeId> = document.element_children(container).collect();

        let target = DisplayTarget::locate(document, field);
        let inline = !nodes.is_empty()
            && nodes.iter().all(|n| {
                document
                    .name(*n)
                    .is_some_and(|name| names::INLINE_ELEMENTS.contains(&name))
            });
        let paragraph = document.find_ancestor(target.run, names::PARAGRAPH);

        match paragraph {
            Some(paragraph) if !inline => {
                insert_all_after(document, paragraph, &nodes);
                document.detach(paragraph);
            }
            _ => {
                if inline {
                    inherit_run_properties(document, target.run, &nodes);
                }
                insert_all_after(document, target.run, &nodes);
                document.detach(target.run);
                target.finish(document, field);
            }
        }
        Ok(())
    }
}

/// An image payload. Consumed by `@NAME:start` blocks; inserted with `=` it
/// only removes the field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub name: String,
    pub data: Vec<u8>,
    /// Relationship id, if one was already assigned by the caller.
    pub rid: Option<String>,
}

impl Image {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Image {
            name: name.into(),
            data,
            rid: None,
        }
    }

    pub fn with_rid(mut self, rid: impl Into<String>) -> Self {
        self.rid = Some(rid.into());
        self
    }
}

impl Content for Image {
    fn kind(&self) -> &str {
        "Image"
    }

    fn append_to(
        &self,
        document: &mut Document,
        field: &Field,
        _env: &mut Environment,
    ) -> Result<(), RuntimeError> {
        field.remove(document);
        Ok(())
    }

    fn as_image(&self) -> Option<&Image> {
        Some(self)
    }
}

/// Where a field's replacement goes: the run that hosts it and the text
/// element inside that run to be replaced.
struct DisplayTarget {
    run: NodeId,
    text: NodeId,
}

impl DisplayTarget {
    /// Find (or create) the display run and its `w:t`.
    fn locate(document: &mut Document, field: &Field) -> Self {
        let run = match field.display_node(document) {
            Some(node) if field.shape == FieldShape::Complex => node,
            Some(node) => match document.find_descendant(node, names::RUN) {
                Some(run) => run,
                None => {
                    let run = document.create_element(names::RUN);
                    document.append_child(node, run);
                    run
                }
            },
            None => {
                let run = document.create_element(names::RUN);
                document.insert_before(field.end_node(), run);
                run
            }
        };

        let text = match document.find_descendant(run, names::TEXT) {
            Some(text) => text,
            None => {
                let text = document.create_element(names::TEXT);
                document.append_child(run, text);
                text
            }
        };

        DisplayTarget { run, text }
    }

    /// Drop the field markers around the inserted content.
    fn finish(&self, document: &mut Document, field: &Field) {
        match field.shape {
            FieldShape::Simple => document.unwrap_node(field.start_node()),
            FieldShape::Complex => {
                for node in &field.anchor_nodes {
                    if *node != self.run {
                        document.detach(*node);
                    }
                }
            }
        }
    }
}

fn insert_all_after(document: &mut Document, anchor: NodeId, nodes: &[NodeId]) {
    let mut anchor = anchor;
    for node in nodes {
        document.insert_after(anchor, *node);
        anchor = *node;
    }
}

/// Give fragment runs without their own `w:rPr` the formatting of the field's run.
fn inherit_run_properties(document: &mut Document, run: NodeId, nodes: &[NodeId]) {
    let Some(properties) = document
        .element_children(run)
        .find(|c| document.is_element(*c, names::RUN_PROPERTIES))
    else {
        return;
    };

    let runs: Vec<NodeId> = nodes
        .iter()
        .flat_map(|n| std::iter::once(*n).chain(document.descendants(*n)))
        .filter(|n| document.is_element(*n, names::RUN))
        .collect();

    for fragment_run in runs {
        let has_properties = document
            .element_children(fragment_run)
            .any(|c| document.is_element(c, names::RUN_PROPERTIES));
        if !has_properties {
            let copy = document.deep_copy(properties);
            document.prepend_child(fragment_run, copy);
        }
    }
}
