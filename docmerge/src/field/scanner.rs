use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, trace};

use crate::document::{Document, NodeId, names};
use crate::field::{Field, FieldShape, contains_field_char};

static MERGE_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*MERGEFIELD\s+(\S+)(?:\s+\\\*\s+MERGEFORMAT)?\s*$")
        .expect("merge field pattern is valid")
});

/// Extract the directive from a field instruction such as
/// `MERGEFIELD =name \* MERGEFORMAT`. Returns `None` for any other instruction.
pub fn parse_instruction(instruction: &str) -> Option<&str> {
    MERGE_FIELD
        .captures(instruction)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Walk the subtree below `root` and collect every valid merge field in document order.
pub fn scan_fields(document: &Document, root: NodeId) -> Vec<Field> {
    let mut fields = Vec::new();

    for node in document.descendants(root) {
        let field = if document.is_element(node, names::SIMPLE_FIELD) {
            simple_field(document, node)
        } else if document.is_element(node, names::FIELD_CHAR)
            && document.attribute(node, names::FIELD_CHAR_TYPE) == Some("begin")
        {
            complex_field(document, node)
        } else {
            None
        };

        match field {
            Some(field) if field.valid => {
                debug!(expression = %field.raw_expression, shape = ?field.shape, "field found");
                fields.push(field);
            }
            Some(field) => {
                trace!(instruction = %field.raw_expression, "skipping non-merge field");
            }
            None => {}
        }
    }

    fields
}

fn simple_field(document: &Document, node: NodeId) -> Option<Field> {
    let instruction = document.attribute(node, names::FIELD_INSTRUCTION)?;
    Some(build_field(
        instruction,
        vec![node],
        FieldShape::Simple,
        true,
        document,
    ))
}

/// Collect the run holding the begin marker and its following siblings up to
/// the run holding the end marker. Fields that never end are skipped.
fn complex_field(document: &Document, begin: NodeId) -> Option<Field> {
    let first = document.parent(begin)?;
    let mut nodes = vec![first];
    let mut cursor = first;
    while !contains_field_char(document, cursor, "end") {
        cursor = document.next_element_sibling(cursor)?;
        nodes.push(cursor);
    }

    let instruction: String = nodes
        .iter()
        .flat_map(|n| std::iter::once(*n).chain(document.descendants(*n)))
        .filter(|n| document.is_element(*n, names::INSTRUCTION_TEXT))
        .map(|n| document.text_content(n))
        .collect();

    let has_separator = nodes
        .iter()
        .any(|n| contains_field_char(document, *n, "separate"));

    Some(build_field(
        &instruction,
        nodes,
        FieldShape::Complex,
        has_separator,
        document,
    ))
}

fn build_field(
    instruction: &str,
    nodes: Vec<NodeId>,
    shape: FieldShape,
    well_formed: bool,
    document: &Document,
) -> Field {
    let span_start = document.span(nodes[0]).start;
    let span_end = document.span(nodes[nodes.len() - 1]).end;
    match parse_instruction(instruction) {
        Some(expression) => Field::new(
            expression.trim(),
            nodes,
            shape,
            well_formed,
            span_start..span_end.max(span_start),
        ),
        None => Field::new(
            instruction.trim(),
            nodes,
            shape,
            false,
            span_start..span_end.max(span_start),
        ),
    }
}
