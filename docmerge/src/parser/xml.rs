use std::borrow::Cow;

use quick_xml::Reader;
use quick_xml::events::{BytesDecl, BytesStart, Event};

use crate::document::{Document, NodeId, NodeKind};
use crate::parser::error::ParseError;

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Read `source` and append the resulting nodes as children of `parent`.
///
/// Used both for whole parts and for markup fragments spliced into an
/// existing document. Spans are byte offsets into `source`.
pub fn read_into(
    document: &mut Document,
    parent: NodeId,
    source: &str,
    file_id: usize,
) -> Result<(), ParseError> {
    let mut reader = Reader::from_str(source);
    let mut stack: Vec<NodeId> = vec![parent];

    loop {
        let start = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| {
            let at = reader.buffer_position() as usize;
            ParseError::error(format!("malformed XML: {}", e), start..at.max(start), file_id)
        })?;
        let end = reader.buffer_position() as usize;
        let span = start..end;
        let current = *stack.last().unwrap_or(&parent);

        match event {
            Event::Start(tag) => {
                let id = element(document, &tag, span.clone(), file_id)?;
                document.append_child(current, id);
                stack.push(id);
            }
            Event::Empty(tag) => {
                let id = element(document, &tag, span.clone(), file_id)?;
                document.append_child(current, id);
            }
            Event::End(_) => {
                if stack.len() <= 1 {
                    return Err(ParseError::error("unexpected closing tag", span, file_id));
                }
                if let Some(closed) = stack.pop() {
                    document.extend_span(closed, end);
                }
            }
            Event::Text(text) => {
                let content = text.unescape().map_err(|e| {
                    ParseError::error(format!("invalid character data: {}", e), span.clone(), file_id)
                })?;
                append_leaf(document, current, NodeKind::Text(content.into_owned()), span);
            }
            Event::CData(data) => {
                let content = String::from_utf8_lossy(&data).into_owned();
                append_leaf(document, current, NodeKind::CData(content), span);
            }
            Event::Comment(text) => {
                let content = String::from_utf8_lossy(&text).into_owned();
                append_leaf(document, current, NodeKind::Comment(content), span);
            }
            Event::Decl(decl) => {
                let content = declaration(&decl, span.clone(), file_id)?;
                append_leaf(document, current, NodeKind::Declaration(content), span);
            }
            Event::PI(instruction) => {
                let content = String::from_utf8_lossy(&instruction).into_owned();
                append_leaf(
                    document,
                    current,
                    NodeKind::ProcessingInstruction(content),
                    span,
                );
            }
            Event::DocType(text) => {
                let content = String::from_utf8_lossy(&text).trim().to_string();
                append_leaf(document, current, NodeKind::DocType(content), span);
            }
            Event::Eof => break,
        }
    }

    if stack.len() > 1 {
        let unclosed = stack[stack.len() - 1];
        let name = document.name(unclosed).unwrap_or("?").to_string();
        return Err(ParseError::error(
            format!("unclosed element <{}>", name),
            document.span(unclosed),
            file_id,
        )
        .with_note("the input ended before this element was closed"));
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn append_leaf(document: &mut Document, parent: NodeId, kind: NodeKind, span: std::ops::Range<usize>) {
    let id = document.create_node(kind);
    document.set_span(id, span);
    document.append_child(parent, id);
}

fn element(
    document: &mut Document,
    tag: &BytesStart<'_>,
    span: std::ops::Range<usize>,
    file_id: usize,
) -> Result<NodeId, ParseError> {
    let name = String::from_utf8_lossy(tag.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    for attribute in tag.attributes() {
        let attribute = attribute.map_err(|e| {
            ParseError::error(format!("invalid attribute on <{}>: {}", name, e), span.clone(), file_id)
        })?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        let value = attribute.unescape_value().map_err(|e| {
            ParseError::error(
                format!("invalid value for attribute {} on <{}>: {}", key, name, e),
                span.clone(),
                file_id,
            )
        })?;
        attributes.push((key, value.into_owned()));
    }

    let id = document.create_node(NodeKind::Element { name, attributes });
    document.set_span(id, span);
    Ok(id)
}

/// Rebuild `xml version=".." encoding=".." standalone=".."` from a declaration event.
fn declaration(
    decl: &BytesDecl<'_>,
    span: std::ops::Range<usize>,
    file_id: usize,
) -> Result<String, ParseError> {
    let version = decl
        .version()
        .map_err(|e| ParseError::error(format!("invalid XML declaration: {}", e), span, file_id))?;
    let mut content = format!("xml version=\"{}\"", lossy(&version));
    if let Some(Ok(encoding)) = decl.encoding() {
        content.push_str(&format!(" encoding=\"{}\"", lossy(&encoding)));
    }
    if let Some(Ok(standalone)) = decl.standalone() {
        content.push_str(&format!(" standalone=\"{}\"", lossy(&standalone)));
    }
    Ok(content)
}

fn lossy<'a>(bytes: &'a Cow<'_, [u8]>) -> Cow<'a, str> {
    String::from_utf8_lossy(bytes)
}
