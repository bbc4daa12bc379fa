pub mod document;
pub mod expression;
pub mod field;
pub mod parser;

use crate::document::Document;
use crate::field::Field;

/// A parsed document part together with the merge fields found in it.
#[derive(Debug)]
pub struct Template {
    pub document: Document,
    /// Fields in document order.
    pub fields: Vec<Field>,
    /// The source file ID (for error reporting with codespan-reporting).
    pub source_id: usize,
}

impl Template {
    pub fn parse(source: String, source_id: usize) -> Result<Self, parser::ParseError> {
        let document = parser::Parser::new(source, source_id).parse()?;
        let fields = field::scanner::scan_fields(&document, document.root());
        Ok(Template {
            document,
            fields,
            source_id,
        })
    }
}
