pub mod error;
mod xml;

pub use error::ParseError;
pub use xml::read_into;

use crate::document::Document;

/// Parser entry point.
pub struct Parser {
    source: String,
    file_id: usize,
}

impl Parser {
    pub fn new(source: String, file_id: usize) -> Self {
        Parser { source, file_id }
    }

    /// Read the source XML into a document tree.
    pub fn parse(&self) -> Result<Document, ParseError> {
        let mut document = Document::new();
        let root = document.root();
        xml::read_into(&mut document, root, &self.source, self.file_id)?;
        Ok(document)
    }
}
