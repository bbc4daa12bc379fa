pub mod block;
pub mod builder;
pub mod content;
pub mod environment;
pub mod error;
pub mod evaluator;
pub mod handler;
pub mod media;
pub mod processor;
pub mod runtime_value;
pub mod statement;

use std::path::Path;

use docmerge::document::Document;

pub use content::{Content, Image, Text, WordMl};
pub use environment::{Environment, MissingPolicy};
pub use error::{ContextError, DiagnosticError, RuntimeError, TemplateError};
pub use handler::{FieldHandler, HandlerRegistry};
pub use processor::Processor;
pub use runtime_value::{Map, Object, RuntimeValue};

/// Process one part in place with the stock directives.
pub fn process(document: &mut Document, env: &mut Environment) -> Result<(), DiagnosticError> {
    Processor::default().process(document, env)
}

/// Parse, process and serialize one part with the stock directives.
pub fn process_xml(xml: &str, env: &mut Environment) -> Result<String, DiagnosticError> {
    Processor::default().process_xml(xml, env)
}

pub fn process_part_file(
    input: &Path,
    output: &Path,
    env: &mut Environment,
) -> Result<(), DiagnosticError> {
    Processor::default().process_part_file(input, output, env)
}
