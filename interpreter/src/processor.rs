use std::fs;
use std::path::Path;

use docmerge::document::{Document, NodeId, names};
use docmerge::field::scanner::scan_fields;
use docmerge::parser::Parser;
use tracing::{debug, info};

use crate::builder::OperationBuilder;
use crate::environment::Environment;
use crate::error::DiagnosticError;
use crate::handler::HandlerRegistry;

/// Expands the merge fields of document parts.
#[derive(Debug)]
pub struct Processor {
    registry: HandlerRegistry,
}

impl Default for Processor {
    fn default() -> Self {
        Processor::new(HandlerRegistry::with_defaults())
    }
}

impl Processor {
    pub fn new(registry: HandlerRegistry) -> Self {
        Processor { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// Expand every directive in `document` in place, then repair the
    /// structure the expansion may have emptied out.
    pub fn process(&self, document: &mut Document, env: &mut Environment) -> Result<(), DiagnosticError> {
        let root = document.root();
        run(document, root, env, &self.registry)?;
        fill_empty_table_cells(document, root);
        info!(nodes = document.len(), "part processed");
        Ok(())
    }

    /// Parse, process and serialize one part.
    pub fn process_xml(&self, xml: &str, env: &mut Environment) -> Result<String, DiagnosticError> {
        self.process_source(xml, 0, env)
    }

    /// Like [`process_xml`](Self::process_xml), tagging diagnostics with `source_id`.
    pub fn process_source(
        &self,
        xml: &str,
        source_id: usize,
        env: &mut Environment,
    ) -> Result<String, DiagnosticError> {
        let mut document = Parser::new(xml.to_string(), source_id).parse()?;
        self.process(&mut document, env)
            .map_err(|e| e.with_source(source_id))?;
        Ok(document.to_xml())
    }

    /// Read a part from `input`, process it and write the result to `output`.
    pub fn process_part_file(
        &self,
        input: &Path,
        output: &Path,
        env: &mut Environment,
    ) -> Result<(), DiagnosticError> {
        let xml = fs::read_to_string(input)?;
        let result = self.process_xml(&xml, env)?;
        fs::write(output, result)?;
        info!(input = %input.display(), output = %output.display(), "part written");
        Ok(())
    }
}

/// Scan, build and evaluate the directives below `root`.
pub(crate) fn run(
    document: &mut Document,
    root: NodeId,
    env: &mut Environment,
    registry: &HandlerRegistry,
) -> Result<(), DiagnosticError> {
    let fields = scan_fields(document, root);
    if fields.is_empty() {
        return Ok(());
    }

    let statements = OperationBuilder::new(document, registry, fields).build()?;
    debug!(statements = statements.len(), depth = env.depth(), "evaluating");
    for statement in &statements {
        statement.evaluate(document, env, registry)?;
    }
    Ok(())
}

/// Give every table cell left without a paragraph an empty one.
pub fn fill_empty_table_cells(document: &mut Document, root: NodeId) {
    let cells: Vec<NodeId> = document
        .descendants(root)
        .into_iter()
        .filter(|n| document.is_element(*n, names::TABLE_CELL))
        .collect();

    for cell in cells {
        let has_paragraph = document
            .element_children(cell)
            .any(|c| document.is_element(c, names::PARAGRAPH));
        if !has_paragraph {
            debug!(cell = cell.index(), "filling empty table cell");
            let paragraph = document.create_element(names::PARAGRAPH);
            document.append_child(cell, paragraph);
        }
    }
}
