mod context;
mod test_runner;

use std::path::Path;
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use docmerge::Template;
use docmerge::parser::{ParseError, Parser as XmlParser};
use interpreter::builder::OperationBuilder;
use interpreter::{DiagnosticError, Environment, HandlerRegistry, Map, MissingPolicy, Processor};

#[derive(Parser)]
#[command(name = "docmerge", version, about = "Merge-field template processor for WordprocessingML parts")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Expand a document part with a context file
    Render(RenderArgs),

    /// Scan and build a template without evaluating it
    Check(FileArgs),

    /// List the merge fields of a document part
    Fields(FileArgs),

    /// Run .test.xml fixture files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Document part XML (e.g. word/document.xml)
    file: String,

    /// Context file (.toml or .json)
    #[arg(short, long)]
    context: Option<String>,

    /// Output file. Defaults to stdout.
    #[arg(short, long)]
    output: Option<String>,

    /// Treat names missing from the context as errors
    #[arg(long)]
    strict: bool,
}

#[derive(clap::Args)]
struct FileArgs {
    /// Document part XML
    file: String,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.xml file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

fn main() {
    let cli = Cli::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(if cli.verbose {
                tracing::Level::DEBUG.into()
            } else {
                tracing::Level::WARN.into()
            }),
        )
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: cannot install logger: {}", e);
    }

    match cli.command {
        Command::Render(args) => do_render(args, cli.no_color),
        Command::Check(args) => do_check(args, cli.no_color),
        Command::Fields(args) => do_fields(args, cli.no_color),
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code = test_runner::run_tests(path, cli.no_color, &test_args.category);
            process::exit(exit_code);
        }
    }
}

fn read_source(file: &str) -> String {
    match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", file, e);
            process::exit(1);
        }
    }
}

fn color_choice(no_color: bool) -> ColorChoice {
    if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

fn do_render(args: RenderArgs, no_color: bool) {
    let source = read_source(&args.file);
    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.clone(), source.clone());

    let context = match &args.context {
        Some(path) => match context::load_context(Path::new(path)) {
            Ok(map) => map,
            Err(e) => {
                eprintln!("error: {}", e);
                process::exit(1);
            }
        },
        None => Map::new(),
    };
    let policy = if args.strict {
        MissingPolicy::Strict
    } else {
        MissingPolicy::Lenient
    };
    let mut env = Environment::new(context).with_policy(policy);

    let mut document = match XmlParser::new(source, file_id).parse() {
        Ok(document) => document,
        Err(error) => {
            emit_parse_error(color_choice(no_color), &files, &error);
            process::exit(1);
        }
    };
    if let Err(error) = Processor::default().process(&mut document, &mut env) {
        emit_diagnostic_error(color_choice(no_color), &files, &error.with_source(file_id));
        process::exit(1);
    }
    let xml = document.to_xml();

    match &args.output {
        Some(output) => {
            if let Err(e) = std::fs::write(output, xml) {
                eprintln!("error: cannot write '{}': {}", output, e);
                process::exit(1);
            }
        }
        None => println!("{}", xml),
    }
}

fn do_check(args: FileArgs, no_color: bool) {
    let source = read_source(&args.file);
    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.clone(), source.clone());

    let template = match Template::parse(source, file_id) {
        Ok(t) => t,
        Err(error) => {
            emit_parse_error(color_choice(no_color), &files, &error);
            process::exit(1);
        }
    };

    let field_count = template.fields.len();
    let registry = HandlerRegistry::with_defaults();
    match OperationBuilder::new(&template.document, &registry, template.fields).build() {
        Ok(statements) => {
            eprintln!(
                "ok: {} ({} fields, {} top-level statements)",
                args.file,
                field_count,
                statements.len()
            );
        }
        Err(error) => {
            emit_diagnostic_error(color_choice(no_color), &files, &error.with_source(file_id));
            process::exit(1);
        }
    }
}

fn do_fields(args: FileArgs, no_color: bool) {
    let source = read_source(&args.file);
    let mut files = SimpleFiles::new();
    let file_id = files.add(args.file.clone(), source.clone());

    let template = match Template::parse(source.clone(), file_id) {
        Ok(t) => t,
        Err(error) => {
            emit_parse_error(color_choice(no_color), &files, &error);
            process::exit(1);
        }
    };

    for field in &template.fields {
        println!(
            "{}:{}\t{:?}\t{}",
            args.file,
            test_runner::byte_offset_to_line(&source, field.span.start),
            field.shape,
            field.expression()
        );
    }
}

fn emit_parse_error(color: ColorChoice, files: &SimpleFiles<String, String>, error: &ParseError) {
    let writer = StandardStream::stderr(color);
    let config = term::Config::default();
    let _ = term::emit_to_write_style(&mut writer.lock(), &config, files, &error.to_diagnostic());
}

fn emit_diagnostic_error(
    color: ColorChoice,
    files: &SimpleFiles<String, String>,
    error: &DiagnosticError,
) {
    let kind = if error.is_template_error() {
        "template error"
    } else if error.is_context_error() {
        "context error"
    } else {
        "error"
    };

    match &error.span {
        Some(span) => {
            let diagnostic = Diagnostic::error()
                .with_message(error.to_string())
                .with_labels(vec![Label::primary(error.source_id, span.clone())])
                .with_notes(vec![kind.to_string()]);
            let writer = StandardStream::stderr(color);
            let config = term::Config::default();
            let _ = term::emit_to_write_style(&mut writer.lock(), &config, files, &diagnostic);
        }
        None => eprintln!("{}: {}", kind, error),
    }
}
