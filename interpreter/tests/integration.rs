use std::rc::Rc;

use docmerge::document::{Document, names};
use docmerge::expression::Expression;
use docmerge::field::{Field, FieldRef};
use docmerge::parser::Parser;
use interpreter::builder::OperationBuilder;
use interpreter::media::MediaCollection;
use interpreter::statement::Statement;
use interpreter::{
    Content, ContextError, Environment, FieldHandler, HandlerRegistry, Image, Map, MissingPolicy, Object,
    Processor, RuntimeError, RuntimeValue, TemplateError,
};

const NAMESPACES: &str = concat!(
    r#"xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships""#
);

fn document(body: &str) -> String {
    format!("<w:document {}><w:body>{}</w:body></w:document>", NAMESPACES, body)
}

fn simple(directive: &str) -> String {
    format!(
        r#"<w:fldSimple w:instr=" MERGEFIELD {} \* MERGEFORMAT "><w:r><w:t>«{}»</w:t></w:r></w:fldSimple>"#,
        directive, directive
    )
}

fn complex(directive: &str) -> String {
    format!(
        concat!(
            r#"<w:r><w:fldChar w:fldCharType="begin"/></w:r>"#,
            r#"<w:r><w:instrText xml:space="preserve"> MERGEFIELD {} \* MERGEFORMAT </w:instrText></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="separate"/></w:r>"#,
            r#"<w:r><w:rPr><w:i/></w:rPr><w:t>«{}»</w:t></w:r>"#,
            r#"<w:r><w:fldChar w:fldCharType="end"/></w:r>"#,
        ),
        directive, directive
    )
}

fn run(text: &str) -> String {
    format!("<w:r><w:t>{}</w:t></w:r>", text)
}

fn p(inner: &str) -> String {
    format!("<w:p>{}</w:p>", inner)
}

fn row(inner: &str) -> String {
    format!("<w:tr><w:tc>{}</w:tc></w:tr>", p(inner))
}

fn context(entries: Vec<(&str, RuntimeValue)>) -> Environment {
    Environment::new(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
}

fn render(body: &str, env: &mut Environment) -> String {
    interpreter::process_xml(&document(body), env).expect("processing failed")
}

fn render_err(body: &str, env: &mut Environment) -> interpreter::DiagnosticError {
    interpreter::process_xml(&document(body), env).expect_err("processing should fail")
}

fn parse(xml: &str) -> Document {
    Parser::new(xml.to_string(), 0).parse().expect("parse failed")
}

/// The text of every paragraph, in document order.
fn paragraphs(xml: &str) -> Vec<String> {
    let doc = parse(xml);
    doc.descendants(doc.root())
        .into_iter()
        .filter(|n| doc.is_element(*n, names::PARAGRAPH))
        .map(|para| {
            doc.descendants(para)
                .into_iter()
                .filter(|n| doc.is_element(*n, names::TEXT))
                .map(|t| doc.text_content(t))
                .collect::<String>()
        })
        .collect()
}

#[derive(Debug)]
struct Technologies(Vec<&'static str>);

impl Object for Technologies {
    fn type_name(&self) -> &str {
        "Technologies"
    }

    fn member(&self, name: &str) -> Option<RuntimeValue> {
        match name {
            "size" => Some(RuntimeValue::Integer(self.0.len() as i64)),
            _ => None,
        }
    }

    fn enumerate(&self) -> Option<Vec<RuntimeValue>> {
        Some(self.0.iter().map(|t| RuntimeValue::from(*t)).collect())
    }
}

#[derive(Debug)]
struct Opaque;

impl Object for Opaque {
    fn type_name(&self) -> &str {
        "Opaque"
    }

    fn member(&self, _name: &str) -> Option<RuntimeValue> {
        None
    }
}

// --- Insertion ---

#[test]
fn simple_field_insertion() {
    let body = p(&format!("{}{}{}", run("Hello "), simple("=name"), run("!")));
    let out = render(&body, &mut context(vec![("name", "World".into())]));
    assert_eq!(paragraphs(&out), vec!["Hello World!"]);
    assert!(!out.contains("fldSimple"));
    assert!(!out.contains("MERGEFIELD"));
}

#[test]
fn complex_field_insertion_keeps_run_properties() {
    let body = p(&format!("{}{}", run("Dear "), complex("=name")));
    let out = render(&body, &mut context(vec![("name", "Ada".into())]));
    assert_eq!(paragraphs(&out), vec!["Dear Ada"]);
    assert!(out.contains("<w:i/>"));
    assert!(!out.contains("fldChar"));
    assert!(!out.contains("instrText"));
}

#[test]
fn member_access_insertion() {
    let person = RuntimeValue::map([("name", RuntimeValue::from("Grace"))]);
    let body = p(&simple("=person.name"));
    let out = render(&body, &mut context(vec![("person", person)]));
    assert_eq!(paragraphs(&out), vec!["Grace"]);
}

#[test]
fn multi_member_chain() {
    let person = RuntimeValue::map([("name", RuntimeValue::from("grace"))]);
    let body = p(&simple("=person.name.upcase"));
    let out = render(&body, &mut context(vec![("person", person)]));
    assert_eq!(paragraphs(&out), vec!["GRACE"]);
}

#[test]
fn nil_insertion_removes_field() {
    let body = p(&format!("{}{}", run("a"), simple("=missing")));
    let out = render(&body, &mut Environment::default());
    assert_eq!(paragraphs(&out), vec!["a"]);
    assert!(!out.contains("missing"));
}

#[test]
fn newlines_become_breaks() {
    let body = p(&simple("=address"));
    let out = render(&body, &mut context(vec![("address", "Main St\nSpringfield".into())]));
    assert!(out.contains("<w:br/>"));
    assert_eq!(paragraphs(&out), vec!["Main StSpringfield"]);
}

#[test]
fn numbers_are_inserted_as_text() {
    let body = p(&format!("{}{}", simple("=count"), simple("=ratio")));
    let out = render(
        &body,
        &mut context(vec![("count", 3i64.into()), ("ratio", 2.0f64.into())]),
    );
    assert_eq!(paragraphs(&out), vec!["32"]);
}

#[test]
fn inline_word_ml_inherits_run_properties() {
    let mut env = context(vec![(
        "word_ml:note",
        r#"<w:r><w:t>plain</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>bold</w:t></w:r>"#.into(),
    )]);
    let body = p(&format!("{}{}", run("x "), complex("=note")));
    let out = render(&body, &mut env);
    assert_eq!(paragraphs(&out), vec!["x plainbold"]);
    assert!(out.contains("<w:r><w:rPr><w:i/></w:rPr><w:t>plain</w:t></w:r>"));
    assert!(out.contains("<w:r><w:rPr><w:b/></w:rPr><w:t>bold</w:t></w:r>"));
}

#[test]
fn block_word_ml_replaces_paragraph() {
    let mut env = context(vec![(
        "word_ml:section",
        "<w:p><w:r><w:t>one</w:t></w:r></w:p><w:p><w:r><w:t>two</w:t></w:r></w:p>".into(),
    )]);
    let body = format!("{}{}{}", p(&run("before")), p(&simple("=section")), p(&run("after")));
    let out = render(&body, &mut env);
    assert_eq!(paragraphs(&out), vec!["before", "one", "two", "after"]);
}

// --- Loops ---

#[test]
fn loop_expands_paragraph_block_in_order() {
    let body = format!(
        "{}{}{}",
        p(&simple("technologies:each(technology)")),
        p(&simple("=technology")),
        p(&simple("technologies:endEach")),
    );
    let out = render(
        &body,
        &mut context(vec![("technologies", vec!["Ruby", "Rails"].into())]),
    );
    assert_eq!(paragraphs(&out), vec!["Ruby", "Rails"]);
    assert!(!out.contains("MERGEFIELD"));
}

#[test]
fn loop_over_table_rows() {
    let items = RuntimeValue::List(vec![
        RuntimeValue::map([("name", RuntimeValue::from("Widget"))]),
        RuntimeValue::map([("name", RuntimeValue::from("Gadget"))]),
    ]);
    let body = format!(
        "<w:tbl>{}{}{}{}</w:tbl>",
        row(&run("Name")),
        row(&simple("items:each(item)")),
        row(&simple("=item.name")),
        row(&simple("items:endEach")),
    );
    let out = render(&body, &mut context(vec![("items", items)]));
    assert_eq!(paragraphs(&out), vec!["Name", "Widget", "Gadget"]);
    assert_eq!(out.matches("<w:tr>").count(), 3);
}

#[test]
fn inline_loop() {
    let body = p(&format!(
        "{}{}{}{}",
        simple("tags:each(tag)"),
        simple("=tag"),
        run(";"),
        simple("tags:endEach"),
    ));
    let out = render(&body, &mut context(vec![("tags", vec!["a", "b", "c"].into())]));
    assert_eq!(paragraphs(&out), vec!["a;b;c;"]);
}

#[test]
fn nested_loops() {
    let groups = RuntimeValue::List(vec![
        RuntimeValue::map([
            ("name", RuntimeValue::from("A")),
            ("members", vec!["a1", "a2"].into()),
        ]),
        RuntimeValue::map([
            ("name", RuntimeValue::from("B")),
            ("members", vec!["b1"].into()),
        ]),
    ]);
    let body = [
        p(&simple("groups:each(group)")),
        p(&simple("=group.name")),
        p(&simple("group.members:each(member)")),
        p(&simple("=member")),
        p(&simple("group.members:endEach")),
        p(&simple("groups:endEach")),
    ]
    .concat();
    let out = render(&body, &mut context(vec![("groups", groups)]));
    assert_eq!(paragraphs(&out), vec!["A", "a1", "a2", "B", "b1"]);
}

#[test]
fn loop_over_object_with_enumeration() {
    let body = format!(
        "{}{}{}",
        p(&simple("stack:each(technology)")),
        p(&simple("=technology")),
        p(&simple("stack:endEach")),
    );
    let stack = RuntimeValue::object(Technologies(vec!["Rust", "Tokio"]));
    let out = render(&body, &mut context(vec![("stack", stack)]));
    assert_eq!(paragraphs(&out), vec!["Rust", "Tokio"]);
}

#[test]
fn loop_over_map_yields_entries() {
    let mut totals = Map::new();
    totals.insert("apples".to_string(), 3i64.into());
    totals.insert("pears".to_string(), 5i64.into());
    let body = format!(
        "{}{}{}",
        p(&simple("totals:each(entry)")),
        p(&format!("{}{}{}", simple("=entry.key"), run("="), simple("=entry.value"))),
        p(&simple("totals:endEach")),
    );
    let out = render(&body, &mut context(vec![("totals", totals.into())]));
    assert_eq!(paragraphs(&out), vec!["apples=3", "pears=5"]);
}

#[test]
fn loop_over_non_enumerable_is_context_error() {
    let body = format!(
        "{}{}{}",
        p(&simple("stack:each(technology)")),
        p(&simple("=technology")),
        p(&simple("stack:endEach")),
    );
    let mut env = context(vec![("stack", RuntimeValue::object(Opaque))]);
    let err = render_err(&body, &mut env);
    assert!(err.is_context_error());
    assert!(matches!(
        &err.error,
        RuntimeError::Context(ContextError::NotEnumerable { expression, type_name })
            if expression == "stack" && type_name == "Opaque"
    ));
    assert!(err.span.is_some());

    let err = render_err(&body, &mut context(vec![("stack", 42i64.into())]));
    assert!(err.to_string().contains("«stack»"));
}

// --- Conditions ---

#[test]
fn condition_with_predicate() {
    let body = format!(
        "{}{}{}{}{}",
        p(&run("before")),
        p(&simple("body:if(empty?)")),
        p(&run("guarded")),
        p(&simple("body:endIf")),
        p(&run("after")),
    );

    let out = render(&body, &mut context(vec![("body", "".into())]));
    assert_eq!(paragraphs(&out), vec!["before", "guarded", "after"]);

    let out = render(&body, &mut context(vec![("body", "not empty".into())]));
    assert_eq!(paragraphs(&out), vec!["before", "after"]);
}

#[test]
fn condition_truthiness() {
    let body = format!(
        "{}{}{}",
        p(&simple("items:if")),
        p(&run("shown")),
        p(&simple("items:endIf")),
    );
    let shown = |value: RuntimeValue| paragraphs(&render(&body, &mut context(vec![("items", value)])));

    assert_eq!(shown(vec!["x"].into()), vec!["shown"]);
    assert_eq!(shown("".into()), vec!["shown"]);
    assert_eq!(shown(0i64.into()), vec!["shown"]);
    assert!(shown(RuntimeValue::List(Vec::new())).is_empty());
    assert!(shown(RuntimeValue::Nil).is_empty());
    assert!(shown(false.into()).is_empty());
    assert!(paragraphs(&render(&body, &mut Environment::default())).is_empty());
}

#[test]
fn unknown_predicate_is_context_error() {
    let body = format!(
        "{}{}{}",
        p(&simple("body:if(shiny?)")),
        p(&run("x")),
        p(&simple("body:endIf")),
    );
    let err = render_err(&body, &mut context(vec![("body", "text".into())]));
    assert!(matches!(
        err.error,
        RuntimeError::Context(ContextError::UnknownPredicate { .. })
    ));
}

#[test]
fn inline_if_else_removes_shared_boundary_once() {
    let body = p(&format!(
        "{}{}{}{}{}{}{}",
        run("A"),
        simple("flag:if"),
        run("yes"),
        simple("flag:else"),
        run("no"),
        simple("flag:endIf"),
        run("Z"),
    ));

    let out = render(&body, &mut context(vec![("flag", true.into())]));
    assert_eq!(paragraphs(&out), vec!["AyesZ"]);
    assert!(!out.contains("MERGEFIELD"));

    let out = render(&body, &mut context(vec![("flag", false.into())]));
    assert_eq!(paragraphs(&out), vec!["AnoZ"]);
    assert!(!out.contains("MERGEFIELD"));
}

#[test]
fn multi_branch_conditional() {
    let body = [
        p(&simple("n:if(positive?)")),
        p(&run("positive")),
        p(&simple("n:elsif(negative?)")),
        p(&run("negative")),
        p(&simple("n:else")),
        p(&run("zero")),
        p(&simple("n:endIf")),
    ]
    .concat();
    let branch = |n: i64| paragraphs(&render(&body, &mut context(vec![("n", n.into())])));

    assert_eq!(branch(4), vec!["positive"]);
    assert_eq!(branch(-3), vec!["negative"]);
    assert_eq!(branch(0), vec!["zero"]);
}

#[test]
fn branch_after_else_is_template_error() {
    let body = [
        p(&simple("n:if")),
        p(&simple("n:else")),
        p(&simple("n:elsif")),
        p(&simple("n:endIf")),
    ]
    .concat();
    let err = render_err(&body, &mut Environment::default());
    assert!(matches!(
        err.error,
        RuntimeError::Template(TemplateError::MisplacedBranch { .. })
    ));
}

#[test]
fn abutting_conditionals_share_their_paragraph() {
    let body = [
        p(&simple("a:if")),
        p(&run("A")),
        p(&format!("{}{}", simple("a:endIf"), simple("b:if"))),
        p(&run("B")),
        p(&simple("b:endIf")),
    ]
    .concat();
    let shown = |a: bool, b: bool| {
        paragraphs(&render(&body, &mut context(vec![("a", a.into()), ("b", b.into())])))
    };

    assert_eq!(shown(true, true), vec!["A", "B"]);
    assert_eq!(shown(false, true), vec!["B"]);
    assert_eq!(shown(true, false), vec!["A"]);
    assert!(shown(false, false).is_empty());
}

#[test]
fn abutting_loops_share_their_paragraph() {
    let body = [
        p(&simple("xs:each(x)")),
        p(&simple("=x")),
        p(&format!("{}{}", simple("xs:endEach"), simple("ys:each(y)"))),
        p(&simple("=y")),
        p(&simple("ys:endEach")),
    ]
    .concat();
    let mut env = context(vec![
        ("xs", vec![1i64, 2].into()),
        ("ys", vec![3i64].into()),
    ]);
    let out = render(&body, &mut env);
    assert_eq!(paragraphs(&out), vec!["1", "2", "3"]);
    assert!(!out.contains("MERGEFIELD"));
}

#[test]
fn paragraph_block_end_next_to_inline_block_keeps_paragraph() {
    let body = [
        p(&simple("a:if")),
        p(&run("A")),
        p(&format!(
            "{}{}{}{}",
            simple("a:endIf"),
            simple("b:if"),
            run("B"),
            simple("b:endIf")
        )),
    ]
    .concat();
    let out = render(&body, &mut context(vec![("a", true.into()), ("b", true.into())]));
    assert_eq!(paragraphs(&out), vec!["A", "B"]);
    assert!(!out.contains("MERGEFIELD"));
}

// --- Comments, images ---

#[test]
fn comment_blocks_are_removed_with_empty_context() {
    let body = format!(
        "{}{}{}{}",
        p(&simple("comment")),
        p(&format!("{}{}", run("note to self "), simple("=anything"))),
        p(&simple("endComment")),
        p(&run("visible")),
    );
    let out = render(&body, &mut Environment::default());
    assert_eq!(paragraphs(&out), vec!["visible"]);
}

#[test]
fn image_block_retargets_picture() {
    let drawing = concat!(
        r#"<w:r><w:drawing><pic:pic><pic:nvPicPr><pic:cNvPr id="1" name="placeholder.png"/></pic:nvPicPr>"#,
        r#"<pic:blipFill><a:blip r:embed="rId5"/></pic:blipFill></pic:pic></w:drawing></w:r>"#,
    );
    let body = format!(
        "{}{}{}",
        p(&simple("@logo:start")),
        p(drawing),
        p(&simple("@logo:end")),
    );
    let logo = RuntimeValue::content(Image::new("logo.png", vec![0x89, 0x50, 0x4e, 0x47]));
    let out = render(&body, &mut context(vec![("logo", logo)]));

    assert!(out.contains(r#"name="logo.png""#));
    assert!(out.contains(r#"r:embed="rIdDocmerge1""#));
    assert!(!out.contains("MERGEFIELD"));
    assert_eq!(out.matches("<w:p").count(), 3);
}

#[test]
fn image_block_without_image_keeps_placeholder() {
    let drawing = r#"<w:r><w:drawing><a:blip r:embed="rId5"/></w:drawing></w:r>"#;
    let body = p(&format!(
        "{}{}{}",
        simple("@logo:start"),
        drawing,
        simple("@logo:end"),
    ));
    let out = render(&body, &mut Environment::default());
    assert!(out.contains(r#"r:embed="rId5""#));
    assert!(!out.contains("MERGEFIELD"));
}

#[test]
fn image_with_assigned_rid_is_not_registered() {
    let drawing = r#"<w:r><w:drawing><a:blip r:embed="rId5"/></w:drawing></w:r>"#;
    let body = p(&format!("{}{}{}", simple("@logo:start"), drawing, simple("@logo:end")));
    let logo = RuntimeValue::content(Image::new("logo.png", Vec::new()).with_rid("rId42"));
    let out = render(&body, &mut context(vec![("logo", logo)]));
    assert!(out.contains(r#"r:embed="rId42""#));
}

#[test]
fn image_block_outside_paragraphs() {
    let drawing = r#"<w:r><w:drawing><a:blip r:embed="rId5"/></w:drawing></w:r>"#;
    let body = format!("{}{}{}", simple("@logo:start"), p(drawing), simple("@logo:end"));
    let logo = RuntimeValue::content(Image::new("logo.png", vec![7]));
    let out = render(&body, &mut context(vec![("logo", logo)]));
    assert!(out.contains(r#"r:embed="rIdDocmerge1""#));
    assert!(!out.contains("MERGEFIELD"));
}

#[test]
fn image_directive_with_non_image_value_is_context_error() {
    let drawing = r#"<w:r><w:drawing><a:blip r:embed="rId5"/></w:drawing></w:r>"#;
    let body = p(&format!("{}{}{}", simple("@logo:start"), drawing, simple("@logo:end")));
    let err = render_err(&body, &mut context(vec![("logo", "logo.png".into())]));
    assert!(matches!(
        &err.error,
        RuntimeError::Context(ContextError::NotAnImage { expression, type_name })
            if expression == "logo" && type_name == "String"
    ));
    assert!(err.span.is_some());
}

// --- Structure ---

#[test]
fn unmatched_loop_reports_both_markers() {
    let body = format!("{}{}", p(&simple("X:each(y)")), p(&simple("=y")));
    let err = render_err(&body, &mut Environment::default());
    assert!(err.is_template_error());
    match &err.error {
        RuntimeError::Template(TemplateError::MissingEndField { start, end }) => {
            assert_eq!(start, "X:each(y)");
            assert_eq!(end, "X:endEach");
        }
        other => panic!("unexpected error: {other}"),
    }
    let message = err.to_string();
    assert!(message.contains("X:each(y)"));
    assert!(message.contains("X:endEach"));
}

#[test]
fn block_across_unrelated_containers_is_unresolvable() {
    let body = format!(
        "{}<w:tbl>{}</w:tbl>",
        p(&simple("a:if")),
        row(&simple("a:endIf")),
    );
    let err = render_err(&body, &mut context(vec![("a", true.into())]));
    assert!(matches!(
        err.error,
        RuntimeError::Template(TemplateError::UnresolvableBlock { .. })
    ));
}

#[test]
fn inline_block_split_across_containers_is_unresolvable() {
    let body = p(&format!(
        "<w:hyperlink>{}{}</w:hyperlink>{}{}",
        simple("c:if"),
        run("secret"),
        run("more"),
        simple("c:endIf"),
    ));
    let err = render_err(&body, &mut context(vec![("c", false.into())]));
    assert!(matches!(
        err.error,
        RuntimeError::Template(TemplateError::UnresolvableBlock { .. })
    ));
}

#[test]
fn invalid_expression_is_template_error() {
    let body = p(&simple("=a..b"));
    let err = render_err(&body, &mut Environment::default());
    assert!(matches!(
        err.error,
        RuntimeError::Template(TemplateError::InvalidExpression(_))
    ));
}

#[test]
fn emptied_table_cells_get_a_paragraph() {
    let cell = [
        p(&simple("hidden:if")),
        p(&run("secret")),
        p(&simple("hidden:endIf")),
    ]
    .concat();
    let body = format!("<w:tbl><w:tr><w:tc>{}</w:tc></w:tr></w:tbl>", cell);
    let out = render(&body, &mut Environment::default());
    assert!(out.contains("<w:tc><w:p/></w:tc>"));
}

#[test]
fn second_process_is_a_no_op() {
    let body = format!(
        "{}{}{}",
        p(&simple("technologies:each(technology)")),
        p(&simple("=technology")),
        p(&simple("technologies:endEach")),
    );
    let mut env = context(vec![("technologies", vec!["Ruby", "Rails"].into())]);
    let mut doc = parse(&document(&body));

    interpreter::process(&mut doc, &mut env).expect("first pass failed");
    let first = doc.to_xml();
    interpreter::process(&mut doc, &mut env).expect("second pass failed");
    assert_eq!(doc.to_xml(), first);
}

#[test]
fn strict_policy_rejects_missing_keys() {
    let body = p(&simple("=missing"));
    let mut env = Environment::new(Map::new()).with_policy(MissingPolicy::Strict);
    let err = render_err(&body, &mut env);
    assert!(matches!(
        &err.error,
        RuntimeError::Context(ContextError::UndefinedVariable { name, .. }) if name == "missing"
    ));
}

#[test]
fn unknown_member_is_context_error() {
    let body = p(&simple("=title.colour"));
    let err = render_err(&body, &mut context(vec![("title", "x".into())]));
    assert!(matches!(
        &err.error,
        RuntimeError::Context(ContextError::UnknownMember { member, .. }) if member == "colour"
    ));
}

// --- Registry ---

#[derive(Debug)]
struct TodayHandler;

impl FieldHandler for TodayHandler {
    fn matches(&self, field: &Field) -> bool {
        field.expression() == "today"
    }

    fn build(
        &self,
        _builder: &mut OperationBuilder<'_>,
        field: FieldRef,
        allow_insertion: bool,
    ) -> Result<Option<Statement>, interpreter::DiagnosticError> {
        if !allow_insertion {
            return Ok(None);
        }
        Ok(Some(Statement::Insertion {
            field,
            expression: Expression::Variable("current_date".to_string()),
        }))
    }
}

#[test]
fn custom_handler_extends_directives() {
    let mut processor = Processor::default();
    processor
        .registry_mut()
        .register("today", Box::new(TodayHandler))
        .expect("name is free");

    let mut env = context(vec![("current_date", "2024-05-01".into())]);
    let out = processor
        .process_xml(&document(&p(&simple("today"))), &mut env)
        .expect("processing failed");
    assert_eq!(paragraphs(&out), vec!["2024-05-01"]);
}

#[test]
fn registry_management() {
    let mut registry = HandlerRegistry::with_defaults();
    assert_eq!(
        registry.names().collect::<Vec<_>>(),
        vec!["insertion", "each", "conditional", "image", "comment"]
    );
    assert!(registry.register("each", Box::new(TodayHandler)).is_err());

    assert!(registry.replace("each", Box::new(TodayHandler)).is_some());
    assert_eq!(registry.names().nth(1), Some("each"));

    assert!(registry.remove("comment").is_some());
    assert!(registry.remove("comment").is_none());
    assert!(registry.set_default(Some(Box::new(TodayHandler))).is_none());
}

#[test]
fn fields_without_a_handler_are_left_alone() {
    let mut registry = HandlerRegistry::with_defaults();
    registry.remove("insertion");
    let processor = Processor::new(registry);
    let out = processor
        .process_xml(&document(&p(&simple("=name"))), &mut Environment::default())
        .expect("processing failed");
    assert!(out.contains("MERGEFIELD =name"));
}

#[test]
fn builder_nests_directives_inside_blocks() {
    let body = [
        p(&simple("=title")),
        p(&simple("items:each(item)")),
        p(&simple("=item")),
        p(&simple("item:if")),
        p(&simple("item:endIf")),
        p(&simple("items:endEach")),
        p(&simple("comment")),
        p(&simple("endComment")),
    ]
    .concat();
    let doc = parse(&document(&body));
    let fields = docmerge::field::scanner::scan_fields(&doc, doc.root());
    assert_eq!(fields.len(), 8);

    let registry = HandlerRegistry::with_defaults();
    let statements = OperationBuilder::new(&doc, &registry, fields)
        .build()
        .expect("build failed");
    let kinds: Vec<_> = statements.iter().map(|s| s.name()).collect();
    assert_eq!(kinds, vec!["insertion", "loop", "comment"]);
}

// --- Values ---

#[test]
fn value_members_and_predicates() {
    let list = RuntimeValue::from(vec!["a", "b"]);
    assert_eq!(list.member("size"), Some(RuntimeValue::Integer(2)));
    assert_eq!(list.member("first"), Some(RuntimeValue::from("a")));
    assert_eq!(list.member("bogus"), None);
    assert_eq!(list.predicate("any?"), Some(true));

    let text = RuntimeValue::from("  hi ");
    assert_eq!(text.member("strip"), Some(RuntimeValue::from("hi")));
    assert_eq!(text.predicate("blank?"), Some(false));
    assert_eq!(RuntimeValue::from("   ").predicate("blank?"), Some(true));

    assert_eq!(RuntimeValue::Nil.member("anything"), Some(RuntimeValue::Nil));
    assert_eq!(RuntimeValue::Integer(3).predicate("odd?"), Some(true));
    assert_eq!(RuntimeValue::Integer(3).predicate("empty?"), None);

    let object = RuntimeValue::object(Technologies(Vec::new()));
    assert_eq!(object.predicate("empty?"), Some(true));
    assert!(!object.is_truthy());
}

#[test]
fn word_ml_keys_are_transformed_recursively() {
    let nested = RuntimeValue::map([("word_ml:body", RuntimeValue::from("<w:p/>"))]);
    let env = context(vec![("section", nested)]);
    let Some(RuntimeValue::Map(section)) = env.get_variable("section") else {
        panic!("section should be a map");
    };
    assert!(matches!(section.get("body"), Some(RuntimeValue::Content(c)) if c.kind() == "WordMl"));
    assert!(!section.contains_key("word_ml:body"));
}

#[test]
fn process_part_file_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("document.xml");
    let output = dir.path().join("out.xml");
    std::fs::write(&input, document(&p(&simple("=name")))).expect("write input");

    let mut env = context(vec![("name", "file".into())]);
    interpreter::process_part_file(&input, &output, &mut env).expect("processing failed");

    let out = std::fs::read_to_string(&output).expect("read output");
    assert_eq!(paragraphs(&out), vec!["file"]);
}

#[test]
fn shared_media_registry_across_parts() {
    let drawing = r#"<w:r><w:drawing><a:blip r:embed="rId5"/></w:drawing></w:r>"#;
    let body = p(&format!("{}{}{}", simple("@logo:start"), drawing, simple("@logo:end")));
    let logo = Rc::new(Image::new("logo.png", vec![1, 2, 3]));
    let mut env = context(vec![("logo", RuntimeValue::Content(logo))]);

    let header = render(&body, &mut env);
    let footer = render(&body, &mut env);
    assert!(header.contains(r#"r:embed="rIdDocmerge1""#));
    assert!(footer.contains(r#"r:embed="rIdDocmerge1""#));
}

#[test]
fn registered_images_are_available_after_processing() {
    let drawing = r#"<w:r><w:drawing><a:blip r:embed="rId5"/></w:drawing></w:r>"#;
    let body = [
        p(&format!("{}{}{}", simple("@logo:start"), drawing, simple("@logo:end"))),
        p(&format!("{}{}{}", simple("@badge:start"), drawing, simple("@badge:end"))),
    ]
    .concat();
    let mut env = context(vec![
        ("logo", RuntimeValue::content(Image::new("logo.png", vec![1, 2]))),
        ("badge", RuntimeValue::content(Image::new("badge.png", vec![3]))),
    ])
    .with_media(Box::new(MediaCollection::with_prefix("rIdMerge")));

    let out = render(&body, &mut env);
    assert!(out.contains(r#"r:embed="rIdMerge2""#));

    let images = env.media().images();
    assert_eq!(images.len(), 2);
    assert_eq!(images[0].0, "rIdMerge1");
    assert_eq!(images[0].1.name, "logo.png");
    assert_eq!(images[0].1.data, vec![1, 2]);
    assert_eq!(images[1].0, "rIdMerge2");
    assert_eq!(images[1].1.name, "badge.png");
}
