use std::rc::Rc;

use docscript::{
    Document, Element, ElementType, Runtime, RuntimeConfig, Scope, ScriptError, ScriptType,
    engine::MIN_MEMORY_BUDGET,
    marshal,
    value::{Value, ValueKind},
};
use pretty_assertions::assert_eq;

fn runtime() -> Runtime {
    Runtime::new(RuntimeConfig::default()).expect("runtime should start")
}

fn number(value: &Value) -> f64 {
    value
        .as_number()
        .unwrap_or_else(|| panic!("expected number, found {}", value.type_name()))
}

fn proxy_reads(scope: &Scope, name: &str) -> usize {
    let value = scope.global(name).expect("global is bound");
    let object = value.as_object().expect("global is an object");
    let reads = object.borrow().proxy().expect("object is a document proxy").reads();
    reads
}

#[test]
fn numbers_round_trip_exactly() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    for value in [0.0, -1.5, 42.0, 1e300, f64::MIN_POSITIVE, -0.1 + 0.2] {
        scope.set_number("n", value);
        assert_eq!(scope.get_number("n").expect("number"), value);
    }
}

#[test]
fn booleans_and_strings_round_trip() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    scope.set_boolean("flag", true);
    assert!(scope.get_boolean("flag").expect("bool"));
    scope.set_boolean("flag", false);
    assert!(!scope.get_boolean("flag").expect("bool"));

    scope.set_string("name", "ada");
    assert_eq!(scope.get_string("name").expect("string"), "ada");
}

#[test]
fn getters_coerce_with_script_rules() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    scope.set_string("padded", "  12 ");
    assert_eq!(scope.get_number("padded").expect("number"), 12.0);
    scope.set_number("n", 3.0);
    assert_eq!(scope.get_string("n").expect("string"), "3");
    assert!(scope.get_boolean("n").expect("bool"));
    assert!(scope.get_number("missing").expect("number").is_nan());
    assert!(!scope.get_boolean("missing").expect("bool"));
}

#[test]
fn objects_are_not_convertible_to_numbers() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    scope.eval("o = {a: 1}").expect("script runs");
    match scope.get_number("o") {
        Err(ScriptError::NotAConvertibleType {
            name,
            requested,
            actual,
        }) => {
            assert_eq!((name.as_str(), requested, actual), ("o", "number", "object"));
        }
        other => panic!("expected NotAConvertibleType, found {other:?}"),
    }
}

#[test]
fn function_literal_result_is_published_as_return() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    let function = scope
        .create_function("function(){ return 1+1; }")
        .expect("compiles");
    scope.invoke(&function, None).expect("invokes");
    assert_eq!(scope.get_number("return").expect("number"), 2.0);
}

#[test]
fn bare_expression_behaves_like_a_function() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    let function = scope.create_function("1+1").expect("compiles");
    assert_eq!(function.label(), "anonymous");
    let result = scope.invoke(&function, None).expect("invokes");
    assert_eq!(number(&result), 2.0);
    assert_eq!(scope.get_number("return").expect("number"), 2.0);
}

#[test]
fn statement_bodies_run_against_the_receiver() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    let document = Rc::new(Document::new().with("a", 4));
    scope.set_this(&document).expect("receiver bound");
    let function = scope
        .create_function("var x = this.a; return x * 2")
        .expect("compiles");
    assert_eq!(number(&scope.invoke(&function, None).expect("invokes")), 8.0);

    scope.clear_this();
    let err = scope.invoke(&function, None).expect_err("no receiver");
    assert!(!err.is_fatal());
}

#[test]
fn named_function_literal_keeps_its_label() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    let function = scope
        .create_function("function total(a, b) { return a + b }")
        .expect("compiles");
    assert_eq!(function.label(), "total");
}

#[test]
fn invalid_source_is_a_compile_error() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    for source in ["function( {", "return )", "1 +", "var = 3"] {
        match scope.create_function(source) {
            Err(err @ ScriptError::Compile { .. }) => assert!(!err.is_fatal()),
            other => panic!("expected compile error for `{source}`, found {other:?}"),
        }
    }
    assert_eq!(scope.eval("1").expect("scope stays usable").to_string(), "1");
}

#[test]
fn deeply_nested_source_is_a_compile_error() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    let parens = format!("{}1{}", "(".repeat(50_000), ")".repeat(50_000));
    let blocks = format!("{}{}", "{".repeat(50_000), "}".repeat(50_000));
    let negations = format!("{}true", "!".repeat(50_000));
    for source in [parens, blocks, negations] {
        match scope.create_function(&source) {
            Err(err @ ScriptError::Compile { .. }) => assert!(!err.is_fatal()),
            other => panic!("expected compile error, found {other:?}"),
        }
    }

    let nested = format!("{}1{}", "(".repeat(200), ")".repeat(200));
    let function = scope.create_function(&nested).expect("moderate nesting compiles");
    assert_eq!(number(&scope.invoke(&function, None).expect("invokes")), 1.0);
}

#[test]
fn invoke_passes_document_fields_positionally() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    scope
        .set_this(&Rc::new(Document::new().with("c", 1)))
        .expect("receiver bound");
    let function = scope
        .create_function("function(a, b) { return a * b + this.c }")
        .expect("compiles");
    let args = Document::new().with("x", 3).with("y", 4.0);
    assert_eq!(number(&scope.invoke(&function, Some(&args)).expect("invokes")), 13.0);
    let missing = scope.invoke(&function, None).expect("invokes");
    assert!(number(&missing).is_nan());
}

#[test]
fn proxy_resolves_each_field_once() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    let document = Rc::new(
        Document::new()
            .with("a", Element::Int32(7))
            .with("big", Element::Int64(1 << 40))
            .with("s", "text")
            .with("t", true)
            .with("n", Element::Null),
    );
    scope.set_object("doc", &document).expect("bound");
    assert_eq!(proxy_reads(&scope, "doc"), 0);

    let value = scope.eval("doc.a + doc.a").expect("script runs");
    assert_eq!(number(&value), 14.0);
    assert_eq!(proxy_reads(&scope, "doc"), 1);

    let text = scope
        .eval(r#"[doc.big, doc.s, doc.t, doc.n === null, doc.a].join("|")"#)
        .expect("script runs");
    assert_eq!(text.to_string(), "1099511627776|text|true|true|7");
    assert_eq!(proxy_reads(&scope, "doc"), 5);
}

#[test]
fn missing_fields_read_undefined_and_stay_writable() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    let document = Rc::new(Document::new().with("a", 1));
    scope.set_object("doc", &document).expect("bound");

    let kind = scope.eval("typeof doc.missing").expect("script runs");
    assert_eq!(kind.to_string(), "undefined");
    let value = scope.eval("doc.missing = 5; doc.missing").expect("script runs");
    assert_eq!(number(&value), 5.0);

    let expected = Document::new().with("a", 1).with("missing", 5.0);
    assert_eq!(scope.get_object("doc").expect("document"), expected);
}

#[test]
fn unsupported_field_types_abort_evaluation() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    let document = Rc::new(
        Document::new()
            .with("nested", Document::new().with("x", 1))
            .with("list", Element::Array(vec![Element::Int32(1)]))
            .with("when", Element::DateTime(0)),
    );
    scope.set_object("doc", &document).expect("bound");

    let err = scope
        .eval("flag = 1; doc.nested; flag = 2")
        .expect_err("nested documents are not marshaled");
    assert!(!err.is_fatal());
    match err {
        ScriptError::UnsupportedType {
            field,
            element_type,
        } => {
            assert_eq!(field, "nested");
            assert_eq!(element_type, ElementType::Document);
        }
        other => panic!("expected UnsupportedType, found {other:?}"),
    }
    assert_eq!(scope.get_number("flag").expect("number"), 1.0);

    for (field, expected) in [("list", ElementType::Array), ("when", ElementType::DateTime)] {
        match scope.eval(&format!("doc.{field}")) {
            Err(ScriptError::UnsupportedType { element_type, .. }) => {
                assert_eq!(element_type, expected);
            }
            other => panic!("expected UnsupportedType, found {other:?}"),
        }
    }
}

#[test]
fn resolved_fields_outlive_the_document() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    let document = Rc::new(Document::new().with("a", 1).with("b", 2));
    scope.set_object("doc", &document).expect("bound");
    scope.eval("doc.a").expect("script runs");
    drop(document);

    assert_eq!(number(&scope.eval("doc.a").expect("cached field")), 1.0);
    match scope.eval("doc.b") {
        Err(err @ ScriptError::DocumentReleased) => assert!(err.is_fatal()),
        other => panic!("expected DocumentReleased, found {other:?}"),
    }
}

#[test]
fn get_type_classifies_globals() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    scope.set_number("n", 1.0);
    scope.set_string("s", "x");
    scope.set_boolean("b", true);
    scope
        .set_object("doc", &Rc::new(Document::new()))
        .expect("bound");
    scope
        .eval("arr = [1]; fn = function () {}; nothing = null")
        .expect("script runs");

    let types: Vec<ScriptType> = ["n", "s", "b", "doc", "arr", "fn", "nothing", "absent"]
        .iter()
        .map(|name| scope.get_type(name))
        .collect();
    assert_eq!(
        types,
        vec![
            ScriptType::Number,
            ScriptType::String,
            ScriptType::Boolean,
            ScriptType::Object,
            ScriptType::Array,
            ScriptType::Function,
            ScriptType::Null,
            ScriptType::Undefined,
        ]
    );
}

#[test]
fn get_object_converts_plain_objects_shallowly() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    scope
        .eval("o = {a: 1, s: 'x', t: true, n: null, u: undefined}")
        .expect("script runs");
    let expected = Document::new()
        .with("a", 1.0)
        .with("s", "x")
        .with("t", true)
        .with("n", Element::Null);
    assert_eq!(scope.get_object("o").expect("document"), expected);

    scope.eval("outer = {inner: {}}").expect("script runs");
    match scope.get_object("outer") {
        Err(ScriptError::NotAConvertibleType { name, .. }) => assert_eq!(name, "outer.inner"),
        other => panic!("expected NotAConvertibleType, found {other:?}"),
    }

    scope.set_number("n", 1.0);
    assert!(matches!(
        scope.get_object("n"),
        Err(ScriptError::NotAConvertibleType { .. })
    ));
}

#[test]
fn get_object_overlays_script_writes_on_the_document() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    let document = Rc::new(Document::new().with("a", Element::Int32(1)).with("b", "x"));
    scope.set_object("d", &document).expect("bound");
    scope.eval("d.b = 'y'; d.c = 3").expect("script runs");

    let expected = Document::new()
        .with("a", Element::Int32(1))
        .with("b", "y")
        .with("c", 3.0);
    assert_eq!(scope.get_object("d").expect("document"), expected);
    assert_eq!(document.get("b"), Some(&Element::String("x".to_string())));
}

#[test]
fn init_binds_top_level_fields_atomically() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    scope
        .init(&Document::new().with("a", 1).with("s", "x"))
        .expect("fields bind");
    assert_eq!(scope.get_number("a").expect("number"), 1.0);
    assert_eq!(scope.get_string("s").expect("string"), "x");

    let err = scope
        .init(&Document::new().with("ok", 1).with("bad", Document::new()))
        .expect_err("nested field is rejected");
    assert!(matches!(err, ScriptError::UnsupportedType { .. }));
    assert_eq!(scope.get_type("ok"), ScriptType::Undefined);
}

#[test]
fn reset_restores_a_fresh_scope() {
    let runtime = runtime();
    let mut scope = runtime.create_scope().expect("scope");
    scope.set_number("x", 1.0);
    scope
        .set_this(&Rc::new(Document::new().with("a", 1)))
        .expect("receiver bound");
    let function = scope.create_function("this.a").expect("compiles");

    scope.reset().expect("reset succeeds");
    assert_eq!(scope.get_type("x"), ScriptType::Undefined);
    assert_eq!(scope.get_type("print"), ScriptType::Function);
    assert_eq!(
        scope.eval("typeof this").expect("script runs").to_string(),
        "undefined"
    );
    match scope.invoke(&function, None) {
        Err(err @ ScriptError::StaleFunction { .. }) => assert!(err.is_fatal()),
        other => panic!("expected StaleFunction, found {other:?}"),
    }
}

#[test]
fn functions_belong_to_their_scope() {
    let runtime = runtime();
    let mut first = runtime.create_scope().expect("scope");
    let mut second = runtime.create_scope().expect("scope");
    assert_ne!(first.id(), second.id());
    let function = first.create_function("1").expect("compiles");
    match second.invoke(&function, None) {
        Err(err @ ScriptError::ForeignFunction { .. }) => assert!(err.is_fatal()),
        other => panic!("expected ForeignFunction, found {other:?}"),
    }
    assert_eq!(number(&first.invoke(&function, None).expect("invokes")), 1.0);
}

#[test]
fn heap_budget_is_enforced() {
    let runtime = Runtime::new(RuntimeConfig {
        memory_budget: MIN_MEMORY_BUDGET,
        ..RuntimeConfig::default()
    })
    .expect("runtime should start");
    let mut scope = runtime.create_scope().expect("scope");
    let err = scope
        .eval("var a = []; while (true) { a.push({}) }")
        .expect_err("allocation should fail");
    assert!(matches!(err, ScriptError::OutOfMemory { .. }));
    assert!(err.is_fatal());

    let exhausted = runtime.heap_used();
    assert_eq!(runtime.config().memory_budget, MIN_MEMORY_BUDGET);
    assert!(runtime.heap_peak() >= exhausted);
    scope.reset().expect("reset succeeds");
    assert!(runtime.heap_used() < exhausted);
    assert_eq!(scope.eval("1 + 1").expect("scope recovers").to_string(), "2");
}

#[test]
fn unreachable_cycles_are_collected_while_the_scope_lives() {
    let runtime = Runtime::new(RuntimeConfig {
        memory_budget: MIN_MEMORY_BUDGET,
        ..RuntimeConfig::default()
    })
    .expect("runtime should start");
    let mut scope = runtime.create_scope().expect("scope");
    let function = scope
        .create_function("function () { var o = {}; o.me = o; return 1 }")
        .expect("compiles");
    for _ in 0..2_000 {
        let value = scope.invoke(&function, None).expect("garbage cycles are reclaimed");
        assert_eq!(number(&value), 1.0);
    }
    assert!(scope.live_objects() < 600, "live objects: {}", scope.live_objects());
    assert!(runtime.heap_used() < MIN_MEMORY_BUDGET);
}

#[test]
fn collection_keeps_cycles_that_are_still_reachable() {
    let runtime = Runtime::new(RuntimeConfig {
        memory_budget: MIN_MEMORY_BUDGET,
        ..RuntimeConfig::default()
    })
    .expect("runtime should start");
    let mut scope = runtime.create_scope().expect("scope");
    scope
        .eval(
            r#"
            var keep = { count: 0 };
            keep.me = keep;
            var counter = function () { keep.count++; return counter };
            function churn() { var o = { counter: counter }; o.me = o }
            "#,
        )
        .expect("script runs");
    for _ in 0..1_000 {
        scope.eval("churn()").expect("churn fits the heap");
    }
    let value = scope
        .eval("keep.me === keep && counter()() === counter && keep.count")
        .expect("reachable values survive");
    assert_eq!(number(&value), 2.0);
}

#[test]
fn strings_built_by_scripts_are_charged_to_the_heap() {
    let runtime = Runtime::new(RuntimeConfig {
        memory_budget: MIN_MEMORY_BUDGET,
        ..RuntimeConfig::default()
    })
    .expect("runtime should start");
    let mut scope = runtime.create_scope().expect("scope");
    let err = scope
        .eval(r#"var s = "x"; for (var i = 0; i < 26; i++) { s = s + s } s.length"#)
        .expect_err("doubling outgrows the budget");
    assert!(matches!(err, ScriptError::OutOfMemory { .. }));

    scope.reset().expect("reset succeeds");
    let err = scope
        .eval("var a = [1]; a.push(a, a, a, a); String(a)")
        .expect_err("rendering a self-referencing array outgrows the budget");
    assert!(matches!(err, ScriptError::OutOfMemory { .. }));

    scope.reset().expect("reset succeeds");
    let before = runtime.heap_used();
    let value = scope
        .eval(r#"var t = "ab"; t = t + t + t; t.toUpperCase()"#)
        .expect("small strings fit");
    match value.kind() {
        ValueKind::String(text) => {
            assert_eq!(text.as_str(), "ABABAB");
            assert!(text.is_charged());
        }
        _ => panic!("expected string, found {}", value.type_name()),
    }
    assert!(runtime.heap_used() >= before + "ababab".len());
}

#[test]
fn dropping_a_scope_releases_cyclic_garbage() {
    let runtime = runtime();
    assert_eq!(runtime.heap_used(), 0);
    {
        let mut scope = runtime.create_scope().expect("scope");
        scope
            .eval(
                r#"
                var o = {};
                o.self = o;
                function loop() { return loop }
                var keep = function () { return o };
                o.keep = keep;
                "#,
            )
            .expect("script runs");
        assert!(scope.live_objects() > 0);
        assert!(runtime.heap_used() > 0);
        assert_eq!(runtime.live_scopes(), 1);
    }
    assert_eq!(runtime.live_scopes(), 0);
    assert_eq!(runtime.heap_used(), 0);
}

#[test]
fn runtime_rejects_invalid_configuration() {
    for config in [
        RuntimeConfig {
            memory_budget: 1024,
            ..RuntimeConfig::default()
        },
        RuntimeConfig {
            max_call_depth: 0,
            ..RuntimeConfig::default()
        },
    ] {
        match Runtime::new(config) {
            Err(err @ ScriptError::RuntimeInit(_)) => assert!(err.is_fatal()),
            Err(other) => panic!("expected RuntimeInit, found {other:?}"),
            Ok(_) => panic!("configuration should be rejected"),
        }
    }
}

#[test]
fn shutdown_waits_for_scopes() {
    let runtime = runtime();
    let scope = runtime.create_scope().expect("scope");
    match runtime.shutdown() {
        Err(ScriptError::RuntimeInUse { live }) => assert_eq!(live, 1),
        other => panic!("expected RuntimeInUse, found {other:?}"),
    }
    scope.destroy();
    runtime.shutdown().expect("no scopes left");
    assert!(matches!(
        runtime.create_scope(),
        Err(ScriptError::RuntimeInit(_))
    ));
}

#[test]
fn marshaler_maps_element_kinds() {
    let cases = [
        (Element::Double(1.5), "1.5"),
        (Element::Int32(-3), "-3"),
        (Element::Int64(10), "10"),
        (Element::String("s".to_string()), "s"),
        (Element::Boolean(false), "false"),
        (Element::Null, "null"),
    ];
    for (element, text) in cases {
        let value = marshal::element_to_value("f", Some(&element))
            .expect("supported kind")
            .expect("field is present");
        assert_eq!(value.to_string(), text);
    }
    assert!(
        marshal::element_to_value("f", None)
            .expect("absence is not an error")
            .is_none()
    );
}
