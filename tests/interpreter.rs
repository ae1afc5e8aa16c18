use docscript::{Runtime, RuntimeConfig, Scope, ScriptError, value::ValueKind};
use pretty_assertions::assert_eq;

fn with_scope<T>(body: impl FnOnce(&mut Scope) -> T) -> T {
    let runtime = Runtime::new(RuntimeConfig::default()).expect("runtime should start");
    let mut scope = runtime.create_scope().expect("scope should open");
    body(&mut scope)
}

fn eval_text(source: &str) -> String {
    with_scope(|scope| {
        scope
            .eval(source)
            .expect("evaluation should succeed")
            .to_string()
    })
}

fn eval_number(source: &str) -> f64 {
    with_scope(|scope| {
        let value = scope.eval(source).expect("evaluation should succeed");
        match value.kind() {
            ValueKind::Number(n) => *n,
            _ => panic!("expected number, found {}", value.type_name()),
        }
    })
}

fn eval_error(source: &str) -> ScriptError {
    with_scope(|scope| match scope.eval(source) {
        Ok(value) => panic!("expected error, received value {value}"),
        Err(err) => err,
    })
}

fn diagnostic_message(err: ScriptError) -> String {
    match err {
        ScriptError::Diagnostic(diag) => diag.message,
        other => panic!("expected diagnostic, found {other:?}"),
    }
}

#[test]
fn evaluates_arithmetic_with_precedence() {
    assert_eq!(eval_number("1 + 2 * 3 - 4 / 2"), 5.0);
    assert_eq!(eval_number("(1 + 2) * 3 % 4"), 1.0);
    assert_eq!(eval_number("-2 * -(3)"), 6.0);
}

#[test]
fn plus_concatenates_once_a_string_is_involved() {
    assert_eq!(eval_text(r#""a" + 1 + 2"#), "a12");
    assert_eq!(eval_text(r#"1 + 2 + "a""#), "3a");
    assert_eq!(eval_text(r#"[1, null, "x"] + """#), "1,,x");
    assert_eq!(eval_text(r#"({}) + """#), "[object Object]");
}

#[test]
fn formats_numbers_like_script_strings() {
    assert_eq!(eval_text("1 / 0"), "Infinity");
    assert_eq!(eval_text("0 / 0"), "NaN");
    assert_eq!(eval_text("10 / 4"), "2.5");
    assert_eq!(eval_text("3.0"), "3");
}

#[test]
fn var_is_function_scoped_and_let_is_block_scoped() {
    let text = eval_text(
        r#"
        function probe() {
            if (true) {
                var a = 1;
                let b = 2;
            }
            return typeof a + "," + typeof b;
        }
        probe()
        "#,
    );
    assert_eq!(text, "number,undefined");
}

#[test]
fn const_bindings_reject_assignment() {
    let message = diagnostic_message(eval_error("const x = 1; x = 2;"));
    assert!(message.contains("constant"), "unexpected message: {message}");
}

#[test]
fn assignment_to_undeclared_name_creates_global() {
    with_scope(|scope| {
        scope
            .eval("function publish() { result = 42 } publish();")
            .expect("script runs");
        assert_eq!(scope.get_number("result").expect("global is bound"), 42.0);
    });
}

#[test]
fn function_declarations_are_hoisted() {
    assert_eq!(
        eval_number("var r = twice(4); function twice(n) { return n * 2 } r"),
        8.0
    );
}

#[test]
fn closures_capture_their_environment() {
    let value = eval_number(
        r#"
        function counter() {
            var n = 0;
            return function () { n += 1; return n; };
        }
        var next = counter();
        next(); next(); next()
        "#,
    );
    assert_eq!(value, 3.0);
}

#[test]
fn functions_without_return_yield_undefined() {
    assert_eq!(eval_text("function nothing() {} nothing()"), "undefined");
    assert_eq!(eval_text("(function (a, b) { return b })(1)"), "undefined");
}

#[test]
fn logical_operators_short_circuit_and_return_operands() {
    assert_eq!(eval_text(r#"null || "fallback""#), "fallback");
    assert_eq!(eval_text("0 && explode()"), "0");
    assert_eq!(eval_text(r#""left" && "right""#), "right");
}

#[test]
fn loops_honor_break_and_continue() {
    let total = eval_number(
        r#"
        var total = 0;
        for (var i = 0; i < 10; i++) {
            if (i % 2 == 0) continue;
            if (i > 7) break;
            total += i;
        }
        total
        "#,
    );
    assert_eq!(total, 16.0);
    assert_eq!(eval_number("var n = 0; while (n < 5) n++; n"), 5.0);
}

#[test]
fn distinguishes_loose_and_strict_equality() {
    let text = eval_text(
        r#"[1 == "1", 1 === "1", null == undefined, null === undefined, NaN == NaN].join(",")"#,
    );
    assert_eq!(text, "true,false,true,false,false");
    assert_eq!(eval_text(r#""apple" < "banana""#), "true");
}

#[test]
fn objects_and_arrays_are_shared_by_reference() {
    let value = eval_number(
        r#"
        var o = {a: 1, "b": [1, 2]};
        var alias = o;
        alias.b.push(3);
        o.c = o.b.length;
        o.a + alias.c + o["b"][2]
        "#,
    );
    assert_eq!(value, 7.0);
}

#[test]
fn array_writes_past_the_end_pad_with_undefined() {
    assert_eq!(
        eval_text(r#"var a = []; a[2] = "x"; a.length + ":" + a.join("-")"#),
        "3:--x"
    );
    assert_eq!(eval_text("var a = [1, 2]; a.pop() + a.indexOf(1)"), "2");
}

#[test]
fn method_calls_bind_this() {
    assert_eq!(
        eval_number("var o = {n: 2, scaled: function () { return this.n * 10 }}; o.scaled()"),
        20.0
    );
    assert_eq!(
        eval_text("function who() { return typeof this } who()"),
        "undefined"
    );
}

#[test]
fn string_members_are_available() {
    assert_eq!(
        eval_text(
            r#""  Hello ".trim().toUpperCase() + "abc".indexOf("c") + "abc".charAt(1) + "abcdef".substring(4, 1)"#
        ),
        "HELLO2bbcd"
    );
    assert_eq!(
        eval_text(r#""docscript".startsWith("doc") && "docscript".endsWith("script")"#),
        "true"
    );
    assert_eq!(eval_number(r#""a\tb".length"#), 3.0);
    assert_eq!(eval_text(r#"'A' + "BC".toLowerCase()"#), "Abc");
}

#[test]
fn standard_library_is_preloaded() {
    assert_eq!(
        eval_number(
            r#"parseInt("42px") + parseFloat("1.5") + Math.max(1, 7, 3) + Math.floor(2.7) + Math.abs(-1)"#
        ),
        53.5
    );
    assert_eq!(eval_text(r#"String(12) + Number("3")"#), "123");
    assert_eq!(eval_text(r#"isNaN("abc") && isFinite("12")"#), "true");
    assert_eq!(eval_text("Boolean(0) || Boolean(\"x\")"), "true");
    assert_eq!(eval_number("Math.pow(2, 10) + Math.round(Math.PI)"), 1027.0);
}

#[test]
fn typeof_reports_script_types() {
    assert_eq!(
        eval_text(
            r#"[typeof 1, typeof "s", typeof true, typeof undefined, typeof null, typeof {}, typeof [], typeof print, typeof missing].join(" ")"#
        ),
        "number string boolean undefined object object object function undefined"
    );
}

#[test]
fn compound_assignment_and_updates() {
    assert_eq!(
        eval_text(r#"var x = 5; x *= 2; x -= 1; x /= 3; x > 2 ? "big" : "small""#),
        "big"
    );
    assert_eq!(
        eval_text(r#"var i = 1; var a = i++; var b = ++i; a + "," + b + "," + i"#),
        "1,3,3"
    );
}

#[test]
fn semicolons_and_comments_are_optional() {
    let value = eval_number(
        r#"
        // leading comment
        var a = 1 /* inline */
        var b = 2
        a + b
        "#,
    );
    assert_eq!(value, 3.0);
}

#[test]
fn block_statements_produce_completion_values() {
    assert_eq!(eval_number("if (true) { 5 } else { 6 }"), 5.0);
}

#[test]
fn throw_surfaces_as_uncaught_error() {
    match eval_error(r#"throw "boom""#) {
        ScriptError::Uncaught(message) => assert_eq!(message, "boom"),
        other => panic!("expected uncaught error, found {other:?}"),
    }
}

#[test]
fn reports_undefined_variables_and_nullish_property_reads() {
    let message = diagnostic_message(eval_error("missing + 1"));
    assert!(message.contains("is not defined"), "unexpected message: {message}");

    let message = diagnostic_message(eval_error("var u; u.field"));
    assert!(
        message.contains("cannot read property"),
        "unexpected message: {message}"
    );
}

#[test]
fn calling_a_non_function_is_an_error() {
    let message = diagnostic_message(eval_error("var n = 1; n()"));
    assert!(message.contains("not a function"), "unexpected message: {message}");
}

#[test]
fn failed_evaluation_restores_the_global_frame() {
    with_scope(|scope| {
        let err = scope
            .eval("function f() { let inner = 1; missing(); } f()")
            .expect_err("call should fail");
        assert!(!err.is_fatal());
        let text = scope.eval("typeof inner").expect("scope stays usable");
        assert_eq!(text.to_string(), "undefined");
    });
}

#[test]
fn call_depth_is_limited() {
    let runtime = Runtime::new(RuntimeConfig {
        max_call_depth: 50,
        ..RuntimeConfig::default()
    })
    .expect("runtime should start");
    let mut scope = runtime.create_scope().expect("scope should open");
    let err = scope
        .eval("function down(n) { return down(n + 1) } down(0)")
        .expect_err("recursion should be cut off");
    let message = diagnostic_message(err);
    assert!(message.contains("maximum call depth"), "unexpected message: {message}");
    assert_eq!(scope.eval("1 + 1").expect("scope recovers").to_string(), "2");
}

#[test]
fn runaway_recursion_stops_at_the_default_call_depth() {
    let message = diagnostic_message(eval_error(
        "function down(n) { return down(n + 1) } down(0)",
    ));
    assert!(
        message.contains("maximum call depth of 200"),
        "unexpected message: {message}"
    );
}

#[test]
fn writing_far_past_the_end_of_an_array_runs_out_of_memory() {
    with_scope(|scope| {
        for key in ["4611686018427387904", "18446744073709551615"] {
            let err = scope
                .eval(&format!(r#"var a = []; a["{key}"] = 1; a.length"#))
                .expect_err("the padding cannot be paid for");
            assert!(matches!(err, ScriptError::OutOfMemory { .. }), "found {err:?}");
            scope.reset().expect("reset succeeds");
        }
        assert_eq!(scope.eval("var b = []; b[3] = 1; b.length").expect("small writes").to_string(), "4");
    });
}

#[test]
fn syntax_errors_report_position() {
    match eval_error("var x = 1;\nvar = 2;") {
        ScriptError::Compile { line, column, .. } => {
            assert_eq!((line, column), (2, 5));
        }
        other => panic!("expected compile error, found {other:?}"),
    }
}
