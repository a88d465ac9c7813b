//! Tests for the script parser and evaluator.

use super::ast::{BinaryOp, Expr, Stmt};
use super::*;
use serde_json::json;

/// Records builtin calls; `echo` returns its first argument.
#[derive(Default)]
struct RecordingHost {
    calls: Vec<(String, Vec<Value>)>,
}

impl Host for RecordingHost {
    fn call(&mut self, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
        self.calls.push((name.to_owned(), args.clone()));
        match name {
            "echo" => Ok(args.into_iter().next().unwrap_or(Value::Null)),
            "send" => Ok(Value::Null),
            _ => Err(ScriptError::UnknownFunction(name.to_owned())),
        }
    }
}

fn eval_in(scope: &mut Scope, source: &str) -> Result<Value, ScriptError> {
    let program = parse(source)?;
    evaluate(&program, scope, &mut RecordingHost::default())
}

fn eval_str(source: &str) -> Result<Value, ScriptError> {
    eval_in(&mut Scope::new(), source)
}

// =============================================================================
// PARSER TESTS
// =============================================================================

#[test]
fn parse_splits_statements_on_semicolons_and_newlines() {
    let program = parse("let a = 1; a = 2\n\n send('x', a)").unwrap();
    assert_eq!(program.statements.len(), 3);
    assert!(matches!(program.statements[0], Stmt::Let { .. }));
    assert!(matches!(program.statements[1], Stmt::Assign { .. }));
    assert!(matches!(program.statements[2], Stmt::Expr(Expr::Call { .. })));
}

#[test]
fn parse_ignores_newlines_inside_brackets() {
    let program = parse("send('x', {\n  a: 1,\n  b: [1,\n 2],\n})").unwrap();
    assert_eq!(program.statements.len(), 1);
}

#[test]
fn parse_respects_operator_precedence() {
    let program = parse("1 + 2 * 3").unwrap();
    let Stmt::Expr(Expr::Binary { op, right, .. }) = &program.statements[0] else {
        panic!("expected binary expression");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn parse_skips_line_comments() {
    let program = parse("// header\nlet a = 1 // trailing\n").unwrap();
    assert_eq!(program.statements.len(), 1);
}

#[test]
fn parse_rejects_invalid_assignment_target() {
    let err = parse("send('x') = 3").unwrap_err();
    assert!(matches!(err, ScriptError::Syntax { line: 1, .. }));
}

#[test]
fn parse_reports_line_of_error() {
    let err = parse("let a = 1\nlet b = )").unwrap_err();
    assert!(matches!(err, ScriptError::Syntax { line: 2, .. }), "{err:?}");
}

#[test]
fn parse_rejects_unterminated_string() {
    let err = parse("log('oops)").unwrap_err();
    assert!(matches!(err, ScriptError::Syntax { .. }));
}

#[test]
fn parse_rejects_two_expressions_without_separator() {
    assert!(parse("a b").is_err());
}

#[test]
fn parse_empty_source_is_empty_program() {
    assert!(parse("  \n ; ;\n").unwrap().statements.is_empty());
}

// =============================================================================
// EVALUATION TESTS
// =============================================================================

#[test]
fn program_value_is_last_expression() {
    assert_eq!(eval_str("let a = 2; a * 21").unwrap(), json!(42));
}

#[test]
fn arithmetic_keeps_integers_integral() {
    assert_eq!(eval_str("7 - 2 * 3").unwrap(), json!(1));
    assert_eq!(eval_str("10 / 4").unwrap(), json!(2.5));
    assert_eq!(eval_str("-(3)").unwrap(), json!(-3));
}

#[test]
fn division_by_zero_is_type_error() {
    assert!(matches!(eval_str("1 / 0"), Err(ScriptError::Type(_))));
}

#[test]
fn plus_concatenates_when_either_side_is_text() {
    assert_eq!(eval_str("'id-' + 7").unwrap(), json!("id-7"));
    assert_eq!(eval_str("1 + '2'").unwrap(), json!("12"));
    assert_eq!(eval_str("'x' + null").unwrap(), json!("xnull"));
}

#[test]
fn comparisons_and_logic_follow_truthiness() {
    assert_eq!(eval_str("1 < 2 && 'b' > 'a'").unwrap(), json!(true));
    assert_eq!(eval_str("0 || 'fallback'").unwrap(), json!("fallback"));
    assert_eq!(eval_str("'' && missing").unwrap(), json!(""));
    assert_eq!(eval_str("!0").unwrap(), json!(true));
    assert_eq!(eval_str("1 == 1.0").unwrap(), json!(true));
    assert_eq!(eval_str("[1] != [1]").unwrap(), json!(false));
}

#[test]
fn undefined_variable_is_an_error() {
    assert_eq!(eval_str("nope + 1").unwrap_err(), ScriptError::Undefined("nope".into()));
}

#[test]
fn missing_property_reads_as_null() {
    assert_eq!(eval_str("let o = {a: 1}; o.b").unwrap(), Value::Null);
    assert_eq!(eval_str("let o = [1, 2]; o[5]").unwrap(), Value::Null);
    assert_eq!(eval_str("let o = [1, 2, 3]; o.length").unwrap(), json!(3));
}

#[test]
fn reading_through_null_is_type_error() {
    assert!(matches!(eval_str("let o = null; o.x"), Err(ScriptError::Type(_))));
}

#[test]
fn member_assignment_creates_missing_root() {
    let mut scope = Scope::new();
    eval_in(&mut scope, "module.returned = 42").unwrap();
    assert_eq!(scope.lookup(&["module", "returned"]), Some(&json!(42)));
}

#[test]
fn nested_and_indexed_assignment() {
    let mut scope = Scope::new();
    eval_in(&mut scope, "let cfg = {list: [1, 2]}; cfg.list[1] = 'b'; cfg['deep'].x = true; cfg.list[2] = 3").unwrap();
    assert_eq!(scope.get("cfg"), Some(&json!({"list": [1, "b", 3], "deep": {"x": true}})));
}

#[test]
fn assignment_past_array_end_is_type_error() {
    assert!(matches!(eval_str("let a = []; a[3] = 1"), Err(ScriptError::Type(_))));
}

#[test]
fn assigning_property_on_scalar_is_type_error() {
    assert!(matches!(eval_str("let a = 1; a.b = 2"), Err(ScriptError::Type(_))));
}

#[test]
fn calls_go_to_host_with_evaluated_arguments() {
    let mut host = RecordingHost::default();
    let program = parse("send('topic', {n: 1 + 1}); echo('back')").unwrap();
    let value = evaluate(&program, &mut Scope::new(), &mut host).unwrap();
    assert_eq!(value, json!("back"));
    assert_eq!(host.calls[0], ("send".to_owned(), vec![json!("topic"), json!({"n": 2})]));
}

#[test]
fn unknown_function_surfaces_host_error() {
    assert_eq!(eval_str("explode()").unwrap_err(), ScriptError::UnknownFunction("explode".into()));
}

#[test]
fn evaluate_keeps_let_bindings_in_scope() {
    let mut scope = Scope::new();
    eval_in(&mut scope, "let kept = 'yes'").unwrap();
    assert_eq!(scope.get("kept"), Some(&json!("yes")));
}

// =============================================================================
// ISOLATED EXECUTION
// =============================================================================

#[test]
fn execute_discards_let_bindings_but_writes_through_assignments() {
    let mut scope = Scope::new();
    scope.set("counter", json!(1));
    let program = parse("let temp = counter + 1; counter = temp; fresh = 'global'").unwrap();

    execute(&program, &mut scope, &mut RecordingHost::default()).unwrap();

    assert_eq!(scope.get("counter"), Some(&json!(2)));
    assert_eq!(scope.get("fresh"), Some(&json!("global")));
    assert!(!scope.contains("temp"));
    assert_eq!(scope.attached_units(), 0);
}

#[test]
fn execute_detaches_even_when_program_fails() {
    let mut scope = Scope::new();
    let program = parse("let temp = 1; boom()").unwrap();

    let err = execute(&program, &mut scope, &mut RecordingHost::default()).unwrap_err();

    assert_eq!(err, ScriptError::UnknownFunction("boom".into()));
    assert_eq!(scope.attached_units(), 0);
    assert!(!scope.contains("temp"));
}

#[test]
fn execute_locals_shadow_host_bindings() {
    let mut scope = Scope::new();
    scope.set("name", json!("host"));
    let program = parse("let name = 'unit'; name = name + '!'; name").unwrap();

    let value = execute(&program, &mut scope, &mut RecordingHost::default()).unwrap();

    assert_eq!(value, json!("unit!"));
    assert_eq!(scope.get("name"), Some(&json!("host")));
}

#[test]
fn text_and_truthiness_helpers() {
    assert_eq!(to_text(&json!("plain")), "plain");
    assert_eq!(to_text(&json!({"a": 1})), r#"{"a":1}"#);
    assert!(!is_truthy(&json!(0)));
    assert!(is_truthy(&json!([])));
}

// =============================================================================
// NESTING LIMITS
// =============================================================================

fn assert_too_deep(source: &str) {
    match parse(source) {
        Err(ScriptError::Syntax { message, .. }) => assert_eq!(message, "expression nested too deeply"),
        other => panic!("expected nesting error, got {other:?}"),
    }
}

#[test]
fn deeply_nested_brackets_are_rejected() {
    assert_too_deep(&format!("{}1{}", "(".repeat(5_000), ")".repeat(5_000)));
    assert_too_deep(&format!("{}1{}", "[".repeat(5_000), "]".repeat(5_000)));
    assert_too_deep(&format!("{}1{}", "{a: ".repeat(5_000), "}".repeat(5_000)));
    assert_too_deep(&format!("{}1{}", "echo(".repeat(5_000), ")".repeat(5_000)));
    assert_too_deep(&format!("a{}", "[0".repeat(5_000)));
}

#[test]
fn long_prefix_and_operator_chains_are_rejected() {
    assert_too_deep(&format!("{}true", "!".repeat(5_000)));
    assert_too_deep(&format!("1{}", " + 1".repeat(5_000)));
    assert_too_deep(&format!("a{}", ".b".repeat(5_000)));
    assert_too_deep(&format!("a{}", "[0]".repeat(5_000)));
}

#[test]
fn moderate_nesting_still_evaluates() {
    let parens = format!("{}1{}", "(".repeat(100), ")".repeat(100));
    assert_eq!(eval_str(&parens), Ok(json!(1)));

    let sum = format!("1{}", " + 1".repeat(99));
    assert_eq!(eval_str(&sum), Ok(json!(100)));

    assert_eq!(eval_str(&format!("{}true", "!".repeat(100))), Ok(json!(true)));
}

#[test]
fn values_cannot_grow_past_depth_limit() {
    let mut scope = Scope::new();
    eval_in(&mut scope, "a = 1").unwrap();
    let wraps = "a = [a]\n".repeat(MAX_VALUE_DEPTH);
    assert!(eval_in(&mut scope, &wraps).is_ok());

    assert_eq!(
        eval_in(&mut scope, "a = [a]"),
        Err(ScriptError::Type("value nested too deeply".to_owned()))
    );
}

#[test]
fn assigning_through_a_path_counts_toward_value_depth() {
    let mut scope = Scope::new();
    eval_in(&mut scope, "x = {}").unwrap();
    let wraps = "x.k = x\n".repeat(MAX_VALUE_DEPTH * 2);

    assert_eq!(eval_in(&mut scope, &wraps), Err(ScriptError::Type("value nested too deeply".to_owned())));
    assert!(scope.get("x").is_some());
}
