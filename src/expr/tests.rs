//! Tests for expression parsing and evaluation.
//!
//! The fail-open behaviors are load-bearing: an authoring mistake must
//! never hide content, and a broken jump condition must never fire.

use std::collections::BTreeMap;

use maplit::btreemap;
use serde_json::{json, Value as JsonValue};

use super::{eval_expr, evaluate, parse, try_evaluate, EvalContext, Expr, Predicate};
use crate::session::ResponseSet;

/// Context over known questions `color` (id q_color) and `toppings`
/// (id q_toppings), plus one embedded value.
struct Fixture {
    responses: ResponseSet,
    embedded: BTreeMap<String, JsonValue>,
    variables: BTreeMap<String, String>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            responses: ResponseSet::new(),
            embedded: btreemap! {
                "channel".to_string() => json!("email"),
            },
            variables: btreemap! {
                "color".to_string() => "q_color".to_string(),
                "toppings".to_string() => "q_toppings".to_string(),
                "age".to_string() => "q_age".to_string(),
            },
        }
    }

    fn answer(mut self, key: &str, value: JsonValue) -> Self {
        self.responses.insert(key.to_string(), value);
        self
    }

    fn ctx(&self) -> EvalContext<'_> {
        EvalContext {
            responses: &self.responses,
            embedded: &self.embedded,
            variables: &self.variables,
        }
    }
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn parses_equals_predicate() {
    let expr = parse("equals(answer(color), blue)").unwrap();
    assert_eq!(
        expr,
        Expr::Single {
            pred: Predicate::Equals {
                reference: "color".to_string(),
                value: "blue".to_string(),
            }
        }
    );
}

#[test]
fn parses_quoted_values() {
    let expr = parse("equals(answer(color), \"navy blue\")").unwrap();
    assert_eq!(
        expr,
        Expr::Single {
            pred: Predicate::Equals {
                reference: "color".to_string(),
                value: "navy blue".to_string(),
            }
        }
    );
}

#[test]
fn parses_selection_predicate_with_array() {
    let expr = parse("anySelected(toppings, [cheese, olives])").unwrap();
    assert_eq!(
        expr,
        Expr::Single {
            pred: Predicate::AnySelected {
                reference: "toppings".to_string(),
                values: vec!["cheese".to_string(), "olives".to_string()],
            }
        }
    );
}

#[test]
fn parses_flat_conjunction() {
    let expr = parse("equals(answer(color), blue) && notEmpty(answer(toppings))").unwrap();
    match expr {
        Expr::All { parts } => assert_eq!(parts.len(), 2),
        other => panic!("expected All, got {other:?}"),
    }
}

#[test]
fn parses_flat_disjunction() {
    let expr = parse("equals(answer(color), blue) || equals(answer(color), red)").unwrap();
    match expr {
        Expr::Any { parts } => assert_eq!(parts.len(), 2),
        other => panic!("expected Any, got {other:?}"),
    }
}

#[test]
fn conjunction_wins_over_disjunction() {
    // Mixed separators split on && first; the || residue stays inside one
    // part and fails predicate parsing. Flat split, no precedence.
    let result = parse("isEmpty(answer(a)) && isEmpty(answer(b)) || isEmpty(answer(c))");
    assert!(result.is_err());
}

#[test]
fn parses_leading_negation() {
    let expr = parse("!( equals(answer(color), blue) )").unwrap();
    match expr {
        Expr::Not { inner } => assert!(matches!(*inner, Expr::Single { .. })),
        other => panic!("expected Not, got {other:?}"),
    }
}

#[test]
fn rejects_unknown_predicate() {
    assert!(parse("matches(answer(color), blue)").is_err());
}

#[test]
fn rejects_wrong_arity() {
    assert!(parse("equals(answer(color))").is_err());
    assert!(parse("isEmpty(answer(color), blue)").is_err());
}

#[test]
fn rejects_non_numeric_comparison() {
    assert!(parse("greaterThan(answer(age), old)").is_err());
}

// ============================================================================
// Scalar Predicates
// ============================================================================

#[test]
fn equals_matches_string_answer() {
    let fx = Fixture::new().answer("q_color", json!("blue"));
    assert!(evaluate("equals(answer(color), blue)", &fx.ctx()));
    assert!(!evaluate("equals(answer(color), red)", &fx.ctx()));
}

#[test]
fn equals_treats_single_element_array_as_scalar() {
    let fx = Fixture::new().answer("q_color", json!(["blue"]));
    assert!(evaluate("equals(answer(color), blue)", &fx.ctx()));
}

#[test]
fn equals_is_numeric_aware() {
    let fx = Fixture::new().answer("q_age", json!(30));
    assert!(evaluate("equals(answer(age), 30)", &fx.ctx()));
    let fx = Fixture::new().answer("q_age", json!("30"));
    assert!(evaluate("equals(answer(age), 30.0)", &fx.ctx()));
}

#[test]
fn not_equals_is_true_when_unanswered() {
    let fx = Fixture::new();
    assert!(evaluate("notEquals(answer(color), blue)", &fx.ctx()));
    assert!(!evaluate("equals(answer(color), blue)", &fx.ctx()));
}

#[test]
fn contains_and_starts_with() {
    let fx = Fixture::new().answer("q_color", json!("navy blue"));
    assert!(evaluate("contains(answer(color), blue)", &fx.ctx()));
    assert!(evaluate("startsWith(answer(color), navy)", &fx.ctx()));
    assert!(!evaluate("startsWith(answer(color), blue)", &fx.ctx()));
}

#[test]
fn numeric_comparisons() {
    let fx = Fixture::new().answer("q_age", json!(42));
    assert!(evaluate("greaterThan(answer(age), 18)", &fx.ctx()));
    assert!(!evaluate("lessThan(answer(age), 18)", &fx.ctx()));
    // Known but unanswered comparisons are false, not fail-open.
    let empty = Fixture::new();
    assert!(!evaluate("greaterThan(answer(age), 18)", &empty.ctx()));
}

#[test]
fn empties() {
    let fx = Fixture::new().answer("q_color", json!(""));
    assert!(evaluate("isEmpty(answer(color))", &fx.ctx()));
    let fx = Fixture::new().answer("q_color", json!("blue"));
    assert!(evaluate("notEmpty(answer(color))", &fx.ctx()));
    // Unanswered is empty.
    let empty = Fixture::new();
    assert!(evaluate("isEmpty(answer(color))", &empty.ctx()));
}

// ============================================================================
// Selection Predicates
// ============================================================================

#[test]
fn any_selected_intersects() {
    let fx = Fixture::new().answer("q_toppings", json!(["cheese", "ham"]));
    assert!(evaluate("anySelected(toppings, [cheese, olives])", &fx.ctx()));
    assert!(!evaluate("anySelected(toppings, [olives, pineapple])", &fx.ctx()));
}

#[test]
fn any_selected_is_false_for_unanswered() {
    let fx = Fixture::new();
    let expr = parse("anySelected(toppings, [cheese, olives])").unwrap();
    assert_eq!(eval_expr(&expr, &fx.ctx()), Some(false));
}

#[test]
fn all_selected_requires_every_value() {
    let fx = Fixture::new().answer("q_toppings", json!(["cheese", "ham", "olives"]));
    assert!(evaluate("allSelected(toppings, [cheese, olives])", &fx.ctx()));
    assert!(!evaluate("allSelected(toppings, [cheese, pineapple])", &fx.ctx()));
}

#[test]
fn none_selected_excludes() {
    let fx = Fixture::new().answer("q_toppings", json!(["cheese"]));
    assert!(evaluate("noneSelected(toppings, [olives, pineapple])", &fx.ctx()));
    assert!(!evaluate("noneSelected(toppings, [cheese])", &fx.ctx()));
    // Vacuously true when unanswered.
    let empty = Fixture::new();
    assert!(evaluate("noneSelected(toppings, [cheese])", &empty.ctx()));
}

#[test]
fn scalar_answer_acts_as_single_selection() {
    let fx = Fixture::new().answer("q_toppings", json!("cheese"));
    assert!(evaluate("anySelected(toppings, [cheese])", &fx.ctx()));
}

// ============================================================================
// Composition
// ============================================================================

#[test]
fn conjunction_requires_all_parts() {
    let fx = Fixture::new()
        .answer("q_color", json!("blue"))
        .answer("q_toppings", json!(["cheese"]));
    assert!(evaluate(
        "equals(answer(color), blue) && anySelected(toppings, [cheese])",
        &fx.ctx()
    ));
    assert!(!evaluate(
        "equals(answer(color), red) && anySelected(toppings, [cheese])",
        &fx.ctx()
    ));
}

#[test]
fn disjunction_needs_one_part() {
    let fx = Fixture::new().answer("q_color", json!("red"));
    assert!(evaluate(
        "equals(answer(color), blue) || equals(answer(color), red)",
        &fx.ctx()
    ));
}

#[test]
fn negation_inverts() {
    let fx = Fixture::new().answer("q_color", json!("blue"));
    assert!(!evaluate("!( equals(answer(color), blue) )", &fx.ctx()));
    assert!(evaluate("!( equals(answer(color), red) )", &fx.ctx()));
}

// ============================================================================
// Fail-open
// ============================================================================

#[test]
fn empty_expression_is_true() {
    let fx = Fixture::new();
    assert!(evaluate("", &fx.ctx()));
    assert!(evaluate("   ", &fx.ctx()));
}

#[test]
fn unknown_reference_fails_open() {
    let fx = Fixture::new();
    assert!(evaluate("equals(answer(no_such_question), blue)", &fx.ctx()));
    // Even inside a conjunction whose other part is false.
    let fx = Fixture::new().answer("q_color", json!("red"));
    assert!(evaluate(
        "equals(answer(color), blue) && equals(answer(ghost), x)",
        &fx.ctx()
    ));
}

#[test]
fn malformed_expression_fails_open() {
    let fx = Fixture::new();
    assert!(evaluate("equals(answer(color), ", &fx.ctx()));
    assert!(evaluate("this is not a predicate", &fx.ctx()));
    assert!(evaluate("matches(answer(color), blue)", &fx.ctx()));
}

#[test]
fn negated_failure_still_fails_open() {
    // Fail-open dominates negation: a broken inner expression must not
    // become `false` through the Not.
    let fx = Fixture::new();
    assert!(evaluate("!( equals(answer(ghost), blue) )", &fx.ctx()));
}

#[test]
fn try_evaluate_reports_indeterminate() {
    let fx = Fixture::new();
    assert_eq!(try_evaluate("equals(answer(ghost), blue)", &fx.ctx()), None);
    assert_eq!(try_evaluate("garbage(((", &fx.ctx()), None);
    assert_eq!(try_evaluate("", &fx.ctx()), None);
    let fx = Fixture::new().answer("q_color", json!("blue"));
    assert_eq!(
        try_evaluate("equals(answer(color), blue)", &fx.ctx()),
        Some(true)
    );
}

// ============================================================================
// Reference Resolution
// ============================================================================

#[test]
fn direct_key_lookup_falls_back() {
    // No question named q_color exists in the variable map, but the
    // response set carries the key directly.
    let fx = Fixture::new().answer("q_color", json!("blue"));
    assert!(evaluate("equals(answer(q_color), blue)", &fx.ctx()));
}

#[test]
fn embedded_data_is_readable() {
    let fx = Fixture::new();
    assert!(evaluate("equals(answer(channel), email)", &fx.ctx()));
}
