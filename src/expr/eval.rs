//! Evaluation of parsed expressions against a response context.
//!
//! The distinction that matters here: a reference that matches *no*
//! question and no direct response/embedded key is unresolvable and makes
//! the whole expression indeterminate (`None`, which the public wrappers
//! turn into the fail-open default). A reference to a *known* question
//! that simply has no answer yet evaluates by predicate semantics:
//! `isEmpty` is true, `anySelected` is false, `equals` is false.

use std::collections::BTreeMap;
use std::collections::HashSet;

use serde_json::Value as JsonValue;

use super::{Expr, Predicate};
use crate::session::ResponseSet;

/// Everything an expression can read.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    /// Question id -> submitted value(s).
    pub responses: &'a ResponseSet,
    /// Author-provided embedded data.
    pub embedded: &'a BTreeMap<String, JsonValue>,
    /// Question variable name -> canonical response key.
    pub variables: &'a BTreeMap<String, String>,
}

enum Resolution<'a> {
    Answered(&'a JsonValue),
    Unanswered,
    UnknownReference,
}

impl<'a> EvalContext<'a> {
    fn resolve(&self, reference: &str) -> Resolution<'a> {
        if let Some(key) = self.variables.get(reference) {
            return match self.responses.get(key) {
                Some(value) => Resolution::Answered(value),
                None => Resolution::Unanswered,
            };
        }
        // No such question: fall back to a direct key lookup.
        if let Some(value) = self.responses.get(reference) {
            return Resolution::Answered(value);
        }
        if let Some(value) = self.embedded.get(reference) {
            return Resolution::Answered(value);
        }
        Resolution::UnknownReference
    }
}

/// Evaluate an AST. `None` means the expression referenced something that
/// does not exist; callers apply their fail-open/fail-closed default.
pub fn eval_expr(expr: &Expr, ctx: &EvalContext) -> Option<bool> {
    match expr {
        Expr::Single { pred } => eval_pred(pred, ctx),
        Expr::All { parts } => {
            let mut verdict = true;
            for part in parts {
                verdict &= eval_pred(part, ctx)?;
            }
            Some(verdict)
        }
        Expr::Any { parts } => {
            let mut verdict = false;
            for part in parts {
                verdict |= eval_pred(part, ctx)?;
            }
            Some(verdict)
        }
        Expr::Not { inner } => eval_expr(inner, ctx).map(|v| !v),
    }
}

fn eval_pred(pred: &Predicate, ctx: &EvalContext) -> Option<bool> {
    use Resolution::*;

    let verdict = match pred {
        Predicate::Equals { reference, value } => match ctx.resolve(reference) {
            Answered(v) => scalar_eq(v, value),
            Unanswered => false,
            UnknownReference => return None,
        },
        Predicate::NotEquals { reference, value } => match ctx.resolve(reference) {
            Answered(v) => !scalar_eq(v, value),
            Unanswered => true,
            UnknownReference => return None,
        },
        Predicate::AnySelected { reference, values } => match ctx.resolve(reference) {
            Answered(v) => {
                let selected = selected_set(v);
                values.iter().any(|candidate| selected.contains(candidate.as_str()))
            }
            Unanswered => false,
            UnknownReference => return None,
        },
        Predicate::AllSelected { reference, values } => match ctx.resolve(reference) {
            Answered(v) => {
                let selected = selected_set(v);
                !values.is_empty()
                    && values.iter().all(|candidate| selected.contains(candidate.as_str()))
            }
            Unanswered => false,
            UnknownReference => return None,
        },
        Predicate::NoneSelected { reference, values } => match ctx.resolve(reference) {
            Answered(v) => {
                let selected = selected_set(v);
                !values.iter().any(|candidate| selected.contains(candidate.as_str()))
            }
            Unanswered => true,
            UnknownReference => return None,
        },
        Predicate::Contains { reference, value } => match ctx.resolve(reference) {
            Answered(v) => scalar_text(v).is_some_and(|text| text.contains(value.as_str())),
            Unanswered => false,
            UnknownReference => return None,
        },
        Predicate::StartsWith { reference, value } => match ctx.resolve(reference) {
            Answered(v) => scalar_text(v).is_some_and(|text| text.starts_with(value.as_str())),
            Unanswered => false,
            UnknownReference => return None,
        },
        Predicate::GreaterThan { reference, value } => match ctx.resolve(reference) {
            Answered(v) => scalar_number(v).is_some_and(|n| n > *value),
            Unanswered => false,
            UnknownReference => return None,
        },
        Predicate::LessThan { reference, value } => match ctx.resolve(reference) {
            Answered(v) => scalar_number(v).is_some_and(|n| n < *value),
            Unanswered => false,
            UnknownReference => return None,
        },
        Predicate::IsEmpty { reference } => match ctx.resolve(reference) {
            Answered(v) => is_empty_value(v),
            Unanswered => true,
            UnknownReference => return None,
        },
        Predicate::NotEmpty { reference } => match ctx.resolve(reference) {
            Answered(v) => !is_empty_value(v),
            Unanswered => false,
            UnknownReference => return None,
        },
    };

    Some(verdict)
}

/* ===================== Value Coercion ===================== */

/// A single-element array is its scalar; anything else passes through.
fn unwrap_single(value: &JsonValue) -> &JsonValue {
    match value.as_array() {
        Some(items) if items.len() == 1 => &items[0],
        _ => value,
    }
}

/// Scalar equality against a string literal, numeric-aware: `5`, `5.0`
/// and `"5"` all equal the literal `5`.
fn scalar_eq(value: &JsonValue, literal: &str) -> bool {
    match unwrap_single(value) {
        JsonValue::String(s) => {
            s == literal
                || matches!(
                    (s.parse::<f64>(), literal.parse::<f64>()),
                    (Ok(a), Ok(b)) if a == b
                )
        }
        JsonValue::Number(n) => {
            literal.parse::<f64>().is_ok_and(|parsed| n.as_f64() == Some(parsed))
        }
        JsonValue::Bool(b) => literal.eq_ignore_ascii_case(if *b { "true" } else { "false" }),
        _ => false,
    }
}

/// String form of a scalar answer, for substring predicates.
fn scalar_text(value: &JsonValue) -> Option<String> {
    match unwrap_single(value) {
        JsonValue::String(s) => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        JsonValue::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn scalar_number(value: &JsonValue) -> Option<f64> {
    match unwrap_single(value) {
        JsonValue::Number(n) => n.as_f64(),
        JsonValue::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Set view of a response for the selection predicates.
fn selected_set(value: &JsonValue) -> HashSet<String> {
    match value {
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|item| scalar_text(item))
            .collect(),
        JsonValue::Null => HashSet::new(),
        scalar => scalar_text(scalar).into_iter().collect(),
    }
}

fn is_empty_value(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => true,
        JsonValue::String(s) => s.is_empty(),
        JsonValue::Array(items) => items.is_empty(),
        JsonValue::Object(map) => map.is_empty(),
        _ => false,
    }
}
