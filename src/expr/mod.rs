//! The survey expression DSL.
//!
//! A deliberately small predicate language: a fixed set of function-call
//! predicate forms, combined by a *flat* split on ` && ` or ` || `, with
//! a single optional leading `!( ... )` negation. There is no operator
//! precedence and no nested grouping; authors who need more write
//! multiple expressions.
//!
//! # Fail-open
//!
//! Any expression that is empty, references a question that does not
//! exist, or fails to parse evaluates to `true` for visibility purposes.
//! An authoring mistake must never hide content or strand a respondent.
//! Jump conditions invert the default: a broken condition never fires a
//! jump. Both surfaces log the failure for the survey author.

mod eval;
mod parser;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use eval::{eval_expr, EvalContext};
pub use parser::{parse, ExprError};

/// A single predicate call, the leaf of every expression.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Predicate {
    Equals { reference: String, value: String },
    NotEquals { reference: String, value: String },
    AnySelected { reference: String, values: Vec<String> },
    AllSelected { reference: String, values: Vec<String> },
    NoneSelected { reference: String, values: Vec<String> },
    Contains { reference: String, value: String },
    StartsWith { reference: String, value: String },
    GreaterThan { reference: String, value: f64 },
    LessThan { reference: String, value: f64 },
    IsEmpty { reference: String },
    NotEmpty { reference: String },
}

/// A whole expression: one predicate, a flat conjunction or disjunction
/// of predicates, or a negation of the entire rest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expr {
    Single { pred: Predicate },
    All { parts: Vec<Predicate> },
    Any { parts: Vec<Predicate> },
    Not { inner: Box<Expr> },
}

/// Evaluate an expression with the fail-open default: `true` on empty
/// input, parse failure, or an unresolvable question reference.
///
/// This is the visibility-facing entry point.
pub fn evaluate(dsl: &str, ctx: &EvalContext) -> bool {
    if dsl.trim().is_empty() {
        return true;
    }
    match parse(dsl) {
        Ok(expr) => match eval_expr(&expr, ctx) {
            Some(verdict) => verdict,
            None => {
                warn!(expression = dsl, "expression references no known question, failing open");
                true
            }
        },
        Err(err) => {
            warn!(expression = dsl, error = %err, "expression failed to parse, failing open");
            true
        }
    }
}

/// Evaluate an expression without a default: `None` on empty input, parse
/// failure, or an unresolvable reference.
///
/// Jump conditions use this and treat `None` as "rule does not fire";
/// the safe default there is the opposite of visibility's.
pub fn try_evaluate(dsl: &str, ctx: &EvalContext) -> Option<bool> {
    if dsl.trim().is_empty() {
        return None;
    }
    match parse(dsl) {
        Ok(expr) => eval_expr(&expr, ctx),
        Err(err) => {
            warn!(expression = dsl, error = %err, "expression failed to parse");
            None
        }
    }
}
