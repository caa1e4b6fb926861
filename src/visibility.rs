//! Visibility resolution.
//!
//! One contract for every display entity: no expression means visible,
//! otherwise the expression decides, fail-open. Nothing is cached; the
//! response context changes between calls, so every call re-evaluates.

use crate::definition::{OptionGroup, Page, Question, QuestionOption};
use crate::expr::{self, EvalContext};

/// Display entities that can carry a visibility expression.
pub trait Visibility {
    fn visibility_expr(&self) -> Option<&str>;
}

impl Visibility for Page {
    fn visibility_expr(&self) -> Option<&str> {
        self.visibility_expr.as_deref()
    }
}

impl Visibility for Question {
    fn visibility_expr(&self) -> Option<&str> {
        self.visibility_expr.as_deref()
    }
}

impl Visibility for OptionGroup {
    fn visibility_expr(&self) -> Option<&str> {
        self.visibility_expr.as_deref()
    }
}

impl Visibility for QuestionOption {
    fn visibility_expr(&self) -> Option<&str> {
        self.visibility_expr.as_deref()
    }
}

/// Whether an entity is currently shown.
pub fn is_visible<T: Visibility>(entity: &T, ctx: &EvalContext) -> bool {
    match entity.visibility_expr() {
        None => true,
        Some(dsl) => expr::evaluate(dsl, ctx),
    }
}
