//! Rule: Expression Syntax
//!
//! Every visibility expression and jump condition should parse. The
//! runtime fails open on malformed DSL (visible, no jump), so these are
//! warnings: the survey still runs, just not the way the author wrote it.

use super::super::{ValidationIssue, ValidationRule};
use crate::definition::SurveyDefinition;
use crate::expr;

pub struct ExpressionSyntaxRule;

impl ExpressionSyntaxRule {
    fn check(
        &self,
        entity: &str,
        what: &str,
        dsl: &Option<String>,
        issues: &mut Vec<ValidationIssue>,
    ) {
        let Some(dsl) = dsl else { return };
        if dsl.trim().is_empty() {
            return;
        }
        if let Err(err) = expr::parse(dsl) {
            issues.push(ValidationIssue::warning(
                entity,
                format!("{what} does not parse and will evaluate fail-open: {err}"),
                self.id(),
            ));
        }
    }
}

impl ValidationRule for ExpressionSyntaxRule {
    fn id(&self) -> &'static str {
        "expression-syntax"
    }

    fn description(&self) -> &'static str {
        "Visibility expressions and jump conditions should parse"
    }

    fn validate(&self, definition: &SurveyDefinition) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for page in definition.pages() {
            self.check(&page.id, "page visibility", &page.visibility_expr, &mut issues);

            for question in &page.questions {
                self.check(
                    &question.id,
                    "question visibility",
                    &question.visibility_expr,
                    &mut issues,
                );
                for group in &question.groups {
                    self.check(
                        &question.id,
                        "option group visibility",
                        &group.visibility_expr,
                        &mut issues,
                    );
                }
                for option in &question.options {
                    self.check(
                        &option.id,
                        "option visibility",
                        &option.visibility_expr,
                        &mut issues,
                    );
                }
            }
        }

        for rule in &definition.jump_rules {
            self.check(&rule.id, "jump condition", &rule.condition, &mut issues);
        }

        issues
    }
}
