//! Rule: Dangling Jump
//!
//! Jump rules must originate from an existing question and point at an
//! existing question or page. A dangling destination resolves to "no
//! jump" at runtime.

use super::super::{ValidationIssue, ValidationRule};
use crate::definition::SurveyDefinition;
use crate::types::JumpDestination;

pub struct DanglingJumpRule;

impl ValidationRule for DanglingJumpRule {
    fn id(&self) -> &'static str {
        "dangling-jump"
    }

    fn description(&self) -> &'static str {
        "Jump sources and destinations must exist"
    }

    fn validate(&self, definition: &SurveyDefinition) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for rule in &definition.jump_rules {
            if definition.question(&rule.from_question_id).is_none() {
                issues.push(ValidationIssue::error(
                    &rule.id,
                    format!("source question '{}' does not exist", rule.from_question_id),
                    self.id(),
                ));
            }

            match &rule.destination {
                JumpDestination::Question { id } => {
                    if definition.question(id).is_none() {
                        issues.push(ValidationIssue::error(
                            &rule.id,
                            format!("destination question '{id}' does not exist"),
                            self.id(),
                        ));
                    }
                }
                JumpDestination::Page { id } => {
                    if definition.page(id).is_none() {
                        issues.push(ValidationIssue::error(
                            &rule.id,
                            format!("destination page '{id}' does not exist"),
                            self.id(),
                        ));
                    }
                }
                JumpDestination::End => {}
            }
        }

        issues
    }
}
