//! Rule: Answer Source
//!
//! A battery sourced from answers must point at an existing multi-select
//! question. Anything else yields zero iterations at runtime, which is
//! almost never what the author meant.

use super::super::{ValidationIssue, ValidationRule};
use crate::definition::SurveyDefinition;
use crate::types::LoopSource;

pub struct AnswerSourceRule;

impl ValidationRule for AnswerSourceRule {
    fn id(&self) -> &'static str {
        "answer-source"
    }

    fn description(&self) -> &'static str {
        "Answer-sourced batteries need an existing multi-select source question"
    }

    fn validate(&self, definition: &SurveyDefinition) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for battery in &definition.batteries {
            let LoopSource::Answer { question_id } = &battery.source else {
                continue;
            };

            match definition.question(question_id) {
                None => {
                    issues.push(ValidationIssue::error(
                        &battery.id,
                        format!("source question '{question_id}' does not exist"),
                        self.id(),
                    ));
                }
                Some((_, question)) if !question.question_type.is_multi_select() => {
                    issues.push(ValidationIssue::error(
                        &battery.id,
                        format!(
                            "source question '{question_id}' is not multi-select ({:?})",
                            question.question_type
                        ),
                        self.id(),
                    ));
                }
                Some(_) => {}
            }
        }

        issues
    }
}
