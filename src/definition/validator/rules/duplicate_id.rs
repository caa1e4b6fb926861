//! Rule: Duplicate Id
//!
//! Page ids, question ids, question variable names, and per-battery item
//! keys must be unique. The expression DSL resolves references by
//! variable name; a duplicate silently shadows its sibling.

use std::collections::HashSet;

use super::super::{ValidationIssue, ValidationRule};
use crate::definition::SurveyDefinition;

pub struct DuplicateIdRule;

fn note_duplicate<'a>(
    seen: &mut HashSet<&'a str>,
    value: &'a str,
    entity: &str,
    what: &str,
    rule_id: &'static str,
    issues: &mut Vec<ValidationIssue>,
) {
    if !seen.insert(value) {
        issues.push(ValidationIssue::error(
            entity,
            format!("duplicate {what} '{value}'"),
            rule_id,
        ));
    }
}

impl ValidationRule for DuplicateIdRule {
    fn id(&self) -> &'static str {
        "duplicate-id"
    }

    fn description(&self) -> &'static str {
        "Ids, variable names, and dataset keys must be unique"
    }

    fn validate(&self, definition: &SurveyDefinition) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let mut page_ids = HashSet::new();
        let mut question_ids = HashSet::new();
        let mut variables = HashSet::new();

        for page in definition.pages() {
            note_duplicate(&mut page_ids, &page.id, &page.id, "page id", self.id(), &mut issues);

            for question in &page.questions {
                note_duplicate(
                    &mut question_ids,
                    &question.id,
                    &question.id,
                    "question id",
                    self.id(),
                    &mut issues,
                );
                note_duplicate(
                    &mut variables,
                    &question.variable,
                    &question.id,
                    "variable name",
                    self.id(),
                    &mut issues,
                );
            }
        }

        for battery in &definition.batteries {
            let mut keys = HashSet::new();
            for item in &battery.items {
                note_duplicate(
                    &mut keys,
                    &item.key,
                    &battery.id,
                    "dataset item key",
                    self.id(),
                    &mut issues,
                );
            }
        }

        issues
    }
}
