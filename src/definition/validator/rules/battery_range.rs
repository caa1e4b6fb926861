//! Rule: Battery Range
//!
//! A loop battery's start page must come strictly before its end page,
//! both boundary pages must exist, and no two batteries may cover
//! overlapping page ranges. The navigator relies on the no-overlap
//! invariant to treat "which battery owns this page" as a pure function.

use super::super::{ValidationIssue, ValidationRule};
use crate::definition::SurveyDefinition;

pub struct BatteryRangeRule;

impl ValidationRule for BatteryRangeRule {
    fn id(&self) -> &'static str {
        "battery-range"
    }

    fn description(&self) -> &'static str {
        "Loop battery page ranges must be ordered and disjoint"
    }

    fn validate(&self, definition: &SurveyDefinition) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        let mut ranges: Vec<(&str, i32, i32)> = Vec::new();

        for battery in &definition.batteries {
            let start = definition.page(&battery.start_page);
            let end = definition.page(&battery.end_page);

            match (start, end) {
                (None, _) => {
                    issues.push(ValidationIssue::error(
                        &battery.id,
                        format!("start page '{}' does not exist", battery.start_page),
                        self.id(),
                    ));
                }
                (_, None) => {
                    issues.push(ValidationIssue::error(
                        &battery.id,
                        format!("end page '{}' does not exist", battery.end_page),
                        self.id(),
                    ));
                }
                (Some(start), Some(end)) => {
                    if start.index >= end.index {
                        issues.push(ValidationIssue::error(
                            &battery.id,
                            format!(
                                "start page '{}' (index {}) must come before end page '{}' (index {})",
                                start.id, start.index, end.id, end.index
                            ),
                            self.id(),
                        ));
                    } else {
                        ranges.push((&battery.id, start.index, end.index));
                    }
                }
            }
        }

        // Pairwise overlap check over the well-formed ranges.
        for (i, (id_a, start_a, end_a)) in ranges.iter().enumerate() {
            for (id_b, start_b, end_b) in ranges.iter().skip(i + 1) {
                if start_a <= end_b && start_b <= end_a {
                    issues.push(ValidationIssue::error(
                        *id_a,
                        format!("page range overlaps battery '{id_b}'"),
                        self.id(),
                    ));
                }
            }
        }

        issues
    }
}
