//! Conditional jump resolution.
//!
//! Rules are evaluated in ascending priority order (lower number first,
//! regardless of authored order); the first rule whose condition holds
//! decides the destination. A rule without a condition always fires. A
//! condition that fails to parse or references nothing known never
//! fires: the safe default for flow redirection is "stay on course", the
//! opposite of visibility's fail-open.

use tracing::warn;

use crate::definition::JumpRule;
use crate::expr::{self, EvalContext};
use crate::types::JumpDestination;

/// Resolve the jump for a just-answered question. Returns the destination
/// of the first matching rule, or `None` for ordinary sequential flow.
pub fn resolve_jump<'a>(rules: &[&'a JumpRule], ctx: &EvalContext) -> Option<&'a JumpDestination> {
    let mut ordered: Vec<&JumpRule> = rules.to_vec();
    ordered.sort_by_key(|rule| rule.priority);

    for rule in ordered {
        let fires = match &rule.condition {
            None => true,
            Some(dsl) => match expr::try_evaluate(dsl, ctx) {
                Some(verdict) => verdict,
                None => {
                    warn!(
                        rule = %rule.id,
                        condition = %dsl,
                        "jump condition is indeterminate, rule skipped"
                    );
                    false
                }
            },
        };
        if fires {
            return Some(&rule.destination);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;
    use crate::session::ResponseSet;

    fn rule(id: &str, priority: i32, condition: Option<&str>, dest: JumpDestination) -> JumpRule {
        JumpRule {
            id: id.to_string(),
            from_question_id: "q1".to_string(),
            destination: dest,
            condition: condition.map(String::from),
            priority,
        }
    }

    fn ctx<'a>(
        responses: &'a ResponseSet,
        embedded: &'a BTreeMap<String, serde_json::Value>,
        variables: &'a BTreeMap<String, String>,
    ) -> EvalContext<'a> {
        EvalContext {
            responses,
            embedded,
            variables,
        }
    }

    #[test]
    fn lowest_priority_number_wins_over_list_order() {
        let responses = ResponseSet::new();
        let embedded = BTreeMap::new();
        let variables = BTreeMap::new();

        let second = rule("r2", 2, None, JumpDestination::Page { id: "p2".into() });
        let first = rule("r1", 1, None, JumpDestination::Page { id: "p1".into() });
        let rules = vec![&second, &first];

        let dest = resolve_jump(&rules, &ctx(&responses, &embedded, &variables));
        assert_eq!(dest, Some(&JumpDestination::Page { id: "p1".into() }));
    }

    #[test]
    fn condition_filters_rules() {
        let mut responses = ResponseSet::new();
        responses.insert("q_color".to_string(), json!("red"));
        let embedded = BTreeMap::new();
        let mut variables = BTreeMap::new();
        variables.insert("color".to_string(), "q_color".to_string());

        let blue = rule(
            "r1",
            1,
            Some("equals(answer(color), blue)"),
            JumpDestination::End,
        );
        let red = rule(
            "r2",
            2,
            Some("equals(answer(color), red)"),
            JumpDestination::Page { id: "p9".into() },
        );
        let rules = vec![&blue, &red];

        let dest = resolve_jump(&rules, &ctx(&responses, &embedded, &variables));
        assert_eq!(dest, Some(&JumpDestination::Page { id: "p9".into() }));
    }

    #[test]
    fn no_match_means_no_jump() {
        let responses = ResponseSet::new();
        let embedded = BTreeMap::new();
        let mut variables = BTreeMap::new();
        variables.insert("color".to_string(), "q_color".to_string());

        let blue = rule(
            "r1",
            1,
            Some("equals(answer(color), blue)"),
            JumpDestination::End,
        );
        let rules = vec![&blue];

        assert_eq!(resolve_jump(&rules, &ctx(&responses, &embedded, &variables)), None);
    }

    #[test]
    fn broken_condition_never_fires() {
        let responses = ResponseSet::new();
        let embedded = BTreeMap::new();
        let variables = BTreeMap::new();

        // Malformed DSL and an unknown reference: both indeterminate, both
        // skipped rather than fired.
        let broken = rule("r1", 1, Some("equals(answer("), JumpDestination::End);
        let ghost = rule(
            "r2",
            2,
            Some("equals(answer(ghost), x)"),
            JumpDestination::End,
        );
        let fallback = rule("r3", 3, None, JumpDestination::Page { id: "p3".into() });
        let rules = vec![&broken, &ghost, &fallback];

        let dest = resolve_jump(&rules, &ctx(&responses, &embedded, &variables));
        assert_eq!(dest, Some(&JumpDestination::Page { id: "p3".into() }));
    }
}
