use serde_json::json;

use super::{validate_definition, Severity};
use crate::definition::SurveyDefinition;

fn definition(value: serde_json::Value) -> SurveyDefinition {
    SurveyDefinition::from_value(value).unwrap()
}

fn rule_ids(issues: &[super::ValidationIssue]) -> Vec<&'static str> {
    issues.iter().map(|issue| issue.rule_id).collect()
}

#[test]
fn clean_definition_has_no_issues() {
    let def = definition(json!({
        "name": "clean",
        "pages": [
            { "id": "p1", "index": 0, "questions": [{
                "id": "q1", "variable": "v1", "type": "multi_choice", "prompt": "?",
                "options": [{ "id": "o1", "value": "a", "label": "A" }]
            }]},
            { "id": "p2", "index": 1, "questions": [] },
            { "id": "p3", "index": 2, "questions": [] }
        ],
        "batteries": [{
            "id": "b1", "name": "loop", "start_page": "p2", "end_page": "p3",
            "source": "answer", "question_id": "q1"
        }],
        "jump_rules": [{
            "id": "r1", "from_question_id": "q1",
            "destination": { "type": "page", "id": "p3" },
            "condition": "anySelected(v1, [a])"
        }]
    }));

    assert!(validate_definition(&def).is_empty());
}

#[test]
fn inverted_battery_range_is_an_error() {
    let def = definition(json!({
        "name": "inverted",
        "pages": [
            { "id": "p1", "index": 0, "questions": [] },
            { "id": "p2", "index": 1, "questions": [] }
        ],
        "batteries": [{
            "id": "b1", "name": "loop", "start_page": "p2", "end_page": "p1",
            "source": "dataset"
        }]
    }));

    let issues = validate_definition(&def);
    assert!(rule_ids(&issues).contains(&"battery-range"));
    assert!(issues.iter().any(|issue| issue.is_error()));
}

#[test]
fn overlapping_batteries_are_an_error() {
    let def = definition(json!({
        "name": "overlap",
        "pages": [
            { "id": "p1", "index": 0, "questions": [] },
            { "id": "p2", "index": 1, "questions": [] },
            { "id": "p3", "index": 2, "questions": [] },
            { "id": "p4", "index": 3, "questions": [] }
        ],
        "batteries": [
            { "id": "b1", "name": "a", "start_page": "p1", "end_page": "p3", "source": "dataset" },
            { "id": "b2", "name": "b", "start_page": "p2", "end_page": "p4", "source": "dataset" }
        ]
    }));

    let issues = validate_definition(&def);
    assert!(issues
        .iter()
        .any(|issue| issue.rule_id == "battery-range" && issue.message.contains("overlaps")));
}

#[test]
fn answer_battery_needs_a_multi_select_source() {
    let def = definition(json!({
        "name": "wrong-source",
        "pages": [
            { "id": "p1", "index": 0, "questions": [{
                "id": "q1", "variable": "v1", "type": "text", "prompt": "?"
            }]},
            { "id": "p2", "index": 1, "questions": [] },
            { "id": "p3", "index": 2, "questions": [] }
        ],
        "batteries": [{
            "id": "b1", "name": "loop", "start_page": "p2", "end_page": "p3",
            "source": "answer", "question_id": "q1"
        }]
    }));

    let issues = validate_definition(&def);
    assert!(rule_ids(&issues).contains(&"answer-source"));
}

#[test]
fn missing_answer_source_question_is_an_error() {
    let def = definition(json!({
        "name": "ghost-source",
        "pages": [
            { "id": "p1", "index": 0, "questions": [] },
            { "id": "p2", "index": 1, "questions": [] }
        ],
        "batteries": [{
            "id": "b1", "name": "loop", "start_page": "p1", "end_page": "p2",
            "source": "answer", "question_id": "q_ghost"
        }]
    }));

    let issues = validate_definition(&def);
    assert!(rule_ids(&issues).contains(&"answer-source"));
}

#[test]
fn dangling_jump_destinations_are_errors() {
    let def = definition(json!({
        "name": "dangling",
        "pages": [
            { "id": "p1", "index": 0, "questions": [{
                "id": "q1", "variable": "v1", "type": "text", "prompt": "?"
            }]}
        ],
        "jump_rules": [
            { "id": "r1", "from_question_id": "q1", "destination": { "type": "page", "id": "ghost" } },
            { "id": "r2", "from_question_id": "q1", "destination": { "type": "question", "id": "ghost" } },
            { "id": "r3", "from_question_id": "ghost", "destination": { "type": "end" } }
        ]
    }));

    let issues = validate_definition(&def);
    let dangling = issues
        .iter()
        .filter(|issue| issue.rule_id == "dangling-jump")
        .count();
    assert_eq!(dangling, 3);
}

#[test]
fn malformed_expressions_are_warnings_not_errors() {
    let def = definition(json!({
        "name": "bad-expr",
        "pages": [{
            "id": "p1", "index": 0,
            "visibility_expr": "equals(answer(",
            "questions": []
        }]
    }));

    let issues = validate_definition(&def);
    let expr_issues: Vec<_> = issues
        .iter()
        .filter(|issue| issue.rule_id == "expression-syntax")
        .collect();
    assert_eq!(expr_issues.len(), 1);
    assert_eq!(expr_issues[0].severity, Severity::Warning);
}

#[test]
fn duplicate_variables_are_flagged() {
    let def = definition(json!({
        "name": "dupes",
        "pages": [{
            "id": "p1", "index": 0,
            "questions": [
                { "id": "q1", "variable": "v", "type": "text", "prompt": "?" },
                { "id": "q2", "variable": "v", "type": "text", "prompt": "?" }
            ]
        }]
    }));

    let issues = validate_definition(&def);
    assert!(rule_ids(&issues).contains(&"duplicate-id"));
}
