//! Text token substitution.
//!
//! Two independent passes that never reconcile syntax:
//!
//! - loop tokens: `{{loop.key}}`, `{{loop.label}}`, `{{loop.index}}`
//!   (1-based), `{{loop.total}}`, and `{{loop.<attribute>}}` for each
//!   custom attribute of the current iteration item;
//! - answer piping: `[[variableName]]` inserts the prior response's
//!   display text.
//!
//! Both are literal, non-recursive substring replacement. An unanswered
//! piping token renders as an empty string; an unknown loop attribute is
//! left in place.

use serde_json::Value as JsonValue;

use crate::definition::SurveyDefinition;
use crate::session::{LoopItem, ResponseSet};

/// Substitute the loop tokens for one iteration item.
pub fn render_loop_tokens(text: &str, item: &LoopItem, index: usize, total: usize) -> String {
    let mut out = text.to_string();

    out = out.replace("{{loop.key}}", &item.key);
    out = out.replace("{{loop.label}}", &item.label);
    out = out.replace("{{loop.index}}", &(index + 1).to_string());
    out = out.replace("{{loop.total}}", &total.to_string());

    for (name, value) in &item.attributes {
        // Built-in tokens win over same-named attributes.
        if matches!(name.as_str(), "key" | "label" | "index" | "total") {
            continue;
        }
        let token = format!("{{{{loop.{name}}}}}");
        if out.contains(&token) {
            out = out.replace(&token, &attribute_text(value));
        }
    }

    out
}

/// Substitute `[[variableName]]` piping tokens with response display text.
pub fn pipe_answers(text: &str, definition: &SurveyDefinition, responses: &ResponseSet) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("[[") {
        let Some(end) = rest[start + 2..].find("]]") else {
            break;
        };
        let variable = &rest[start + 2..start + 2 + end];
        out.push_str(&rest[..start]);
        out.push_str(&piped_text(variable, definition, responses));
        rest = &rest[start + 2 + end + 2..];
    }

    out.push_str(rest);
    out
}

/// Display text for a piped variable: option labels where the question
/// defines options, raw values otherwise, multi-selections joined with
/// ", ". Unanswered variables pipe as empty text.
fn piped_text(variable: &str, definition: &SurveyDefinition, responses: &ResponseSet) -> String {
    let question = definition.question_by_variable(variable);
    let key = question.map(|q| q.id.as_str()).unwrap_or(variable);
    let Some(value) = responses.get(key) else {
        return String::new();
    };

    let labeled = |raw: &JsonValue| -> String {
        let raw_text = match raw {
            JsonValue::String(s) => s.clone(),
            JsonValue::Number(n) => n.to_string(),
            JsonValue::Bool(b) => b.to_string(),
            _ => String::new(),
        };
        question
            .and_then(|q| q.options.iter().find(|option| option.value == raw_text))
            .map(|option| option.label.clone())
            .unwrap_or(raw_text)
    };

    match value {
        JsonValue::Array(values) => values
            .iter()
            .map(&labeled)
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(", "),
        other => labeled(other),
    }
}

fn attribute_text(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use maplit::btreemap;
    use serde_json::json;

    use super::*;
    use crate::definition::SurveyDefinition;

    fn item() -> LoopItem {
        LoopItem {
            key: "brand_a".to_string(),
            label: "Brand A".to_string(),
            attributes: btreemap! {
                "label".to_string() => json!("Brand A"),
                "country".to_string() => json!("Norway"),
                "founded".to_string() => json!(1987),
            },
        }
    }

    fn definition_with_colors() -> SurveyDefinition {
        SurveyDefinition::from_value(json!({
            "name": "s",
            "pages": [{
                "id": "p1",
                "index": 0,
                "questions": [{
                    "id": "q_color",
                    "variable": "color",
                    "type": "single_choice",
                    "options": [
                        { "id": "o1", "value": "blue", "label": "Deep Blue" },
                        { "id": "o2", "value": "red", "label": "Bright Red" }
                    ]
                }]
            }]
        }))
        .unwrap()
    }

    // ========================================================================
    // Loop tokens
    // ========================================================================

    #[test]
    fn replaces_builtin_loop_tokens() {
        let text = "Rate {{loop.label}} ({{loop.index}} of {{loop.total}})";
        assert_eq!(
            render_loop_tokens(text, &item(), 0, 3),
            "Rate Brand A (1 of 3)"
        );
    }

    #[test]
    fn replaces_custom_attributes() {
        let text = "{{loop.key}} from {{loop.country}}, est. {{loop.founded}}";
        assert_eq!(
            render_loop_tokens(text, &item(), 1, 3),
            "brand_a from Norway, est. 1987"
        );
    }

    #[test]
    fn unknown_attribute_tokens_stay_in_place() {
        let text = "{{loop.ceo}} leads {{loop.label}}";
        assert_eq!(
            render_loop_tokens(text, &item(), 0, 1),
            "{{loop.ceo}} leads Brand A"
        );
    }

    // ========================================================================
    // Answer piping
    // ========================================================================

    #[test]
    fn pipes_option_label() {
        let definition = definition_with_colors();
        let mut responses = ResponseSet::new();
        responses.insert("q_color".to_string(), json!("blue"));

        assert_eq!(
            pipe_answers("You picked [[color]].", &definition, &responses),
            "You picked Deep Blue."
        );
    }

    #[test]
    fn pipes_multi_selection_joined() {
        let definition = definition_with_colors();
        let mut responses = ResponseSet::new();
        responses.insert("q_color".to_string(), json!(["blue", "red"]));

        assert_eq!(
            pipe_answers("Picks: [[color]]", &definition, &responses),
            "Picks: Deep Blue, Bright Red"
        );
    }

    #[test]
    fn unanswered_pipe_is_empty() {
        let definition = definition_with_colors();
        let responses = ResponseSet::new();
        assert_eq!(
            pipe_answers("You picked [[color]].", &definition, &responses),
            "You picked ."
        );
    }

    #[test]
    fn loop_and_piping_passes_are_independent() {
        let definition = definition_with_colors();
        let mut responses = ResponseSet::new();
        responses.insert("q_color".to_string(), json!("red"));

        let text = "Does {{loop.label}} come in [[color]]?";
        let with_loop = render_loop_tokens(text, &item(), 0, 2);
        let piped = pipe_answers(&with_loop, &definition, &responses);
        assert_eq!(piped, "Does Brand A come in Bright Red?");
    }
}
