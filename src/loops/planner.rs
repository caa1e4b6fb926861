//! Loop plan computation.
//!
//! A plan is computed at most once per battery per session: on first
//! entry to the start page. `None` means zero iterations and the caller
//! skips the whole battery. The randomized order is part of the plan and
//! survives with it; nothing here re-rolls on re-render.

use rand::seq::SliceRandom;
use serde_json::Value as JsonValue;

use crate::definition::{LoopBattery, SurveyDefinition};
use crate::ordering::session_rng;
use crate::session::{LoopItem, LoopPlan, ResponseSet};
use crate::types::LoopSource;

/// Resolve the item list for a battery against the current responses.
pub fn build_plan(
    battery: &LoopBattery,
    definition: &SurveyDefinition,
    responses: &ResponseSet,
    seed: u64,
) -> Option<LoopPlan> {
    let mut items = match &battery.source {
        LoopSource::Answer { question_id } => answer_items(definition, responses, question_id),
        LoopSource::Dataset => dataset_items(battery),
    };

    if items.is_empty() {
        return None;
    }

    let mut rng = session_rng(seed, &format!("loop:{}", battery.id));
    let sampling = battery
        .max_items
        .is_some_and(|max| max < items.len());

    if battery.randomize {
        items.shuffle(&mut rng);
    } else if battery.sample_without_replacement && sampling {
        // Draw a random subset but keep the source order for display.
        let mut indexed: Vec<(usize, LoopItem)> = items.into_iter().enumerate().collect();
        indexed.shuffle(&mut rng);
        if let Some(max) = battery.max_items {
            indexed.truncate(max);
        }
        indexed.sort_by_key(|(position, _)| *position);
        items = indexed.into_iter().map(|(_, item)| item).collect();
    }

    if let Some(max) = battery.max_items {
        items.truncate(max);
    }

    if items.is_empty() {
        return None;
    }
    Some(LoopPlan::new(items))
}

/// One item per currently-selected value on the source question, labeled
/// with the matching option's display label.
fn answer_items(
    definition: &SurveyDefinition,
    responses: &ResponseSet,
    question_id: &str,
) -> Vec<LoopItem> {
    let Some(value) = responses.get(question_id) else {
        return Vec::new();
    };

    let selections: Vec<String> = match value {
        JsonValue::Array(values) => values
            .iter()
            .filter_map(|v| match v {
                JsonValue::String(s) => Some(s.clone()),
                JsonValue::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        JsonValue::String(s) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    };

    let options = definition
        .question(question_id)
        .map(|(_, question)| question.options.as_slice())
        .unwrap_or(&[]);

    selections
        .into_iter()
        .map(|value| {
            let label = options
                .iter()
                .find(|option| option.value == value)
                .map(|option| option.label.clone())
                .unwrap_or_else(|| value.clone());
            LoopItem {
                key: value,
                label,
                attributes: Default::default(),
            }
        })
        .collect()
}

/// Active dataset rows in sort order. Attributes carry through verbatim
/// for template substitution; `label` doubles as the display label.
fn dataset_items(battery: &LoopBattery) -> Vec<LoopItem> {
    battery
        .items
        .iter()
        .filter(|row| row.is_active)
        .map(|row| {
            let label = row
                .attributes
                .get("label")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or_else(|| row.key.clone());
            LoopItem {
                key: row.key.clone(),
                label,
                attributes: row.attributes.clone(),
            }
        })
        .collect()
}
