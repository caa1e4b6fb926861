//! Loop batteries: page ranges that repeat once per item of a
//! per-respondent list.
//!
//! The planner resolves the item list (from answers or a dataset), the
//! navigator owns the per-session iteration state machine. Which battery
//! a page belongs to, and whether it is a boundary or an interior page,
//! is precomputed here into a lookup table built once per engine.

pub mod navigator;
pub mod planner;

use std::collections::BTreeMap;

use crate::definition::SurveyDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatteryRole {
    Start,
    End,
    Interior,
}

/// Page id -> (battery id, role). A page belongs to at most one battery;
/// the definition validator enforces disjoint ranges, and a malformed
/// definition resolves first-battery-wins here rather than erroring.
#[derive(Debug, Default)]
pub struct BatteryRoles {
    by_page: BTreeMap<String, (String, BatteryRole)>,
}

impl BatteryRoles {
    pub fn build(definition: &SurveyDefinition) -> Self {
        let mut by_page = BTreeMap::new();

        for battery in &definition.batteries {
            let (Some(start), Some(end)) = (
                definition.page(&battery.start_page),
                definition.page(&battery.end_page),
            ) else {
                continue;
            };
            if start.index >= end.index {
                continue;
            }

            for page in definition.pages() {
                if page.index < start.index || page.index > end.index {
                    continue;
                }
                let role = if page.id == battery.start_page {
                    BatteryRole::Start
                } else if page.id == battery.end_page {
                    BatteryRole::End
                } else {
                    BatteryRole::Interior
                };
                by_page
                    .entry(page.id.clone())
                    .or_insert_with(|| (battery.id.clone(), role));
            }
        }

        Self { by_page }
    }

    pub fn role_of(&self, page_id: &str) -> Option<(&str, BatteryRole)> {
        self.by_page
            .get(page_id)
            .map(|(battery_id, role)| (battery_id.as_str(), *role))
    }
}
