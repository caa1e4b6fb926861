//! Per-respondent session state.
//!
//! Everything the engine needs to behave identically across repeated
//! renders and partial resumes lives here, as one explicit, versioned
//! value: the accumulated responses, the render state (loop plans and the
//! ordering cache), the current page, and the visit history. The engine
//! takes this value in and hands it back; persistence wraps each step in
//! a versioned compare-and-swap (see `sessions`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::SessionStatus;

/// Canonical response map: question id -> submitted value(s).
/// Multi-select answers are JSON arrays of the selected option values.
pub type ResponseSet = BTreeMap<String, JsonValue>;

/// One resolved repeat-item of a loop battery.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopItem {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, JsonValue>,
}

/// The persisted iteration plan for one battery in one session.
///
/// Once generated the plan is never recomputed, randomized order
/// included, until the governing answer changes and the engine discards it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopPlan {
    pub items: Vec<LoopItem>,
    /// Zero-based. Equal to `items.len()` once the loop has been exited
    /// forward, which is also when `complete` flips.
    pub cursor: usize,
    pub complete: bool,
}

impl LoopPlan {
    pub fn new(items: Vec<LoopItem>) -> Self {
        Self {
            items,
            cursor: 0,
            complete: false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Item the cursor points at. `None` once the loop completed.
    pub fn current_item(&self) -> Option<&LoopItem> {
        self.items.get(self.cursor)
    }

    /// Item to render. Unlike [`current_item`](Self::current_item) this
    /// keeps showing the last item after completion, so re-rendering the
    /// end page of a finished loop stays meaningful.
    pub fn display_item(&self) -> Option<&LoopItem> {
        if self.items.is_empty() {
            return None;
        }
        self.items.get(self.cursor.min(self.items.len() - 1))
    }
}

/// Session-scoped render decisions that must replay identically.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RenderState {
    /// Battery id -> its iteration plan.
    #[serde(default)]
    pub loop_plans: BTreeMap<String, LoopPlan>,
    /// "(entity id):(mode)" -> resolved display order (item ids).
    #[serde(default)]
    pub order_cache: BTreeMap<String, Vec<String>>,
    /// Seed for every shuffle this session performs.
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub id: String,
    pub survey_name: String,
    #[serde(default)]
    pub responses: ResponseSet,
    #[serde(default)]
    pub render: RenderState,
    #[serde(default)]
    pub current_page: Option<String>,
    /// Pages visited, in order. Appended on every forward arrival.
    #[serde(default)]
    pub history: Vec<String>,
    pub status: SessionStatus,
    /// Optimistic-concurrency counter; bumped by every successful save.
    pub version: i64,
}

impl SessionState {
    pub fn new(id: impl Into<String>, survey_name: impl Into<String>, seed: u64) -> Self {
        Self {
            id: id.into(),
            survey_name: survey_name.into(),
            responses: ResponseSet::new(),
            render: RenderState {
                seed,
                ..RenderState::default()
            },
            current_page: None,
            history: Vec::new(),
            status: SessionStatus::Active,
            version: 0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == SessionStatus::Active
    }
}
