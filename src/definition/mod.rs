//! Survey definition model.
//!
//! A [`SurveyDefinition`] is the authored shape of one survey: pages in
//! index order, their questions and options, jump rules, and loop
//! batteries. Definitions are immutable once loaded; everything that
//! varies per respondent lives in the session state instead.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::types::{JumpDestination, LoopSource, OrderMode, QuestionType};

pub mod validator;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub id: String,
    /// Strict ordering across the survey. Navigation walks indexes, never
    /// the Vec position, so sparse indexes are fine.
    pub index: i32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub intro: Option<String>,
    #[serde(default)]
    pub visibility_expr: Option<String>,
    #[serde(default)]
    pub question_order: OrderMode,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Question {
    pub id: String,
    /// Name the expression DSL and piping tokens use to reference this
    /// question's answer.
    pub variable: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub option_order: OrderMode,
    #[serde(default)]
    pub visibility_expr: Option<String>,
    /// Source question whose selected options seed this question's options
    /// when it declares none of its own.
    #[serde(default)]
    pub carry_forward_from: Option<String>,
    #[serde(default)]
    pub groups: Vec<OptionGroup>,
    #[serde(default)]
    pub options: Vec<QuestionOption>,
}

/// A named partition of options. Group visibility hides every option that
/// carries the group's key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptionGroup {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub visibility_expr: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuestionOption {
    pub id: String,
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub visibility_expr: Option<String>,
    #[serde(default)]
    pub group_key: Option<String>,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JumpRule {
    pub id: String,
    pub from_question_id: String,
    pub destination: JumpDestination,
    #[serde(default)]
    pub condition: Option<String>,
    /// Lower evaluates first.
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopBattery {
    pub id: String,
    pub name: String,
    pub start_page: String,
    pub end_page: String,
    #[serde(flatten)]
    pub source: LoopSource,
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default)]
    pub randomize: bool,
    #[serde(default)]
    pub sample_without_replacement: bool,
    #[serde(default)]
    pub items: Vec<LoopDatasetItem>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopDatasetItem {
    /// Unique per battery.
    pub key: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, JsonValue>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_index: i32,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("failed to parse survey definition: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("survey definition '{name}' is invalid: {message}")]
    Invalid { name: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SurveyDefinition {
    pub name: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Author-provided values readable from expressions and piping, next
    /// to actual responses.
    #[serde(default)]
    pub embedded_data: BTreeMap<String, JsonValue>,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub jump_rules: Vec<JumpRule>,
    #[serde(default)]
    pub batteries: Vec<LoopBattery>,
}

impl SurveyDefinition {
    /// Parse a definition from JSON source and sort its pages by index.
    pub fn from_json(source: &str) -> Result<Self, DefinitionError> {
        let mut def: SurveyDefinition = serde_json::from_str(source)?;
        def.normalize();
        Ok(def)
    }

    pub fn from_value(value: JsonValue) -> Result<Self, DefinitionError> {
        let mut def: SurveyDefinition = serde_json::from_value(value)?;
        def.normalize();
        Ok(def)
    }

    fn normalize(&mut self) {
        self.pages.sort_by_key(|p| p.index);
        for battery in &mut self.batteries {
            battery.items.sort_by_key(|item| item.sort_index);
        }
    }

    /// Pages in index order.
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, page_id: &str) -> Option<&Page> {
        self.pages.iter().find(|p| p.id == page_id)
    }

    /// Locate a question and its containing page.
    pub fn question(&self, question_id: &str) -> Option<(&Page, &Question)> {
        self.pages.iter().find_map(|page| {
            page.questions
                .iter()
                .find(|q| q.id == question_id)
                .map(|q| (page, q))
        })
    }

    pub fn question_by_variable(&self, variable: &str) -> Option<&Question> {
        self.pages
            .iter()
            .flat_map(|p| p.questions.iter())
            .find(|q| q.variable == variable)
    }

    /// Variable name -> canonical response key (the question id). Built
    /// once per engine and handed to the expression evaluator.
    pub fn variable_map(&self) -> BTreeMap<String, String> {
        self.pages
            .iter()
            .flat_map(|p| p.questions.iter())
            .map(|q| (q.variable.clone(), q.id.clone()))
            .collect()
    }

    /// Jump rules attached to a question, in authored order. The jump
    /// resolver re-sorts by priority.
    pub fn rules_for(&self, question_id: &str) -> Vec<&JumpRule> {
        self.jump_rules
            .iter()
            .filter(|r| r.from_question_id == question_id)
            .collect()
    }

    pub fn battery(&self, battery_id: &str) -> Option<&LoopBattery> {
        self.batteries.iter().find(|b| b.id == battery_id)
    }

    /// Batteries whose plan depends on a given question's answer.
    pub fn batteries_sourced_from(&self, question_id: &str) -> Vec<&LoopBattery> {
        self.batteries
            .iter()
            .filter(|b| match &b.source {
                LoopSource::Answer { question_id: q } => q == question_id,
                LoopSource::Dataset => false,
            })
            .collect()
    }
}
