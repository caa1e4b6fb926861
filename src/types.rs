use serde::{Deserialize, Serialize};

/// Answer shape a question collects.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum QuestionType {
    Text,
    Number,
    SingleChoice,
    MultiChoice,
}

impl QuestionType {
    /// Whether the question can carry more than one selected value.
    /// Loop batteries sourced from answers require this.
    pub fn is_multi_select(&self) -> bool {
        matches!(self, QuestionType::MultiChoice)
    }
}

/// Display-order strategy for questions on a page or options on a question.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderMode {
    #[default]
    Sequential,
    Random,
    GroupRandom,
    Weighted,
}

impl OrderMode {
    /// Stable slug used in the per-session ordering cache key.
    pub fn slug(&self) -> &'static str {
        match self {
            OrderMode::Sequential => "sequential",
            OrderMode::Random => "random",
            OrderMode::GroupRandom => "group_random",
            OrderMode::Weighted => "weighted",
        }
    }
}

/// Where a jump rule sends the respondent when it fires.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JumpDestination {
    /// Jump to the page containing this question.
    Question { id: String },
    /// Jump directly to a page.
    Page { id: String },
    /// Finish the survey immediately.
    End,
}

/// Where a loop battery's repeat items come from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LoopSource {
    /// One iteration per currently-selected value on a multi-select question.
    Answer { question_id: String },
    /// One iteration per active dataset row.
    Dataset,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}
