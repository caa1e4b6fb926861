//! Authoring-time validation for survey definitions.
//!
//! This module provides an extensible rule-based validation system that
//! runs at registration time to catch definition errors the data model
//! can't enforce: overlapping loop batteries, dangling jump destinations,
//! answer-sourced batteries on the wrong question type, malformed
//! expressions.
//!
//! Validation is strictly an authoring aid. The runtime never trusts it:
//! every resolver fails open when it meets a broken definition anyway.
//!
//! # Adding a New Rule
//!
//! 1. Create a new file in `validator/rules/`
//! 2. Implement `ValidationRule` for your struct
//! 3. Add it to the `Validator::new()` constructor

pub mod rules;

#[cfg(test)]
mod tests;

use super::SurveyDefinition;

// ============================================================================
// Validation Issue Types
// ============================================================================

/// A problem found in a survey definition.
///
/// Independent of any output format (CLI, registration log) so both the
/// runtime and tooling can consume it.
#[derive(Debug, Clone)]
pub struct ValidationIssue {
    /// Id of the entity the issue concerns (page, battery, rule, question).
    pub entity: String,
    /// Human-readable message
    pub message: String,
    /// Severity level
    pub severity: Severity,
    /// Which rule produced this issue
    pub rule_id: &'static str,
}

/// Severity levels for validation issues
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Must be fixed - the definition cannot behave as authored
    Error,
    /// Should probably be fixed - the runtime will fail open around it
    Warning,
}

impl ValidationIssue {
    pub fn error(entity: impl Into<String>, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            entity: entity.into(),
            message: message.into(),
            severity: Severity::Error,
            rule_id,
        }
    }

    pub fn warning(entity: impl Into<String>, message: impl Into<String>, rule_id: &'static str) -> Self {
        Self {
            entity: entity.into(),
            message: message.into(),
            severity: Severity::Warning,
            rule_id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.severity, Severity::Error)
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(
            f,
            "{} on '{}': {} [{}]",
            severity, self.entity, self.message, self.rule_id
        )
    }
}

// ============================================================================
// ValidationRule Trait
// ============================================================================

/// Trait that all validation rules must implement.
///
/// Each rule checks one specific aspect of the definition. Rules should be
/// independent of each other and produce actionable messages.
pub trait ValidationRule {
    /// Stable identifier, shown in brackets after each message.
    fn id(&self) -> &'static str;

    /// One-line description of what the rule checks.
    fn description(&self) -> &'static str;

    fn validate(&self, definition: &SurveyDefinition) -> Vec<ValidationIssue>;
}

// ============================================================================
// Validator
// ============================================================================

/// Runs every registered rule over a definition.
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(rules::BatteryRangeRule),
                Box::new(rules::AnswerSourceRule),
                Box::new(rules::DanglingJumpRule),
                Box::new(rules::ExpressionSyntaxRule),
                Box::new(rules::DuplicateIdRule),
            ],
        }
    }

    pub fn validate(&self, definition: &SurveyDefinition) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for rule in &self.rules {
            issues.extend(rule.validate(definition));
        }
        issues
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper used by registration and the CLI.
pub fn validate_definition(definition: &SurveyDefinition) -> Vec<ValidationIssue> {
    Validator::new().validate(definition)
}
