//! The survey flow engine.
//!
//! Pure composition of the resolvers: rendering a page runs visibility ->
//! ordering -> templates; submitting an answer runs loop resets and jump
//! rules; navigation walks page indexes with the loop navigator patched
//! in at battery boundaries. Every operation is synchronous and operates
//! on an explicit [`SessionState`]; persistence happens around the
//! engine, never inside it (see `sessions`).


use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::definition::{OptionGroup, Question, QuestionOption, SurveyDefinition};
use crate::expr::EvalContext;
use crate::jumps;
use crate::loops::navigator::{self, LoopEntry, LoopExit, LoopState};
use crate::loops::{BatteryRole, BatteryRoles};
use crate::ordering::{resolve_order, OrderItem};
use crate::session::{LoopItem, ResponseSet, SessionState};
use crate::templates;
use crate::types::{JumpDestination, SessionStatus};
use crate::visibility::is_visible;

/* ===================== Resolved Output Types ===================== */

/// The loop iteration a page is rendered under.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopContext {
    pub battery_id: String,
    pub item: LoopItem,
    /// 1-based for display.
    pub index: usize,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedOption {
    pub id: String,
    pub value: String,
    pub label: String,
    pub group_key: Option<String>,
}

/// A visible option group; options reference it through `group_key`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedGroup {
    pub key: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedQuestion {
    pub id: String,
    pub variable: String,
    pub prompt: String,
    pub groups: Vec<ResolvedGroup>,
    pub options: Vec<ResolvedOption>,
}

/// A page as the respondent sees it: visible content in final order,
/// tokens substituted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResolvedPage {
    pub id: String,
    pub title: Option<String>,
    pub intro: Option<String>,
    pub questions: Vec<ResolvedQuestion>,
    pub loop_context: Option<LoopContext>,
}

/// Where forward navigation lands.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NextPage {
    Page {
        id: String,
        loop_context: Option<LoopContext>,
    },
    /// Survey complete.
    End,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PreviousPage {
    pub id: String,
    pub loop_context: Option<LoopContext>,
}

/// A jump rule's resolved target, already mapped to a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpTarget {
    Page(String),
    End,
}

/// Read-only projection of one battery's progress.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoopProgress {
    /// 1-based.
    pub current_iteration: usize,
    pub total_iterations: usize,
    pub percent_complete: f64,
    pub current_item: Option<LoopItem>,
}

/* ===================== Engine ===================== */

pub struct SurveyEngine {
    definition: SurveyDefinition,
    /// Variable name -> canonical response key, built once.
    variables: BTreeMap<String, String>,
    /// Page id -> battery role, built once.
    roles: BatteryRoles,
}

impl SurveyEngine {
    pub fn new(definition: SurveyDefinition) -> Self {
        let variables = definition.variable_map();
        let roles = BatteryRoles::build(&definition);
        Self {
            definition,
            variables,
            roles,
        }
    }

    pub fn definition(&self) -> &SurveyDefinition {
        &self.definition
    }

    fn eval_ctx<'a>(&'a self, responses: &'a ResponseSet) -> EvalContext<'a> {
        EvalContext {
            responses,
            embedded: &self.definition.embedded_data,
            variables: &self.variables,
        }
    }

    /* ===================== Rendering ===================== */

    /// Resolve a page for display. Fills the ordering cache and, on a
    /// battery's start page, lazily creates the loop plan.
    pub fn resolve_page(&self, page_id: &str, state: &mut SessionState) -> Option<ResolvedPage> {
        let page = self.definition.page(page_id)?;

        let loop_context = match self.roles.role_of(page_id) {
            Some((battery_id, BatteryRole::Start)) => {
                let battery_id = battery_id.to_string();
                if let Some(battery) = self.definition.battery(&battery_id) {
                    navigator::enter(battery, &self.definition, &state.responses, &mut state.render);
                }
                self.loop_context_for(&battery_id, state)
            }
            Some((battery_id, _)) => self.loop_context_for(battery_id, state),
            None => None,
        };

        // Visible questions, then the page's configured question order.
        let visible_questions: Vec<&Question> = {
            let ctx = self.eval_ctx(&state.responses);
            page.questions
                .iter()
                .filter(|question| is_visible(*question, &ctx))
                .collect()
        };
        let items: Vec<OrderItem> = visible_questions
            .iter()
            .map(|question| OrderItem::plain(question.id.clone()))
            .collect();
        let order = resolve_order(&page.id, page.question_order, &items, &mut state.render);

        let mut questions = Vec::with_capacity(order.len());
        for question_id in &order {
            let Some(question) = visible_questions
                .iter()
                .copied()
                .find(|question| question.id == *question_id)
            else {
                continue;
            };
            questions.push(self.resolve_question(question, loop_context.as_ref(), state));
        }

        let title = page
            .title
            .as_deref()
            .map(|text| self.resolve_text(text, loop_context.as_ref(), &state.responses));
        let intro = page
            .intro
            .as_deref()
            .map(|text| self.resolve_text(text, loop_context.as_ref(), &state.responses));

        Some(ResolvedPage {
            id: page.id.clone(),
            title,
            intro,
            questions,
            loop_context,
        })
    }

    fn resolve_question(
        &self,
        question: &Question,
        loop_context: Option<&LoopContext>,
        state: &mut SessionState,
    ) -> ResolvedQuestion {
        let source_options = self.effective_options(question, &state.responses);

        let (groups, visible_options): (Vec<ResolvedGroup>, Vec<QuestionOption>) = {
            let ctx = self.eval_ctx(&state.responses);
            let visible_groups: Vec<&OptionGroup> = question
                .groups
                .iter()
                .filter(|group| is_visible(*group, &ctx))
                .collect();
            let hidden_groups: HashSet<&str> = question
                .groups
                .iter()
                .filter(|group| !is_visible(*group, &ctx))
                .map(|group| group.key.as_str())
                .collect();

            let options = source_options
                .into_iter()
                .filter(|option| {
                    !option
                        .group_key
                        .as_deref()
                        .is_some_and(|key| hidden_groups.contains(key))
                })
                .filter(|option| is_visible(option, &ctx))
                .collect();
            let groups = visible_groups
                .into_iter()
                .map(|group| ResolvedGroup {
                    key: group.key.clone(),
                    label: group.label.clone(),
                })
                .collect();
            (groups, options)
        };

        let items: Vec<OrderItem> = visible_options
            .iter()
            .map(|option| OrderItem {
                id: option.id.clone(),
                group_key: option.group_key.clone(),
                weight: option.weight,
            })
            .collect();
        let order = resolve_order(&question.id, question.option_order, &items, &mut state.render);

        let options = order
            .iter()
            .filter_map(|option_id| visible_options.iter().find(|o| o.id == *option_id))
            .map(|option| ResolvedOption {
                id: option.id.clone(),
                value: option.value.clone(),
                label: self.resolve_text(&option.label, loop_context, &state.responses),
                group_key: option.group_key.clone(),
            })
            .collect();

        ResolvedQuestion {
            id: question.id.clone(),
            variable: question.variable.clone(),
            prompt: self.resolve_text(&question.prompt, loop_context, &state.responses),
            groups,
            options,
        }
    }

    /// A question's options, or its carry-forward source's currently
    /// selected options when it declares none of its own.
    fn effective_options(&self, question: &Question, responses: &ResponseSet) -> Vec<QuestionOption> {
        if !question.options.is_empty() {
            return question.options.clone();
        }
        let Some(source_id) = question.carry_forward_from.as_deref() else {
            return Vec::new();
        };
        let Some((_, source)) = self.definition.question(source_id) else {
            warn!(
                question = %question.id,
                source = source_id,
                "carry-forward source does not exist"
            );
            return Vec::new();
        };

        let selected: HashSet<String> = match responses.get(source_id) {
            Some(JsonValue::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(String::from))
                .collect(),
            Some(JsonValue::String(s)) => HashSet::from([s.clone()]),
            _ => HashSet::new(),
        };

        source
            .options
            .iter()
            .filter(|option| selected.contains(&option.value))
            .cloned()
            .collect()
    }

    fn resolve_text(
        &self,
        text: &str,
        loop_context: Option<&LoopContext>,
        responses: &ResponseSet,
    ) -> String {
        let with_loop = match loop_context {
            Some(ctx) => templates::render_loop_tokens(text, &ctx.item, ctx.index - 1, ctx.total),
            None => text.to_string(),
        };
        templates::pipe_answers(&with_loop, &self.definition, responses)
    }

    fn loop_context_for(&self, battery_id: &str, state: &SessionState) -> Option<LoopContext> {
        let plan = state.render.loop_plans.get(battery_id)?;
        let item = plan.display_item()?.clone();
        Some(LoopContext {
            battery_id: battery_id.to_string(),
            index: plan.cursor.min(plan.len() - 1) + 1,
            total: plan.len(),
            item,
        })
    }

    /* ===================== Answers & Jumps ===================== */

    /// Record a submitted answer: store the response, discard loop plans
    /// the answer governs when it changed, then evaluate jump rules.
    pub fn submit_answer(
        &self,
        question_id: &str,
        value: JsonValue,
        state: &mut SessionState,
    ) -> Option<JumpTarget> {
        let previous = state.responses.insert(question_id.to_string(), value.clone());

        if previous.as_ref() != Some(&value) {
            for battery in self.definition.batteries_sourced_from(question_id) {
                navigator::reset(&mut state.render, &battery.id);
            }
        }

        let rules = self.definition.rules_for(question_id);
        if rules.is_empty() {
            return None;
        }

        let destination = {
            let ctx = self.eval_ctx(&state.responses);
            jumps::resolve_jump(&rules, &ctx)?.clone()
        };

        match destination {
            JumpDestination::Question { id } => match self.definition.question(&id) {
                Some((page, _)) => Some(JumpTarget::Page(page.id.clone())),
                None => {
                    warn!(question = %id, "jump destination question does not exist");
                    None
                }
            },
            JumpDestination::Page { id } => {
                if self.definition.page(&id).is_some() {
                    Some(JumpTarget::Page(id))
                } else {
                    warn!(page = %id, "jump destination page does not exist");
                    None
                }
            }
            JumpDestination::End => Some(JumpTarget::End),
        }
    }

    /* ===================== Navigation ===================== */

    /// Entry point for a fresh session: the first visible page.
    pub fn first_page(&self, state: &mut SessionState) -> NextPage {
        let outcome = self.scan_forward(i64::MIN, state);
        self.note_arrival(&outcome, state);
        outcome
    }

    /// Forward navigation from the current page. Applies the loop exit
    /// transition at battery end pages, then ordinary index order with
    /// invisible pages skipped.
    pub fn next_page(&self, current_page_id: &str, state: &mut SessionState) -> NextPage {
        if let Some((battery_id, BatteryRole::End)) = self.roles.role_of(current_page_id) {
            let battery_id = battery_id.to_string();
            if let LoopExit::Continue(_) = navigator::advance(&mut state.render, &battery_id) {
                if let Some(battery) = self.definition.battery(&battery_id) {
                    let outcome = NextPage::Page {
                        id: battery.start_page.clone(),
                        loop_context: self.loop_context_for(&battery_id, state),
                    };
                    self.note_arrival(&outcome, state);
                    return outcome;
                }
            }
            // Plan exhausted: sequential flow continues past the end page.
        }

        let from = self
            .definition
            .page(current_page_id)
            .map(|page| page.index as i64)
            .unwrap_or(i64::MIN);
        let outcome = self.scan_forward(from, state);
        self.note_arrival(&outcome, state);
        outcome
    }

    /// Arrival at an explicit page (a jump destination). Normalizes loop
    /// entry the same way sequential arrival does.
    pub fn arrive(&self, page_id: &str, state: &mut SessionState) -> NextPage {
        if let Some((battery_id, BatteryRole::Start)) = self.roles.role_of(page_id) {
            let battery_id = battery_id.to_string();
            if let Some(battery) = self.definition.battery(&battery_id) {
                let entered =
                    navigator::enter(battery, &self.definition, &state.responses, &mut state.render);
                if entered == LoopEntry::Skip {
                    let from = self.page_index(&battery.end_page).unwrap_or(i64::MIN);
                    let outcome = self.scan_forward(from, state);
                    self.note_arrival(&outcome, state);
                    return outcome;
                }
            }
        }

        let loop_context = self
            .roles
            .role_of(page_id)
            .and_then(|(battery_id, _)| self.loop_context_for(battery_id, state));
        let outcome = NextPage::Page {
            id: page_id.to_string(),
            loop_context,
        };
        self.note_arrival(&outcome, state);
        outcome
    }

    /// Backward navigation. At a battery's start page this steps to the
    /// previous iteration's end page; past the first iteration it leaves
    /// the battery.
    pub fn previous_page(
        &self,
        current_page_id: &str,
        state: &mut SessionState,
    ) -> Option<PreviousPage> {
        if let Some((battery_id, BatteryRole::Start)) = self.roles.role_of(current_page_id) {
            let battery_id = battery_id.to_string();
            if navigator::retreat(&mut state.render, &battery_id).is_some() {
                if let Some(battery) = self.definition.battery(&battery_id) {
                    let previous = PreviousPage {
                        id: battery.end_page.clone(),
                        loop_context: self.loop_context_for(&battery_id, state),
                    };
                    state.current_page = Some(previous.id.clone());
                    return Some(previous);
                }
            }
        }

        let from = self
            .definition
            .page(current_page_id)
            .map(|page| page.index as i64)
            .unwrap_or(i64::MAX);
        let previous = self.scan_backward(from, state);
        if let Some(previous) = &previous {
            state.current_page = Some(previous.id.clone());
        }
        previous
    }

    /// Progress projection for one battery. Pure read, no side effects.
    pub fn loop_progress(&self, battery_id: &str, state: &SessionState) -> Option<LoopProgress> {
        let plan = state.render.loop_plans.get(battery_id)?;
        let total = plan.len();
        if total == 0 {
            return None;
        }
        let completed = plan.cursor.min(total);
        Some(LoopProgress {
            current_iteration: completed.min(total - 1) + 1,
            total_iterations: total,
            percent_complete: (completed as f64 / total as f64) * 100.0,
            current_item: plan.display_item().cloned(),
        })
    }

    /* ===================== Scan Helpers ===================== */

    fn page_index(&self, page_id: &str) -> Option<i64> {
        self.definition.page(page_id).map(|page| page.index as i64)
    }

    /// First renderable page after `from_index`, entering or skipping
    /// batteries as their plans dictate.
    fn scan_forward(&self, from_index: i64, state: &mut SessionState) -> NextPage {
        let mut skip_through: Option<i64> = None;

        for page in self.definition.pages() {
            let index = page.index as i64;
            if index <= from_index {
                continue;
            }
            if skip_through.is_some_and(|limit| index <= limit) {
                continue;
            }

            match self.roles.role_of(&page.id) {
                Some((battery_id, BatteryRole::Start)) => {
                    let battery_id = battery_id.to_string();
                    let Some(battery) = self.definition.battery(&battery_id) else {
                        continue;
                    };
                    let end_index = self.page_index(&battery.end_page).unwrap_or(index);

                    let start_visible = {
                        let ctx = self.eval_ctx(&state.responses);
                        is_visible(page, &ctx)
                    };
                    if !start_visible {
                        // An invisible start page skips the battery wholesale.
                        skip_through = Some(end_index);
                        continue;
                    }

                    match navigator::enter(
                        battery,
                        &self.definition,
                        &state.responses,
                        &mut state.render,
                    ) {
                        LoopEntry::Iterating(_) => {
                            return NextPage::Page {
                                id: page.id.clone(),
                                loop_context: self.loop_context_for(&battery_id, state),
                            };
                        }
                        LoopEntry::Skip => {
                            skip_through = Some(end_index);
                            continue;
                        }
                    }
                }
                Some((battery_id, _)) => {
                    // Interior or end page in sequence: only renderable
                    // while its battery is mid-iteration.
                    let iterating =
                        matches!(navigator::state_of(&state.render, battery_id), LoopState::Iterating(_));
                    if !iterating {
                        continue;
                    }
                    let visible = {
                        let ctx = self.eval_ctx(&state.responses);
                        is_visible(page, &ctx)
                    };
                    if !visible {
                        continue;
                    }
                    let battery_id = battery_id.to_string();
                    return NextPage::Page {
                        id: page.id.clone(),
                        loop_context: self.loop_context_for(&battery_id, state),
                    };
                }
                None => {
                    let visible = {
                        let ctx = self.eval_ctx(&state.responses);
                        is_visible(page, &ctx)
                    };
                    if visible {
                        return NextPage::Page {
                            id: page.id.clone(),
                            loop_context: None,
                        };
                    }
                }
            }
        }

        NextPage::End
    }

    /// First renderable page before `from_index`, walking backward.
    /// Batteries that were never entered are skipped wholesale; entered
    /// ones re-open at their end page showing the last rendered item.
    fn scan_backward(&self, from_index: i64, state: &mut SessionState) -> Option<PreviousPage> {
        let mut skip_through: Option<i64> = None;

        for page in self.definition.pages().iter().rev() {
            let index = page.index as i64;
            if index >= from_index {
                continue;
            }
            if skip_through.is_some_and(|limit| index >= limit) {
                continue;
            }

            match self.roles.role_of(&page.id) {
                Some((battery_id, _)) => {
                    let entered = state
                        .render
                        .loop_plans
                        .get(battery_id)
                        .is_some_and(|plan| !plan.is_empty());
                    if !entered {
                        let battery_id = battery_id.to_string();
                        if let Some(battery) = self.definition.battery(&battery_id) {
                            skip_through = self.page_index(&battery.start_page);
                        }
                        continue;
                    }
                    let visible = {
                        let ctx = self.eval_ctx(&state.responses);
                        is_visible(page, &ctx)
                    };
                    if !visible {
                        continue;
                    }
                    let battery_id = battery_id.to_string();
                    return Some(PreviousPage {
                        id: page.id.clone(),
                        loop_context: self.loop_context_for(&battery_id, state),
                    });
                }
                None => {
                    let visible = {
                        let ctx = self.eval_ctx(&state.responses);
                        is_visible(page, &ctx)
                    };
                    if visible {
                        return Some(PreviousPage {
                            id: page.id.clone(),
                            loop_context: None,
                        });
                    }
                }
            }
        }

        None
    }

    fn note_arrival(&self, outcome: &NextPage, state: &mut SessionState) {
        match outcome {
            NextPage::Page { id, .. } => {
                state.current_page = Some(id.clone());
                if state.history.last().map(String::as_str) != Some(id.as_str()) {
                    state.history.push(id.clone());
                }
            }
            NextPage::End => {
                state.current_page = None;
                state.status = SessionStatus::Completed;
            }
        }
    }
}
