//! Per-session loop iteration state machine.
//!
//! States per (session, battery): NotStarted -> Iterating(i) -> Done,
//! projected from the stored plan. Only the two boundary pages carry
//! loop transitions; interior pages navigate sequentially.

use crate::definition::{LoopBattery, SurveyDefinition};
use crate::session::{RenderState, ResponseSet};

use super::planner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    NotStarted,
    Iterating(usize),
    Done,
}

/// Outcome of arriving at a battery's start page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopEntry {
    /// Render the start page with this iteration index.
    Iterating(usize),
    /// Zero iterations: route past the battery's end page.
    Skip,
}

/// Outcome of leaving a battery's end page forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopExit {
    /// More items: route back to the start page with this index.
    Continue(usize),
    /// Plan exhausted: route to the first page after the end page.
    Done,
}

pub fn state_of(render: &RenderState, battery_id: &str) -> LoopState {
    match render.loop_plans.get(battery_id) {
        None => LoopState::NotStarted,
        Some(plan) if plan.complete => LoopState::Done,
        Some(plan) => LoopState::Iterating(plan.cursor),
    }
}

/// Arrival at the start page. Computes the plan lazily on first entry; a
/// cached plan is reused verbatim, so mid-loop re-renders and resumes see
/// the same current item.
pub fn enter(
    battery: &LoopBattery,
    definition: &SurveyDefinition,
    responses: &ResponseSet,
    render: &mut RenderState,
) -> LoopEntry {
    if let Some(plan) = render.loop_plans.get(&battery.id) {
        if plan.complete || plan.is_empty() {
            return LoopEntry::Skip;
        }
        return LoopEntry::Iterating(plan.cursor);
    }

    match planner::build_plan(battery, definition, responses, render.seed) {
        Some(plan) => {
            let cursor = plan.cursor;
            render.loop_plans.insert(battery.id.clone(), plan);
            LoopEntry::Iterating(cursor)
        }
        // Zero iterations: nothing cached, the next arrival recomputes.
        None => LoopEntry::Skip,
    }
}

/// Forward exit from the end page: advance the cursor.
pub fn advance(render: &mut RenderState, battery_id: &str) -> LoopExit {
    let Some(plan) = render.loop_plans.get_mut(battery_id) else {
        return LoopExit::Done;
    };
    if plan.complete {
        return LoopExit::Done;
    }

    plan.cursor += 1;
    if plan.cursor < plan.len() {
        LoopExit::Continue(plan.cursor)
    } else {
        plan.complete = true;
        LoopExit::Done
    }
}

/// Backward step from the start page: move to the previous iteration.
/// `None` at the first iteration, where the caller leaves the battery.
pub fn retreat(render: &mut RenderState, battery_id: &str) -> Option<usize> {
    let plan = render.loop_plans.get_mut(battery_id)?;
    if plan.is_empty() {
        return None;
    }

    if plan.complete {
        plan.complete = false;
        plan.cursor = plan.len() - 1;
    }
    if plan.cursor == 0 {
        return None;
    }
    plan.cursor -= 1;
    Some(plan.cursor)
}

/// Discard the plan. Called when the answer-sourced question changes; the
/// next arrival at the start page regenerates from scratch.
pub fn reset(render: &mut RenderState, battery_id: &str) {
    render.loop_plans.remove(battery_id);
}
