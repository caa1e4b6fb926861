//! Session persistence.
//!
//! One row per respondent session. Every engine step is wrapped in a
//! read-modify-write guarded by the session's version counter: the save
//! only applies when the stored version still matches the one that was
//! loaded, so a duplicate or retried request cannot silently lose the
//! loop cursor or an ordering decision. On a conflict the step reloads
//! and reapplies once; engine operations are deterministic over
//! (definition, state), so the replay converges.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde_json::Value as JsonValue;
use sqlx::Row;
use uuid::Uuid;

use crate::db::get_pool;
use crate::engine::{JumpTarget, NextPage, PreviousPage, SurveyEngine};
use crate::session::{RenderState, ResponseSet, SessionState};
use crate::types::SessionStatus;

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session '{0}' not found")]
    NotFound(String),
    #[error("session '{id}' was modified concurrently (expected version {expected})")]
    Stale { id: String, expected: i64 },
    #[error("corrupt session state: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Create a new session row with a fresh shuffle seed.
pub async fn create_session(survey_name: &str) -> Result<SessionState, SessionStoreError> {
    let pool = get_pool().await?;

    let id = format!("resp_{}", Uuid::new_v4());
    let seed: u64 = rand::thread_rng().gen();
    let state = SessionState::new(&id, survey_name, seed);

    sqlx::query(
        r#"
        INSERT INTO survey_sessions (
            id, survey_name, responses, render_state, current_page, history, status, version
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&state.id)
    .bind(&state.survey_name)
    .bind(serde_json::to_value(&state.responses)?)
    .bind(serde_json::to_value(&state.render)?)
    .bind(&state.current_page)
    .bind(serde_json::to_value(&state.history)?)
    .bind(&state.status)
    .bind(state.version)
    .execute(pool.as_ref())
    .await?;

    Ok(state)
}

/// Get a session by ID
pub async fn get_session(session_id: &str) -> Result<Option<SessionState>, SessionStoreError> {
    let pool = get_pool().await?;

    let row = sqlx::query(
        r#"
        SELECT id, survey_name, responses, render_state, current_page, history, status, version
        FROM survey_sessions
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool.as_ref())
    .await?;

    match row {
        Some(row) => {
            let responses: ResponseSet = serde_json::from_value(row.get::<JsonValue, _>("responses"))?;
            let render: RenderState = serde_json::from_value(row.get::<JsonValue, _>("render_state"))?;
            let history: Vec<String> = serde_json::from_value(row.get::<JsonValue, _>("history"))?;

            Ok(Some(SessionState {
                id: row.get("id"),
                survey_name: row.get("survey_name"),
                responses,
                render,
                current_page: row.get("current_page"),
                history,
                status: row.get("status"),
                version: row.get("version"),
            }))
        }
        None => Ok(None),
    }
}

/// Persist a session, guarded by its version. Returns the state with the
/// bumped version on success; a [`SessionStoreError::Stale`] means
/// another write landed first and the caller should reload and reapply.
pub async fn save_session(state: &SessionState) -> Result<SessionState, SessionStoreError> {
    let pool = get_pool().await?;

    let result = sqlx::query(
        r#"
        UPDATE survey_sessions
        SET responses = $1,
            render_state = $2,
            current_page = $3,
            history = $4,
            status = $5,
            version = version + 1,
            updated_at = NOW(),
            completed_at = CASE
                WHEN $5 = 'completed' AND completed_at IS NULL THEN NOW()
                ELSE completed_at
            END
        WHERE id = $6
          AND version = $7
        "#,
    )
    .bind(serde_json::to_value(&state.responses)?)
    .bind(serde_json::to_value(&state.render)?)
    .bind(&state.current_page)
    .bind(serde_json::to_value(&state.history)?)
    .bind(&state.status)
    .bind(&state.id)
    .bind(state.version)
    .execute(pool.as_ref())
    .await?;

    if result.rows_affected() == 0 {
        return Err(SessionStoreError::Stale {
            id: state.id.clone(),
            expected: state.version,
        });
    }

    let mut saved = state.clone();
    saved.version += 1;
    Ok(saved)
}

/// Mark a session abandoned (an administrative action, not respondent flow).
pub async fn abandon_session(session_id: &str) -> Result<(), SessionStoreError> {
    let pool = get_pool().await?;

    sqlx::query(
        r#"
        UPDATE survey_sessions
        SET status = 'abandoned',
            version = version + 1,
            updated_at = NOW()
        WHERE id = $1
          AND status = 'active'
        "#,
    )
    .bind(session_id)
    .execute(pool.as_ref())
    .await?;

    Ok(())
}

/* ===================== Step Wrappers ===================== */

/// Load a session, apply one engine step, and save it back under the
/// version guard. Retries once on a stale save.
pub async fn with_session<T, F>(
    engine: &SurveyEngine,
    session_id: &str,
    mut apply: F,
) -> Result<(SessionState, T), SessionStoreError>
where
    F: FnMut(&SurveyEngine, &mut SessionState) -> T,
{
    let mut attempts = 0;
    loop {
        attempts += 1;

        let mut state = get_session(session_id)
            .await?
            .ok_or_else(|| SessionStoreError::NotFound(session_id.to_string()))?;
        let value = apply(engine, &mut state);

        match save_session(&state).await {
            Ok(saved) => return Ok((saved, value)),
            Err(SessionStoreError::Stale { .. }) if attempts < 2 => continue,
            Err(err) => return Err(err),
        }
    }
}

/// Record an answer and resolve any jump it triggers.
pub async fn submit_answer(
    engine: &SurveyEngine,
    session_id: &str,
    question_id: &str,
    value: JsonValue,
) -> Result<(SessionState, Option<JumpTarget>), SessionStoreError> {
    with_session(engine, session_id, |engine, state| {
        engine.submit_answer(question_id, value.clone(), state)
    })
    .await
}

/// Advance to the next page (or the first, for a fresh session).
pub async fn step_next(
    engine: &SurveyEngine,
    session_id: &str,
) -> Result<(SessionState, NextPage), SessionStoreError> {
    with_session(engine, session_id, |engine, state| {
        match state.current_page.clone() {
            Some(page_id) => engine.next_page(&page_id, state),
            None => engine.first_page(state),
        }
    })
    .await
}

/// Step back to the previous page, if any.
pub async fn step_previous(
    engine: &SurveyEngine,
    session_id: &str,
) -> Result<(SessionState, Option<PreviousPage>), SessionStoreError> {
    with_session(engine, session_id, |engine, state| {
        state
            .current_page
            .clone()
            .and_then(|page_id| engine.previous_page(&page_id, state))
    })
    .await
}

/* ===================== Listing ===================== */

#[derive(Debug, Clone, Default)]
pub struct SessionListFilter {
    pub survey: Option<String>,
    pub status: Option<SessionStatus>,
    pub limit: Option<i32>,
}

/// A session row as listed administratively; the full state stays in
/// `get_session`.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub survey_name: String,
    pub status: SessionStatus,
    pub current_page: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// List sessions with filters
pub async fn list_sessions(
    filter: SessionListFilter,
) -> Result<Vec<SessionSummary>, SessionStoreError> {
    let pool = get_pool().await?;

    let mut query = String::from(
        "SELECT id, survey_name, status, current_page, version, created_at, updated_at, completed_at
         FROM survey_sessions WHERE 1=1",
    );

    if filter.survey.is_some() {
        query.push_str(" AND survey_name = $1");
    }
    if filter.status.is_some() {
        let param_num = if filter.survey.is_some() { 2 } else { 1 };
        query.push_str(&format!(" AND status = ${param_num}"));
    }

    query.push_str(" ORDER BY created_at DESC");

    if filter.limit.is_some() {
        let param_num =
            1 + usize::from(filter.survey.is_some()) + usize::from(filter.status.is_some());
        query.push_str(&format!(" LIMIT ${param_num}"));
    }

    let mut q = sqlx::query(&query);
    if let Some(ref survey) = filter.survey {
        q = q.bind(survey);
    }
    if let Some(ref status) = filter.status {
        q = q.bind(status);
    }
    if let Some(limit) = filter.limit {
        q = q.bind(limit);
    }

    let rows = q.fetch_all(pool.as_ref()).await?;

    let mut sessions = Vec::with_capacity(rows.len());
    for row in rows {
        sessions.push(SessionSummary {
            id: row.get("id"),
            survey_name: row.get("survey_name"),
            status: row.get("status"),
            current_page: row.get("current_page"),
            version: row.get("version"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            completed_at: row.get("completed_at"),
        });
    }

    Ok(sessions)
}
