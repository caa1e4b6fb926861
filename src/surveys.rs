//! Survey definition registration and session startup.
//!
//! Definitions are versioned by a SHA-256 hash of their source, so
//! re-registering an unchanged file is a no-op and every historical
//! version stays addressable.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use crate::db;
use crate::definition::validator::validate_definition;
use crate::definition::SurveyDefinition;
use crate::engine::{NextPage, SurveyEngine};
use crate::session::SessionState;
use crate::sessions;

/// A survey definition file picked up for registration.
#[derive(Debug, Clone)]
pub struct SurveyFile {
    pub name: String,
    pub source: String,
    pub file_path: String,
}

/// Register survey definitions during initialization.
///
/// Each source is parsed, validated, hashed, and upserted; validation
/// errors fail registration (they would misbehave at runtime), warnings
/// are logged and allowed through.
pub async fn register_surveys(surveys: Vec<SurveyFile>) -> Result<()> {
    if surveys.is_empty() {
        return Ok(());
    }

    let pool = db::get_pool().await?;
    let survey_count = surveys.len();

    for survey in surveys {
        let definition = SurveyDefinition::from_json(&survey.source).with_context(|| {
            format!(
                "Failed to parse survey '{}' from {}",
                survey.name, survey.file_path
            )
        })?;

        let issues = validate_definition(&definition);
        for issue in issues.iter().filter(|issue| !issue.is_error()) {
            warn!(survey = %survey.name, %issue, "definition warning");
        }
        let errors: Vec<String> = issues
            .iter()
            .filter(|issue| issue.is_error())
            .map(|issue| issue.to_string())
            .collect();
        if !errors.is_empty() {
            anyhow::bail!(
                "Validation failed for survey '{}' from {}:\n  {}",
                survey.name,
                survey.file_path,
                errors.join("\n  ")
            );
        }

        let version_hash = hash_source(&survey.source);
        let parsed = serde_json::to_value(&definition)
            .context("Failed to serialize parsed definition")?;

        info!(
            survey = %survey.name,
            version = &version_hash[..8],
            pages = definition.pages().len(),
            "registered survey"
        );

        sqlx::query(
            r#"
            INSERT INTO survey_definitions (name, version_hash, source, definition, file_path)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (name, version_hash) DO NOTHING
            "#,
        )
        .bind(&survey.name)
        .bind(&version_hash)
        .bind(&survey.source)
        .bind(&parsed)
        .bind(&survey.file_path)
        .execute(pool.as_ref())
        .await
        .with_context(|| format!("Failed to store survey '{}'", survey.name))?;
    }

    info!("registered {survey_count} survey definition(s)");
    Ok(())
}

/// Hash survey source using SHA256
pub fn hash_source(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Load the latest registered version of a survey definition.
pub async fn load_definition(survey_name: &str) -> Result<Option<SurveyDefinition>> {
    let pool = db::get_pool().await?;

    let row: Option<(serde_json::Value,)> = sqlx::query_as(
        r#"
        SELECT definition
        FROM survey_definitions
        WHERE name = $1
        ORDER BY created_at DESC
        LIMIT 1
        "#,
    )
    .bind(survey_name)
    .fetch_optional(pool.as_ref())
    .await
    .context("Failed to query survey definition")?;

    match row {
        Some((value,)) => {
            let definition =
                SurveyDefinition::from_value(value).context("Stored definition is corrupt")?;
            Ok(Some(definition))
        }
        None => Ok(None),
    }
}

/// Build an engine for the latest version of a survey.
pub async fn load_engine(survey_name: &str) -> Result<SurveyEngine> {
    let definition = load_definition(survey_name)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Survey '{survey_name}' not found"))?;
    Ok(SurveyEngine::new(definition))
}

/// Start a respondent session: create the row, resolve the first page,
/// persist the resulting state.
pub async fn start_session(survey_name: &str) -> Result<(SessionState, NextPage)> {
    let engine = load_engine(survey_name).await?;

    let mut state = sessions::create_session(survey_name)
        .await
        .context("Failed to create session")?;
    let first = engine.first_page(&mut state);
    let state = sessions::save_session(&state)
        .await
        .context("Failed to persist session entry")?;

    Ok((state, first))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_content_sensitive() {
        let a = hash_source("{\"name\":\"s\"}");
        let b = hash_source("{\"name\":\"s\"}");
        let c = hash_source("{\"name\":\"t\"}");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }
}
