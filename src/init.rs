//! Initialization system for Canvass.
//!
//! Provides a centralized initialization API that embedding applications
//! call before using anything else: configuration loading, database
//! setup, migrations, and survey definition registration.
//!
//! # Example
//!
//! ```ignore
//! use canvass_core::init::InitBuilder;
//!
//! // Simple initialization (auto-migrate, surveys from config paths)
//! InitBuilder::new().init().await?;
//!
//! // Custom configuration
//! InitBuilder::new()
//!     .database_url("postgresql://localhost/canvass")
//!     .auto_migrate(false)
//!     .survey_path("./surveys")
//!     .init()
//!     .await?;
//! ```

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};

use crate::config::Settings;
use crate::db;
use crate::surveys::{self, SurveyFile};

/// Global initialization state
static INIT_STATE: OnceLock<InitState> = OnceLock::new();

#[derive(Debug)]
struct InitState {
    settings: Settings,
}

/// Options for initializing Canvass
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// Database URL (overrides config file and env vars)
    pub database_url: Option<String>,

    /// Config file path (overrides default search)
    pub config_path: Option<String>,

    /// Whether to automatically run migrations
    pub auto_migrate: bool,

    /// Additional directories to scan for survey definitions
    pub survey_paths: Vec<String>,

    /// Survey files to register directly
    pub surveys: Vec<SurveyFile>,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            database_url: None,
            config_path: None,
            auto_migrate: true,
            survey_paths: Vec::new(),
            surveys: Vec::new(),
        }
    }
}

/// Builder for constructing InitOptions
pub struct InitBuilder {
    options: InitOptions,
}

impl InitBuilder {
    pub fn new() -> Self {
        Self {
            options: InitOptions::default(),
        }
    }

    /// Set the database URL
    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.options.database_url = Some(url.into());
        self
    }

    /// Set the config file path
    pub fn config_path(mut self, path: impl Into<String>) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    /// Set whether to automatically run migrations
    pub fn auto_migrate(mut self, auto: bool) -> Self {
        self.options.auto_migrate = auto;
        self
    }

    /// Add a directory to scan for survey definition files
    pub fn survey_path(mut self, path: impl Into<String>) -> Self {
        self.options.survey_paths.push(path.into());
        self
    }

    /// Add survey files to register during initialization
    pub fn surveys(mut self, surveys: Vec<SurveyFile>) -> Self {
        self.options.surveys.extend(surveys);
        self
    }

    pub async fn init(self) -> Result<()> {
        initialize(self.options).await
    }
}

impl Default for InitBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Initialize Canvass with the given options. Idempotent: a second call
/// is a no-op.
pub async fn initialize(options: InitOptions) -> Result<()> {
    if INIT_STATE.get().is_some() {
        return Ok(());
    }

    let settings = Settings::load(options.config_path.as_deref())?;

    let url = options
        .database_url
        .clone()
        .or_else(|| settings.database_url.clone());
    if let Some(url) = url {
        db::configure(url, settings.max_connections);
    }

    if options.auto_migrate {
        db::migrate().await.context("Failed to run migrations")?;
    }

    let mut surveys = options.surveys;
    for dir in options.survey_paths.iter().chain(settings.survey_paths.iter()) {
        surveys.extend(collect_survey_files(dir)?);
    }
    surveys::register_surveys(surveys).await?;

    let _ = INIT_STATE.set(InitState { settings });
    Ok(())
}

/// Gather `*.json` survey definition files from a directory. The survey
/// name is the file stem.
pub fn collect_survey_files(dir: impl AsRef<Path>) -> Result<Vec<SurveyFile>> {
    let dir = dir.as_ref();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read survey directory {}", dir.display()))?;

    let mut surveys = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        let source = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read survey file {}", path.display()))?;
        surveys.push(SurveyFile {
            name: name.to_string(),
            source,
            file_path: path.display().to_string(),
        });
    }

    Ok(surveys)
}
