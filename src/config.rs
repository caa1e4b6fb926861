//! Layered configuration: an optional `canvass.toml` next to the process,
//! overridden by `CANVASS_*` environment variables (a `.env` file is
//! honored via dotenvy). Explicit CLI flags override both at the call
//! sites that take them.

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Postgres connection string. Falls back to `CANVASS_DATABASE_URL`.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Directories scanned for `*.json` survey definitions at init.
    #[serde(default)]
    pub survey_paths: Vec<String>,
}

fn default_max_connections() -> u32 {
    20
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: default_max_connections(),
            survey_paths: Vec::new(),
        }
    }
}

impl Settings {
    /// Load settings from the default search path or an explicit file.
    pub fn load(explicit_path: Option<&str>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let builder = match explicit_path {
            Some(path) => config::Config::builder().add_source(config::File::with_name(path)),
            None => config::Config::builder()
                .add_source(config::File::with_name("canvass").required(false)),
        };

        builder
            .add_source(config::Environment::with_prefix("CANVASS"))
            .build()
            .context("failed to load configuration")?
            .try_deserialize::<Settings>()
            .context("invalid configuration")
    }
}
