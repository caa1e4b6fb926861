use std::collections::BTreeMap;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::db;
use crate::definition::validator::validate_definition;
use crate::definition::SurveyDefinition;
use crate::expr;
use crate::session::ResponseSet;
use crate::sessions::{self, SessionListFilter};
use crate::surveys::{self, SurveyFile};
use crate::types::SessionStatus;

#[derive(Parser)]
#[command(name = "canvass")]
#[command(about = "Canvass - survey flow engine administration", long_about = None)]
pub struct Cli {
    /// Database URL (overrides config file and env vars)
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run database migrations
    Migrate,

    /// Register survey definition files (or directories of them)
    Register {
        /// Files or directories containing *.json survey definitions
        paths: Vec<String>,
    },

    /// Validate a survey definition file without registering it
    Validate {
        /// Path to a *.json survey definition
        file: String,
    },

    /// Show a respondent session
    Status {
        /// Session ID to query
        session_id: String,
    },

    /// List respondent sessions
    List {
        /// Filter by survey name
        #[arg(short = 's', long = "survey")]
        survey: Option<String>,

        /// Filter by status (active, completed, abandoned)
        #[arg(long = "status")]
        status: Option<String>,

        /// Number of results (default: 20)
        #[arg(short = 'l', long = "limit", default_value = "20")]
        limit: i32,
    },

    /// Evaluate a DSL expression against an ad-hoc response set
    Eval {
        /// The expression, e.g. 'equals(answer(color), blue)'
        expression: String,

        /// Responses as a JSON object, e.g. '{"color": "blue"}'
        #[arg(long, default_value = "{}")]
        responses: String,
    },
}

pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    if let Some(url) = &cli.database_url {
        db::configure(url.as_str(), 20);
    }

    match cli.command {
        Commands::Migrate => {
            db::migrate().await?;
            println!("Migrations complete");
        }

        Commands::Register { paths } => {
            let mut files = Vec::new();
            for path in &paths {
                let meta = std::fs::metadata(path)
                    .with_context(|| format!("Cannot access {path}"))?;
                if meta.is_dir() {
                    files.extend(crate::init::collect_survey_files(path)?);
                } else {
                    let source = std::fs::read_to_string(path)
                        .with_context(|| format!("Failed to read {path}"))?;
                    let name = std::path::Path::new(path)
                        .file_stem()
                        .and_then(|stem| stem.to_str())
                        .unwrap_or("survey")
                        .to_string();
                    files.push(SurveyFile {
                        name,
                        source,
                        file_path: path.clone(),
                    });
                }
            }
            let count = files.len();
            surveys::register_surveys(files).await?;
            println!("Registered {count} survey definition(s)");
        }

        Commands::Validate { file } => {
            let source = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {file}"))?;
            let definition = SurveyDefinition::from_json(&source)
                .with_context(|| format!("Failed to parse {file}"))?;

            let issues = validate_definition(&definition);
            for issue in &issues {
                println!("{issue}");
            }
            let errors = issues.iter().filter(|issue| issue.is_error()).count();
            if errors > 0 {
                anyhow::bail!("{errors} error(s) in {file}");
            }
            println!(
                "OK: '{}' ({} pages, {} batteries)",
                definition.name,
                definition.pages().len(),
                definition.batteries.len()
            );
        }

        Commands::Status { session_id } => match sessions::get_session(&session_id).await? {
            Some(state) => println!("{}", serde_json::to_string_pretty(&state)?),
            None => anyhow::bail!("Session '{session_id}' not found"),
        },

        Commands::List {
            survey,
            status,
            limit,
        } => {
            let status = match status.as_deref() {
                None => None,
                Some("active") => Some(SessionStatus::Active),
                Some("completed") => Some(SessionStatus::Completed),
                Some("abandoned") => Some(SessionStatus::Abandoned),
                Some(other) => anyhow::bail!("Unknown status '{other}'"),
            };
            let listed = sessions::list_sessions(SessionListFilter {
                survey,
                status,
                limit: Some(limit),
            })
            .await?;

            for session in listed {
                println!(
                    "{}  {}  {:?}  page={}  v{}  {}",
                    session.id,
                    session.survey_name,
                    session.status,
                    session.current_page.as_deref().unwrap_or("-"),
                    session.version,
                    session.created_at.format("%Y-%m-%d %H:%M:%S"),
                );
            }
        }

        Commands::Eval {
            expression,
            responses,
        } => {
            let responses: ResponseSet =
                serde_json::from_str(&responses).context("--responses must be a JSON object")?;
            let embedded = BTreeMap::new();
            let variables = BTreeMap::new();
            let ctx = expr::EvalContext {
                responses: &responses,
                embedded: &embedded,
                variables: &variables,
            };
            match expr::try_evaluate(&expression, &ctx) {
                Some(verdict) => println!("{verdict}"),
                None => println!("indeterminate (fails open to true for visibility)"),
            }
        }
    }

    Ok(())
}
