pub mod cli;
pub mod config;
pub mod db;
pub mod definition;
pub mod engine;
pub mod expr;
pub mod init;
pub mod jumps;
pub mod loops;
pub mod ordering;
pub mod session;
pub mod sessions;
pub mod surveys;
pub mod templates;
pub mod types;
pub mod visibility;

// Re-export main types
pub use engine::{JumpTarget, NextPage, PreviousPage, ResolvedPage, SurveyEngine};
pub use session::SessionState;
pub use types::*;

// Re-export init API for convenience
pub use init::{initialize, InitBuilder, InitOptions};
