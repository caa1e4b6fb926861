/// Canvass Global CLI
///
/// Administrative commands for the survey flow engine: migrations,
/// definition registration and validation, session inspection, and
/// ad-hoc expression evaluation.
use canvass_core::cli;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    if let Err(e) = cli::run_cli().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}
