use anyhow::{Context, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::env;
use std::sync::{Arc, OnceLock};
use tokio::sync::OnceCell;

/// Connection settings applied before the pool is first built. Later
/// calls are ignored; the pool is process-wide.
#[derive(Debug, Clone)]
struct DbConfig {
    url: String,
    max_connections: u32,
}

static CONFIG: OnceLock<DbConfig> = OnceLock::new();
static POOL: OnceCell<Arc<PgPool>> = OnceCell::const_new();

/// Set the database URL (and pool size) explicitly, overriding the
/// `CANVASS_DATABASE_URL` environment variable.
pub fn configure(url: impl Into<String>, max_connections: u32) {
    let _ = CONFIG.set(DbConfig {
        url: url.into(),
        max_connections,
    });
}

/// Get the shared database pool, creating it on first use.
pub async fn get_pool() -> Result<Arc<PgPool>> {
    POOL.get_or_try_init(|| async {
        let config = match CONFIG.get() {
            Some(config) => config.clone(),
            None => DbConfig {
                url: env::var("CANVASS_DATABASE_URL")
                    .context("CANVASS_DATABASE_URL must be set")?,
                max_connections: 20,
            },
        };

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(2)
            .connect(&config.url)
            .await
            .context("Failed to connect to database")?;

        Ok(Arc::new(pool))
    })
    .await
    .map(Arc::clone)
}

/// Run database migrations
pub async fn migrate() -> Result<()> {
    let pool = get_pool().await?;

    sqlx::migrate!("./migrations")
        .run(pool.as_ref())
        .await
        .context("Failed to run migrations")?;

    Ok(())
}
