//! Database migrations
//!
//! Migrations are handled by SQLx and stored in the `migrations/` directory.

use anyhow::{Context, Result};
use sqlx::SqlitePool;

/// Apply all pending migrations
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run database migrations")?;
    Ok(())
}

/// Check that the database answers queries
pub async fn check_connection(pool: &SqlitePool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("Database is not reachable")?;
    Ok(())
}
