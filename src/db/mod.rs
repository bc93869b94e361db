//! Database layer
//!
//! This module handles local storage of the orchestrator's entities:
//! - Releases, clusters and their networks
//! - Nodes and their interfaces
//! - Tasks and notifications
//!
//! Repositories borrow a `SqliteConnection` so they can run inside the
//! transaction of a [`UnitOfWork`].

pub mod cluster_repository;
pub mod migrations;
pub mod node_repository;
pub mod notification_repository;
pub mod release_repository;
pub mod task_repository;
pub mod unit_of_work;

pub use cluster_repository::ClusterRepository;
pub use node_repository::NodeRepository;
pub use notification_repository::NotificationRepository;
pub use release_repository::ReleaseRepository;
pub use task_repository::TaskRepository;
pub use unit_of_work::UnitOfWork;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::DatabaseConfig;

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

/// Initialize the database connection pool and apply pending migrations
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("Invalid database URL: {}", config.url))?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(config.connect_timeout_secs));

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to database: {}", config.url))?;

    migrations::run_migrations(&pool).await?;

    Ok(pool)
}

/// Build the error returned when a stored column cannot be decoded
pub(crate) fn decode_error(column: &str, message: impl Into<String>) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            message.into(),
        )),
    }
}

/// Decode a text enum column with the type's `parse` function
pub(crate) fn decode_enum<T>(
    column: &str,
    value: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, sqlx::Error> {
    parse(value).ok_or_else(|| decode_error(column, format!("unknown value {:?}", value)))
}

pub(crate) fn decode_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, sqlx::Error> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| sqlx::Error::ColumnDecode {
            index: column.to_string(),
            source: Box::new(e),
        })
}

pub(crate) fn decode_json<T: DeserializeOwned>(column: &str, value: &str) -> Result<T, sqlx::Error> {
    serde_json::from_str(value).map_err(|e| sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: Box::new(e),
    })
}

pub(crate) fn encode_json<T: serde::Serialize>(value: &T) -> Result<String, sqlx::Error> {
    serde_json::to_string(value).map_err(|e| sqlx::Error::Encode(Box::new(e)))
}

/// Stored progress is clamped into 0..=100
pub(crate) fn decode_progress(value: i64) -> u8 {
    value.clamp(0, 100) as u8
}

/// `?, ?, ?` for an `IN (...)` clause with `count` bindings
pub(crate) fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
