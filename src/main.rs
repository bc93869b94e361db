//! deployd - report receiver for the deployment orchestrator
//!
//! Accepts asynchronous task reports from the remote execution layer over
//! HTTP and reconciles them into cluster, node, release and task state.

use std::env;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, Level};

use config::{LogFormat, LoggingConfig};
use deployd::{api, config, db, AppConfig, AppState};

/// Tables the receiver cannot work without
const REQUIRED_TABLES: &[&str] = &[
    "releases",
    "clusters",
    "network_groups",
    "cluster_changes",
    "nodes",
    "node_interfaces",
    "ip_addrs",
    "tasks",
    "notifications",
];

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|arg| arg == "--help" || arg == "-h") {
        print_help();
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--version" || arg == "-V") {
        println!("deployd {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    if args.iter().any(|arg| arg == "--migrate") {
        return migrate_database().await;
    }

    // Load configuration first (before logging, so we know log format)
    let config = AppConfig::load().context("Failed to load configuration")?;

    // The guard must be kept alive for the duration of the program
    // to ensure log messages are flushed to files
    let _log_guard = init_logging(&config);

    info!("deployd starting up");

    ensure_data_directory(&config)?;

    info!("Initializing database connection");
    let db = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;

    info!(
        admin_network_mac = %config.receiver.admin_network_mac,
        "Initializing report receiver"
    );
    let state = AppState::new(config.clone(), db);

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("Invalid server address configuration")?;

    info!("Starting HTTP server on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    info!("deployd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize the logging/tracing infrastructure
fn init_logging(config: &AppConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use config::LogTarget;
    use tracing_subscriber::{prelude::*, EnvFilter};

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let log_config = &config.logging;
    let subscriber = tracing_subscriber::registry().with(env_filter);

    match &log_config.target {
        LogTarget::Console => {
            init_console_logging(subscriber, &log_config.format);
            None
        }
        LogTarget::File => {
            let (writer, guard) = create_file_writer(log_config);
            init_file_logging(subscriber, &log_config.format, writer);
            Some(guard)
        }
        LogTarget::Both => {
            let (writer, guard) = create_file_writer(log_config);
            init_both_logging(subscriber, &log_config.format, writer);
            Some(guard)
        }
    }
}

/// Create a file writer with optional daily rotation
fn create_file_writer(
    log_config: &LoggingConfig,
) -> (
    tracing_appender::non_blocking::NonBlocking,
    tracing_appender::non_blocking::WorkerGuard,
) {
    if let Err(e) = std::fs::create_dir_all(&log_config.log_dir) {
        eprintln!(
            "Warning: Failed to create log directory {:?}: {}",
            log_config.log_dir, e
        );
    }

    let rotation = if log_config.daily_rotation {
        tracing_appender::rolling::Rotation::DAILY
    } else {
        tracing_appender::rolling::Rotation::NEVER
    };

    let mut builder = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(&log_config.log_prefix)
        .filename_suffix("log");
    if log_config.max_log_files > 0 {
        builder = builder.max_log_files(log_config.max_log_files);
    }

    match builder.build(&log_config.log_dir) {
        Ok(appender) => tracing_appender::non_blocking(appender),
        Err(e) => {
            eprintln!(
                "Warning: Failed to open log file in {:?}: {}, logging to stderr",
                log_config.log_dir, e
            );
            tracing_appender::non_blocking(std::io::stderr())
        }
    }
}

/// Initialize console-only logging
fn init_console_logging<S>(subscriber: S, format: &LogFormat)
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_target(true))
            .init(),
        LogFormat::Compact => subscriber
            .with(fmt::layer().compact().with_target(false))
            .init(),
        LogFormat::Pretty => subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init(),
    }
}

/// Initialize file-only logging
fn init_file_logging<S>(
    subscriber: S,
    format: &LogFormat,
    writer: tracing_appender::non_blocking::NonBlocking,
) where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_target(true).with_writer(writer))
            .init(),
        LogFormat::Compact => subscriber
            .with(fmt::layer().compact().with_target(false).with_writer(writer))
            .init(),
        LogFormat::Pretty => subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .init(),
    }
}

/// Initialize both console and file logging
fn init_both_logging<S>(
    subscriber: S,
    format: &LogFormat,
    writer: tracing_appender::non_blocking::NonBlocking,
) where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a> + Send + Sync,
{
    use tracing_subscriber::{fmt, prelude::*};

    match format {
        LogFormat::Json => subscriber
            .with(fmt::layer().json().with_target(true))
            .with(fmt::layer().json().with_target(true).with_writer(writer))
            .init(),
        LogFormat::Compact => subscriber
            .with(fmt::layer().compact().with_target(false))
            .with(fmt::layer().compact().with_target(false).with_writer(writer))
            .init(),
        LogFormat::Pretty => subscriber
            .with(fmt::layer().with_target(true))
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(writer),
            )
            .init(),
    }
}

/// Ensure the directory holding the SQLite file exists
fn ensure_data_directory(config: &AppConfig) -> Result<()> {
    if let Some(path) = config.database.url.strip_prefix("sqlite://") {
        let path = path.split('?').next().unwrap_or(path);
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).context("Failed to create data directory")?;
                info!("Created data directory: {:?}", parent);
            }
        }
    }
    Ok(())
}

/// Create the application router with all routes and middleware
fn create_router(state: AppState) -> Router {
    // The execution layer and dashboards may live on other hosts
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .nest("/api/v1", api::routes())
        .with_state(state)
        .layer(trace_layer)
        .layer(cors)
}

/// Apply migrations and check that every table exists
async fn migrate_database() -> Result<()> {
    use sqlx::Row;

    println!("deployd database migration v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let config = AppConfig::load().context("Failed to load configuration")?;
    ensure_data_directory(&config)?;

    println!("Database URL: {}", config.database.url);
    println!("Running database migrations...");

    let pool = db::init_pool(&config.database)
        .await
        .context("Failed to initialize database")?;

    let rows = sqlx::query(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%'",
    )
    .fetch_all(&pool)
    .await
    .context("Failed to query database tables")?;

    let existing: Vec<String> = rows.iter().map(|row| row.get::<String, _>("name")).collect();

    let missing: Vec<&str> = REQUIRED_TABLES
        .iter()
        .filter(|&&table| !existing.iter().any(|t| t == table))
        .copied()
        .collect();

    if !missing.is_empty() {
        eprintln!("Missing table(s) after migrations:");
        for table in &missing {
            eprintln!("  - {}", table);
        }
        anyhow::bail!("Database migration incomplete: {} missing tables", missing.len());
    }

    println!("All {} required tables are present.", REQUIRED_TABLES.len());
    Ok(())
}

/// Print help message
fn print_help() {
    println!(
        r#"deployd {}

USAGE:
    deployd [OPTIONS]

OPTIONS:
    -h, --help              Print this help message
    -V, --version           Print version information
    --migrate               Apply database migrations, verify the schema and exit

ENVIRONMENT:
    DEPLOYD_CONFIG              Path to configuration file (default: config.yaml)
    DATABASE_URL                SQLite database URL
    DEPLOYD_HOST, DEPLOYD_PORT  Listen address
    DEPLOYD_ADMIN_NETWORK_MAC   MAC address of the master node on the admin network
    DEPLOYD_DUMP_URL_PREFIX     URL prefix of environment dumps
    RUST_LOG                    Log filter

CONFIGURATION:
    The application looks for configuration files in the following order:
    1. Path specified by DEPLOYD_CONFIG environment variable
    2. ./config.yaml, ./config/config.yaml
    3. /etc/deployd/config.yaml
    4. <user config dir>/deployd/config.yaml"#,
        env!("CARGO_PKG_VERSION")
    );
}
