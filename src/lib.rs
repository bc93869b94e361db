//! deployd library
//!
//! Receives asynchronous task reports from the remote execution layer and
//! reconciles them into cluster, node, release and task state.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
use services::{NotificationService, Receiver};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    /// Report receiver
    pub receiver: Arc<Receiver>,
    /// Notification service
    pub notifications: Arc<NotificationService>,
}

impl AppState {
    /// Wire the services around an initialised pool
    pub fn new(config: AppConfig, db: DbPool) -> Self {
        let notifications = Arc::new(NotificationService::new(db.clone()));
        let receiver = Arc::new(Receiver::new(
            db.clone(),
            config.receiver.clone(),
            notifications.clone(),
        ));

        Self {
            config,
            db,
            receiver,
            notifications,
        }
    }
}
