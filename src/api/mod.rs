//! API routes and handlers
//!
//! This module defines all API endpoints and their routing.

use axum::{
    routing::{get, post},
    Router,
};

use crate::AppState;

mod health;
mod notifications;
mod rpc;
mod tasks;

pub use health::*;
pub use rpc::RpcAccepted;

/// All API routes, to be nested under `/api/v1`
pub fn routes() -> Router<AppState> {
    Router::new()
        // Health check endpoints
        .route("/health", get(health::health_check))
        .route("/health/detailed", get(health::health_check_detailed))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        // Report intake from the execution layer
        .route("/rpc", post(rpc::receive_report))
        // Task state
        .nest("/tasks", tasks::routes())
        // User-facing notifications
        .nest("/notifications", notifications::routes())
}
