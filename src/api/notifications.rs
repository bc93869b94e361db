//! Notification API endpoints

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    response::{
        sse::{Event, KeepAlive},
        Json, Sse,
    },
    routing::{get, put},
    Router,
};
use futures::stream::{Stream, StreamExt};
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tracing::warn;

use crate::models::NotificationQuery;
use crate::services::NotificationEvent;
use crate::utils::AppError;
use crate::AppState;

/// Create notification routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notifications))
        .route("/stream", get(notification_stream))
        .route("/{id}/read", put(mark_notification_read))
}

/// List notifications, newest first
async fn list_notifications(
    State(state): State<AppState>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<serde_json::Value>, AppError> {
    let notifications = state.notifications.list(&query).await?;
    Ok(Json(json!({ "notifications": notifications })))
}

/// Mark a notification as read
async fn mark_notification_read(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, AppError> {
    let notification = state.notifications.mark_as_read(id).await?;
    Ok(Json(json!({ "notification": notification })))
}

/// Server-Sent Events stream of notifications as they are committed
async fn notification_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.notifications.subscribe();

    let stream = BroadcastStream::new(receiver).filter_map(|result| async move {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Notification stream lagged");
                return None;
            }
        };

        let data = match event {
            NotificationEvent::New(notification) => json!({
                "type": "new",
                "notification": notification
            }),
            NotificationEvent::Updated(notification) => json!({
                "type": "updated",
                "notification": notification
            }),
        };

        Event::default().json_data(data).ok().map(Ok)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
