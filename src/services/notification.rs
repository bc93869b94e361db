//! Notification service for user-facing event messages
//!
//! Notifications are written to the store by the report's unit of work and
//! only broadcast to live subscribers once that unit has committed.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::debug;

use crate::db::{DbPool, NotificationRepository};
use crate::models::{Notification, NotificationQuery};
use crate::utils::AppError;

/// Notification service
#[derive(Clone)]
pub struct NotificationService {
    db: DbPool,
    broadcast: Arc<broadcast::Sender<NotificationEvent>>,
}

/// Notification event for broadcasting
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    New(Notification),
    Updated(Notification),
}

impl NotificationService {
    /// Create a new notification service
    pub fn new(db: DbPool) -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self {
            db,
            broadcast: Arc::new(tx),
        }
    }

    /// Subscribe to notification events
    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.broadcast.subscribe()
    }

    /// Broadcast notifications that have been committed to the store
    pub fn publish(&self, notifications: Vec<Notification>) {
        for notification in notifications {
            debug!(
                topic = %notification.topic,
                cluster_id = ?notification.cluster_id,
                "Publishing notification"
            );
            // No subscribers is fine
            let _ = self.broadcast.send(NotificationEvent::New(notification));
        }
    }

    /// List stored notifications, newest first
    pub async fn list(&self, query: &NotificationQuery) -> Result<Vec<Notification>, AppError> {
        let mut conn = self.db.acquire().await?;
        let notifications = NotificationRepository::new(&mut conn).list(query).await?;
        Ok(notifications)
    }

    /// Mark a notification as read
    pub async fn mark_as_read(&self, id: i64) -> Result<Notification, AppError> {
        let mut conn = self.db.acquire().await?;
        let notification = NotificationRepository::new(&mut conn)
            .mark_as_read(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Notification not found".to_string()))?;

        let _ = self
            .broadcast
            .send(NotificationEvent::Updated(notification.clone()));

        Ok(notification)
    }
}
