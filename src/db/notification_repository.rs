//! Notification repository

use chrono::Utc;
use sqlx::SqliteConnection;

use crate::models::{NewNotification, Notification, NotificationQuery};

/// Default and maximum page size for listings
const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

pub struct NotificationRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> NotificationRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn create(&mut self, notification: &NewNotification) -> Result<Notification, sqlx::Error> {
        let created_at = Utc::now().to_rfc3339();

        sqlx::query_as::<_, Notification>(
            r#"
            INSERT INTO notifications (topic, message, cluster_id, node_id, task_id, status, created_at)
            VALUES (?, ?, ?, ?, ?, 'unread', ?)
            RETURNING *
            "#,
        )
        .bind(notification.topic.as_str())
        .bind(&notification.message)
        .bind(notification.cluster_id)
        .bind(notification.node_id)
        .bind(notification.task_id)
        .bind(&created_at)
        .fetch_one(&mut *self.conn)
        .await
    }

    /// Most recent notifications first
    pub async fn list(&mut self, query: &NotificationQuery) -> Result<Vec<Notification>, sqlx::Error> {
        let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

        sqlx::query_as::<_, Notification>(
            r#"
            SELECT * FROM notifications
            WHERE (?1 IS NULL OR topic = ?1)
              AND (?2 IS NULL OR cluster_id = ?2)
            ORDER BY id DESC
            LIMIT ?3
            "#,
        )
        .bind(query.topic.map(|t| t.as_str()))
        .bind(query.cluster_id)
        .bind(limit)
        .fetch_all(&mut *self.conn)
        .await
    }

    pub async fn mark_as_read(&mut self, id: i64) -> Result<Option<Notification>, sqlx::Error> {
        sqlx::query_as::<_, Notification>(
            "UPDATE notifications SET status = 'read' WHERE id = ?1 RETURNING *",
        )
        .bind(id)
        .fetch_optional(&mut *self.conn)
        .await
    }
}
