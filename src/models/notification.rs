//! Notification model and types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a user-facing notification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationTopic {
    Done,
    Error,
    Warning,
}

impl NotificationTopic {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationTopic::Done => "done",
            NotificationTopic::Error => "error",
            NotificationTopic::Warning => "warning",
        }
    }
}

impl std::fmt::Display for NotificationTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for NotificationTopic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "done" => Ok(NotificationTopic::Done),
            "error" => Ok(NotificationTopic::Error),
            "warning" => Ok(NotificationTopic::Warning),
            _ => Err(format!("Invalid notification topic: {}", s)),
        }
    }
}

/// Notification model
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub topic: NotificationTopic,
    pub message: String,
    pub cluster_id: Option<i64>,
    pub node_id: Option<i64>,
    pub task_id: Option<i64>,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

impl sqlx::FromRow<'_, sqlx::sqlite::SqliteRow> for Notification {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;

        Ok(Self {
            id: row.try_get("id")?,
            topic: {
                let topic_str: String = row.try_get("topic")?;
                topic_str.parse().map_err(|e: String| sqlx::Error::ColumnDecode {
                    index: "topic".to_string(),
                    source: Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e)),
                })?
            },
            message: row.try_get("message")?,
            cluster_id: row.try_get("cluster_id")?,
            node_id: row.try_get("node_id")?,
            task_id: row.try_get("task_id")?,
            read: {
                let status: String = row.try_get("status")?;
                status == "read"
            },
            created_at: {
                let created: String = row.try_get("created_at")?;
                DateTime::parse_from_rfc3339(&created)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| sqlx::Error::ColumnDecode {
                        index: "created_at".to_string(),
                        source: Box::new(e),
                    })?
            },
        })
    }
}

/// A notification about to be recorded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub topic: NotificationTopic,
    pub message: String,
    pub cluster_id: Option<i64>,
    pub node_id: Option<i64>,
    pub task_id: Option<i64>,
}

impl NewNotification {
    pub fn new(topic: NotificationTopic, message: impl Into<String>) -> Self {
        Self {
            topic,
            message: message.into(),
            cluster_id: None,
            node_id: None,
            task_id: None,
        }
    }

    pub fn done(message: impl Into<String>) -> Self {
        Self::new(NotificationTopic::Done, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NotificationTopic::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(NotificationTopic::Warning, message)
    }

    pub fn for_cluster(mut self, cluster_id: Option<i64>) -> Self {
        self.cluster_id = cluster_id;
        self
    }

    pub fn for_node(mut self, node_id: i64) -> Self {
        self.node_id = Some(node_id);
        self
    }

    pub fn for_task(mut self, task_id: i64) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

/// Notification query parameters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<NotificationTopic>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cluster_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,
}
