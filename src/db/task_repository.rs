//! Task repository

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection};

use super::{decode_enum, decode_json, decode_progress, decode_timestamp, encode_json, placeholders};
use crate::models::{NewTask, Task, TaskKind, TaskStatus};

/// Repository for task operations
pub struct TaskRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> TaskRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    /// Create a task in the `running` state
    pub async fn create(&mut self, task: &NewTask) -> Result<Task, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO tasks (uuid, name, status, progress, result, cache, cluster_id, parent_id, created_at, updated_at)
            VALUES (?1, ?2, 'running', 0, '{}', ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(&task.uuid)
        .bind(task.kind.as_str())
        .bind(encode_json(&task.cache)?)
        .bind(task.cluster_id)
        .bind(task.parent_id)
        .bind(&now)
        .execute(&mut *self.conn)
        .await?;

        self.get_by_id(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get_by_id(&mut self, id: i64) -> Result<Option<Task>, sqlx::Error> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.map(Task::try_from).transpose()
    }

    pub async fn get_by_uuid(&mut self, uuid: &str) -> Result<Option<Task>, sqlx::Error> {
        let row = sqlx::query_as::<_, TaskRow>("SELECT * FROM tasks WHERE uuid = ?1")
            .bind(uuid)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.map(Task::try_from).transpose()
    }

    /// Take the write lock on a task and read it
    pub async fn lock_by_uuid(&mut self, uuid: &str) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query("UPDATE tasks SET id = id WHERE uuid = ?1")
            .bind(uuid)
            .execute(&mut *self.conn)
            .await?;

        self.get_by_uuid(uuid).await
    }

    pub async fn lock_by_id(&mut self, id: i64) -> Result<Option<Task>, sqlx::Error> {
        sqlx::query("UPDATE tasks SET id = id WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        self.get_by_id(id).await
    }

    /// Sub-tasks of a task, oldest first
    pub async fn children(&mut self, parent_id: i64) -> Result<Vec<Task>, sqlx::Error> {
        let rows = sqlx::query_as::<_, TaskRow>(
            "SELECT * FROM tasks WHERE parent_id = ?1 ORDER BY id ASC",
        )
        .bind(parent_id)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(Task::try_from).collect()
    }

    /// Tasks of the given kinds that belong to a cluster
    pub async fn filter_by_cluster(
        &mut self,
        cluster_id: i64,
        kinds: &[TaskKind],
    ) -> Result<Vec<Task>, sqlx::Error> {
        if kinds.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM tasks WHERE cluster_id = ? AND name IN ({}) ORDER BY id ASC",
            placeholders(kinds.len())
        );
        let mut query = sqlx::query_as::<_, TaskRow>(&sql).bind(cluster_id);
        for kind in kinds {
            query = query.bind(kind.as_str());
        }

        let rows = query.fetch_all(&mut *self.conn).await?;
        rows.into_iter().map(Task::try_from).collect()
    }

    /// Persist the mutable state of a task
    pub async fn update(&mut self, task: &Task) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            UPDATE tasks
            SET status = ?1, progress = ?2, message = ?3, result = ?4, updated_at = ?5
            WHERE id = ?6
            "#,
        )
        .bind(task.status.as_str())
        .bind(i64::from(task.progress))
        .bind(task.message.as_deref())
        .bind(encode_json(&task.result)?)
        .bind(&now)
        .bind(task.id)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn delete_many(&mut self, ids: &[i64]) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("DELETE FROM tasks WHERE id IN ({})", placeholders(ids.len()));
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        Ok(query.execute(&mut *self.conn).await?.rows_affected())
    }
}

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, FromRow)]
struct TaskRow {
    id: i64,
    uuid: String,
    name: String,
    status: String,
    progress: i64,
    message: Option<String>,
    result: String,
    cache: String,
    cluster_id: Option<i64>,
    parent_id: Option<i64>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<TaskRow> for Task {
    type Error = sqlx::Error;

    fn try_from(row: TaskRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            uuid: row.uuid,
            kind: decode_enum("name", &row.name, TaskKind::parse)?,
            status: decode_enum("status", &row.status, TaskStatus::parse)?,
            progress: decode_progress(row.progress),
            message: row.message,
            result: decode_json("result", &row.result)?,
            cache: decode_json("cache", &row.cache)?,
            cluster_id: row.cluster_id,
            parent_id: row.parent_id,
            created_at: decode_timestamp("created_at", &row.created_at)?,
            updated_at: decode_timestamp("updated_at", &row.updated_at)?,
        })
    }
}
