//! Release repository

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection};

use super::{decode_enum, decode_timestamp};
use crate::models::{Release, ReleaseState};

/// Repository for release operations
pub struct ReleaseRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ReleaseRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &mut self,
        name: &str,
        version: &str,
        state: ReleaseState,
    ) -> Result<Release, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO releases (name, version, state, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            "#,
        )
        .bind(name)
        .bind(version)
        .bind(state.as_str())
        .bind(&now)
        .execute(&mut *self.conn)
        .await?;

        self.get(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(&mut self, id: i64) -> Result<Option<Release>, sqlx::Error> {
        let row = sqlx::query_as::<_, ReleaseRow>("SELECT * FROM releases WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.map(Release::try_from).transpose()
    }

    /// Take the write lock on a release and read it
    pub async fn lock(&mut self, id: i64) -> Result<Option<Release>, sqlx::Error> {
        sqlx::query("UPDATE releases SET id = id WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        self.get(id).await
    }

    pub async fn set_state(&mut self, id: i64, state: ReleaseState) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        sqlx::query("UPDATE releases SET state = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(state.as_str())
            .bind(&now)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        Ok(())
    }
}

#[derive(Debug, FromRow)]
struct ReleaseRow {
    id: i64,
    name: String,
    version: String,
    state: String,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ReleaseRow> for Release {
    type Error = sqlx::Error;

    fn try_from(row: ReleaseRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            version: row.version,
            state: decode_enum("state", &row.state, ReleaseState::parse)?,
            created_at: decode_timestamp("created_at", &row.created_at)?,
            updated_at: decode_timestamp("updated_at", &row.updated_at)?,
        })
    }
}
