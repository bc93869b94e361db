//! Cluster repository
//!
//! Clusters, their network groups, IP allocations and pending changes.

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection};

use super::{decode_enum, decode_timestamp};
use crate::models::{
    Cluster, ClusterChange, ClusterMode, ClusterStatus, NetworkGroup, NewCluster, NodeId,
    PendingChange,
};

/// Repository for cluster operations
pub struct ClusterRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> ClusterRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    // =========================================================================
    // Clusters
    // =========================================================================

    pub async fn create(&mut self, cluster: &NewCluster) -> Result<Cluster, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO clusters (name, status, mode, release_id, public_vip, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
        )
        .bind(&cluster.name)
        .bind(cluster.status.as_str())
        .bind(cluster.mode.as_str())
        .bind(cluster.release_id)
        .bind(cluster.public_vip.as_deref())
        .bind(&now)
        .execute(&mut *self.conn)
        .await?;

        self.get(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(&mut self, id: i64) -> Result<Option<Cluster>, sqlx::Error> {
        let row = sqlx::query_as::<_, ClusterRow>("SELECT * FROM clusters WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.map(Cluster::try_from).transpose()
    }

    /// Take the write lock on a cluster and read it
    pub async fn lock(&mut self, id: i64) -> Result<Option<Cluster>, sqlx::Error> {
        sqlx::query("UPDATE clusters SET id = id WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        self.get(id).await
    }

    pub async fn set_status(&mut self, id: i64, status: ClusterStatus) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        sqlx::query("UPDATE clusters SET status = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(status.as_str())
            .bind(&now)
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        Ok(())
    }

    /// Delete a cluster; its network groups and pending changes go with it
    pub async fn delete(&mut self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM clusters WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Networks
    // =========================================================================

    pub async fn add_network_group(
        &mut self,
        cluster_id: i64,
        name: &str,
        cidr: Option<&str>,
        vlan_start: Option<i64>,
    ) -> Result<NetworkGroup, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO network_groups (cluster_id, name, cidr, vlan_start) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(cluster_id)
        .bind(name)
        .bind(cidr)
        .bind(vlan_start)
        .execute(&mut *self.conn)
        .await?;

        Ok(NetworkGroup {
            id: result.last_insert_rowid(),
            cluster_id,
            name: name.to_string(),
            cidr: cidr.map(String::from),
            vlan_start,
        })
    }

    pub async fn network_groups(&mut self, cluster_id: i64) -> Result<Vec<NetworkGroup>, sqlx::Error> {
        sqlx::query_as::<_, NetworkGroupRow>(
            "SELECT * FROM network_groups WHERE cluster_id = ?1 ORDER BY id ASC",
        )
        .bind(cluster_id)
        .fetch_all(&mut *self.conn)
        .await
        .map(|rows| rows.into_iter().map(NetworkGroup::from).collect())
    }

    pub async fn assign_ip(
        &mut self,
        network_id: i64,
        node_id: NodeId,
        ip_addr: &str,
    ) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO ip_addrs (network_id, node_id, ip_addr) VALUES (?1, ?2, ?3)")
            .bind(network_id)
            .bind(node_id)
            .bind(ip_addr)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Release every IP allocation in the cluster's network groups
    pub async fn delete_ip_addrs(&mut self, cluster_id: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            r#"
            DELETE FROM ip_addrs
            WHERE network_id IN (SELECT id FROM network_groups WHERE cluster_id = ?1)
            "#,
        )
        .bind(cluster_id)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected())
    }

    // =========================================================================
    // Pending changes
    // =========================================================================

    /// Record a pending change unless the same one is already recorded
    pub async fn add_pending_change(
        &mut self,
        cluster_id: i64,
        change: PendingChange,
        node_id: Option<NodeId>,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO cluster_changes (cluster_id, name, node_id)
            SELECT ?1, ?2, ?3
            WHERE NOT EXISTS (
                SELECT 1 FROM cluster_changes
                WHERE cluster_id = ?1 AND name = ?2 AND node_id IS ?3
            )
            "#,
        )
        .bind(cluster_id)
        .bind(change.as_str())
        .bind(node_id)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    pub async fn pending_changes(&mut self, cluster_id: i64) -> Result<Vec<ClusterChange>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ClusterChangeRow>(
            "SELECT name, node_id FROM cluster_changes WHERE cluster_id = ?1 ORDER BY id ASC",
        )
        .bind(cluster_id)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(ClusterChange::try_from).collect()
    }
}

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, FromRow)]
struct ClusterRow {
    id: i64,
    name: String,
    status: String,
    mode: String,
    release_id: Option<i64>,
    public_vip: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<ClusterRow> for Cluster {
    type Error = sqlx::Error;

    fn try_from(row: ClusterRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            status: decode_enum("status", &row.status, ClusterStatus::parse)?,
            mode: decode_enum("mode", &row.mode, ClusterMode::parse)?,
            release_id: row.release_id,
            public_vip: row.public_vip,
            created_at: decode_timestamp("created_at", &row.created_at)?,
            updated_at: decode_timestamp("updated_at", &row.updated_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct NetworkGroupRow {
    id: i64,
    cluster_id: i64,
    name: String,
    cidr: Option<String>,
    vlan_start: Option<i64>,
}

impl From<NetworkGroupRow> for NetworkGroup {
    fn from(row: NetworkGroupRow) -> Self {
        Self {
            id: row.id,
            cluster_id: row.cluster_id,
            name: row.name,
            cidr: row.cidr,
            vlan_start: row.vlan_start,
        }
    }
}

#[derive(Debug, FromRow)]
struct ClusterChangeRow {
    name: String,
    node_id: Option<i64>,
}

impl TryFrom<ClusterChangeRow> for ClusterChange {
    type Error = sqlx::Error;

    fn try_from(row: ClusterChangeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            name: decode_enum("name", &row.name, PendingChange::parse)?,
            node_id: row.node_id,
        })
    }
}
