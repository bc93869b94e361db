//! Node repository
//!
//! Database operations for nodes and their network interfaces.

use chrono::Utc;
use sqlx::{FromRow, SqliteConnection};

use super::{decode_enum, decode_json, decode_progress, decode_timestamp, encode_json, placeholders};
use crate::models::{
    NewNode, Node, NodeErrorType, NodeId, NodeInterface, NodeStatus,
};

/// Repository for node operations
pub struct NodeRepository<'c> {
    conn: &'c mut SqliteConnection,
}

impl<'c> NodeRepository<'c> {
    pub fn new(conn: &'c mut SqliteConnection) -> Self {
        Self { conn }
    }

    // =========================================================================
    // Nodes
    // =========================================================================

    pub async fn create(&mut self, node: &NewNode) -> Result<Node, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT INTO nodes (
                name, cluster_id, status, online, pending_addition, pending_deletion,
                roles, pending_roles, ip, mac, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
            "#,
        )
        .bind(&node.name)
        .bind(node.cluster_id)
        .bind(node.status.unwrap_or(NodeStatus::Discover).as_str())
        .bind(node.online.unwrap_or(true))
        .bind(node.pending_addition)
        .bind(node.pending_deletion)
        .bind(encode_json(&node.roles)?)
        .bind(encode_json(&node.pending_roles)?)
        .bind(node.ip.as_deref())
        .bind(node.mac.as_deref())
        .bind(&now)
        .execute(&mut *self.conn)
        .await?;

        self.get(result.last_insert_rowid())
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn get(&mut self, id: NodeId) -> Result<Option<Node>, sqlx::Error> {
        let row = sqlx::query_as::<_, NodeRow>("SELECT * FROM nodes WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *self.conn)
            .await?;

        row.map(Node::try_from).transpose()
    }

    /// Take the write lock on a node and read it
    pub async fn lock(&mut self, id: NodeId) -> Result<Option<Node>, sqlx::Error> {
        sqlx::query("UPDATE nodes SET id = id WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        self.get(id).await
    }

    /// Nodes with the given ids, in id order; unknown ids are skipped
    pub async fn get_many(&mut self, ids: &[NodeId]) -> Result<Vec<Node>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "SELECT * FROM nodes WHERE id IN ({}) ORDER BY id ASC",
            placeholders(ids.len())
        );
        let mut query = sqlx::query_as::<_, NodeRow>(&sql);
        for id in ids {
            query = query.bind(*id);
        }

        let rows = query.fetch_all(&mut *self.conn).await?;
        rows.into_iter().map(Node::try_from).collect()
    }

    /// All nodes of a cluster, in id order
    pub async fn filter_by_cluster(&mut self, cluster_id: i64) -> Result<Vec<Node>, sqlx::Error> {
        let rows = sqlx::query_as::<_, NodeRow>(
            "SELECT * FROM nodes WHERE cluster_id = ?1 ORDER BY id ASC",
        )
        .bind(cluster_id)
        .fetch_all(&mut *self.conn)
        .await?;

        rows.into_iter().map(Node::try_from).collect()
    }

    /// Nodes of a cluster that failed at one of the given stages
    ///
    /// A node counts as failed when its status is `error` or it is offline.
    pub async fn failed_in_cluster(
        &mut self,
        cluster_id: i64,
        error_types: &[NodeErrorType],
    ) -> Result<Vec<Node>, sqlx::Error> {
        if error_types.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT * FROM nodes
            WHERE cluster_id = ?
              AND (status = 'error' OR online = 0)
              AND error_type IN ({})
            ORDER BY id ASC
            "#,
            placeholders(error_types.len())
        );
        let mut query = sqlx::query_as::<_, NodeRow>(&sql).bind(cluster_id);
        for error_type in error_types {
            query = query.bind(error_type.as_str());
        }

        let rows = query.fetch_all(&mut *self.conn).await?;
        rows.into_iter().map(Node::try_from).collect()
    }

    /// Lock the nodes with the given ids
    pub async fn lock_many(&mut self, ids: &[NodeId]) -> Result<Vec<Node>, sqlx::Error> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "UPDATE nodes SET id = id WHERE id IN ({})",
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql);
        for id in ids {
            query = query.bind(*id);
        }
        query.execute(&mut *self.conn).await?;

        self.get_many(ids).await
    }

    /// Persist the mutable state of a node
    pub async fn update(&mut self, node: &Node) -> Result<(), sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            UPDATE nodes
            SET name = ?1, cluster_id = ?2, status = ?3, progress = ?4, online = ?5,
                error_type = ?6, error_msg = ?7, pending_addition = ?8, pending_deletion = ?9,
                roles = ?10, pending_roles = ?11, ip = ?12, mac = ?13, updated_at = ?14
            WHERE id = ?15
            "#,
        )
        .bind(&node.name)
        .bind(node.cluster_id)
        .bind(node.status.as_str())
        .bind(i64::from(node.progress))
        .bind(node.online)
        .bind(node.error_type.map(|t| t.as_str()))
        .bind(node.error_msg.as_deref())
        .bind(node.pending_addition)
        .bind(node.pending_deletion)
        .bind(encode_json(&node.roles)?)
        .bind(encode_json(&node.pending_roles)?)
        .bind(node.ip.as_deref())
        .bind(node.mac.as_deref())
        .bind(&now)
        .bind(node.id)
        .execute(&mut *self.conn)
        .await?;

        Ok(())
    }

    /// Clear the pending flags of every node in a cluster
    pub async fn clear_pending_flags(&mut self, cluster_id: i64) -> Result<u64, sqlx::Error> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            UPDATE nodes
            SET pending_addition = 0, pending_deletion = 0, updated_at = ?1
            WHERE cluster_id = ?2
            "#,
        )
        .bind(&now)
        .bind(cluster_id)
        .execute(&mut *self.conn)
        .await?;

        Ok(result.rows_affected())
    }

    /// Return cluster nodes to discovery so they can be deployed again
    ///
    /// Runs as a single set-based statement: nodes go offline in `discover`
    /// with `pending_addition` set, and `roles`/`pending_roles` are swapped.
    /// Only nodes that still belong to `cluster_id` are touched.
    pub async fn reset_for_redeployment(
        &mut self,
        cluster_id: i64,
        ids: &[NodeId],
        clear_pending_deletion: bool,
    ) -> Result<u64, sqlx::Error> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();
        let sql = format!(
            r#"
            UPDATE nodes
            SET online = 0,
                status = 'discover',
                pending_addition = 1,
                pending_deletion = CASE WHEN ? THEN 0 ELSE pending_deletion END,
                roles = pending_roles,
                pending_roles = roles,
                updated_at = ?
            WHERE cluster_id = ? AND id IN ({})
            "#,
            placeholders(ids.len())
        );
        let mut query = sqlx::query(&sql)
            .bind(clear_pending_deletion)
            .bind(&now)
            .bind(cluster_id);
        for id in ids {
            query = query.bind(*id);
        }

        Ok(query.execute(&mut *self.conn).await?.rows_affected())
    }

    pub async fn delete(&mut self, id: NodeId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM nodes WHERE id = ?1")
            .bind(id)
            .execute(&mut *self.conn)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Interfaces and addresses
    // =========================================================================

    pub async fn add_interface(
        &mut self,
        node_id: NodeId,
        name: &str,
        mac: &str,
    ) -> Result<NodeInterface, sqlx::Error> {
        let result = sqlx::query("INSERT INTO node_interfaces (node_id, name, mac) VALUES (?1, ?2, ?3)")
            .bind(node_id)
            .bind(name)
            .bind(mac)
            .execute(&mut *self.conn)
            .await?;

        Ok(NodeInterface {
            id: result.last_insert_rowid(),
            node_id,
            name: name.to_string(),
            mac: mac.to_string(),
        })
    }

    pub async fn interfaces(&mut self, node_id: NodeId) -> Result<Vec<NodeInterface>, sqlx::Error> {
        sqlx::query_as::<_, InterfaceRow>(
            "SELECT id, node_id, name, mac FROM node_interfaces WHERE node_id = ?1 ORDER BY id ASC",
        )
        .bind(node_id)
        .fetch_all(&mut *self.conn)
        .await
        .map(|rows| rows.into_iter().map(NodeInterface::from).collect())
    }

    /// Address of a node on the named network of its cluster, as stored (CIDR or bare)
    pub async fn network_ip(
        &mut self,
        node_id: NodeId,
        network_name: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT ip.ip_addr FROM ip_addrs ip
            JOIN network_groups ng ON ng.id = ip.network_id
            WHERE ip.node_id = ?1 AND ng.name = ?2
            ORDER BY ip.id ASC
            LIMIT 1
            "#,
        )
        .bind(node_id)
        .bind(network_name)
        .fetch_optional(&mut *self.conn)
        .await
    }
}

// ============================================================================
// Database Row Types
// ============================================================================

#[derive(Debug, FromRow)]
struct NodeRow {
    id: i64,
    name: String,
    cluster_id: Option<i64>,
    status: String,
    progress: i64,
    online: bool,
    error_type: Option<String>,
    error_msg: Option<String>,
    pending_addition: bool,
    pending_deletion: bool,
    roles: String,
    pending_roles: String,
    ip: Option<String>,
    mac: Option<String>,
    created_at: String,
    updated_at: String,
}

impl TryFrom<NodeRow> for Node {
    type Error = sqlx::Error;

    fn try_from(row: NodeRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            name: row.name,
            cluster_id: row.cluster_id,
            status: decode_enum("status", &row.status, NodeStatus::parse)?,
            progress: decode_progress(row.progress),
            online: row.online,
            error_type: row
                .error_type
                .as_deref()
                .map(|t| decode_enum("error_type", t, NodeErrorType::parse))
                .transpose()?,
            error_msg: row.error_msg,
            pending_addition: row.pending_addition,
            pending_deletion: row.pending_deletion,
            roles: decode_json("roles", &row.roles)?,
            pending_roles: decode_json("pending_roles", &row.pending_roles)?,
            ip: row.ip,
            mac: row.mac,
            created_at: decode_timestamp("created_at", &row.created_at)?,
            updated_at: decode_timestamp("updated_at", &row.updated_at)?,
        })
    }
}

#[derive(Debug, FromRow)]
struct InterfaceRow {
    id: i64,
    node_id: i64,
    name: String,
    mac: String,
}

impl From<InterfaceRow> for NodeInterface {
    fn from(row: InterfaceRow) -> Self {
        Self {
            id: row.id,
            node_id: row.node_id,
            name: row.name,
            mac: row.mac,
        }
    }
}
