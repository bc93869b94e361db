//! Cluster (environment) data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a cluster
///
/// Derived from the outcome of the cluster's tasks, never set on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    New,
    Deploying,
    Stopped,
    Error,
    Operational,
}

impl ClusterStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterStatus::New => "new",
            ClusterStatus::Deploying => "deploying",
            ClusterStatus::Stopped => "stopped",
            ClusterStatus::Error => "error",
            ClusterStatus::Operational => "operational",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "new" => Some(ClusterStatus::New),
            "deploying" => Some(ClusterStatus::Deploying),
            "stopped" => Some(ClusterStatus::Stopped),
            "error" => Some(ClusterStatus::Error),
            "operational" => Some(ClusterStatus::Operational),
            _ => None,
        }
    }
}

impl std::fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Deployment mode of a cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClusterMode {
    Singlenode,
    Multinode,
    HaCompact,
    HaFull,
}

impl ClusterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterMode::Singlenode => "singlenode",
            ClusterMode::Multinode => "multinode",
            ClusterMode::HaCompact => "ha_compact",
            ClusterMode::HaFull => "ha_full",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "singlenode" => Some(ClusterMode::Singlenode),
            "multinode" => Some(ClusterMode::Multinode),
            "ha_compact" => Some(ClusterMode::HaCompact),
            "ha_full" => Some(ClusterMode::HaFull),
            _ => None,
        }
    }

    pub fn is_ha(&self) -> bool {
        matches!(self, ClusterMode::HaCompact | ClusterMode::HaFull)
    }
}

impl std::fmt::Display for ClusterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A deployment environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: i64,
    pub name: String,
    pub status: ClusterStatus,
    pub mode: ClusterMode,
    pub release_id: Option<i64>,
    /// Virtual IP on the public network (HA modes only)
    pub public_vip: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cluster {
    /// Name for user-facing messages; unnamed clusters fall back to their id
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            self.id.to_string()
        } else {
            self.name.clone()
        }
    }
}

/// A network of a cluster (public, management, storage, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkGroup {
    pub id: i64,
    pub cluster_id: i64,
    pub name: String,
    pub cidr: Option<String>,
    pub vlan_start: Option<i64>,
}

/// Kind of change pending on a cluster until its next deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingChange {
    Attributes,
    Networks,
    Disks,
}

impl PendingChange {
    pub fn as_str(&self) -> &'static str {
        match self {
            PendingChange::Attributes => "attributes",
            PendingChange::Networks => "networks",
            PendingChange::Disks => "disks",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "attributes" => Some(PendingChange::Attributes),
            "networks" => Some(PendingChange::Networks),
            "disks" => Some(PendingChange::Disks),
            _ => None,
        }
    }
}

/// A recorded pending change, optionally scoped to one node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterChange {
    pub name: PendingChange,
    pub node_id: Option<i64>,
}

/// Data needed to create a cluster
#[derive(Debug, Clone)]
pub struct NewCluster {
    pub name: String,
    pub mode: ClusterMode,
    pub status: ClusterStatus,
    pub release_id: Option<i64>,
    pub public_vip: Option<String>,
}

impl NewCluster {
    pub fn new(name: impl Into<String>, mode: ClusterMode) -> Self {
        Self {
            name: name.into(),
            mode,
            status: ClusterStatus::New,
            release_id: None,
            public_vip: None,
        }
    }
}
