//! Task data model
//!
//! A task is one instance of an asynchronous operation delegated to the
//! remote execution layer. Its `cache` is the snapshot of the arguments the
//! operation was launched with and is never rewritten after creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NodeId;

/// Kind of asynchronous operation a task tracks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Deploy,
    Provision,
    VerifyNetworks,
    CheckDhcp,
    RemoveNodes,
    RemoveCluster,
    StopDeployment,
    ResetEnvironment,
    RedhatCheck,
    DownloadRelease,
    DumpEnvironment,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::Deploy => "deploy",
            TaskKind::Provision => "provision",
            TaskKind::VerifyNetworks => "verify_networks",
            TaskKind::CheckDhcp => "check_dhcp",
            TaskKind::RemoveNodes => "remove_nodes",
            TaskKind::RemoveCluster => "remove_cluster",
            TaskKind::StopDeployment => "stop_deployment",
            TaskKind::ResetEnvironment => "reset_environment",
            TaskKind::RedhatCheck => "redhat_check",
            TaskKind::DownloadRelease => "download_release",
            TaskKind::DumpEnvironment => "dump_environment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "deploy" => Some(TaskKind::Deploy),
            "provision" => Some(TaskKind::Provision),
            "verify_networks" => Some(TaskKind::VerifyNetworks),
            "check_dhcp" => Some(TaskKind::CheckDhcp),
            "remove_nodes" => Some(TaskKind::RemoveNodes),
            "remove_cluster" => Some(TaskKind::RemoveCluster),
            "stop_deployment" => Some(TaskKind::StopDeployment),
            "reset_environment" => Some(TaskKind::ResetEnvironment),
            "redhat_check" => Some(TaskKind::RedhatCheck),
            "download_release" => Some(TaskKind::DownloadRelease),
            "dump_environment" => Some(TaskKind::DumpEnvironment),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Task status
///
/// `Ready` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Running,
    Ready,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Running => "running",
            TaskStatus::Ready => "ready",
            TaskStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(TaskStatus::Running),
            "ready" => Some(TaskStatus::Ready),
            "error" => Some(TaskStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Ready | TaskStatus::Error)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of the arguments a task was launched with
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskCache {
    #[serde(default)]
    pub args: TaskArgs,
}

/// Launch arguments that later reports are reconciled against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskArgs {
    /// Nodes expected to answer a network verification, with the VLANs
    /// each interface was asked to probe
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nodes: Option<Vec<CachedNode>>,

    /// Release a release-pipeline task operates on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_info: Option<ReleaseInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedNode {
    #[serde(deserialize_with = "super::report::deserialize_node_id")]
    pub uid: NodeId,
    #[serde(default)]
    pub networks: Vec<CachedNetwork>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedNetwork {
    pub iface: String,
    #[serde(default)]
    pub vlans: Vec<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseInfo {
    pub release_id: i64,
}

/// A persisted asynchronous operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub uuid: String,
    pub kind: TaskKind,
    pub status: TaskStatus,
    pub progress: u8,
    pub message: Option<String>,
    pub result: serde_json::Value,
    pub cache: TaskCache,
    pub cluster_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Data needed to create a task
#[derive(Debug, Clone)]
pub struct NewTask {
    pub uuid: String,
    pub kind: TaskKind,
    pub cluster_id: Option<i64>,
    pub parent_id: Option<i64>,
    pub cache: TaskCache,
}

impl NewTask {
    pub fn new(kind: TaskKind, cluster_id: Option<i64>) -> Self {
        Self {
            uuid: uuid::Uuid::new_v4().to_string(),
            kind,
            cluster_id,
            parent_id: None,
            cache: TaskCache::default(),
        }
    }

    pub fn with_cache(mut self, cache: TaskCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_parent(mut self, parent_id: i64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}
