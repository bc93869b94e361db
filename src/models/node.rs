//! Node data model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Node identifier (`uid` in reports)
pub type NodeId = i64;

/// Lifecycle status of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Discover,
    Provisioning,
    Provisioned,
    Deploying,
    Ready,
    Error,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Discover => "discover",
            NodeStatus::Provisioning => "provisioning",
            NodeStatus::Provisioned => "provisioned",
            NodeStatus::Deploying => "deploying",
            NodeStatus::Ready => "ready",
            NodeStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "discover" => Some(NodeStatus::Discover),
            "provisioning" => Some(NodeStatus::Provisioning),
            "provisioned" => Some(NodeStatus::Provisioned),
            "deploying" => Some(NodeStatus::Deploying),
            "ready" => Some(NodeStatus::Ready),
            "error" => Some(NodeStatus::Error),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Stage at which a node failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeErrorType {
    Provision,
    Deploy,
    Deletion,
    Network,
}

impl NodeErrorType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeErrorType::Provision => "provision",
            NodeErrorType::Deploy => "deploy",
            NodeErrorType::Deletion => "deletion",
            NodeErrorType::Network => "network",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provision" => Some(NodeErrorType::Provision),
            "deploy" => Some(NodeErrorType::Deploy),
            "deletion" => Some(NodeErrorType::Deletion),
            "network" => Some(NodeErrorType::Network),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Role a node plays in its cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeRole {
    Controller,
    Compute,
    Cinder,
    CephOsd,
    Mongo,
    ZabbixServer,
    BaseOs,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Controller => "controller",
            NodeRole::Compute => "compute",
            NodeRole::Cinder => "cinder",
            NodeRole::CephOsd => "ceph-osd",
            NodeRole::Mongo => "mongo",
            NodeRole::ZabbixServer => "zabbix-server",
            NodeRole::BaseOs => "base-os",
        }
    }
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A managed host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub cluster_id: Option<i64>,
    pub status: NodeStatus,
    pub progress: u8,
    pub online: bool,
    pub error_type: Option<NodeErrorType>,
    pub error_msg: Option<String>,
    pub pending_addition: bool,
    pub pending_deletion: bool,
    pub roles: Vec<NodeRole>,
    pub pending_roles: Vec<NodeRole>,
    /// Address on the admin network
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Name for user-facing messages; unnamed nodes fall back to `ID: <id>`,
    /// the same spelling used for nodes that no longer exist
    pub fn display_name(&self) -> String {
        if self.name.is_empty() {
            format!("ID: {}", self.id)
        } else {
            self.name.clone()
        }
    }

    /// Whether the node counts as failed for aggregate error reporting
    pub fn is_failed(&self) -> bool {
        self.status == NodeStatus::Error || !self.online
    }

    pub fn has_role(&self, role: NodeRole) -> bool {
        self.roles.contains(&role)
    }
}

/// Network interface of a node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInterface {
    pub id: i64,
    pub node_id: NodeId,
    pub name: String,
    pub mac: String,
}

/// Data needed to register a node
#[derive(Debug, Clone, Default)]
pub struct NewNode {
    pub name: String,
    pub cluster_id: Option<i64>,
    pub status: Option<NodeStatus>,
    pub online: Option<bool>,
    pub roles: Vec<NodeRole>,
    pub pending_roles: Vec<NodeRole>,
    pub pending_addition: bool,
    pub pending_deletion: bool,
    pub ip: Option<String>,
    pub mac: Option<String>,
}

/// Field changes a deployment-style report may apply to a node
///
/// Every field is optional; only fields present in the report are written.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeUpdate {
    pub status: Option<NodeStatus>,
    pub progress: Option<u8>,
    pub online: Option<bool>,
    pub error_type: Option<NodeErrorType>,
    pub error_msg: Option<String>,
}

impl NodeUpdate {
    /// Whether the update signals a failure (error status or offline)
    pub fn signals_failure(&self) -> bool {
        self.status == Some(NodeStatus::Error) || self.online == Some(false)
    }

    /// Apply the update to a node, returning whether it entered a failed state
    ///
    /// A failure indication forces progress to 100, and an offline node without
    /// an error message gets "Node is offline".
    pub fn apply_to(&self, node: &mut Node) -> bool {
        let was_failed = node.is_failed();

        if let Some(status) = self.status {
            node.status = status;
        }
        if let Some(progress) = self.progress {
            node.progress = progress;
        }
        if let Some(online) = self.online {
            node.online = online;
        }
        if let Some(error_type) = self.error_type {
            node.error_type = Some(error_type);
        }
        if let Some(ref error_msg) = self.error_msg {
            node.error_msg = Some(error_msg.clone());
        }

        if self.signals_failure() {
            node.progress = 100;
            if self.online == Some(false) && node.error_msg.as_deref().map_or(true, str::is_empty) {
                node.error_msg = Some("Node is offline".to_string());
            }
        }

        self.signals_failure() && !was_failed
    }
}
