//! Asynchronous task reports
//!
//! Reports arrive from the remote execution layer as
//! `{"method": "<operation>_resp", "args": {...}}`. Each operation has its
//! own argument shape; all of them share the [`ReportHeader`] fields.

use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationErrors};

use super::{NodeErrorType, NodeId, NodeStatus, NodeUpdate, TaskStatus};

/// Accept a node uid as either a JSON integer or a numeric string
pub fn deserialize_node_id<'de, D>(deserializer: D) -> Result<NodeId, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Int(NodeId),
        Str(String),
    }

    match RawId::deserialize(deserializer)? {
        RawId::Int(id) => Ok(id),
        RawId::Str(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid node uid: {:?}", s))),
    }
}

/// Treat an explicit `null` list the same as a missing one
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Fields every report carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ReportHeader {
    #[validate(length(min = 1))]
    pub task_uuid: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    #[validate(range(max = 100))]
    pub progress: Option<u8>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ReportHeader {
    /// Error text of the report, if any was given
    pub fn error_text(&self) -> Option<&str> {
        self.error.as_deref().filter(|e| !e.is_empty())
    }
}

/// A bare node reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    #[serde(deserialize_with = "deserialize_node_id")]
    pub uid: NodeId,
}

/// Outcome of a node or cluster removal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct RemovalReport {
    #[serde(flatten)]
    #[validate(nested)]
    pub header: ReportHeader,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub nodes: Vec<NodeRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub error_nodes: Vec<NodeRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub inaccessible_nodes: Vec<NodeRef>,
}

/// Per-node state carried by deploy and provision reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NodeReport {
    #[serde(deserialize_with = "deserialize_node_id")]
    pub uid: NodeId,
    #[serde(default)]
    pub status: Option<NodeStatus>,
    #[serde(default)]
    #[validate(range(max = 100))]
    pub progress: Option<u8>,
    #[serde(default)]
    pub online: Option<bool>,
    #[serde(default)]
    pub error_type: Option<NodeErrorType>,
    #[serde(default)]
    pub error_msg: Option<String>,
}

impl NodeReport {
    pub fn to_update(&self) -> NodeUpdate {
        NodeUpdate {
            status: self.status,
            progress: self.progress,
            online: self.online,
            error_type: self.error_type,
            error_msg: self.error_msg.clone(),
        }
    }
}

/// Progress of a deployment or provisioning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct DeploymentReport {
    #[serde(flatten)]
    #[validate(nested)]
    pub header: ReportHeader,
    #[serde(default, deserialize_with = "null_as_empty")]
    #[validate(nested)]
    pub nodes: Vec<NodeReport>,
}

/// Outcome of stopping a deployment or resetting an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct ResetReport {
    #[serde(flatten)]
    #[validate(nested)]
    pub header: ReportHeader,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub nodes: Vec<NodeRef>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub inaccessible_nodes: Vec<NodeRef>,
}

/// VLANs observed on one interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedNetwork {
    pub iface: String,
    #[serde(default)]
    pub vlans: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkNodeReport {
    #[serde(deserialize_with = "deserialize_node_id")]
    pub uid: NodeId,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub networks: Vec<ReportedNetwork>,
}

/// The `nodes` member of a network verification report
///
/// Anything that is not a list of node results is kept as `Malformed` so the
/// task can be failed with a meaningful message instead of rejecting the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportedNodes {
    List(Vec<NetworkNodeReport>),
    Malformed(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct VerifyNetworksReport {
    #[serde(flatten)]
    #[validate(nested)]
    pub header: ReportHeader,
    /// `None` means a status/progress-only update
    #[serde(default)]
    pub nodes: Option<ReportedNodes>,
}

/// One DHCP server answer seen by a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhcpProbeRow {
    pub iface: String,
    pub server_id: String,
    pub mac: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DhcpNodeReport {
    #[serde(deserialize_with = "deserialize_node_id")]
    pub uid: NodeId,
    #[serde(default)]
    pub status: Option<NodeStatus>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub data: Vec<DhcpProbeRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct CheckDhcpReport {
    #[serde(flatten)]
    #[validate(nested)]
    pub header: ReportHeader,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub nodes: Vec<DhcpNodeReport>,
}

/// Report for release pipeline tasks and environment dumps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct MessageReport {
    #[serde(flatten)]
    #[validate(nested)]
    pub header: ReportHeader,
    /// Auxiliary free text (license notice, dump file path)
    #[serde(default)]
    pub msg: Option<String>,
}

/// Every report the receiver understands, keyed by RPC method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "args")]
pub enum RpcReport {
    #[serde(rename = "remove_nodes_resp")]
    RemoveNodes(RemovalReport),
    #[serde(rename = "remove_cluster_resp")]
    RemoveCluster(RemovalReport),
    #[serde(rename = "deploy_resp")]
    Deploy(DeploymentReport),
    #[serde(rename = "provision_resp")]
    Provision(DeploymentReport),
    #[serde(rename = "stop_deployment_resp")]
    StopDeployment(ResetReport),
    #[serde(rename = "reset_environment_resp")]
    ResetEnvironment(ResetReport),
    #[serde(rename = "verify_networks_resp")]
    VerifyNetworks(VerifyNetworksReport),
    #[serde(rename = "check_dhcp_resp")]
    CheckDhcp(CheckDhcpReport),
    #[serde(rename = "check_redhat_credentials_resp")]
    CheckRedhatCredentials(MessageReport),
    #[serde(rename = "redhat_check_licenses_resp")]
    RedhatCheckLicenses(MessageReport),
    #[serde(rename = "download_release_resp")]
    DownloadRelease(MessageReport),
    #[serde(rename = "dump_environment_resp")]
    DumpEnvironment(MessageReport),
}

impl RpcReport {
    /// RPC method name the report was delivered under
    pub fn method(&self) -> &'static str {
        match self {
            RpcReport::RemoveNodes(_) => "remove_nodes_resp",
            RpcReport::RemoveCluster(_) => "remove_cluster_resp",
            RpcReport::Deploy(_) => "deploy_resp",
            RpcReport::Provision(_) => "provision_resp",
            RpcReport::StopDeployment(_) => "stop_deployment_resp",
            RpcReport::ResetEnvironment(_) => "reset_environment_resp",
            RpcReport::VerifyNetworks(_) => "verify_networks_resp",
            RpcReport::CheckDhcp(_) => "check_dhcp_resp",
            RpcReport::CheckRedhatCredentials(_) => "check_redhat_credentials_resp",
            RpcReport::RedhatCheckLicenses(_) => "redhat_check_licenses_resp",
            RpcReport::DownloadRelease(_) => "download_release_resp",
            RpcReport::DumpEnvironment(_) => "dump_environment_resp",
        }
    }

    pub fn header(&self) -> &ReportHeader {
        match self {
            RpcReport::RemoveNodes(r) | RpcReport::RemoveCluster(r) => &r.header,
            RpcReport::Deploy(r) | RpcReport::Provision(r) => &r.header,
            RpcReport::StopDeployment(r) | RpcReport::ResetEnvironment(r) => &r.header,
            RpcReport::VerifyNetworks(r) => &r.header,
            RpcReport::CheckDhcp(r) => &r.header,
            RpcReport::CheckRedhatCredentials(r)
            | RpcReport::RedhatCheckLicenses(r)
            | RpcReport::DownloadRelease(r)
            | RpcReport::DumpEnvironment(r) => &r.header,
        }
    }

    pub fn task_uuid(&self) -> &str {
        &self.header().task_uuid
    }

    pub fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            RpcReport::RemoveNodes(r) | RpcReport::RemoveCluster(r) => r.validate(),
            RpcReport::Deploy(r) | RpcReport::Provision(r) => r.validate(),
            RpcReport::StopDeployment(r) | RpcReport::ResetEnvironment(r) => r.validate(),
            RpcReport::VerifyNetworks(r) => r.validate(),
            RpcReport::CheckDhcp(r) => r.validate(),
            RpcReport::CheckRedhatCredentials(r)
            | RpcReport::RedhatCheckLicenses(r)
            | RpcReport::DownloadRelease(r)
            | RpcReport::DumpEnvironment(r) => r.validate(),
        }
    }
}
