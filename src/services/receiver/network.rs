//! Network verification and DHCP probing

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use super::{Disposition, Receiver};
use crate::db::UnitOfWork;
use crate::models::{
    CachedNode, CheckDhcpReport, NetworkNodeReport, NodeId, NodeStatus, ReportedNodes, Task,
    TaskStatus, VerifyNetworksReport,
};
use crate::services::outcome::forgotten_nodes;
use crate::services::task_status::TaskUpdate;
use crate::utils::validation::same_mac;
use crate::utils::ReceiverError;

/// VLANs a node was asked to see on an interface but did not report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VlanGap {
    pub uid: NodeId,
    pub interface: String,
    pub absent_vlans: Vec<u16>,
}

/// A [`VlanGap`] as stored in the task result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VlanGapRecord {
    pub uid: NodeId,
    pub interface: String,
    pub absent_vlans: Vec<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

/// A DHCP server answer that did not come from the master node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DhcpConflict {
    pub iface: String,
    pub server_id: String,
    pub mac: String,
    pub node_name: String,
}

impl DhcpConflict {
    pub fn message(&self) -> String {
        format!(
            "Node {} discovered DHCP server via {} with following parameters: IP: {}, MAC: {}. \
             This server will conflict with the installation.",
            self.node_name, self.iface, self.server_id, self.mac
        )
    }
}

/// Compare reported VLANs against the ones each node was asked to probe
///
/// An interface missing from a node's answer has all of its VLANs absent.
/// Reported nodes that were never asked are skipped.
pub fn absent_vlans(cached: &[CachedNode], reported: &[NetworkNodeReport]) -> Vec<VlanGap> {
    let mut gaps = Vec::new();

    for node in reported {
        let Some(cached_node) = cached.iter().find(|c| c.uid == node.uid) else {
            warn!(node_id = node.uid, "Node answered but was not asked to verify networks");
            continue;
        };

        for cached_network in &cached_node.networks {
            let received = node
                .networks
                .iter()
                .find(|n| n.iface == cached_network.iface);

            let absent: Vec<u16> = match received {
                Some(received) => {
                    let seen: HashSet<u16> = received.vlans.iter().copied().collect();
                    let mut missing = Vec::new();
                    for vlan in &cached_network.vlans {
                        if !seen.contains(vlan) && !missing.contains(vlan) {
                            missing.push(*vlan);
                        }
                    }
                    missing
                }
                None => {
                    warn!(
                        node_id = node.uid,
                        iface = %cached_network.iface,
                        "No data for interface"
                    );
                    cached_network.vlans.clone()
                }
            };

            if !absent.is_empty() {
                gaps.push(VlanGap {
                    uid: node.uid,
                    interface: cached_network.iface.clone(),
                    absent_vlans: absent,
                });
            }
        }
    }

    gaps
}

impl Receiver {
    pub(super) async fn verify_networks(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: VerifyNetworksReport,
    ) -> Result<Disposition, ReceiverError> {
        let mut status = report.header.status;
        let mut message = report.header.error_text().map(String::from);
        let mut result = Value::Array(Vec::new());

        match report.nodes {
            None => {}
            Some(ReportedNodes::Malformed(value)) => {
                let text = message.unwrap_or_else(|| {
                    "verify_networks_resp: argument \"nodes\" have incorrect type".to_string()
                });
                error!(nodes = %value, "{}", text);
                message = Some(text);
                status = Some(TaskStatus::Error);
            }
            Some(ReportedNodes::List(nodes)) => {
                let cached = task.cache.args.nodes.clone().unwrap_or_default();
                let forgotten =
                    forgotten_nodes(cached.iter().map(|n| n.uid), nodes.iter().map(|n| n.uid));

                if !forgotten.is_empty() {
                    if message.is_none() {
                        let names: Vec<String> = uow
                            .nodes()
                            .get_many(&forgotten)
                            .await?
                            .iter()
                            .map(|n| n.display_name())
                            .collect();
                        message = Some(format!("Node(s) {} didn't return data.", names.join(", ")));
                    }
                    status = Some(TaskStatus::Error);
                } else {
                    let gaps = absent_vlans(&cached, &nodes);
                    if !gaps.is_empty() {
                        let mut records = Vec::with_capacity(gaps.len());
                        for gap in gaps {
                            records.push(self.gap_record(uow, gap).await?);
                        }
                        result = serde_json::to_value(records)
                            .map_err(|e| ReceiverError::MalformedReport(e.to_string()))?;
                        status = Some(TaskStatus::Error);
                    }
                }
            }
        }

        let update = TaskUpdate::new(status, report.header.progress, message).with_result(result);
        match status {
            Some(TaskStatus::Ready | TaskStatus::Error) => {
                self.updater.update_verification(uow, task, update).await?
            }
            _ => self.updater.update(uow, task, update).await?,
        }

        Ok(Disposition::Applied)
    }

    /// Attach the node name and interface MAC to a VLAN gap
    async fn gap_record(
        &self,
        uow: &mut UnitOfWork,
        gap: VlanGap,
    ) -> Result<VlanGapRecord, ReceiverError> {
        let mut record = VlanGapRecord {
            uid: gap.uid,
            interface: gap.interface,
            absent_vlans: gap.absent_vlans,
            name: None,
            mac: None,
        };

        let Some(node) = uow.nodes().get(gap.uid).await? else {
            warn!(node_id = gap.uid, "Can't find node");
            return Ok(record);
        };

        let interfaces = uow.nodes().interfaces(node.id).await?;
        record.mac = Some(
            match interfaces.into_iter().find(|i| i.name == record.interface) {
                Some(interface) => interface.mac,
                None => {
                    warn!(node_id = node.id, iface = %record.interface, "Can't find interface");
                    "unknown".to_string()
                }
            },
        );
        record.name = Some(node.name);

        Ok(record)
    }

    pub(super) async fn check_dhcp(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: CheckDhcpReport,
    ) -> Result<Disposition, ReceiverError> {
        let admin_mac = &self.config.admin_network_mac;
        debug!(mac = %admin_mac, "Mac address of the master node");

        let uids: Vec<NodeId> = report.nodes.iter().map(|n| n.uid).collect();
        let known: BTreeMap<NodeId, String> = uow
            .nodes()
            .get_many(&uids)
            .await?
            .into_iter()
            .map(|n| (n.id, n.name))
            .collect();

        let mut conflicts: BTreeMap<String, Vec<DhcpConflict>> = BTreeMap::new();
        let mut messages = Vec::new();

        for node in report
            .nodes
            .iter()
            .filter(|n| n.status == Some(NodeStatus::Ready))
        {
            for row in node.data.iter().filter(|r| !same_mac(&r.mac, admin_mac)) {
                let Some(name) = known.get(&node.uid) else {
                    warn!(node_id = node.uid, server = %row.server_id, "DHCP answer from nonexistent node");
                    continue;
                };

                let conflict = DhcpConflict {
                    iface: row.iface.clone(),
                    server_id: row.server_id.clone(),
                    mac: row.mac.clone(),
                    node_name: name.clone(),
                };
                messages.push(conflict.message());
                conflicts
                    .entry(node.uid.to_string())
                    .or_default()
                    .push(conflict);
            }
        }

        let (status, message) = if messages.is_empty() {
            (
                report.header.status,
                report.header.error_text().map(String::from),
            )
        } else {
            (Some(TaskStatus::Error), Some(messages.join("\n")))
        };
        debug!(message = ?message, "DHCP check outcome");

        self.updater
            .update_verification(
                uow,
                task,
                TaskUpdate::new(status, report.header.progress, message).with_result(json!(conflicts)),
            )
            .await?;

        Ok(Disposition::Applied)
    }
}
