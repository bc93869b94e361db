//! Node and cluster removal

use tracing::{debug, error, warn};

use super::{Disposition, Receiver};
use crate::db::UnitOfWork;
use crate::models::{
    ClusterStatus, NewNotification, NodeErrorType, NodeId, NodeStatus, RemovalReport, Task,
    TaskStatus,
};
use crate::services::outcome::{compose_node_errors, ErrorListFormat};
use crate::services::task_status::TaskUpdate;
use crate::utils::ReceiverError;

impl Receiver {
    pub(super) async fn remove_nodes(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: RemovalReport,
    ) -> Result<Disposition, ReceiverError> {
        if let Some(cluster_id) = task.cluster_id {
            uow.clusters().lock(cluster_id).await?;
        }

        let message = self.apply_removal(uow, &report).await?;

        self.updater
            .update(
                uow,
                task,
                TaskUpdate::new(report.header.status, report.header.progress, Some(message)),
            )
            .await?;

        Ok(Disposition::Applied)
    }

    pub(super) async fn remove_cluster(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: RemovalReport,
    ) -> Result<Disposition, ReceiverError> {
        let cluster = match task.cluster_id {
            Some(cluster_id) => uow.clusters().lock(cluster_id).await?,
            None => None,
        };

        let mut message = self.apply_removal(uow, &report).await?;

        if let Some(ref cluster) = cluster {
            if report.header.status == Some(TaskStatus::Error)
                && report.header.error_text().is_none()
            {
                let details = compose_node_errors(
                    uow,
                    cluster.id,
                    &[NodeErrorType::Deletion],
                    ErrorListFormat::Detailed,
                )
                .await?;
                message = format!("Failed to delete nodes:\n{}", details);
            }
        }

        self.updater
            .update(
                uow,
                task,
                TaskUpdate::new(
                    report.header.status,
                    report.header.progress,
                    Some(message.clone()),
                ),
            )
            .await?;

        let Some(cluster) = cluster else {
            warn!("Environment of the removal task no longer exists");
            return Ok(Disposition::Applied);
        };

        match task.status {
            TaskStatus::Ready => {
                debug!(cluster_id = cluster.id, "Removing environment itself");
                let released = uow.clusters().delete_ip_addrs(cluster.id).await?;
                debug!(cluster_id = cluster.id, released, "Released IP addresses");
                uow.clusters().delete(cluster.id).await?;

                uow.notify(NewNotification::done(format!(
                    "Environment '{}' and all its nodes are deleted",
                    cluster.display_name()
                )))
                .await?;
            }
            TaskStatus::Error => {
                uow.clusters()
                    .set_status(cluster.id, ClusterStatus::Error)
                    .await?;
                let text = task.message.clone().unwrap_or(message);
                uow.notify(NewNotification::error(text).for_cluster(Some(cluster.id)))
                    .await?;
            }
            TaskStatus::Running => {}
        }

        Ok(Disposition::Applied)
    }

    /// Apply the node groups of a removal report and build the task message
    ///
    /// Removed and unreachable nodes are deleted, nodes that failed to be
    /// removed are put in error. Nodes that no longer exist are skipped.
    /// Summary notifications only go out for rows this report changed.
    async fn apply_removal(
        &self,
        uow: &mut UnitOfWork,
        report: &RemovalReport,
    ) -> Result<String, ReceiverError> {
        let uids: Vec<NodeId> = report
            .nodes
            .iter()
            .chain(&report.error_nodes)
            .chain(&report.inaccessible_nodes)
            .map(|n| n.uid)
            .collect();
        uow.nodes().lock_many(&uids).await?;

        let mut removed = 0usize;
        for node in &report.nodes {
            if uow.nodes().delete(node.uid).await? {
                removed += 1;
            } else {
                error!(node_id = node.uid, "Failed to delete node: node doesn't exist");
            }
        }

        for node in &report.inaccessible_nodes {
            if let Some(existing) = uow.nodes().get(node.uid).await? {
                warn!(
                    node_id = existing.id,
                    name = %existing.display_name(),
                    "Node did not answer, removing it anyway"
                );
                uow.nodes().delete(existing.id).await?;
            }
        }

        let mut failed_names = Vec::with_capacity(report.error_nodes.len());
        let mut newly_failed = false;
        for node in &report.error_nodes {
            match uow.nodes().get(node.uid).await? {
                Some(mut existing) => {
                    let already_failed = existing.status == NodeStatus::Error
                        && existing.error_type == Some(NodeErrorType::Deletion)
                        && !existing.pending_deletion;
                    newly_failed |= !already_failed;

                    existing.pending_deletion = false;
                    existing.status = NodeStatus::Error;
                    existing.error_type = Some(NodeErrorType::Deletion);
                    uow.nodes().update(&existing).await?;

                    failed_names.push(existing.display_name());
                }
                None => {
                    error!(
                        node_id = node.uid,
                        "Failed to mark node as not removed: node doesn't exist"
                    );
                    newly_failed = true;
                    failed_names.push(format!("ID: {}", node.uid));
                }
            }
        }

        let mut success_msg = "No nodes were removed".to_string();
        let mut err_msg = "No errors occurred".to_string();

        if removed > 0 {
            success_msg = format!("Successfully removed {} node(s)", removed);
            uow.notify(NewNotification::done(success_msg.clone())).await?;
        }
        if !report.error_nodes.is_empty() {
            err_msg = format!(
                "Failed to remove {} node(s): {}",
                report.error_nodes.len(),
                failed_names.join(", ")
            );
            if newly_failed {
                uow.notify(NewNotification::error(err_msg.clone())).await?;
            }
        }

        Ok(report
            .header
            .error_text()
            .map(String::from)
            .unwrap_or_else(|| format!("{}. {}", success_msg, err_msg)))
    }
}
