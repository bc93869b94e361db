//! Deployment and provisioning progress

use tracing::{debug, warn};

use super::{Disposition, Receiver};
use crate::db::UnitOfWork;
use crate::models::{
    Cluster, DeploymentReport, NewNotification, Node, NodeErrorType, NodeId, NodeRole, NodeStatus,
    Task, TaskStatus,
};
use crate::services::outcome::{compose_node_errors, ErrorListFormat, UNKNOWN_ERROR};
use crate::services::task_status::{recalculate_progress, TaskUpdate};
use crate::utils::validation::strip_prefix_len;
use crate::utils::ReceiverError;

impl Receiver {
    pub(super) async fn deploy(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: DeploymentReport,
    ) -> Result<Disposition, ReceiverError> {
        let cluster = self.lock_task_cluster(uow, task).await?;
        let status = report.header.status.unwrap_or(task.status);

        let uids: Vec<NodeId> = report.nodes.iter().map(|n| n.uid).collect();
        uow.nodes().lock_many(&uids).await?;

        for node_report in &report.nodes {
            let Some(mut node) = uow.nodes().get(node_report.uid).await? else {
                warn!(node_id = node_report.uid, "No node found, nothing changed");
                continue;
            };

            let entered_failure = node_report.to_update().apply_to(&mut node);
            uow.nodes().update(&node).await?;

            if entered_failure {
                uow.notify(
                    NewNotification::error(format!(
                        "Failed to deploy node '{}': {}",
                        node.name,
                        node.error_msg.as_deref().unwrap_or(UNKNOWN_ERROR)
                    ))
                    .for_cluster(Some(cluster.id))
                    .for_node(node.id)
                    .for_task(task.id),
                )
                .await?;
            }
        }

        let progress = self.overall_progress(uow, task, &report).await?;

        match status {
            TaskStatus::Error => {
                self.deployment_failed(uow, task, &cluster, progress, report.header.error_text())
                    .await?
            }
            TaskStatus::Ready => self.deployment_succeeded(uow, task, &cluster, progress).await?,
            TaskStatus::Running => {
                self.updater
                    .update(
                        uow,
                        task,
                        TaskUpdate::new(Some(status), progress, report.header.error.clone()),
                    )
                    .await?
            }
        }

        Ok(Disposition::Applied)
    }

    pub(super) async fn provision(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: DeploymentReport,
    ) -> Result<Disposition, ReceiverError> {
        if let Some(cluster_id) = task.cluster_id {
            uow.clusters().lock(cluster_id).await?;
        }

        let uids: Vec<NodeId> = report.nodes.iter().map(|n| n.uid).collect();
        uow.nodes().lock_many(&uids).await?;

        for node_report in &report.nodes {
            let Some(mut node) = uow.nodes().get(node_report.uid).await? else {
                warn!(node_id = node_report.uid, "Node not found");
                continue;
            };

            let mut update = node_report.to_update();
            if update.status == Some(NodeStatus::Error) {
                update.error_type.get_or_insert(NodeErrorType::Provision);
                update
                    .error_msg
                    .get_or_insert_with(|| UNKNOWN_ERROR.to_string());
            }
            update.apply_to(&mut node);

            uow.nodes().update(&node).await?;
        }

        let progress = self.overall_progress(uow, task, &report).await?;

        self.updater
            .update(
                uow,
                task,
                TaskUpdate::new(report.header.status, progress, report.header.error.clone()),
            )
            .await?;

        Ok(Disposition::Applied)
    }

    /// Reported progress, or the cluster's node progress when the report
    /// names nodes without an overall figure
    async fn overall_progress(
        &self,
        uow: &mut UnitOfWork,
        task: &Task,
        report: &DeploymentReport,
    ) -> Result<Option<u8>, ReceiverError> {
        match report.header.progress {
            Some(progress) if progress > 0 => Ok(Some(progress)),
            progress if report.nodes.is_empty() => Ok(progress),
            _ => Ok(Some(recalculate_progress(uow, task).await?)),
        }
    }

    async fn deployment_failed(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        cluster: &Cluster,
        progress: Option<u8>,
        error: Option<&str>,
    ) -> Result<(), ReceiverError> {
        let message = match error {
            Some(error) => format!("Deployment has failed. {}", error),
            None => format!(
                "Deployment has failed. Check these nodes:\n{}",
                compose_node_errors(
                    uow,
                    cluster.id,
                    &[NodeErrorType::Deploy, NodeErrorType::Provision],
                    ErrorListFormat::NamesOnly,
                )
                .await?
            ),
        };

        uow.notify(NewNotification::error(message.clone()).for_cluster(Some(cluster.id)))
            .await?;

        self.updater
            .update(
                uow,
                task,
                TaskUpdate::new(Some(TaskStatus::Error), progress, Some(message)),
            )
            .await?;

        Ok(())
    }

    async fn deployment_succeeded(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        cluster: &Cluster,
        progress: Option<u8>,
    ) -> Result<(), ReceiverError> {
        let nodes = uow.nodes().filter_by_cluster(cluster.id).await?;
        if nodes.iter().any(|node| node.status == NodeStatus::Error) {
            debug!(cluster_id = cluster.id, "Deployment reported ready with failed nodes");
            return self
                .deployment_failed(uow, task, cluster, Some(100), None)
                .await;
        }

        let message = self.success_message(uow, cluster, &nodes).await?;

        uow.notify(NewNotification::done(message.clone()).for_cluster(Some(cluster.id)))
            .await?;

        self.updater
            .update(
                uow,
                task,
                TaskUpdate::new(Some(TaskStatus::Ready), progress, Some(message)),
            )
            .await?;

        Ok(())
    }

    /// Completion message pointing at the environment's dashboard
    ///
    /// Falls back to a generic message when no address can be found.
    async fn success_message(
        &self,
        uow: &mut UnitOfWork,
        cluster: &Cluster,
        nodes: &[Node],
    ) -> Result<String, ReceiverError> {
        let name = cluster.display_name();
        let generic = format!("Deployment of environment '{}' is done", name);

        if cluster.mode.is_ha() {
            return Ok(match cluster.public_vip.as_deref() {
                Some(vip) => format!("{}. Access the dashboard at http://{}/", generic, vip),
                None => {
                    warn!(cluster = %name, "Cannot find virtual IP");
                    generic
                }
            });
        }

        let Some(controller) = nodes.iter().find(|node| node.has_role(NodeRole::Controller)) else {
            warn!(cluster = %name, "Controller node not found");
            return Ok(generic);
        };

        debug!(node_id = controller.id, "Controller is found, getting its public IP");
        match uow.nodes().network_ip(controller.id, "public").await? {
            Some(public_ip) => Ok(format!(
                "{}. Access the dashboard at http://{}/ or via internal network at http://{}/",
                generic,
                strip_prefix_len(&public_ip),
                controller.ip.as_deref().unwrap_or_default()
            )),
            None => {
                warn!(cluster = %name, "Public IP for controller node not found");
                Ok(generic)
            }
        }
    }
}
