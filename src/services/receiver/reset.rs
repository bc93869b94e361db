//! Stopping a deployment and resetting an environment
//!
//! Both operations return the reported nodes to discovery with their roles
//! swapped back; they differ in what happens to the cluster itself.

use tracing::{debug, info, warn};

use super::{Disposition, Receiver};
use crate::db::UnitOfWork;
use crate::models::{
    Cluster, ClusterStatus, NewNotification, NodeId, PendingChange, ResetReport, Task, TaskKind,
    TaskStatus,
};
use crate::services::outcome::{notify_inaccessible, UNKNOWN_ERROR};
use crate::services::task_status::TaskUpdate;
use crate::utils::ReceiverError;

impl Receiver {
    pub(super) async fn stop_deployment(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: ResetReport,
    ) -> Result<Disposition, ReceiverError> {
        let cluster = self.lock_task_cluster(uow, task).await?;
        let mut message = report.header.error.clone();

        match report.header.status {
            Some(TaskStatus::Ready) => {
                uow.clusters()
                    .set_status(cluster.id, ClusterStatus::Stopped)
                    .await?;

                let stopped: Vec<i64> = uow
                    .tasks()
                    .filter_by_cluster(cluster.id, &[TaskKind::Deploy, TaskKind::Provision])
                    .await?
                    .iter()
                    .map(|t| t.id)
                    .collect();
                if stopped.is_empty() {
                    warn!(cluster_id = cluster.id, "No deployment tasks found for environment");
                } else {
                    let removed = uow.tasks().delete_many(&stopped).await?;
                    debug!(cluster_id = cluster.id, removed, "Removed stopped deployment tasks");
                }

                self.reset_reported_nodes(uow, &cluster, &report, false, "deployment stopping")
                    .await?;

                let text = format!(
                    "Deployment of environment '{}' was successfully stopped",
                    cluster.display_name()
                );
                uow.notify(NewNotification::done(text.clone()).for_cluster(Some(cluster.id)))
                    .await?;
                message = Some(text);
            }
            Some(TaskStatus::Error) => {
                self.notify_reset_failure(uow, &cluster, &report).await?;
            }
            _ => {}
        }

        self.updater
            .update(
                uow,
                task,
                TaskUpdate::new(report.header.status, report.header.progress, message),
            )
            .await?;

        Ok(Disposition::Applied)
    }

    pub(super) async fn reset_environment(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: ResetReport,
    ) -> Result<Disposition, ReceiverError> {
        let cluster = self.lock_task_cluster(uow, task).await?;
        let mut message = report.header.error.clone();

        match report.header.status {
            Some(TaskStatus::Ready) => {
                uow.clusters()
                    .set_status(cluster.id, ClusterStatus::New)
                    .await?;

                uow.clusters()
                    .add_pending_change(cluster.id, PendingChange::Attributes, None)
                    .await?;
                uow.clusters()
                    .add_pending_change(cluster.id, PendingChange::Networks, None)
                    .await?;

                for node in uow.nodes().filter_by_cluster(cluster.id).await? {
                    uow.clusters()
                        .add_pending_change(cluster.id, PendingChange::Disks, Some(node.id))
                        .await?;
                }

                self.reset_reported_nodes(uow, &cluster, &report, true, "environment resetting")
                    .await?;

                let text = format!(
                    "Environment '{}' was successfully reset",
                    cluster.display_name()
                );
                uow.notify(NewNotification::done(text.clone()).for_cluster(Some(cluster.id)))
                    .await?;
                message = Some(text);
            }
            Some(TaskStatus::Error) => {
                self.notify_reset_failure(uow, &cluster, &report).await?;
            }
            _ => {}
        }

        self.updater
            .update(
                uow,
                task,
                TaskUpdate::new(report.header.status, report.header.progress, message),
            )
            .await?;

        Ok(Disposition::Applied)
    }

    /// Reset every node named by the report and warn about the unreachable ones
    async fn reset_reported_nodes(
        &self,
        uow: &mut UnitOfWork,
        cluster: &Cluster,
        report: &ResetReport,
        clear_pending_deletion: bool,
        action: &str,
    ) -> Result<(), ReceiverError> {
        let uids: Vec<NodeId> = report
            .nodes
            .iter()
            .chain(&report.inaccessible_nodes)
            .map(|n| n.uid)
            .collect();

        uow.nodes().lock_many(&uids).await?;
        let reset = uow
            .nodes()
            .reset_for_redeployment(cluster.id, &uids, clear_pending_deletion)
            .await?;
        info!(cluster_id = cluster.id, reset, "Nodes returned to discovery");

        if !report.inaccessible_nodes.is_empty() {
            let unreachable: Vec<NodeId> =
                report.inaccessible_nodes.iter().map(|n| n.uid).collect();
            notify_inaccessible(uow, cluster.id, &unreachable, action).await?;
        }

        Ok(())
    }

    async fn notify_reset_failure(
        &self,
        uow: &mut UnitOfWork,
        cluster: &Cluster,
        report: &ResetReport,
    ) -> Result<(), ReceiverError> {
        let text = report.header.error_text().unwrap_or(UNKNOWN_ERROR);
        uow.notify(NewNotification::error(text).for_cluster(Some(cluster.id)))
            .await?;
        Ok(())
    }
}
