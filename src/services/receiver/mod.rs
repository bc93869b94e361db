//! Report receiver
//!
//! Reconciles asynchronous task reports into the entity store. Each report
//! is applied in its own [`UnitOfWork`]: the task row is locked first, a
//! report for a finished task is ignored, and the matching handler runs.
//! Notifications recorded by the handler are published only after commit.
//!
//! Handlers are grouped by operation family:
//! - [`removal`]: node and cluster removal
//! - [`deployment`]: deploy and provision progress
//! - [`reset`]: stopping a deployment and resetting an environment
//! - [`network`]: network verification and DHCP probing
//! - [`release`]: release credential/license checks and downloads
//! - [`dump`]: environment diagnostic dumps

mod deployment;
mod dump;
mod network;
mod release;
mod removal;
mod reset;

pub use network::{absent_vlans, DhcpConflict, VlanGap, VlanGapRecord};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::config::ReceiverConfig;
use crate::db::{DbPool, UnitOfWork};
use crate::models::{Cluster, RpcReport, Task};
use crate::services::notification::NotificationService;
use crate::services::task_status::TaskStatusUpdater;
use crate::utils::ReceiverError;

/// What happened to a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// The report was reconciled and committed
    Applied,
    /// The task had already finished; nothing changed
    Ignored,
    /// The report refers to an entity that no longer exists; nothing changed
    Dropped,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Disposition::Applied => "applied",
            Disposition::Ignored => "ignored",
            Disposition::Dropped => "dropped",
        }
    }
}

pub struct Receiver {
    pool: DbPool,
    config: ReceiverConfig,
    notifications: Arc<NotificationService>,
    updater: TaskStatusUpdater,
}

impl Receiver {
    pub fn new(
        pool: DbPool,
        config: ReceiverConfig,
        notifications: Arc<NotificationService>,
    ) -> Self {
        Self {
            pool,
            config,
            notifications,
            updater: TaskStatusUpdater::new(),
        }
    }

    /// Apply one report
    ///
    /// Either the whole report is committed or nothing is.
    #[instrument(skip_all, fields(method = report.method(), task_uuid = %report.task_uuid()))]
    pub async fn handle(&self, report: RpcReport) -> Result<Disposition, ReceiverError> {
        info!(
            status = ?report.header().status,
            progress = ?report.header().progress,
            "Report received"
        );

        let mut uow = UnitOfWork::begin(&self.pool).await?;

        let mut task = uow
            .tasks()
            .lock_by_uuid(report.task_uuid())
            .await?
            .ok_or_else(|| ReceiverError::TaskNotFound(report.task_uuid().to_string()))?;

        if task.is_finished() {
            info!(status = %task.status, "Task already finished, report ignored");
            return Ok(Disposition::Ignored);
        }

        let disposition = match report {
            RpcReport::RemoveNodes(r) => self.remove_nodes(&mut uow, &mut task, r).await?,
            RpcReport::RemoveCluster(r) => self.remove_cluster(&mut uow, &mut task, r).await?,
            RpcReport::Deploy(r) => self.deploy(&mut uow, &mut task, r).await?,
            RpcReport::Provision(r) => self.provision(&mut uow, &mut task, r).await?,
            RpcReport::StopDeployment(r) => self.stop_deployment(&mut uow, &mut task, r).await?,
            RpcReport::ResetEnvironment(r) => {
                self.reset_environment(&mut uow, &mut task, r).await?
            }
            RpcReport::VerifyNetworks(r) => self.verify_networks(&mut uow, &mut task, r).await?,
            RpcReport::CheckDhcp(r) => self.check_dhcp(&mut uow, &mut task, r).await?,
            RpcReport::CheckRedhatCredentials(r) => {
                self.check_redhat_credentials(&mut uow, &mut task, r).await?
            }
            RpcReport::RedhatCheckLicenses(r) => {
                self.redhat_check_licenses(&mut uow, &mut task, r).await?
            }
            RpcReport::DownloadRelease(r) => self.download_release(&mut uow, &mut task, r).await?,
            RpcReport::DumpEnvironment(r) => self.dump_environment(&mut uow, &mut task, r).await?,
        };

        if disposition != Disposition::Applied {
            info!(disposition = disposition.as_str(), "Report left no changes");
            return Ok(disposition);
        }

        let recorded = uow.recorded().len();
        let notifications = uow.commit().await?;
        self.notifications.publish(notifications);

        info!(
            status = %task.status,
            progress = task.progress,
            notifications = recorded,
            "Report applied"
        );
        Ok(disposition)
    }

    /// Lock the cluster a task belongs to; the task must have one
    async fn lock_task_cluster(
        &self,
        uow: &mut UnitOfWork,
        task: &Task,
    ) -> Result<Cluster, ReceiverError> {
        let cluster_id = task
            .cluster_id
            .ok_or_else(|| ReceiverError::ClusterNotFound(task.uuid.clone()))?;

        uow.clusters()
            .lock(cluster_id)
            .await?
            .ok_or_else(|| ReceiverError::ClusterNotFound(task.uuid.clone()))
    }
}
