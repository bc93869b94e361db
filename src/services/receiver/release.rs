//! Release pipeline: credential checks, license checks and downloads

use serde_json::json;
use tracing::{error, info};

use super::{Disposition, Receiver};
use crate::db::UnitOfWork;
use crate::models::{MessageReport, NewNotification, Release, ReleaseState, Task, TaskStatus};
use crate::services::outcome::UNKNOWN_ERROR;
use crate::services::task_status::TaskUpdate;
use crate::utils::ReceiverError;

/// Error text the execution layer sends when a task is cancelled
const TASK_ABORTED: &str = "Task aborted";

impl Receiver {
    pub(super) async fn check_redhat_credentials(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: MessageReport,
    ) -> Result<Disposition, ReceiverError> {
        self.check_release(uow, task, report, "Failed to check release credentials", false)
            .await
    }

    pub(super) async fn redhat_check_licenses(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: MessageReport,
    ) -> Result<Disposition, ReceiverError> {
        self.check_release(uow, task, report, "Failed to check release licenses", true)
            .await
    }

    pub(super) async fn download_release(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: MessageReport,
    ) -> Result<Disposition, ReceiverError> {
        let Some(release) = self.lock_task_release(uow, task).await? else {
            return Ok(Disposition::Dropped);
        };

        let mut status = report.header.status;
        let mut message = None;

        if let Some(original) = report.header.error_text() {
            status = Some(TaskStatus::Error);
            let text = format!("{} download and preparation has failed.", release.name);
            uow.releases().set_state(release.id, ReleaseState::Error).await?;
            if original != TASK_ABORTED {
                uow.notify(NewNotification::error(text.clone())).await?;
            }
            message = Some(text);
        } else if report.header.progress == Some(100) && status == Some(TaskStatus::Ready) {
            uow.releases()
                .set_state(release.id, ReleaseState::Available)
                .await?;
            info!(release_id = release.id, "Release downloaded");
            uow.notify(NewNotification::done(format!(
                "Successfully downloaded {}",
                release.name
            )))
            .await?;
        }

        self.finish_release_task(uow, task, &release, status, report.header.progress, message)
            .await
    }

    /// Shared handling of the credential and license checks
    ///
    /// With `forward_notice` the report's `msg` is surfaced as an error
    /// notification of its own.
    async fn check_release(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: MessageReport,
        fallback: &str,
        forward_notice: bool,
    ) -> Result<Disposition, ReceiverError> {
        let Some(release) = self.lock_task_release(uow, task).await? else {
            return Ok(Disposition::Dropped);
        };

        let mut status = report.header.status;
        let mut message = None;

        if let Some(original) = report.header.error_text() {
            status = Some(TaskStatus::Error);
            uow.releases().set_state(release.id, ReleaseState::Error).await?;

            let text = if original.contains(UNKNOWN_ERROR) {
                fallback.to_string()
            } else {
                original.to_string()
            };
            if original != TASK_ABORTED {
                uow.notify(NewNotification::error(text.clone())).await?;
            }
            message = Some(text);
        }

        if forward_notice {
            if let Some(notice) = report.msg.filter(|m| !m.is_empty()) {
                uow.notify(NewNotification::error(notice)).await?;
            }
        }

        self.finish_release_task(uow, task, &release, status, report.header.progress, message)
            .await
    }

    /// Lock the release a task refers to, `None` if it was deleted
    async fn lock_task_release(
        &self,
        uow: &mut UnitOfWork,
        task: &Task,
    ) -> Result<Option<Release>, ReceiverError> {
        let release_id = task
            .cache
            .args
            .release_info
            .map(|info| info.release_id)
            .ok_or_else(|| {
                ReceiverError::MalformedReport(format!(
                    "task '{}' carries no release information",
                    task.uuid
                ))
            })?;

        let release = uow.releases().lock(release_id).await?;
        if release.is_none() {
            error!(release_id, "Release not found, report dropped");
        }
        Ok(release)
    }

    async fn finish_release_task(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        release: &Release,
        status: Option<TaskStatus>,
        progress: Option<u8>,
        message: Option<String>,
    ) -> Result<Disposition, ReceiverError> {
        let result = json!({"release_info": {"release_id": release.id}});
        self.updater
            .update(
                uow,
                task,
                TaskUpdate::new(status, progress, message).with_result(result),
            )
            .await?;

        Ok(Disposition::Applied)
    }
}
