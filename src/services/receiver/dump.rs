//! Environment diagnostic dumps

use std::path::Path;

use tracing::warn;

use super::{Disposition, Receiver};
use crate::db::UnitOfWork;
use crate::models::{MessageReport, NewNotification, Task, TaskStatus};
use crate::services::outcome::UNKNOWN_ERROR;
use crate::services::task_status::TaskUpdate;
use crate::utils::ReceiverError;

/// Download location of a finished dump, built from the archive path
pub fn dump_url(prefix: &str, archive: &str) -> Option<String> {
    let file = Path::new(archive).file_name()?.to_str()?;
    Some(format!("{}/{}", prefix.trim_end_matches('/'), file))
}

impl Receiver {
    pub(super) async fn dump_environment(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        report: MessageReport,
    ) -> Result<Disposition, ReceiverError> {
        let update = match report.header.status {
            Some(TaskStatus::Error) => {
                let text = report.header.error_text().unwrap_or(UNKNOWN_ERROR).to_string();
                uow.notify(NewNotification::error(text.clone())).await?;
                TaskUpdate::new(Some(TaskStatus::Error), Some(100), Some(text))
            }
            Some(TaskStatus::Ready) => {
                let url = report
                    .msg
                    .as_deref()
                    .and_then(|archive| dump_url(&self.config.dump_url_prefix, archive));
                if url.is_none() {
                    warn!(msg = ?report.msg, "Dump finished without an archive path");
                }

                uow.notify(NewNotification::done(
                    "Snapshot is ready. Visit Support page to download",
                ))
                .await?;
                TaskUpdate::new(Some(TaskStatus::Ready), report.header.progress, url)
            }
            status => TaskUpdate::new(status, report.header.progress, None),
        };

        self.updater.update(uow, task, update).await?;
        Ok(Disposition::Applied)
    }
}
