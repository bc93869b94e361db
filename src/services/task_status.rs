//! Task status updater
//!
//! Applies a status/progress/message/result change to a task and derives
//! the state of everything that depends on it: the owning cluster and the
//! parent task.

use serde_json::Value;
use tracing::{debug, info};

use crate::db::UnitOfWork;
use crate::models::{ClusterStatus, Node, Task, TaskKind, TaskStatus};

/// Changes to apply to a task; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskUpdate {
    pub status: Option<TaskStatus>,
    pub progress: Option<u8>,
    pub message: Option<String>,
    pub result: Option<Value>,
}

impl TaskUpdate {
    pub fn new(status: Option<TaskStatus>, progress: Option<u8>, message: Option<String>) -> Self {
        Self {
            status,
            progress,
            message,
            result: None,
        }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TaskStatusUpdater;

impl TaskStatusUpdater {
    pub fn new() -> Self {
        Self
    }

    /// Apply an update to a task
    ///
    /// A task that already finished is left untouched. A non-empty result
    /// replaces the stored one.
    pub async fn update(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        update: TaskUpdate,
    ) -> Result<(), sqlx::Error> {
        self.apply(uow, task, update, false).await
    }

    /// Apply an update carrying verification results
    ///
    /// Unlike [`update`](Self::update) the result always replaces the stored
    /// one, so a clean verification clears the findings of a previous run.
    pub async fn update_verification(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        update: TaskUpdate,
    ) -> Result<(), sqlx::Error> {
        self.apply(uow, task, update, true).await
    }

    async fn apply(
        &self,
        uow: &mut UnitOfWork,
        task: &mut Task,
        update: TaskUpdate,
        replace_result: bool,
    ) -> Result<(), sqlx::Error> {
        if task.is_finished() {
            debug!(task_uuid = %task.uuid, status = %task.status, "Task already finished, update skipped");
            return Ok(());
        }

        if let Some(status) = update.status {
            task.status = status;
        }
        if let Some(progress) = update.progress {
            task.progress = progress.min(100);
        }
        if let Some(message) = update.message {
            task.message = Some(message);
        }
        match update.result {
            Some(result) if replace_result || !is_empty_result(&result) => task.result = result,
            None if replace_result => task.result = Value::Array(Vec::new()),
            _ => {}
        }

        if task.is_finished() {
            task.progress = 100;
        }

        uow.tasks().update(task).await?;

        if task.is_finished() {
            info!(
                task_uuid = %task.uuid,
                kind = %task.kind,
                status = %task.status,
                "Task finished"
            );
            derive_cluster_status(uow, task).await?;
        }

        if let Some(parent_id) = task.parent_id {
            update_parent(uow, parent_id).await?;
        }

        Ok(())
    }
}

fn is_empty_result(result: &Value) -> bool {
    match result {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Reflect a finished task on its cluster
async fn derive_cluster_status(uow: &mut UnitOfWork, task: &Task) -> Result<(), sqlx::Error> {
    let Some(cluster_id) = task.cluster_id else {
        return Ok(());
    };

    match (task.kind, task.status) {
        (TaskKind::Deploy, TaskStatus::Ready) => {
            uow.clusters()
                .set_status(cluster_id, ClusterStatus::Operational)
                .await?;
            uow.nodes().clear_pending_flags(cluster_id).await?;
        }
        (TaskKind::Deploy, TaskStatus::Error) | (TaskKind::Provision, TaskStatus::Error) => {
            uow.clusters()
                .set_status(cluster_id, ClusterStatus::Error)
                .await?;
        }
        _ => {}
    }

    Ok(())
}

/// Recompute a parent task from its children
async fn update_parent(uow: &mut UnitOfWork, parent_id: i64) -> Result<(), sqlx::Error> {
    let Some(mut parent) = uow.tasks().lock_by_id(parent_id).await? else {
        return Ok(());
    };
    if parent.is_finished() {
        return Ok(());
    }

    let children = uow.tasks().children(parent_id).await?;
    if children.is_empty() {
        return Ok(());
    }

    let failed: Vec<&Task> = children
        .iter()
        .filter(|child| child.status == TaskStatus::Error)
        .collect();

    if !failed.is_empty() {
        parent.status = TaskStatus::Error;
        parent.progress = 100;
        let messages: Vec<&str> = failed
            .iter()
            .filter_map(|child| child.message.as_deref())
            .filter(|message| !message.is_empty())
            .collect();
        if !messages.is_empty() {
            parent.message = Some(messages.join("\n"));
        }
    } else if children.iter().all(|child| child.status == TaskStatus::Ready) {
        parent.status = TaskStatus::Ready;
        parent.progress = 100;
    } else {
        let total: u32 = children.iter().map(|child| u32::from(child.progress)).sum();
        parent.progress = (total / children.len() as u32) as u8;
    }

    uow.tasks().update(&parent).await?;

    if parent.is_finished() {
        info!(task_uuid = %parent.uuid, status = %parent.status, "Parent task finished");
        derive_cluster_status(uow, &parent).await?;
    }

    Ok(())
}

/// Mean progress of the nodes that will remain in a cluster
///
/// Nodes pending deletion are ignored; an empty cluster yields 0.
pub fn cluster_progress(nodes: &[Node]) -> u8 {
    let counted: Vec<u32> = nodes
        .iter()
        .filter(|node| !node.pending_deletion)
        .map(|node| u32::from(node.progress))
        .collect();

    if counted.is_empty() {
        return 0;
    }

    (counted.iter().sum::<u32>() / counted.len() as u32) as u8
}

/// Recalculate the overall progress of a deployment-style task
pub async fn recalculate_progress(uow: &mut UnitOfWork, task: &Task) -> Result<u8, sqlx::Error> {
    let Some(cluster_id) = task.cluster_id else {
        return Ok(task.progress);
    };

    let nodes = uow.nodes().filter_by_cluster(cluster_id).await?;
    Ok(cluster_progress(&nodes))
}
