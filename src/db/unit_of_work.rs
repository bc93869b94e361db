//! Transaction scope for handling one report
//!
//! Every store mutation and every notification of a report goes through one
//! `UnitOfWork`. Dropping it without calling [`UnitOfWork::commit`] rolls the
//! whole report back, notifications included.

use sqlx::{Sqlite, Transaction};

use super::{
    ClusterRepository, DbPool, NodeRepository, NotificationRepository, ReleaseRepository,
    TaskRepository,
};
use crate::models::{NewNotification, Notification};

pub struct UnitOfWork {
    tx: Transaction<'static, Sqlite>,
    recorded: Vec<Notification>,
}

impl UnitOfWork {
    pub async fn begin(pool: &DbPool) -> Result<Self, sqlx::Error> {
        Ok(Self {
            tx: pool.begin().await?,
            recorded: Vec::new(),
        })
    }

    pub fn tasks(&mut self) -> TaskRepository<'_> {
        TaskRepository::new(&mut self.tx)
    }

    pub fn nodes(&mut self) -> NodeRepository<'_> {
        NodeRepository::new(&mut self.tx)
    }

    pub fn clusters(&mut self) -> ClusterRepository<'_> {
        ClusterRepository::new(&mut self.tx)
    }

    pub fn releases(&mut self) -> ReleaseRepository<'_> {
        ReleaseRepository::new(&mut self.tx)
    }

    /// Record a notification as part of this unit
    ///
    /// It is persisted with the rest of the report and handed back by
    /// [`commit`](Self::commit) for publishing.
    pub async fn notify(&mut self, notification: NewNotification) -> Result<(), sqlx::Error> {
        let stored = NotificationRepository::new(&mut self.tx)
            .create(&notification)
            .await?;
        self.recorded.push(stored);
        Ok(())
    }

    /// Notifications recorded so far
    pub fn recorded(&self) -> &[Notification] {
        &self.recorded
    }

    /// Commit the transaction and return the recorded notifications
    pub async fn commit(self) -> Result<Vec<Notification>, sqlx::Error> {
        self.tx.commit().await?;
        Ok(self.recorded)
    }
}
