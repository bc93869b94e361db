//! Business logic services

pub mod notification;
pub mod outcome;
pub mod receiver;
pub mod task_status;

pub use notification::{NotificationEvent, NotificationService};
pub use receiver::{Disposition, Receiver};
pub use task_status::{TaskStatusUpdater, TaskUpdate};
