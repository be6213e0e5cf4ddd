//! Background dispatch with a single-threaded notification consumer

pub mod coordinator;
pub mod notification;

pub use coordinator::{DispatchSnapshot, Dispatcher, PendingTask, SubmitRejection, TaskState};
pub use notification::{Notification, Progress};
