use thiserror::Error;

use crate::types::TaskPriority;

/// Errors surfaced synchronously by the scheduler API.
///
/// Task execution failures never appear here; they are reported through the
/// task's [`TaskHandle`](crate::task::TaskHandle) as a [`TaskError`](crate::task::TaskError).
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("{priority} queue is full ({depth} pending)")]
    QueueFull { priority: TaskPriority, depth: usize },

    #[error("config error: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("config I/O error: {0}")]
    ConfigIo(#[from] std::io::Error),
}
