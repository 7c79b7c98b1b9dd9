use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;

use crate::types::TaskPriority;

/// Metadata key stamped by the scheduler when a task enters its queue.
pub const QUEUED_AT_KEY: &str = "queued_at";

/// Error type for task execution and completion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("Task failed: {0}")]
    Failed(String),
    #[error("Task panicked: {0}")]
    Panicked(String),
    #[error("Task cleared before execution")]
    Cleared,
    #[error("Task dropped from a full queue")]
    Dropped,
    #[error("Task abandoned: scheduler went away before running it")]
    Abandoned,
}

impl TaskError {
    pub fn failed(msg: impl Into<String>) -> Self {
        TaskError::Failed(msg.into())
    }
}

/// Called with `(actual, budget)` when a task ran longer than its budget.
pub type OverrunCallback = Box<dyn FnOnce(Duration, Duration) + Send + 'static>;

type SyncAction = Box<dyn FnOnce() -> Result<(), TaskError> + Send + 'static>;

/// The work a task performs. Async actions are awaited in line by the frame
/// driver, so they occupy the phase until they resolve.
pub enum TaskAction {
    Sync(SyncAction),
    Async(BoxFuture<'static, Result<(), TaskError>>),
}

impl TaskAction {
    pub fn sync<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        TaskAction::Sync(Box::new(f))
    }

    pub fn future<Fut>(fut: Fut) -> Self
    where
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        TaskAction::Async(fut.boxed())
    }
}

impl fmt::Debug for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskAction::Sync(_) => f.write_str("TaskAction::Sync"),
            TaskAction::Async(_) => f.write_str("TaskAction::Async"),
        }
    }
}

/// A unit of deferred work.
///
/// Once handed to [`Scheduler::register`](crate::runner::Scheduler::register)
/// the task is moved into its queue and owned by the scheduler until it runs.
pub struct Task {
    /// Producer supplied; an empty id is replaced with a generated UUID.
    pub id: String,
    pub priority: TaskPriority,
    /// Expected maximum execution time. Used for overrun reporting only,
    /// never for admission.
    pub budget: Duration,
    pub metadata: HashMap<String, serde_json::Value>,
    pub(crate) action: TaskAction,
    pub(crate) on_overrun: Option<OverrunCallback>,
}

impl Task {
    /// Create a task with the tier's default budget.
    pub fn new(id: impl Into<String>, priority: TaskPriority, action: TaskAction) -> Self {
        Self {
            id: id.into(),
            priority,
            budget: priority.default_task_budget(),
            metadata: HashMap::new(),
            action,
            on_overrun: None,
        }
    }

    pub fn from_fn<F>(id: impl Into<String>, priority: TaskPriority, f: F) -> Self
    where
        F: FnOnce() -> Result<(), TaskError> + Send + 'static,
    {
        Self::new(id, priority, TaskAction::sync(f))
    }

    pub fn from_future<Fut>(id: impl Into<String>, priority: TaskPriority, fut: Fut) -> Self
    where
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        Self::new(id, priority, TaskAction::future(fut))
    }

    pub fn with_budget(mut self, budget: Duration) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_budget_ms(self, ms: u64) -> Self {
        self.with_budget(Duration::from_millis(ms))
    }

    pub fn on_overrun<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(Duration, Duration) + Send + 'static,
    {
        self.on_overrun = Some(Box::new(callback));
        self
    }

    pub(crate) fn with_overrun_callback(mut self, callback: Option<OverrunCallback>) -> Self {
        self.on_overrun = callback;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn has_overrun_callback(&self) -> bool {
        self.on_overrun.is_some()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("budget", &self.budget)
            .field("action", &self.action)
            .field("on_overrun", &self.on_overrun.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// Successful result of running a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub id: String,
    pub priority: TaskPriority,
    pub duration: Duration,
    pub overrun: bool,
}

pub(crate) type Completion = oneshot::Sender<Result<TaskOutcome, TaskError>>;

/// Producer-side handle resolved when the task runs, fails, or is discarded.
///
/// Dropping the handle is fine; the task still runs.
#[derive(Debug)]
pub struct TaskHandle {
    id: String,
    priority: TaskPriority,
    rx: oneshot::Receiver<Result<TaskOutcome, TaskError>>,
}

impl TaskHandle {
    pub(crate) fn new(id: String, priority: TaskPriority) -> (Self, Completion) {
        let (tx, rx) = oneshot::channel();
        (Self { id, priority, rx }, tx)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Wait for the task to be resolved.
    pub async fn wait(self) -> Result<TaskOutcome, TaskError> {
        self.rx.await.unwrap_or(Err(TaskError::Abandoned))
    }

    /// Non-blocking check. `None` while the task is still pending.
    pub fn try_result(&mut self) -> Option<Result<TaskOutcome, TaskError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(TaskError::Abandoned)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_uses_tier_default_budget() {
        let task = Task::from_fn("fft", TaskPriority::Audio, || Ok(()));
        assert_eq!(task.budget, Duration::from_millis(16));
        assert!(!task.has_overrun_callback());
        assert!(matches!(task.action, TaskAction::Sync(_)));
    }

    #[test]
    fn builder_sets_budget_callback_and_metadata() {
        let task = Task::from_future("infer", TaskPriority::Ai, async { Ok(()) })
            .with_budget_ms(5)
            .on_overrun(|_, _| {})
            .with_metadata("model", "stem-separator");
        assert_eq!(task.budget, Duration::from_millis(5));
        assert!(task.has_overrun_callback());
        assert!(matches!(task.action, TaskAction::Async(_)));
        assert_eq!(task.metadata["model"], "stem-separator");
    }

    #[test]
    fn debug_hides_closures() {
        let task = Task::from_fn("meter", TaskPriority::Ui, || Ok(()));
        let dbg = format!("{task:?}");
        assert!(dbg.contains("meter"));
        assert!(dbg.contains("TaskAction::Sync"));
    }

    #[tokio::test]
    async fn handle_resolves_with_sent_outcome() {
        let (handle, tx) = TaskHandle::new("t1".into(), TaskPriority::Ui);
        assert_eq!(handle.id(), "t1");
        tx.send(Ok(TaskOutcome {
            id: "t1".into(),
            priority: TaskPriority::Ui,
            duration: Duration::from_millis(3),
            overrun: false,
        }))
        .unwrap();
        let outcome = handle.wait().await.unwrap();
        assert_eq!(outcome.duration, Duration::from_millis(3));
    }

    #[tokio::test]
    async fn dropped_sender_means_abandoned() {
        let (mut handle, tx) = TaskHandle::new("t2".into(), TaskPriority::Ai);
        assert!(handle.try_result().is_none());
        drop(tx);
        assert_eq!(handle.try_result(), Some(Err(TaskError::Abandoned)));
    }
}
