use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::{OverflowPolicy, SchedulerConfig};
use crate::error::SchedulerError;
use crate::metrics::SchedulerStats;
use crate::queue::{QueueDepths, QueuedTask, TaskQueues};
use crate::task::{OverrunCallback, Task, TaskAction, TaskError, TaskHandle, QUEUED_AT_KEY};
use crate::trace::{Trace, TraceMirror, TraceSink};
use crate::types::TaskPriority;

/// Lock a mutex, recovering the data if a previous holder panicked.
///
/// Task code never runs while one of these locks is held, so a poisoned
/// guard still protects consistent data.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// The frame scheduler. Owns the tier queues, statistics and trace buffer,
/// and runs frame passes either on demand or from a background driver.
///
/// Share it between producers as `Arc<Scheduler>`.
pub struct Scheduler {
    pub(super) config: SchedulerConfig,
    /// Time source for frame windows, task timing and starvation.
    pub(super) clock: Arc<dyn Clock>,
    /// Pending tasks per tier, plus the driver's idle flag.
    pub(super) queues: Mutex<TaskQueues>,
    /// Aggregate counters.
    pub(super) stats: Mutex<SchedulerStats>,
    /// Bounded trace buffer and optional external mirror.
    pub(super) traces: TraceSink,
    /// Set while a frame pass is in progress.
    pub(super) running: AtomicBool,
    /// Wakes the driver when work arrives at an idle scheduler.
    pub(super) wake: Notify,
}

impl Scheduler {
    /// Create a new scheduler using the system clock.
    pub fn new(config: SchedulerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a new scheduler reading time from `clock`.
    pub fn with_clock(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let traces = TraceSink::new(config.trace_capacity);
        Self {
            config,
            clock,
            queues: Mutex::new(TaskQueues::new()),
            stats: Mutex::new(SchedulerStats::default()),
            traces,
            running: AtomicBool::new(false),
            wake: Notify::new(),
        }
    }

    /// Attach a best-effort mirror that receives a copy of every trace.
    pub fn with_trace_mirror(mut self, mirror: Arc<dyn TraceMirror>) -> Self {
        self.traces.set_mirror(mirror);
        self
    }

    /// Queue a task at the tail of its tier.
    ///
    /// Stamps `queued_at`, generates an id when the task has none, and wakes
    /// the driver if it is idle. Fails only when a queue-depth limit is
    /// configured with [`OverflowPolicy::Reject`] and the tier is full.
    pub fn register(&self, mut task: Task) -> Result<TaskHandle, SchedulerError> {
        if task.id.is_empty() {
            task.id = Uuid::new_v4().to_string();
        }
        task.metadata.insert(
            QUEUED_AT_KEY.to_string(),
            serde_json::Value::String(Utc::now().to_rfc3339()),
        );

        let priority = task.priority;
        let (handle, completion) = TaskHandle::new(task.id.clone(), priority);
        let queued = QueuedTask::new(task, completion, self.clock.now());

        let (wake, evicted) = {
            let mut queues = lock(&self.queues);
            let mut evicted = None;
            let depth = queues.len(priority);
            if self.config.is_bounded() && depth >= self.config.max_queue_depth {
                match self.config.overflow_policy {
                    OverflowPolicy::Reject => {
                        warn!(task_id = %handle.id(), %priority, depth, "queue full, rejecting task");
                        return Err(SchedulerError::QueueFull { priority, depth });
                    }
                    OverflowPolicy::DropOldest => evicted = queues.pop_front(priority),
                }
            }
            queues.push(queued);
            (queues.take_wake(), evicted)
        };

        if let Some(old) = evicted {
            warn!(task_id = %old.task.id, %priority, "queue full, dropping oldest task");
            old.resolve(Err(TaskError::Dropped));
        }

        debug!(task_id = %handle.id(), %priority, "task registered");
        if wake {
            self.wake.notify_one();
        }
        Ok(handle)
    }

    /// Register with the tier's configured default budget.
    pub fn schedule(
        &self,
        priority: TaskPriority,
        id: impl Into<String>,
        action: TaskAction,
        on_overrun: Option<OverrunCallback>,
    ) -> Result<TaskHandle, SchedulerError> {
        let task = Task::new(id, priority, action)
            .with_budget(self.config.task_budget(priority))
            .with_overrun_callback(on_overrun);
        self.register(task)
    }

    /// Queue an audio task with the configured audio task budget.
    pub fn schedule_audio(
        &self,
        id: impl Into<String>,
        action: TaskAction,
        on_overrun: Option<OverrunCallback>,
    ) -> Result<TaskHandle, SchedulerError> {
        self.schedule(TaskPriority::Audio, id, action, on_overrun)
    }

    /// Queue an AI task with the configured AI task budget.
    pub fn schedule_ai(
        &self,
        id: impl Into<String>,
        action: TaskAction,
        on_overrun: Option<OverrunCallback>,
    ) -> Result<TaskHandle, SchedulerError> {
        self.schedule(TaskPriority::Ai, id, action, on_overrun)
    }

    /// Queue a UI task with the configured UI task budget.
    pub fn schedule_ui(
        &self,
        id: impl Into<String>,
        action: TaskAction,
        on_overrun: Option<OverrunCallback>,
    ) -> Result<TaskHandle, SchedulerError> {
        self.schedule(TaskPriority::Ui, id, action, on_overrun)
    }

    /// Emergency stop: discard every pending task without running it.
    ///
    /// Each discarded task's handle resolves with [`TaskError::Cleared`].
    /// Returns the number of tasks discarded.
    pub fn clear_queues(&self) -> usize {
        let drained = lock(&self.queues).drain_all();
        let count = drained.len();
        for queued in drained {
            queued.resolve(Err(TaskError::Cleared));
        }
        info!(count, "scheduler queues cleared");
        count
    }

    /// Deep copy of the current counters.
    pub fn get_stats(&self) -> SchedulerStats {
        lock(&self.stats).clone()
    }

    /// Zero every counter. Traces are left untouched.
    pub fn reset_stats(&self) {
        *lock(&self.stats) = SchedulerStats::default();
        debug!("scheduler stats reset");
    }

    /// The most recent `limit` traces, oldest first.
    pub fn get_traces(&self, limit: usize) -> Vec<Trace> {
        self.traces.recent(limit)
    }

    /// Store a trace in the buffer and forward it to the mirror.
    pub fn record_trace(&self, trace: Trace) {
        self.traces.record(trace);
    }

    /// Pending task count per tier.
    pub fn queue_depths(&self) -> QueueDepths {
        lock(&self.queues).depths()
    }

    /// Pending tasks across all tiers.
    pub fn pending_count(&self) -> usize {
        self.queue_depths().total()
    }

    /// Whether a frame pass is in progress right now.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// The configuration this scheduler was built with.
    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// The time source used for windows and task timing.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}
