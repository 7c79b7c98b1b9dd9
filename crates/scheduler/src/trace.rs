//! Execution traces and the bounded buffer that retains them.
//!
//! Every executed (or deferred) task produces one immutable [`Trace`]. The
//! sink keeps the most recent N and forwards each one, best-effort, to an
//! optional [`TraceMirror`] read by external inspection tools.

use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::runner::{lock, panic_message};
use crate::types::TaskPriority;

// ── Ring buffer ──────────────────────────────────────────────────────

/// A fixed-size ring buffer backed by `VecDeque`.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    buf: VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer with the given capacity (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push an item, evicting the oldest if at capacity.
    pub fn push(&mut self, item: T) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(item);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate over items from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buf.iter()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// The newest `limit` items, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<T> {
        let skip = self.buf.len().saturating_sub(limit);
        self.buf.iter().skip(skip).cloned().collect()
    }
}

// ── Trace record ─────────────────────────────────────────────────────

/// Outcome of one task execution, recorded once and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub task_id: String,
    pub priority: TaskPriority,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration: Duration,
    pub budget: Duration,
    pub overrun: bool,
    /// Skipped this pass because the tier's window was already closed.
    pub deferred: bool,
    /// Ran as one of several same-tier tasks in a single phase.
    pub batched: bool,
    /// Failure text when the action errored or panicked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Trace {
    /// Trace for a task left in its queue because the window was closed.
    pub fn deferred(task_id: &str, priority: TaskPriority, budget: Duration, at: DateTime<Utc>) -> Self {
        Self {
            task_id: task_id.to_string(),
            priority,
            started_at: at,
            finished_at: at,
            duration: Duration::ZERO,
            budget,
            overrun: false,
            deferred: true,
            batched: false,
            error: None,
        }
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

// ── External mirror ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum TraceMirrorError {
    #[error("trace mirror unavailable: {0}")]
    Unavailable(String),
}

/// Passive, best-effort copy of traces for tools outside the scheduler.
///
/// Implementations must not block; errors are logged and dropped.
pub trait TraceMirror: Send + Sync {
    fn mirror(&self, trace: &Trace) -> Result<(), TraceMirrorError>;
}

/// Shared, capped in-memory trace array that inspection tools can poll.
///
/// Clones share the same storage. Writes use `try_lock`, so a reader holding
/// the lock makes the scheduler skip that trace instead of waiting.
#[derive(Debug, Clone)]
pub struct SharedTraceLog {
    inner: Arc<Mutex<RingBuffer<Trace>>>,
}

impl SharedTraceLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RingBuffer::new(capacity))),
        }
    }

    /// Copy of every retained trace, oldest first.
    pub fn snapshot(&self) -> Vec<Trace> {
        let buf = lock(&self.inner);
        buf.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize the retained traces as a JSON array.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.snapshot()).unwrap_or(serde_json::Value::Null)
    }
}

impl TraceMirror for SharedTraceLog {
    fn mirror(&self, trace: &Trace) -> Result<(), TraceMirrorError> {
        match self.inner.try_lock() {
            Ok(mut buf) => {
                buf.push(trace.clone());
                Ok(())
            }
            Err(TryLockError::WouldBlock) => {
                Err(TraceMirrorError::Unavailable("log is busy".into()))
            }
            Err(TryLockError::Poisoned(poisoned)) => {
                poisoned.into_inner().push(trace.clone());
                Ok(())
            }
        }
    }
}

// ── Sink ─────────────────────────────────────────────────────────────

/// Bounded trace store owned by the scheduler.
pub(crate) struct TraceSink {
    buffer: Mutex<RingBuffer<Trace>>,
    mirror: Option<Arc<dyn TraceMirror>>,
}

impl TraceSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Mutex::new(RingBuffer::new(capacity)),
            mirror: None,
        }
    }

    pub fn set_mirror(&mut self, mirror: Arc<dyn TraceMirror>) {
        self.mirror = Some(mirror);
    }

    /// Keep the trace, then hand a copy to the mirror. Mirror errors and
    /// panics are logged and dropped.
    pub fn record(&self, trace: Trace) {
        let Some(mirror) = &self.mirror else {
            lock(&self.buffer).push(trace);
            return;
        };
        lock(&self.buffer).push(trace.clone());

        match catch_unwind(AssertUnwindSafe(|| mirror.mirror(&trace))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(task_id = %trace.task_id, error = %e, "trace mirror skipped"),
            Err(payload) => warn!(
                task_id = %trace.task_id,
                panic = %panic_message(payload.as_ref()),
                "trace mirror panicked"
            ),
        }
    }

    pub fn recent(&self, limit: usize) -> Vec<Trace> {
        lock(&self.buffer).recent(limit)
    }

    pub fn len(&self) -> usize {
        lock(&self.buffer).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn trace(id: &str) -> Trace {
        Trace {
            task_id: id.to_string(),
            priority: TaskPriority::Ui,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            duration: Duration::from_millis(1),
            budget: Duration::from_millis(100),
            overrun: false,
            deferred: false,
            batched: false,
            error: None,
        }
    }

    #[test]
    fn ring_buffer_evicts_oldest() {
        let mut ring = RingBuffer::new(3);
        for i in 0..5 {
            ring.push(i);
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.iter().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
        assert_eq!(ring.recent(2), vec![3, 4]);
        assert_eq!(ring.recent(10), vec![2, 3, 4]);
        assert!(ring.recent(0).is_empty());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let mut ring = RingBuffer::new(0);
        ring.push("a");
        ring.push("b");
        assert_eq!(ring.capacity(), 1);
        assert_eq!(ring.recent(5), vec!["b"]);
    }

    #[test]
    fn sink_retains_most_recent() {
        let sink = TraceSink::new(2);
        sink.record(trace("a"));
        sink.record(trace("b"));
        sink.record(trace("c"));
        let ids: Vec<String> = sink.recent(10).into_iter().map(|t| t.task_id).collect();
        assert_eq!(ids, vec!["b", "c"]);
        assert_eq!(sink.len(), 2);
    }

    #[test]
    fn shared_log_mirrors_traces() {
        let log = SharedTraceLog::new(10);
        let mut sink = TraceSink::new(10);
        sink.set_mirror(Arc::new(log.clone()));

        sink.record(trace("a"));
        sink.record(trace("b"));

        assert_eq!(log.len(), 2);
        assert_eq!(log.snapshot()[1].task_id, "b");
        assert!(log.to_json().as_array().is_some());
    }

    #[test]
    fn busy_mirror_never_blocks_the_sink() {
        let log = SharedTraceLog::new(10);
        let mut sink = TraceSink::new(10);
        sink.set_mirror(Arc::new(log.clone()));

        let guard = log.inner.lock().unwrap();
        sink.record(trace("while-busy"));
        drop(guard);

        assert_eq!(sink.len(), 1, "sink still keeps its own copy");
        assert!(log.is_empty(), "mirror skipped the trace");
    }

    struct BrokenMirror;

    impl TraceMirror for BrokenMirror {
        fn mirror(&self, _trace: &Trace) -> Result<(), TraceMirrorError> {
            Err(TraceMirrorError::Unavailable("no inspector attached".into()))
        }
    }

    #[test]
    fn failing_mirror_is_ignored() {
        let mut sink = TraceSink::new(4);
        sink.set_mirror(Arc::new(BrokenMirror));
        sink.record(trace("a"));
        assert_eq!(sink.recent(1)[0].task_id, "a");
    }

    struct PanickingMirror;

    impl TraceMirror for PanickingMirror {
        fn mirror(&self, _trace: &Trace) -> Result<(), TraceMirrorError> {
            panic!("inspector crashed")
        }
    }

    #[test]
    fn panicking_mirror_is_contained() {
        let mut sink = TraceSink::new(4);
        sink.set_mirror(Arc::new(PanickingMirror));
        sink.record(trace("a"));
        sink.record(trace("b"));
        let ids: Vec<String> = sink.recent(4).into_iter().map(|t| t.task_id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn trace_json_omits_missing_error() {
        let json = serde_json::to_value(trace("a")).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["priority"], "ui");

        let deferred = Trace::deferred("b", TaskPriority::Ai, Duration::from_millis(50), Utc::now());
        assert!(deferred.deferred);
        assert!(!deferred.failed());
        assert_eq!(deferred.duration, Duration::ZERO);
    }
}
