//! Per-tier FIFO queues.
//!
//! Tasks are appended at the tail and popped from the head; nothing ever
//! reorders a tier. The `idle` flag lives here so that "queue became
//! non-empty" and "driver needs a wake-up" are decided under one lock.

use std::collections::VecDeque;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::task::{Completion, Task, TaskError, TaskOutcome};
use crate::types::TaskPriority;

/// A task waiting in its tier queue, plus scheduler bookkeeping.
pub(crate) struct QueuedTask {
    pub task: Task,
    pub completion: Completion,
    /// Monotonic enqueue instant used for starvation detection.
    pub enqueued_at: Instant,
    /// Set once a starvation warning has been counted for this task.
    pub starvation_reported: bool,
}

impl QueuedTask {
    pub fn new(task: Task, completion: Completion, enqueued_at: Instant) -> Self {
        Self {
            task,
            completion,
            enqueued_at,
            starvation_reported: false,
        }
    }

    /// Resolve the producer's handle without running the task.
    pub fn resolve(self, result: Result<TaskOutcome, TaskError>) {
        // Receiver may already be gone; that is the producer's choice.
        let _ = self.completion.send(result);
    }
}

/// Pending task count per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueDepths {
    pub audio: usize,
    pub ai: usize,
    pub ui: usize,
}

impl QueueDepths {
    /// Depth of one tier.
    pub fn get(&self, priority: TaskPriority) -> usize {
        match priority {
            TaskPriority::Audio => self.audio,
            TaskPriority::Ai => self.ai,
            TaskPriority::Ui => self.ui,
        }
    }

    /// Depth summed over every tier.
    pub fn total(&self) -> usize {
        self.audio + self.ai + self.ui
    }
}

pub(crate) struct TaskQueues {
    audio: VecDeque<QueuedTask>,
    ai: VecDeque<QueuedTask>,
    ui: VecDeque<QueuedTask>,
    /// True while no frame pass is pending or running.
    idle: bool,
}

impl TaskQueues {
    pub fn new() -> Self {
        Self {
            audio: VecDeque::new(),
            ai: VecDeque::new(),
            ui: VecDeque::new(),
            idle: true,
        }
    }

    fn tier(&self, priority: TaskPriority) -> &VecDeque<QueuedTask> {
        match priority {
            TaskPriority::Audio => &self.audio,
            TaskPriority::Ai => &self.ai,
            TaskPriority::Ui => &self.ui,
        }
    }

    fn tier_mut(&mut self, priority: TaskPriority) -> &mut VecDeque<QueuedTask> {
        match priority {
            TaskPriority::Audio => &mut self.audio,
            TaskPriority::Ai => &mut self.ai,
            TaskPriority::Ui => &mut self.ui,
        }
    }

    pub fn push(&mut self, queued: QueuedTask) {
        let priority = queued.task.priority;
        self.tier_mut(priority).push_back(queued);
    }

    pub fn pop_front(&mut self, priority: TaskPriority) -> Option<QueuedTask> {
        self.tier_mut(priority).pop_front()
    }

    pub fn front_mut(&mut self, priority: TaskPriority) -> Option<&mut QueuedTask> {
        self.tier_mut(priority).front_mut()
    }

    pub fn iter(&self, priority: TaskPriority) -> impl Iterator<Item = &QueuedTask> {
        self.tier(priority).iter()
    }

    pub fn len(&self, priority: TaskPriority) -> usize {
        self.tier(priority).len()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_empty() && self.ai.is_empty() && self.ui.is_empty()
    }

    pub fn depths(&self) -> QueueDepths {
        QueueDepths {
            audio: self.audio.len(),
            ai: self.ai.len(),
            ui: self.ui.len(),
        }
    }

    /// Remove every pending task from every tier.
    pub fn drain_all(&mut self) -> Vec<QueuedTask> {
        let mut drained = Vec::with_capacity(self.depths().total());
        drained.extend(self.audio.drain(..));
        drained.extend(self.ai.drain(..));
        drained.extend(self.ui.drain(..));
        drained
    }

    /// Consume the idle flag. Returns true when the caller must wake the driver.
    pub fn take_wake(&mut self) -> bool {
        std::mem::replace(&mut self.idle, false)
    }

    /// Mark the driver idle regardless of pending work. Used when the driver
    /// exits so that a later driver can be woken.
    pub fn park(&mut self) {
        self.idle = true;
    }

    /// Mark the driver idle if nothing is pending. Returns whether more work remains.
    pub fn settle(&mut self) -> bool {
        let more_work = !self.is_empty();
        if !more_work {
            self.idle = true;
        }
        more_work
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskHandle;

    fn queued(id: &str, priority: TaskPriority) -> (QueuedTask, TaskHandle) {
        let task = Task::from_fn(id, priority, || Ok(()));
        let (handle, tx) = TaskHandle::new(id.to_string(), priority);
        (QueuedTask::new(task, tx, Instant::now()), handle)
    }

    #[test]
    fn fifo_within_tier() {
        let mut queues = TaskQueues::new();
        for id in ["a", "b", "c"] {
            queues.push(queued(id, TaskPriority::Audio).0);
        }
        let order: Vec<String> = std::iter::from_fn(|| queues.pop_front(TaskPriority::Audio))
            .map(|q| q.task.id)
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn tiers_are_independent() {
        let mut queues = TaskQueues::new();
        queues.push(queued("ui-1", TaskPriority::Ui).0);
        queues.push(queued("ai-1", TaskPriority::Ai).0);
        queues.push(queued("ui-2", TaskPriority::Ui).0);

        let depths = queues.depths();
        assert_eq!(depths, QueueDepths { audio: 0, ai: 1, ui: 2 });
        assert_eq!(depths.total(), 3);
        assert_eq!(depths.get(TaskPriority::Ui), 2);
        assert!(queues.pop_front(TaskPriority::Audio).is_none());
        assert_eq!(queues.pop_front(TaskPriority::Ui).unwrap().task.id, "ui-1");
    }

    #[test]
    fn idle_flag_is_edge_triggered() {
        let mut queues = TaskQueues::new();
        assert!(queues.take_wake(), "first registration wakes an idle driver");
        assert!(!queues.take_wake(), "second registration does not");

        queues.push(queued("x", TaskPriority::Ai).0);
        assert!(queues.settle(), "work remains, driver stays busy");
        assert!(!queues.take_wake());

        queues.pop_front(TaskPriority::Ai);
        assert!(!queues.settle());
        assert!(queues.take_wake(), "settled driver needs waking again");
    }

    #[test]
    fn parked_queues_wake_again_with_work_pending() {
        let mut queues = TaskQueues::new();
        assert!(queues.take_wake());
        queues.push(queued("left-over", TaskPriority::Ui).0);

        queues.park();
        assert!(queues.take_wake(), "parked flag is consumed like idle");
        assert!(!queues.take_wake());
    }

    #[tokio::test]
    async fn drain_all_empties_every_tier() {
        let mut queues = TaskQueues::new();
        let (a, _ha) = queued("a", TaskPriority::Audio);
        let (b, hb) = queued("b", TaskPriority::Ui);
        queues.push(a);
        queues.push(b);

        let drained = queues.drain_all();
        assert_eq!(drained.len(), 2);
        assert!(queues.is_empty());

        for q in drained {
            q.resolve(Err(TaskError::Cleared));
        }
        assert_eq!(hb.wait().await, Err(TaskError::Cleared));
    }
}
