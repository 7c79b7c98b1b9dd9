use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, warn};

use crate::budget::{is_overrun, FrameBudget};
use crate::queue::{QueueDepths, QueuedTask};
use crate::task::{OverrunCallback, Task, TaskAction, TaskError, TaskOutcome};
use crate::trace::Trace;
use crate::types::TaskPriority;

use super::core::lock;
use super::Scheduler;

/// What one frame pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FrameReport {
    /// Another pass was already running; this call did nothing.
    pub skipped: bool,
    pub audio_executed: usize,
    /// The audio window was spent before the phase could start.
    pub audio_phase_skipped: bool,
    pub ai_executed: usize,
    pub ai_deferred: usize,
    pub ui_executed: usize,
    /// More than one UI task ran in this pass.
    pub ui_batched: bool,
    pub starvation_detected: bool,
    /// Queue depths after the pass.
    pub pending: QueueDepths,
    /// Another pass should follow.
    pub more_work: bool,
}

impl FrameReport {
    /// Tasks executed across all phases.
    pub fn executed(&self) -> usize {
        self.audio_executed + self.ai_executed + self.ui_executed
    }
}

/// Holds the `running` flag for the duration of a pass, releasing it even if
/// the pass future is dropped mid-flight.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl Scheduler {
    /// Run one frame pass starting now.
    pub async fn run_frame(&self) -> FrameReport {
        self.run_frame_since(self.clock.now()).await
    }

    /// Run one frame pass whose window opened at `frame_start`.
    ///
    /// A start in the past (e.g. the instant a wake-up was requested) eats
    /// into every tier's window; if the audio window is already gone the
    /// audio phase is skipped and counted as a starvation warning.
    pub async fn run_frame_since(&self, frame_start: Instant) -> FrameReport {
        let Some(guard) = RunningGuard::acquire(&self.running) else {
            debug!("frame pass already in progress, skipping");
            return FrameReport {
                skipped: true,
                ..FrameReport::default()
            };
        };

        let budget = FrameBudget::new(self.clock(), frame_start, &self.config);
        let mut report = FrameReport::default();

        self.audio_phase(&budget, &mut report).await;
        self.ai_phase(&budget, &mut report).await;
        self.ui_phase(&budget, &mut report).await;
        report.starvation_detected = self.check_starvation();

        lock(&self.stats).frames_run += 1;
        drop(guard);

        {
            let mut queues = lock(&self.queues);
            report.pending = queues.depths();
            report.more_work = queues.settle();
        }

        if report.executed() > 0 || report.ai_deferred > 0 {
            debug!(
                audio = report.audio_executed,
                ai = report.ai_executed,
                ai_deferred = report.ai_deferred,
                ui = report.ui_executed,
                pending = report.pending.total(),
                elapsed_us = budget.elapsed().as_micros() as u64,
                "frame pass complete"
            );
        }
        report
    }

    /// Drain audio tasks while the audio window is open.
    async fn audio_phase(&self, budget: &FrameBudget, report: &mut FrameReport) {
        let tier = TaskPriority::Audio;
        if self.queued_len(tier) == 0 {
            return;
        }

        if !budget.admits(tier) {
            {
                let mut stats = lock(&self.stats);
                stats.starvation_warnings += 1;
                stats.audio_phases_skipped += 1;
            }
            warn!(
                elapsed_ms = budget.elapsed().as_millis() as u64,
                pending = self.queued_len(tier),
                "audio phase skipped: frame window already spent"
            );
            report.audio_phase_skipped = true;
            return;
        }

        while budget.admits(tier) {
            let Some(queued) = self.pop(tier) else { break };
            let trace = self.execute(queued).await;
            self.traces.record(trace);
            report.audio_executed += 1;
        }
    }

    /// Run up to the AI cap, or defer every queued AI task if the window is closed.
    async fn ai_phase(&self, budget: &FrameBudget, report: &mut FrameReport) {
        let tier = TaskPriority::Ai;
        if self.queued_len(tier) == 0 {
            return;
        }

        if !budget.admits(tier) {
            report.ai_deferred = self.defer_queued(tier);
            return;
        }

        let traces = self.run_capped(tier, budget).await;
        report.ai_executed = traces.len();
        for trace in traces {
            self.traces.record(trace);
        }
    }

    /// Run one UI batch; multi-task batches are flagged as such.
    async fn ui_phase(&self, budget: &FrameBudget, report: &mut FrameReport) {
        let tier = TaskPriority::Ui;
        if self.queued_len(tier) == 0 {
            return;
        }

        if !budget.admits(tier) {
            debug!(pending = self.queued_len(tier), "ui window closed, skipping phase");
            return;
        }

        let mut traces = self.run_capped(tier, budget).await;
        let batched = traces.len() > 1;
        if batched {
            for trace in &mut traces {
                trace.batched = true;
            }
            lock(&self.stats).record_batched(tier, traces.len());
        }

        report.ui_executed = traces.len();
        report.ui_batched = batched;
        for trace in traces {
            self.traces.record(trace);
        }
    }

    /// Execute head tasks up to the tier's cap, stopping once the time left
    /// in the tier's window at phase start has been used.
    async fn run_capped(&self, tier: TaskPriority, budget: &FrameBudget) -> Vec<Trace> {
        let limit = self.config.batch_limit(tier).unwrap_or(usize::MAX);
        let window = budget.remaining(tier);
        let phase_start = self.clock.now();

        let mut traces = Vec::new();
        while traces.len() < limit {
            if self.clock.now().saturating_duration_since(phase_start) >= window {
                break;
            }
            let Some(queued) = self.pop(tier) else { break };
            traces.push(self.execute(queued).await);
        }
        traces
    }

    /// Count and trace every queued task of `tier` as deferred. Nothing is
    /// removed; the tasks stay at their positions for the next pass.
    fn defer_queued(&self, tier: TaskPriority) -> usize {
        let now = Utc::now();
        let deferred: Vec<Trace> = lock(&self.queues)
            .iter(tier)
            .map(|q| Trace::deferred(&q.task.id, tier, q.task.budget, now))
            .collect();

        let count = deferred.len();
        lock(&self.stats).record_deferred(tier, count);
        for trace in deferred {
            self.traces.record(trace);
        }
        debug!(count, %tier, "window closed, deferring queued tasks");
        count
    }

    /// Flag the audio head if it has waited past the starvation threshold.
    ///
    /// Observational only. Each task is counted at most once, however many
    /// passes it stays at the head.
    pub(super) fn check_starvation(&self) -> bool {
        let threshold = self.config.starvation_threshold();
        let now = self.clock.now();

        let starved = {
            let mut queues = lock(&self.queues);
            match queues.front_mut(TaskPriority::Audio) {
                Some(head) if !head.starvation_reported => {
                    let waited = now.saturating_duration_since(head.enqueued_at);
                    if waited > threshold {
                        head.starvation_reported = true;
                        Some((head.task.id.clone(), waited))
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };

        let Some((task_id, waited)) = starved else {
            return false;
        };
        lock(&self.stats).starvation_warnings += 1;
        warn!(
            task_id = %task_id,
            waited_ms = waited.as_millis() as u64,
            threshold_ms = threshold.as_millis() as u64,
            "audio task starving at head of queue"
        );
        true
    }

    /// Run one task, time it, update stats, and resolve its handle.
    async fn execute(&self, queued: QueuedTask) -> Trace {
        let QueuedTask { task, completion, .. } = queued;
        let Task {
            id,
            priority,
            budget,
            action,
            on_overrun,
            ..
        } = task;

        let started_at = Utc::now();
        let start = self.clock.now();
        let result = invoke(action).await;
        let duration = self.clock.now().saturating_duration_since(start);
        let overrun = result.is_ok() && is_overrun(duration, budget);

        match &result {
            Ok(()) => debug!(task_id = %id, %priority, duration_us = duration.as_micros() as u64, "task completed"),
            Err(e) => warn!(task_id = %id, %priority, error = %e, "task failed"),
        }

        if overrun {
            debug!(
                task_id = %id,
                actual_us = duration.as_micros() as u64,
                budget_us = budget.as_micros() as u64,
                "task overran its budget"
            );
            if let Some(callback) = on_overrun {
                fire_overrun(&id, callback, duration, budget);
            }
        }

        lock(&self.stats).record_execution(priority, duration, overrun, result.is_err(), started_at);

        let finished_at = started_at
            + chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
        let trace = Trace {
            task_id: id.clone(),
            priority,
            started_at,
            finished_at,
            duration,
            budget,
            overrun,
            deferred: false,
            batched: false,
            error: result.as_ref().err().map(ToString::to_string),
        };

        // Receiver may already be gone; the producer chose not to wait.
        let _ = completion.send(result.map(|()| TaskOutcome {
            id,
            priority,
            duration,
            overrun,
        }));
        trace
    }

    fn pop(&self, tier: TaskPriority) -> Option<QueuedTask> {
        lock(&self.queues).pop_front(tier)
    }

    fn queued_len(&self, tier: TaskPriority) -> usize {
        lock(&self.queues).len(tier)
    }
}

/// Run an action, turning panics into [`TaskError::Panicked`].
async fn invoke(action: TaskAction) -> Result<(), TaskError> {
    match action {
        TaskAction::Sync(f) => std::panic::catch_unwind(AssertUnwindSafe(f))
            .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref())))),
        TaskAction::Async(fut) => AssertUnwindSafe(fut)
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(TaskError::Panicked(panic_message(payload.as_ref())))),
    }
}

fn fire_overrun(task_id: &str, callback: OverrunCallback, actual: Duration, budget: Duration) {
    let outcome = std::panic::catch_unwind(AssertUnwindSafe(move || callback(actual, budget)));
    if let Err(payload) = outcome {
        warn!(
            task_id = %task_id,
            panic = %panic_message(payload.as_ref()),
            "overrun callback panicked"
        );
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
