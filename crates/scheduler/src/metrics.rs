use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::TaskPriority;

/// Counters for one tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TierStats {
    /// Tasks executed to the end, successful or not.
    pub completed: u64,
    /// Subset of `completed` whose action returned an error or panicked.
    pub failed: u64,
    /// Tasks that finished successfully but ran past their own budget.
    pub overruns: u64,
    /// Deferral events (a queued task skipped because its window was closed).
    pub deferred: u64,
    /// Tasks that ran as part of a multi-task batch.
    pub batched: u64,
    /// Total time spent executing this tier.
    pub busy_time: Duration,
    /// Rolling mean execution time.
    pub avg_duration: Duration,
    /// Wall-clock start of the most recent execution.
    pub last_executed_at: Option<DateTime<Utc>>,
}

/// Aggregate scheduler statistics exposed to diagnostics panels.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchedulerStats {
    pub audio: TierStats,
    pub ai: TierStats,
    pub ui: TierStats,
    /// Audio liveness warnings: skipped audio phases plus starved heads.
    pub starvation_warnings: u64,
    /// Audio phases skipped because the frame window was already spent.
    pub audio_phases_skipped: u64,
    /// Frame passes run to completion.
    pub frames_run: u64,
}

impl SchedulerStats {
    pub fn tier(&self, priority: TaskPriority) -> &TierStats {
        match priority {
            TaskPriority::Audio => &self.audio,
            TaskPriority::Ai => &self.ai,
            TaskPriority::Ui => &self.ui,
        }
    }

    pub(crate) fn tier_mut(&mut self, priority: TaskPriority) -> &mut TierStats {
        match priority {
            TaskPriority::Audio => &mut self.audio,
            TaskPriority::Ai => &mut self.ai,
            TaskPriority::Ui => &mut self.ui,
        }
    }

    /// Record one task execution.
    pub(crate) fn record_execution(
        &mut self,
        priority: TaskPriority,
        duration: Duration,
        overrun: bool,
        failed: bool,
        started_at: DateTime<Utc>,
    ) {
        let tier = self.tier_mut(priority);
        tier.completed += 1;
        if failed {
            tier.failed += 1;
        }
        if overrun {
            tier.overruns += 1;
        }
        tier.busy_time += duration;
        tier.last_executed_at = Some(started_at);

        // Incremental mean: new_avg = prev_avg + (duration - prev_avg) / count
        let count = tier.completed;
        tier.avg_duration = if count == 1 {
            duration
        } else {
            let prev_nanos = tier.avg_duration.as_nanos() as f64;
            let cur_nanos = duration.as_nanos() as f64;
            let avg_nanos = prev_nanos + (cur_nanos - prev_nanos) / count as f64;
            Duration::from_nanos(avg_nanos as u64)
        };
    }

    pub(crate) fn record_deferred(&mut self, priority: TaskPriority, count: usize) {
        self.tier_mut(priority).deferred += count as u64;
    }

    pub(crate) fn record_batched(&mut self, priority: TaskPriority, count: usize) {
        self.tier_mut(priority).batched += count as u64;
    }

    /// Total tasks executed across all tiers.
    pub fn total_completed(&self) -> u64 {
        self.audio.completed + self.ai.completed + self.ui.completed
    }

    /// Whether every counter is at its initial value.
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}
