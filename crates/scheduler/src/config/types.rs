use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::TaskPriority;

/// What `register` does when a tier queue is already at `max_queue_depth`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Refuse the new task with `SchedulerError::QueueFull`.
    #[default]
    Reject,
    /// Evict the oldest pending task of that tier to make room.
    DropOldest,
}

/// Scheduler configuration, typically parsed from TOML.
///
/// Frame budgets are cumulative ceilings measured from the start of a frame
/// pass, not allowances added per tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Audio phase window (one 60 Hz cycle).
    #[serde(default = "default_audio_frame_budget")]
    pub audio_frame_budget_ms: u64,
    /// AI phase ceiling.
    #[serde(default = "default_ai_frame_budget")]
    pub ai_frame_budget_ms: u64,
    /// UI phase ceiling.
    #[serde(default = "default_ui_frame_budget")]
    pub ui_frame_budget_ms: u64,
    /// Max AI tasks executed per frame pass.
    #[serde(default = "default_ai_batch_limit")]
    pub ai_batch_limit: usize,
    /// Max UI tasks executed per frame pass.
    #[serde(default = "default_ui_batch_limit")]
    pub ui_batch_limit: usize,
    /// Audio head-of-queue wait that triggers a starvation warning.
    #[serde(default = "default_starvation_threshold")]
    pub starvation_threshold_ms: u64,
    /// Default per-task budget for the audio convenience wrapper.
    #[serde(default = "default_audio_task_budget")]
    pub audio_task_budget_ms: u64,
    /// Default per-task budget for the AI convenience wrapper.
    #[serde(default = "default_ai_task_budget")]
    pub ai_task_budget_ms: u64,
    /// Default per-task budget for the UI convenience wrapper.
    #[serde(default = "default_ui_task_budget")]
    pub ui_task_budget_ms: u64,
    /// Number of traces retained (oldest evicted first).
    #[serde(default = "default_trace_capacity")]
    pub trace_capacity: usize,
    /// Per-tier queue limit. 0 = unbounded.
    #[serde(default)]
    pub max_queue_depth: usize,
    /// Applied when a bounded queue is full.
    #[serde(default)]
    pub overflow_policy: OverflowPolicy,
    /// Delay between self-rescheduled frame passes. 0 = plain yield.
    #[serde(default)]
    pub idle_backoff_ms: u64,
}

fn default_audio_frame_budget() -> u64 { 16 }
fn default_ai_frame_budget() -> u64 { 50 }
fn default_ui_frame_budget() -> u64 { 100 }
fn default_ai_batch_limit() -> usize { 2 }
fn default_ui_batch_limit() -> usize { 10 }
fn default_starvation_threshold() -> u64 { 20 }
fn default_audio_task_budget() -> u64 { 16 }
fn default_ai_task_budget() -> u64 { 50 }
fn default_ui_task_budget() -> u64 { 100 }
fn default_trace_capacity() -> usize { 1000 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            audio_frame_budget_ms: default_audio_frame_budget(),
            ai_frame_budget_ms: default_ai_frame_budget(),
            ui_frame_budget_ms: default_ui_frame_budget(),
            ai_batch_limit: default_ai_batch_limit(),
            ui_batch_limit: default_ui_batch_limit(),
            starvation_threshold_ms: default_starvation_threshold(),
            audio_task_budget_ms: default_audio_task_budget(),
            ai_task_budget_ms: default_ai_task_budget(),
            ui_task_budget_ms: default_ui_task_budget(),
            trace_capacity: default_trace_capacity(),
            max_queue_depth: 0,
            overflow_policy: OverflowPolicy::default(),
            idle_backoff_ms: 0,
        }
    }
}

impl SchedulerConfig {
    /// Cumulative ceiling, measured from frame start, for a tier's phase.
    pub fn frame_budget(&self, priority: TaskPriority) -> Duration {
        Duration::from_millis(match priority {
            TaskPriority::Audio => self.audio_frame_budget_ms,
            TaskPriority::Ai => self.ai_frame_budget_ms,
            TaskPriority::Ui => self.ui_frame_budget_ms,
        })
    }

    /// Budget given to tasks registered through a tier wrapper.
    pub fn task_budget(&self, priority: TaskPriority) -> Duration {
        Duration::from_millis(match priority {
            TaskPriority::Audio => self.audio_task_budget_ms,
            TaskPriority::Ai => self.ai_task_budget_ms,
            TaskPriority::Ui => self.ui_task_budget_ms,
        })
    }

    /// Per-pass task cap. Audio is bounded by its time window only.
    pub fn batch_limit(&self, priority: TaskPriority) -> Option<usize> {
        match priority {
            TaskPriority::Audio => None,
            TaskPriority::Ai => Some(self.ai_batch_limit),
            TaskPriority::Ui => Some(self.ui_batch_limit),
        }
    }

    pub fn starvation_threshold(&self) -> Duration {
        Duration::from_millis(self.starvation_threshold_ms)
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_millis(self.idle_backoff_ms)
    }

    /// Whether tier queues have a depth limit.
    pub fn is_bounded(&self) -> bool {
        self.max_queue_depth > 0
    }

    /// Print a one-block summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Scheduler config:");
        tracing::info!(
            "  frame windows: audio={}ms ai={}ms ui={}ms",
            self.audio_frame_budget_ms,
            self.ai_frame_budget_ms,
            self.ui_frame_budget_ms
        );
        tracing::info!(
            "  phase caps:    ai={} ui={}",
            self.ai_batch_limit,
            self.ui_batch_limit
        );
        tracing::info!(
            "  starvation:    {}ms, traces retained: {}",
            self.starvation_threshold_ms,
            self.trace_capacity
        );
        if self.is_bounded() {
            tracing::info!(
                "  queues:        max depth {} ({:?})",
                self.max_queue_depth,
                self.overflow_policy
            );
        } else {
            tracing::info!("  queues:        unbounded");
        }
    }
}
