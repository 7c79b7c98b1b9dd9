//! Two-level budgeting.
//!
//! Frame-level windows decide whether a tier runs at all during a pass. They
//! are cumulative ceilings measured from the start of the pass. Per-task
//! budgets only decide, after the fact, whether a task overran.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use crate::config::SchedulerConfig;
use crate::types::TaskPriority;

/// Admission windows for one frame pass.
#[derive(Debug, Clone)]
pub struct FrameBudget {
    clock: Arc<dyn Clock>,
    frame_start: Instant,
    audio: Duration,
    ai: Duration,
    ui: Duration,
}

impl FrameBudget {
    pub fn new(clock: Arc<dyn Clock>, frame_start: Instant, config: &SchedulerConfig) -> Self {
        Self {
            clock,
            frame_start,
            audio: config.frame_budget(TaskPriority::Audio),
            ai: config.frame_budget(TaskPriority::Ai),
            ui: config.frame_budget(TaskPriority::Ui),
        }
    }

    /// Time since the pass started.
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.frame_start)
    }

    /// Ceiling for a tier, measured from frame start.
    pub fn ceiling(&self, priority: TaskPriority) -> Duration {
        match priority {
            TaskPriority::Audio => self.audio,
            TaskPriority::Ai => self.ai,
            TaskPriority::Ui => self.ui,
        }
    }

    /// Time left before the tier's ceiling. Zero once exhausted.
    pub fn remaining(&self, priority: TaskPriority) -> Duration {
        self.ceiling(priority).saturating_sub(self.elapsed())
    }

    /// Whether the tier's window is still open.
    pub fn admits(&self, priority: TaskPriority) -> bool {
        !self.remaining(priority).is_zero()
    }
}

/// Whether a task's measured run time counts as an overrun.
///
/// A zero budget always overruns, even when the measurement rounds to zero.
pub fn is_overrun(actual: Duration, budget: Duration) -> bool {
    budget.is_zero() || actual > budget
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn budget_with(clock: &Arc<ManualClock>) -> FrameBudget {
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        FrameBudget::new(dyn_clock, clock.now(), &SchedulerConfig::default())
    }

    #[test]
    fn windows_are_cumulative_from_frame_start() {
        let clock = Arc::new(ManualClock::new());
        let budget = budget_with(&clock);

        assert!(budget.admits(TaskPriority::Audio));
        assert_eq!(budget.remaining(TaskPriority::Ai), Duration::from_millis(50));

        clock.advance(Duration::from_millis(16));
        assert!(!budget.admits(TaskPriority::Audio));
        assert_eq!(budget.remaining(TaskPriority::Ai), Duration::from_millis(34));
        assert_eq!(budget.remaining(TaskPriority::Ui), Duration::from_millis(84));

        clock.advance(Duration::from_millis(40));
        assert!(!budget.admits(TaskPriority::Ai));
        assert!(budget.admits(TaskPriority::Ui));
        assert_eq!(budget.elapsed(), Duration::from_millis(56));

        clock.advance(Duration::from_millis(100));
        assert_eq!(budget.remaining(TaskPriority::Ui), Duration::ZERO);
    }

    #[test]
    fn overrun_rule() {
        assert!(is_overrun(Duration::from_millis(10), Duration::from_millis(1)));
        assert!(!is_overrun(Duration::from_millis(1), Duration::from_millis(1)));
        assert!(!is_overrun(Duration::ZERO, Duration::from_millis(16)));
        assert!(is_overrun(Duration::ZERO, Duration::ZERO));
    }
}
