use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Scheduling tier. Lower numeric value = more urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Real-time DSP work. Always drained first.
    Audio = 0,
    /// Inference work. May be deferred to a later frame without penalty.
    Ai = 1,
    /// Interface refreshes. Batched to amortize per-pass overhead.
    Ui = 2,
}

impl TaskPriority {
    /// All tiers in drain order.
    pub const ALL: [TaskPriority; 3] = [TaskPriority::Audio, TaskPriority::Ai, TaskPriority::Ui];

    /// Budget applied to tasks of this tier when the producer does not pick one.
    pub fn default_task_budget(self) -> Duration {
        match self {
            TaskPriority::Audio => Duration::from_millis(16),
            TaskPriority::Ai => Duration::from_millis(50),
            TaskPriority::Ui => Duration::from_millis(100),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Audio => "audio",
            TaskPriority::Ai => "ai",
            TaskPriority::Ui => "ui",
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_ordering() {
        assert!(TaskPriority::Audio < TaskPriority::Ai);
        assert!(TaskPriority::Ai < TaskPriority::Ui);
        let mut tiers = vec![TaskPriority::Ui, TaskPriority::Audio, TaskPriority::Ai];
        tiers.sort();
        assert_eq!(tiers, TaskPriority::ALL.to_vec());
    }

    #[test]
    fn default_task_budgets() {
        assert_eq!(TaskPriority::Audio.default_task_budget(), Duration::from_millis(16));
        assert_eq!(TaskPriority::Ai.default_task_budget(), Duration::from_millis(50));
        assert_eq!(TaskPriority::Ui.default_task_budget(), Duration::from_millis(100));
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&TaskPriority::Ai).unwrap();
        assert_eq!(json, "\"ai\"");
        let back: TaskPriority = serde_json::from_str("\"audio\"").unwrap();
        assert_eq!(back, TaskPriority::Audio);
        assert_eq!(TaskPriority::Ui.to_string(), "ui");
    }
}
