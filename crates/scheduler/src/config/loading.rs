use std::path::Path;
use std::str::FromStr;

use crate::error::SchedulerError;

use super::types::{OverflowPolicy, SchedulerConfig};

/// Prefix shared by every environment override.
const ENV_PREFIX: &str = "MIXX_SCHEDULER_";

impl SchedulerConfig {
    /// Parse config from a TOML string, then apply env overrides and validate.
    pub fn from_toml(toml_str: &str) -> Result<Self, SchedulerError> {
        let mut config: Self = toml::from_str(toml_str)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Load config from a file path.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content)
    }

    /// Defaults plus environment overrides (call `dotenvy::dotenv()` first
    /// if a `.env` file should be honored).
    pub fn from_env() -> Result<Self, SchedulerError> {
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    // ── Environment variable overrides ──────────────────────────────

    /// Apply `MIXX_SCHEDULER_<FIELD>` overrides from the process environment.
    ///
    /// Examples:
    /// - `MIXX_SCHEDULER_AUDIO_FRAME_BUDGET_MS` -> `audio_frame_budget_ms`
    /// - `MIXX_SCHEDULER_UI_BATCH_LIMIT` -> `ui_batch_limit`
    /// - `MIXX_SCHEDULER_OVERFLOW_POLICY` -> `overflow_policy` (`reject` | `drop_oldest`)
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary lookup. Unparseable values are
    /// logged and ignored.
    pub(crate) fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |field: &str| {
            lookup(&format!("{ENV_PREFIX}{field}")).filter(|v| !v.trim().is_empty())
        };

        override_parsed(&get, "AUDIO_FRAME_BUDGET_MS", &mut self.audio_frame_budget_ms);
        override_parsed(&get, "AI_FRAME_BUDGET_MS", &mut self.ai_frame_budget_ms);
        override_parsed(&get, "UI_FRAME_BUDGET_MS", &mut self.ui_frame_budget_ms);
        override_parsed(&get, "AI_BATCH_LIMIT", &mut self.ai_batch_limit);
        override_parsed(&get, "UI_BATCH_LIMIT", &mut self.ui_batch_limit);
        override_parsed(&get, "STARVATION_THRESHOLD_MS", &mut self.starvation_threshold_ms);
        override_parsed(&get, "AUDIO_TASK_BUDGET_MS", &mut self.audio_task_budget_ms);
        override_parsed(&get, "AI_TASK_BUDGET_MS", &mut self.ai_task_budget_ms);
        override_parsed(&get, "UI_TASK_BUDGET_MS", &mut self.ui_task_budget_ms);
        override_parsed(&get, "TRACE_CAPACITY", &mut self.trace_capacity);
        override_parsed(&get, "MAX_QUEUE_DEPTH", &mut self.max_queue_depth);
        override_parsed(&get, "IDLE_BACKOFF_MS", &mut self.idle_backoff_ms);

        if let Some(v) = get("OVERFLOW_POLICY") {
            match v.trim().to_ascii_lowercase().as_str() {
                "reject" => self.overflow_policy = OverflowPolicy::Reject,
                "drop_oldest" | "drop-oldest" => self.overflow_policy = OverflowPolicy::DropOldest,
                other => tracing::warn!(value = other, "ignoring unknown {ENV_PREFIX}OVERFLOW_POLICY"),
            }
        }
    }
}

fn override_parsed<T, G>(get: &G, field: &str, slot: &mut T)
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(field) {
        match raw.trim().parse() {
            Ok(v) => *slot = v,
            Err(_) => tracing::warn!(value = %raw, "ignoring unparseable {ENV_PREFIX}{field}"),
        }
    }
}
