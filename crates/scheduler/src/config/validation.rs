use super::types::SchedulerConfig;
use crate::error::SchedulerError;

impl SchedulerConfig {
    /// Validate the config: ceilings must be ordered and caps non-zero.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        self.validate_frame_ceilings()?;
        self.validate_batch_limits()?;
        self.validate_trace_capacity()?;
        Ok(())
    }

    /// Frame budgets are cumulative, so each tier's ceiling must not sit
    /// below the tier drained before it.
    fn validate_frame_ceilings(&self) -> Result<(), SchedulerError> {
        if self.audio_frame_budget_ms == 0 {
            return Err(SchedulerError::Config(
                "audio_frame_budget_ms must be greater than zero".into(),
            ));
        }
        if self.ai_frame_budget_ms < self.audio_frame_budget_ms {
            return Err(SchedulerError::Config(format!(
                "ai_frame_budget_ms ({}) is below audio_frame_budget_ms ({})",
                self.ai_frame_budget_ms, self.audio_frame_budget_ms
            )));
        }
        if self.ui_frame_budget_ms < self.ai_frame_budget_ms {
            return Err(SchedulerError::Config(format!(
                "ui_frame_budget_ms ({}) is below ai_frame_budget_ms ({})",
                self.ui_frame_budget_ms, self.ai_frame_budget_ms
            )));
        }
        Ok(())
    }

    fn validate_batch_limits(&self) -> Result<(), SchedulerError> {
        if self.ai_batch_limit == 0 || self.ui_batch_limit == 0 {
            return Err(SchedulerError::Config(format!(
                "phase caps must be at least 1 (ai={}, ui={})",
                self.ai_batch_limit, self.ui_batch_limit
            )));
        }
        Ok(())
    }

    fn validate_trace_capacity(&self) -> Result<(), SchedulerError> {
        if self.trace_capacity == 0 {
            return Err(SchedulerError::Config(
                "trace_capacity must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}
