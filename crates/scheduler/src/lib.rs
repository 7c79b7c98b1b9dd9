//! Cooperative, priority-tiered frame scheduler.
//!
//! Arbitrates between audio DSP work, AI inference and UI updates that share
//! one execution timeline. Each frame pass drains the Audio, AI and UI queues
//! in that order, admitting a tier only while the frame's cumulative window
//! for that tier is still open. Individual tasks carry their own budget which
//! is used purely for overrun reporting.

pub mod budget;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod runner;
pub mod task;
pub mod trace;
pub mod types;

pub use budget::{is_overrun, FrameBudget};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{OverflowPolicy, SchedulerConfig};
pub use error::SchedulerError;
pub use metrics::{SchedulerStats, TierStats};
pub use queue::QueueDepths;
pub use runner::{DriverHandle, FrameReport, Scheduler};
pub use task::{OverrunCallback, Task, TaskAction, TaskError, TaskHandle, TaskOutcome};
pub use trace::{RingBuffer, SharedTraceLog, Trace, TraceMirror, TraceMirrorError};
pub use types::TaskPriority;
