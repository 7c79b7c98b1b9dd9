//! Scheduler configuration: frame windows, per-phase caps, retention and
//! queue-depth policy.
//!
//! Split into focused submodules:
//! - `types`: config structs, serde defaults, and per-tier accessors
//! - `loading`: TOML parsing, file loading, and `MIXX_SCHEDULER_*` env overrides
//! - `validation`: consistency checks run after every load

mod loading;
mod types;
mod validation;

pub use types::{OverflowPolicy, SchedulerConfig};
