//! Frame scheduler runner -- registration, frame passes, and the driver loop.
//!
//! Split into focused submodules:
//! - `core`: Scheduler struct, constructor, registration, and accessor methods
//! - `frame`: one three-phase frame pass plus the starvation check
//! - `driver`: background tokio task that re-enters frame passes on demand

mod core;
mod driver;
mod frame;

pub use self::core::Scheduler;
pub(crate) use self::core::lock;
pub use self::driver::DriverHandle;
pub use self::frame::FrameReport;
pub(crate) use self::frame::panic_message;
