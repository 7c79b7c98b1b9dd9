use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::core::lock;
use super::Scheduler;

/// Backoff when a manual `run_frame` call is holding the pass.
const CONTENDED_RETRY: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct DriverStop {
    requested: AtomicBool,
    notify: Notify,
}

/// Handle to a running frame driver.
#[derive(Debug)]
pub struct DriverHandle {
    stop: Arc<DriverStop>,
    join: JoinHandle<()>,
}

impl DriverHandle {
    /// Stop the driver after its current frame pass and wait for it to exit.
    ///
    /// Tasks still queued stay queued; call
    /// [`Scheduler::clear_queues`] to resolve them.
    pub async fn shutdown(self) {
        info!("frame driver shutdown requested");
        self.stop.requested.store(true, Ordering::Release);
        self.stop.notify.notify_one();
        if let Err(e) = self.join.await {
            warn!(error = %e, "frame driver task ended abnormally");
        }
    }

    /// Whether the driver task has exited.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }
}

impl Scheduler {
    /// Spawn the frame driver on the current tokio runtime.
    ///
    /// The driver sleeps until `register` wakes it, then runs frame passes
    /// back to back (yielding between them) until every queue is empty.
    /// Work left queued by an earlier driver is picked up immediately.
    pub fn spawn_driver(self: &Arc<Self>) -> DriverHandle {
        let wake_now = {
            let mut queues = lock(&self.queues);
            !queues.is_empty() && queues.take_wake()
        };
        if wake_now {
            self.wake.notify_one();
        }

        let stop = Arc::new(DriverStop::default());
        let scheduler = Arc::clone(self);
        let loop_stop = Arc::clone(&stop);
        let join = tokio::spawn(async move {
            scheduler.drive(&loop_stop).await;
        });
        DriverHandle { stop, join }
    }

    async fn drive(&self, stop: &DriverStop) {
        info!("frame driver started");
        while !stop.requested.load(Ordering::Acquire) {
            tokio::select! {
                _ = self.wake.notified() => {}
                _ = stop.notify.notified() => break,
            }
            self.drain_frames(stop).await;
        }
        lock(&self.queues).park();
        info!(pending = self.pending_count(), "frame driver stopped");
    }

    /// Re-enter frame passes until the queues settle or a stop is requested.
    async fn drain_frames(&self, stop: &DriverStop) {
        loop {
            let report = self.run_frame().await;
            if stop.requested.load(Ordering::Acquire) {
                break;
            }
            if report.skipped {
                debug!("frame pass contended, retrying");
                tokio::time::sleep(CONTENDED_RETRY).await;
                continue;
            }
            if !report.more_work {
                break;
            }
            self.yield_between_frames().await;
        }
    }

    async fn yield_between_frames(&self) {
        let backoff = self.config.idle_backoff();
        if backoff.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(backoff).await;
        }
    }
}
