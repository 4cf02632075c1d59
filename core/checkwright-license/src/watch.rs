//! Periodic entitlement re-check.
//!
//! The shell subscribes to entitlement changes instead of polling the
//! manager itself. The background task only reads local state.

use crate::manager::{Entitlement, LicenseManager};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Shortest re-check interval. Shorter intervals, including zero, are raised to it.
pub const MIN_RECHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Handle to a running re-check task. Dropping it stops the task.
#[derive(Debug)]
pub struct EntitlementWatch {
    rx: watch::Receiver<Entitlement>,
    task: JoinHandle<()>,
}

impl EntitlementWatch {
    /// Returns the last published entitlement.
    #[must_use]
    pub fn current(&self) -> Entitlement {
        self.rx.borrow().clone()
    }

    /// Returns a receiver that is notified when the entitlement changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Entitlement> {
        self.rx.clone()
    }

    /// Waits for the next entitlement change.
    ///
    /// Returns `None` once the task has stopped.
    pub async fn changed(&mut self) -> Option<Entitlement> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Stops the re-check task.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Returns true once the task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for EntitlementWatch {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl LicenseManager {
    /// Re-evaluates entitlement every `interval` and publishes changes.
    ///
    /// Intervals below [`MIN_RECHECK_INTERVAL`] are raised to it. Must be
    /// called from within a tokio runtime.
    pub fn watch(self: &Arc<Self>, interval: Duration) -> EntitlementWatch {
        let interval = interval.max(MIN_RECHECK_INTERVAL);
        let (tx, rx) = watch::channel(self.entitlement());
        let manager = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial value is already sent.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let next = manager.entitlement();
                let changed = tx.send_if_modified(|current| {
                    if *current == next {
                        false
                    } else {
                        *current = next.clone();
                        true
                    }
                });
                if changed {
                    info!(entitled = next.is_entitled(), "Entitlement changed: {next:?}");
                }
                if tx.is_closed() {
                    debug!("Entitlement watch has no receivers, stopping");
                    break;
                }
            }
        });

        EntitlementWatch { rx, task }
    }
}
