//! Background reconciliation task.

use std::sync::{Arc, MutexGuard, Weak};
use std::time::Duration;

use log::{error, info, warn};
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::service::Monitor;
use crate::errors::{MonitorError, Result};

/// Handle to a running reconciliation loop.
pub(super) struct MonitorTask {
    shutdown: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl Monitor {
    fn lock_task(&self) -> MutexGuard<'_, Option<MonitorTask>> {
        self.task.lock().unwrap_or_else(|poisoned| {
            warn!("Monitor task mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Spawn the reconciliation loop on the current tokio runtime.
    ///
    /// The loop runs every `loop_interval_secs`, falls back to
    /// `error_backoff_secs` after a failed pass, and exits on
    /// [`Monitor::stop_monitoring`] or once the monitor is dropped.
    pub fn start_monitoring(self: &Arc<Self>) -> Result<()> {
        let mut task = self.lock_task();
        if task.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return Err(MonitorError::TaskAlreadyRunning);
        }

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(run_loop(
            Arc::downgrade(self),
            Arc::clone(&shutdown),
            self.config.loop_interval(),
            self.config.error_backoff(),
        ));
        *task = Some(MonitorTask { shutdown, handle });
        Ok(())
    }

    /// Signal the loop to stop and wait for it. Returns false if it was not
    /// running.
    pub async fn stop_monitoring(&self) -> bool {
        let Some(task) = self.lock_task().take() else {
            return false;
        };

        task.shutdown.notify_one();
        if let Err(e) = task.handle.await {
            warn!("Monitor loop ended abnormally: {}", e);
        }
        true
    }

    pub fn is_monitoring(&self) -> bool {
        self.lock_task()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }
}

async fn run_loop(
    monitor: Weak<Monitor>,
    shutdown: Arc<Notify>,
    interval: Duration,
    error_backoff: Duration,
) {
    info!(
        "Monitor loop started ({}s interval, {}s error backoff)",
        interval.as_secs(),
        error_backoff.as_secs()
    );

    let mut delay = interval;
    loop {
        tokio::select! {
            _ = shutdown.notified() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        let Some(strong) = monitor.upgrade() else {
            break;
        };
        delay = match strong.reconcile() {
            Ok(()) => interval,
            Err(e) => {
                error!("Monitor loop pass failed: {}", e);
                error_backoff
            }
        };
    }

    info!("Monitor loop stopped");
}
