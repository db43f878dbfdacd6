//! Background Sweeper
//!
//! Periodic reclamation task shared by both backends. The task is spawned
//! when a backend is built and lives until the backend is shut down, closed
//! or dropped. A failed pass is logged and retried on the next tick.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Handle to a running sweep task
pub(crate) struct Sweeper {
    /// Stop signal
    cancel: CancellationToken,
    /// Task handle, taken on stop
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    /// Spawn a task that calls `pass` every `period`.
    ///
    /// `pass` returns the number of reclaimed entries. The loop exits on
    /// cancellation or when a pass reports [`Error::Closed`].
    pub(crate) fn spawn<F, Fut>(name: &str, period: Duration, mut pass: F) -> Result<Self>
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = Result<u64>> + Send + 'static,
    {
        if period.is_zero() {
            return Err(Error::Config("sweep interval must be non-zero".to_string()));
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            Error::Config("cache must be created inside a Tokio runtime".to_string())
        })?;

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let name = name.to_string();

        let handle = runtime.spawn(async move {
            debug!(cache = %name, ?period, "Sweeper started");

            let mut tick = interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            tick.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        match pass().await {
                            Ok(0) => {}
                            Ok(reclaimed) => {
                                info!(cache = %name, reclaimed, "Reclaimed expired entries");
                            }
                            Err(Error::Closed) => break,
                            Err(e) => {
                                warn!(cache = %name, error = %e, "Sweep pass failed, retrying next interval");
                            }
                        }
                    }
                }
            }

            debug!(cache = %name, "Sweeper stopped");
        });

        Ok(Self {
            cancel,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Signal the task to stop and wait for it to finish
    pub(crate) async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Sweeper task ended abnormally");
            }
        }
    }

    /// True while the task is alive
    pub(crate) fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// =============================================================================
// Tests
// =============================================================================
