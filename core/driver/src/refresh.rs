//! Periodic engine refresh task.
//!
//! The engine's cached network and identity data must be refreshed at
//! least once after startup before volume and share operations are
//! reliable, and periodically thereafter for the life of the process.
//! Failures are logged and retried on the next tick; they never stop the
//! loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use sable_common::{Error, Result};
use sable_engine::Engine;

/// Handle to a running refresh task.
///
/// Holds the readiness signal (flipped by the first successful refresh)
/// and the shutdown signal. Dropping the handle leaves the task running;
/// call [`RefreshHandle::shutdown`] to stop and join it.
pub struct RefreshHandle {
    ready_rx: watch::Receiver<bool>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Whether at least one refresh has succeeded.
    pub fn is_ready(&self) -> bool {
        *self.ready_rx.borrow()
    }

    /// Wait until the first refresh has succeeded.
    ///
    /// # Errors
    /// - `Timeout` if no refresh succeeds within `timeout`
    /// - `State` if the task stopped before its first success
    pub async fn ready(&self, timeout: Duration) -> Result<()> {
        let mut rx = self.ready_rx.clone();
        tokio::time::timeout(timeout, async move {
            loop {
                if *rx.borrow_and_update() {
                    return true;
                }
                if rx.changed().await.is_err() {
                    return false;
                }
            }
        })
        .await
        .map_err(|_| Error::Timeout(format!("no successful refresh within {:?}", timeout)))?
        .then_some(())
        .ok_or_else(|| Error::State("refresh task stopped before first success".to_string()))
    }

    /// Signal the task to stop and wait for it to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

/// Spawn the periodic refresh task.
///
/// The first attempt runs immediately; further attempts follow every
/// `period`. Refresh errors are logged and retried on schedule.
pub fn spawn_refresh(engine: Arc<dyn Engine>, period: Duration) -> RefreshHandle {
    let (ready_tx, ready_rx) = watch::channel(false);
    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(async move {
        let mut ticker = interval(period);
        info!("refresh task started ({:?} interval)", period);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("refresh task shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    match engine.refresh().await {
                        Ok(()) => {
                            if !*ready_tx.borrow() {
                                debug!("first refresh completed");
                            }
                            let _ = ready_tx.send(true);
                        }
                        Err(e) if e.is_retryable() => {
                            warn!("refresh failed, retrying on schedule: {}", e);
                        }
                        Err(e) => {
                            error!("refresh failed: {}", e);
                        }
                    }
                }
            }
        }
    });

    RefreshHandle {
        ready_rx,
        shutdown_tx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_engine::MemoryEngine;
    use std::path::Path;

    async fn initialized_engine(fail_refreshes: u32) -> Arc<dyn Engine> {
        let engine = MemoryEngine::builder().fail_refreshes(fail_refreshes).build();
        engine.initialize(Path::new(".SaifeStore")).await.unwrap();
        Arc::new(engine)
    }

    #[tokio::test]
    async fn test_ready_after_immediate_success() {
        let engine = initialized_engine(0).await;
        let handle = spawn_refresh(engine, Duration::from_secs(60));

        handle.ready(Duration::from_secs(1)).await.unwrap();
        assert!(handle.is_ready());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_ready_survives_initial_failures() {
        let engine = initialized_engine(2).await;
        let handle = spawn_refresh(engine, Duration::from_millis(10));

        // Not ready until the third attempt succeeds.
        handle.ready(Duration::from_secs(2)).await.unwrap();
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_ready_times_out_when_refresh_keeps_failing() {
        let engine = initialized_engine(u32::MAX).await;
        let handle = spawn_refresh(engine, Duration::from_millis(10));

        let result = handle.ready(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert!(!handle.is_ready());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_joins_task() {
        let engine = initialized_engine(0).await;
        let handle = spawn_refresh(engine, Duration::from_millis(10));
        handle.ready(Duration::from_secs(1)).await.unwrap();
        // Returns only after the task has exited.
        handle.shutdown().await;
    }
}
