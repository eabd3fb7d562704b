use std::sync::Arc;
use std::time::Duration;

use common::retry::calculate_backoff;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{DiscoveryError, DiscoverySource, SandboxSet};

/// Snapshots emitted by [`DiscoveryWatcher::watch`].
///
/// The channel closing means the watch ended for good (permanent discovery
/// failure or shutdown); no more updates will follow.
pub type SnapshotStream = mpsc::Receiver<SandboxSet>;

/// Delay schedule for re-registering a failed watch.
#[derive(Debug, Clone, Copy)]
pub struct WatchBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for WatchBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(30),
        }
    }
}

impl WatchBackoff {
    fn delay(&self, consecutive_failures: u8) -> Duration {
        calculate_backoff(
            consecutive_failures,
            self.base.as_millis() as u64,
            self.max.as_millis() as u64,
        )
    }
}

/// Owns the connection to the discovery backend and the background watch tasks.
pub struct DiscoveryWatcher {
    source: Arc<dyn DiscoverySource>,
    backoff: WatchBackoff,
    shutdown: CancellationToken,
}

impl DiscoveryWatcher {
    pub fn new(
        source: Arc<dyn DiscoverySource>,
        backoff: WatchBackoff,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            backoff,
            shutdown,
        }
    }

    /// One-off read of the endpoints under `path`.
    pub async fn fetch(&self, path: &str) -> Result<SandboxSet, DiscoveryError> {
        let children = self.source.children(path).await?;
        Ok(SandboxSet::new(children, 0))
    }

    /// Start watching `path` in a background task.
    ///
    /// Every registration (the first one and each one after a change or a
    /// transient failure) emits the complete current endpoint list.
    pub fn watch(&self, path: &str) -> SnapshotStream {
        let (tx, rx) = mpsc::channel(8);
        tokio::spawn(run_watch(
            Arc::clone(&self.source),
            path.to_string(),
            tx,
            self.backoff,
            self.shutdown.clone(),
        ));
        rx
    }
}

async fn run_watch(
    source: Arc<dyn DiscoverySource>,
    path: String,
    tx: mpsc::Sender<SandboxSet>,
    backoff: WatchBackoff,
    shutdown: CancellationToken,
) {
    info!(path = %path, "Starting sandbox discovery watch");

    let mut generation: u64 = 0;
    let mut failures: u8 = 0;

    loop {
        let registered = tokio::select! {
            _ = shutdown.cancelled() => break,
            res = source.children_watch(&path) => res,
        };

        match registered {
            Ok((children, changed)) => {
                failures = 0;
                generation += 1;
                let set = SandboxSet::new(children, generation);
                debug!(path = %path, generation, sandboxes = set.len(), "Discovery snapshot");

                if tx.send(set).await.is_err() {
                    debug!(path = %path, "Snapshot receiver dropped");
                    break;
                }

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = changed => {}
                }
            }
            Err(e) if e.is_permanent() => {
                error!(path = %path, error = %e, "Discovery watch failed permanently");
                break;
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                let delay = backoff.delay(failures);
                warn!(
                    path = %path,
                    error = %e,
                    attempt = failures,
                    delay_ms = delay.as_millis() as u64,
                    "Discovery watch failed, re-registering after backoff"
                );

                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    info!(path = %path, "Sandbox discovery watch stopped");
}
