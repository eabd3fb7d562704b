mod policy;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::discovery::{SandboxSet, SnapshotStream};

pub use policy::{
    LeastOutstandingPolicy, RandomPolicy, RoundRobinPolicy, SelectionPolicy, policy_for,
};

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("No available sandbox")]
pub struct NoAvailableSandbox;

/// Picks a sandbox for each dispatch from a cached discovery snapshot.
///
/// The snapshot is an `Arc` behind a read/write lock: `select` clones the
/// `Arc` under a read lock and works on that, a refresh swaps in a new `Arc`
/// under the write lock. A caller therefore always sees one complete snapshot.
pub struct SandboxSelector {
    snapshot: RwLock<Arc<SandboxSet>>,
    policy: Box<dyn SelectionPolicy>,
    stale: AtomicBool,
}

impl SandboxSelector {
    pub fn new(policy: Box<dyn SelectionPolicy>) -> Self {
        Self::with_snapshot(policy, SandboxSet::empty())
    }

    pub fn with_snapshot(policy: Box<dyn SelectionPolicy>, initial: SandboxSet) -> Self {
        Self {
            snapshot: RwLock::new(Arc::new(initial)),
            policy,
            stale: AtomicBool::new(false),
        }
    }

    /// Choose a live sandbox. Fails when the current snapshot is empty.
    pub fn select(self: &Arc<Self>) -> Result<SelectedSandbox, NoAvailableSandbox> {
        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            return Err(NoAvailableSandbox);
        }

        let endpoint = self.policy.pick(&snapshot).ok_or(NoAvailableSandbox)?;
        debug!(
            endpoint = %endpoint,
            policy = self.policy.name(),
            generation = snapshot.generation(),
            "Selected sandbox"
        );

        Ok(SelectedSandbox {
            endpoint,
            selector: Arc::clone(self),
        })
    }

    /// The snapshot `select` currently works from.
    pub fn snapshot(&self) -> Arc<SandboxSet> {
        match self.snapshot.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Swap in a new snapshot.
    pub fn replace(&self, set: SandboxSet) {
        let set = Arc::new(set);
        match self.snapshot.write() {
            Ok(mut guard) => *guard = set,
            Err(poisoned) => *poisoned.into_inner() = set,
        }
    }

    /// True once the discovery stream feeding this selector has ended.
    /// The last snapshot stays in use but will no longer be refreshed.
    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub fn policy_name(&self) -> &'static str {
        self.policy.name()
    }

    /// Apply every snapshot from `stream` until it closes.
    pub fn subscribe(self: &Arc<Self>, mut stream: SnapshotStream) -> JoinHandle<()> {
        let selector = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(set) = stream.recv().await {
                info!(
                    generation = set.generation(),
                    sandboxes = ?set.endpoints(),
                    "Updated sandbox list"
                );
                selector.replace(set);
            }

            selector.stale.store(true, Ordering::Release);
            error!(
                sandboxes = selector.snapshot().len(),
                "Discovery stream closed, sandbox list is now stale"
            );
        })
    }
}

/// An endpoint handed out by [`SandboxSelector::select`].
///
/// Dropping it tells the policy the dispatch is over.
pub struct SelectedSandbox {
    endpoint: String,
    selector: Arc<SandboxSelector>,
}

impl SelectedSandbox {
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl std::fmt::Debug for SelectedSandbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectedSandbox")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl Drop for SelectedSandbox {
    fn drop(&mut self) {
        self.selector.policy.release(&self.endpoint);
    }
}
