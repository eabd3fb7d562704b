//! Live view of the sandbox pool.
//!
//! A [`DiscoverySource`] knows how to read the current endpoint list from a
//! coordination service and how to wait for the next change. The
//! [`DiscoveryWatcher`] turns that primitive into a stream of full
//! [`SandboxSet`] snapshots that survives transient failures.

mod set;
mod static_source;
mod watcher;
mod zookeeper;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;

pub use set::SandboxSet;
pub use static_source::StaticDiscovery;
pub use watcher::{DiscoveryWatcher, SnapshotStream, WatchBackoff};
pub use zookeeper::ZookeeperDiscovery;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The coordination service could not be reached or refused the request.
    /// Worth retrying.
    #[error("Discovery service unavailable: {0}")]
    Unavailable(String),

    /// The session is gone for good; no further updates can arrive.
    #[error("Discovery session closed: {0}")]
    Closed(String),
}

impl DiscoveryError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

/// Resolves once after the children of the watched node change.
pub type ChangeNotification = BoxFuture<'static, ()>;

/// Backend holding the registered sandbox endpoints.
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Current endpoints registered under `path`.
    async fn children(&self, path: &str) -> Result<Vec<String>, DiscoveryError>;

    /// Current endpoints under `path`, plus a notification for the next change.
    async fn children_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, ChangeNotification), DiscoveryError>;
}
