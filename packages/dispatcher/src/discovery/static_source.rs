use async_trait::async_trait;
use tokio::sync::watch;

use super::{ChangeNotification, DiscoveryError, DiscoverySource};

/// Endpoint list held in memory.
///
/// Used for single-host deployments where sandboxes are listed in the config
/// file, and anywhere a discovery service is not available. The list can be
/// replaced at runtime; watchers see the change like a ZooKeeper child event.
pub struct StaticDiscovery {
    endpoints: watch::Sender<Vec<String>>,
}

impl StaticDiscovery {
    pub fn new(endpoints: Vec<String>) -> Self {
        let (endpoints, _) = watch::channel(endpoints);
        Self { endpoints }
    }

    /// Replace the endpoint list and wake every watcher.
    pub fn set_endpoints(&self, endpoints: Vec<String>) {
        self.endpoints.send_replace(endpoints);
    }
}

#[async_trait]
impl DiscoverySource for StaticDiscovery {
    async fn children(&self, _path: &str) -> Result<Vec<String>, DiscoveryError> {
        Ok(self.endpoints.borrow().clone())
    }

    async fn children_watch(
        &self,
        _path: &str,
    ) -> Result<(Vec<String>, ChangeNotification), DiscoveryError> {
        let mut rx = self.endpoints.subscribe();
        let current = rx.borrow_and_update().clone();

        let changed: ChangeNotification = Box::pin(async move {
            if rx.changed().await.is_err() {
                // Sender gone: the list can never change again.
                std::future::pending::<()>().await;
            }
        });

        Ok((current, changed))
    }
}
