use async_trait::async_trait;
use tracing::{debug, info};
use zookeeper_client as zk;

use super::{ChangeNotification, DiscoveryError, DiscoverySource};

/// Sandboxes register themselves as children of a ZooKeeper node
/// (`/sandboxes/10.0.0.5:8080`, ...); the child names are the endpoints.
pub struct ZookeeperDiscovery {
    client: zk::Client,
}

impl ZookeeperDiscovery {
    pub async fn connect(servers: &[String]) -> Result<Self, DiscoveryError> {
        if servers.is_empty() {
            return Err(DiscoveryError::Unavailable(
                "no ZooKeeper servers configured".into(),
            ));
        }

        let cluster = servers.join(",");
        info!(cluster = %cluster, "Connecting to ZooKeeper");

        let client = zk::Client::connect(&cluster)
            .await
            .map_err(|e| DiscoveryError::Unavailable(format!("connect to {cluster}: {e}")))?;

        Ok(Self { client })
    }
}

fn map_zk_error(path: &str, err: zk::Error) -> DiscoveryError {
    match err {
        zk::Error::SessionExpired | zk::Error::ClientClosed => {
            DiscoveryError::Closed(format!("{path}: {err}"))
        }
        // NoNode included: the parent node may simply not be created yet.
        other => DiscoveryError::Unavailable(format!("{path}: {other}")),
    }
}

#[async_trait]
impl DiscoverySource for ZookeeperDiscovery {
    async fn children(&self, path: &str) -> Result<Vec<String>, DiscoveryError> {
        let (children, _stat) = self
            .client
            .get_children(path)
            .await
            .map_err(|e| map_zk_error(path, e))?;
        Ok(children)
    }

    async fn children_watch(
        &self,
        path: &str,
    ) -> Result<(Vec<String>, ChangeNotification), DiscoveryError> {
        let (children, _stat, watcher) = self
            .client
            .get_and_watch_children(path)
            .await
            .map_err(|e| map_zk_error(path, e))?;

        let path = path.to_string();
        let changed: ChangeNotification = Box::pin(async move {
            let event = watcher.changed().await;
            debug!(path = %path, event = ?event.event_type, "ZooKeeper watch fired");
        });

        Ok((children, changed))
    }
}
