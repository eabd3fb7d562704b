use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use common::retry::{RetryTracker, spawn_cleanup_task};
use dispatcher::config::{AppConfig, DiscoveryBackend};
use dispatcher::consumer::JudgeTaskConsumer;
use dispatcher::database::init_db;
use dispatcher::discovery::{
    DiscoverySource, DiscoveryWatcher, StaticDiscovery, WatchBackoff, ZookeeperDiscovery,
};
use dispatcher::dlq::DeadLetterSink;
use dispatcher::processor::TaskProcessor;
use dispatcher::sandbox::HttpSandboxClient;
use dispatcher::scheduler::{SandboxSelector, policy_for};
use dispatcher::store::DbSubmissionStore;
use mq::{MqConfig, init_mq};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let config = AppConfig::load().context("Failed to load config")?;
    info!(
        dispatcher_id = %config.dispatcher.id,
        policy = ?config.scheduler.policy,
        discovery = ?config.discovery.backend,
        "Dispatcher starting"
    );

    let shutdown = CancellationToken::new();

    let db = init_db(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    let source: Arc<dyn DiscoverySource> = match config.discovery.backend {
        DiscoveryBackend::Zookeeper => Arc::new(
            ZookeeperDiscovery::connect(&config.discovery.servers)
                .await
                .context("Failed to connect to ZooKeeper")?,
        ),
        DiscoveryBackend::Static => {
            Arc::new(StaticDiscovery::new(config.discovery.endpoints.clone()))
        }
    };
    let watcher = DiscoveryWatcher::new(
        source,
        WatchBackoff {
            base: Duration::from_secs(config.discovery.retry_backoff_secs),
            max: Duration::from_secs(config.discovery.retry_backoff_max_secs),
        },
        shutdown.clone(),
    );

    let selector = Arc::new(SandboxSelector::new(policy_for(config.scheduler.policy)));
    let _refresh_handle = selector.subscribe(watcher.watch(&config.discovery.path));

    let client = HttpSandboxClient::new(Duration::from_secs(config.sandbox.request_timeout_secs))
        .context("Failed to build sandbox HTTP client")?;
    let processor = Arc::new(TaskProcessor::new(
        Arc::new(DbSubmissionStore::new(db.clone())),
        selector,
        Arc::new(client),
    ));

    let retry_tracker = Arc::new(Mutex::new(RetryTracker::new(config.dlq.max_redeliveries)));
    let cleanup_handle = spawn_cleanup_task(
        retry_tracker.clone(),
        Duration::from_secs(config.dlq.retry_cleanup_interval_secs),
        Duration::from_secs(config.dlq.retry_max_age_secs),
    );

    let mq = Arc::new(
        init_mq(MqConfig::new(&config.mq, &config.dlq))
            .await
            .context("Failed to initialize MQ")?,
    );
    info!(queue_name = %config.mq.queue_name, "MQ connected");

    let dead_letters: Arc<dyn DeadLetterSink> = Arc::new(db);
    let consumer = Arc::new(
        JudgeTaskConsumer::new(
            processor,
            dead_letters,
            retry_tracker,
            shutdown.clone(),
            Duration::from_secs(config.dispatcher.processing_timeout_secs),
        )
        .with_redelivery_backoff(
            config.dlq.redelivery_backoff_base_ms,
            config.dlq.redelivery_backoff_max_ms,
        ),
    );

    tokio::select! {
        res = Arc::clone(&consumer).run(mq, &config.mq.queue_name, config.dispatcher.concurrency) => {
            if let Err(e) = res {
                error!(error = %e, "Consumer stopped unexpectedly");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received");
        }
    }

    // broccoli's worker tasks outlive the consumer future; cancelling makes
    // their in-flight deliveries hand the message back instead of dispatching.
    shutdown.cancel();
    let grace = Duration::from_secs(config.dispatcher.shutdown_grace_secs);
    if !consumer.drain(grace).await {
        warn!(
            in_flight = consumer.in_flight(),
            "Shutdown grace period elapsed with deliveries still in flight"
        );
    }
    cleanup_handle.abort();
    info!("Dispatcher stopped");

    Ok(())
}
