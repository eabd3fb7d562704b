use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

pub use common::config::{DlqConfig, MqAppConfig};

/// Dispatcher-specific configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct DispatcherConfig {
    /// Identifier of this dispatcher instance, used in logs. Default: "dispatcher-1".
    #[serde(default = "default_dispatcher_id")]
    pub id: String,
    /// Messages processed concurrently. Default: 16.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Deadline for a single processing attempt. Default: 120.
    #[serde(default = "default_processing_timeout_secs")]
    pub processing_timeout_secs: u64,
    /// How long in-flight deliveries get to settle after a shutdown signal. Default: 10.
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

fn default_dispatcher_id() -> String {
    "dispatcher-1".into()
}
fn default_concurrency() -> usize {
    16
}
fn default_processing_timeout_secs() -> u64 {
    120
}
fn default_shutdown_grace_secs() -> u64 {
    10
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            id: default_dispatcher_id(),
            concurrency: default_concurrency(),
            processing_timeout_secs: default_processing_timeout_secs(),
            shutdown_grace_secs: default_shutdown_grace_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Create missing tables on startup. Off in production, where the
    /// schema belongs to the main backend.
    #[serde(default)]
    pub sync_schema: bool,
}

fn default_max_connections() -> u32 {
    32
}
fn default_min_connections() -> u32 {
    2
}
fn default_connect_timeout_secs() -> u64 {
    8
}

/// Where the live sandbox set comes from.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryBackend {
    Zookeeper,
    Static,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    /// Default: zookeeper.
    #[serde(default = "default_discovery_backend")]
    pub backend: DiscoveryBackend,
    /// ZooKeeper ensemble, e.g. `["zk1:2181", "zk2:2181"]`.
    #[serde(default)]
    pub servers: Vec<String>,
    /// Node whose children are the live sandboxes. Default: "/sandboxes".
    #[serde(default = "default_discovery_path")]
    pub path: String,
    /// First delay before re-registering a failed watch. Default: 5.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    /// Upper bound for the re-registration delay. Default: 30.
    #[serde(default = "default_retry_backoff_max_secs")]
    pub retry_backoff_max_secs: u64,
    /// Sandbox addresses for the static backend.
    #[serde(default)]
    pub endpoints: Vec<String>,
}

fn default_discovery_backend() -> DiscoveryBackend {
    DiscoveryBackend::Zookeeper
}
fn default_discovery_path() -> String {
    "/sandboxes".into()
}
fn default_retry_backoff_secs() -> u64 {
    5
}
fn default_retry_backoff_max_secs() -> u64 {
    30
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            backend: default_discovery_backend(),
            servers: Vec::new(),
            path: default_discovery_path(),
            retry_backoff_secs: default_retry_backoff_secs(),
            retry_backoff_max_secs: default_retry_backoff_max_secs(),
            endpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SandboxConfig {
    /// Per-request timeout for `POST /judge`. Default: 30.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum PolicyKind {
    #[default]
    Random,
    RoundRobin,
    LeastOutstanding,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub policy: PolicyKind,
}

/// Dispatcher application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub mq: MqAppConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub dlq: DlqConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("JUDGE_CONFIG").unwrap_or_else(|_| "config/config".to_string());

        let s = Config::builder()
            .set_default("dispatcher.id", "dispatcher-1")?
            .set_default("mq.url", "redis://localhost:6379")?
            .set_default("mq.queue_name", "judge_tasks")?
            .set_default("discovery.path", "/sandboxes")?
            .add_source(File::with_name(&config_path).required(false))
            // e.g. JUDGE__DATABASE__URL
            .add_source(
                Environment::with_prefix("JUDGE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("discovery.servers")
                    .with_list_parse_key("discovery.endpoints")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.dlq.validate().map_err(ConfigError::Message)
    }
}
