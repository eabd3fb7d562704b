use serde::Deserialize;

/// App-level MQ configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct MqAppConfig {
    /// Redis connection URL. Default: "redis://localhost:6379".
    #[serde(default = "default_mq_url")]
    pub url: String,
    /// Connection pool size. Default: 5.
    #[serde(default = "default_mq_pool_size")]
    pub pool_size: u8,
    /// Queue carrying submission ids ready for judging. Default: "judge_tasks".
    #[serde(default = "default_mq_queue_name")]
    pub queue_name: String,
}

fn default_mq_url() -> String {
    "redis://localhost:6379".into()
}
fn default_mq_pool_size() -> u8 {
    5
}
fn default_mq_queue_name() -> String {
    "judge_tasks".into()
}

impl Default for MqAppConfig {
    fn default() -> Self {
        Self {
            url: default_mq_url(),
            pool_size: default_mq_pool_size(),
            queue_name: default_mq_queue_name(),
        }
    }
}

/// Bounded-redelivery policy for messages that keep failing.
#[derive(Debug, Deserialize, Clone)]
pub struct DlqConfig {
    /// Failed deliveries tolerated before a submission is quarantined. Default: 5.
    #[serde(default = "default_max_redeliveries")]
    pub max_redeliveries: u8,
    /// How often stale retry tracker entries are evicted. Default: 300.
    #[serde(default = "default_retry_cleanup_interval_secs")]
    pub retry_cleanup_interval_secs: u64,
    /// Tracker entries untouched for this long are evicted. Default: 3600.
    #[serde(default = "default_retry_max_age_secs")]
    pub retry_max_age_secs: u64,
    /// Delay before the first failed delivery is handed back. Doubles per
    /// failure. Default: 1000.
    #[serde(default = "default_redelivery_backoff_base_ms")]
    pub redelivery_backoff_base_ms: u64,
    /// Upper bound of the redelivery delay. Default: 30000.
    #[serde(default = "default_redelivery_backoff_max_ms")]
    pub redelivery_backoff_max_ms: u64,
}

fn default_max_redeliveries() -> u8 {
    5
}
fn default_retry_cleanup_interval_secs() -> u64 {
    300
}
fn default_retry_max_age_secs() -> u64 {
    3600
}
fn default_redelivery_backoff_base_ms() -> u64 {
    1000
}
fn default_redelivery_backoff_max_ms() -> u64 {
    30000
}

impl Default for DlqConfig {
    fn default() -> Self {
        Self {
            max_redeliveries: default_max_redeliveries(),
            retry_cleanup_interval_secs: default_retry_cleanup_interval_secs(),
            retry_max_age_secs: default_retry_max_age_secs(),
            redelivery_backoff_base_ms: default_redelivery_backoff_base_ms(),
            redelivery_backoff_max_ms: default_redelivery_backoff_max_ms(),
        }
    }
}

impl DlqConfig {
    /// Largest `max_redeliveries` for which the broker can still be given a
    /// bigger delivery budget than the tracker.
    pub const MAX_REDELIVERIES: u8 = u8::MAX - 2;

    /// Deliveries the broker allows before it parks a message in its own
    /// failed list.
    ///
    /// The tracker quarantines on failure `max_redeliveries + 1` and acks that
    /// delivery, so the broker sees at most `max_redeliveries` rejects. One
    /// extra delivery is left for a hand-back during shutdown, which the
    /// tracker does not count.
    pub fn broker_delivery_attempts(&self) -> u8 {
        self.max_redeliveries.saturating_add(2)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.max_redeliveries > Self::MAX_REDELIVERIES {
            return Err(format!(
                "dlq.max_redeliveries must be at most {}, got {}",
                Self::MAX_REDELIVERIES,
                self.max_redeliveries
            ));
        }
        if self.retry_cleanup_interval_secs == 0 {
            return Err("dlq.retry_cleanup_interval_secs must be positive".into());
        }
        if self.redelivery_backoff_base_ms > self.redelivery_backoff_max_ms {
            return Err(format!(
                "dlq.redelivery_backoff_base_ms ({}) exceeds dlq.redelivery_backoff_max_ms ({})",
                self.redelivery_backoff_base_ms, self.redelivery_backoff_max_ms
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dlq_config_is_valid() {
        let config = DlqConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.broker_delivery_attempts(), 7);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let zero_interval = DlqConfig {
            retry_cleanup_interval_secs: 0,
            ..Default::default()
        };
        assert!(zero_interval.validate().is_err());

        let too_many = DlqConfig {
            max_redeliveries: u8::MAX,
            ..Default::default()
        };
        assert!(too_many.validate().is_err());

        let inverted = DlqConfig {
            redelivery_backoff_base_ms: 5000,
            redelivery_backoff_max_ms: 1000,
            ..Default::default()
        };
        assert!(inverted.validate().is_err());

        let at_limit = DlqConfig {
            max_redeliveries: DlqConfig::MAX_REDELIVERIES,
            ..Default::default()
        };
        assert!(at_limit.validate().is_ok());
        assert_eq!(at_limit.broker_delivery_attempts(), u8::MAX);
    }
}
