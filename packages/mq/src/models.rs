pub use broccoli_queue::{
    brokers::broker::BrokerMessage, error::BroccoliError, queue::BroccoliQueue,
};
use broccoli_queue::queue::RetryStrategy;
use common::{DlqConfig, MqAppConfig};
use tracing::debug;

use crate::error::MqError;

pub type MqQueue = BroccoliQueue;

pub struct MqConfig {
    pub url: String,
    pub pool_size: u8,
    /// Deliveries before broccoli moves a message to `<queue>_failed`.
    pub delivery_attempts: u8,
}

impl MqConfig {
    /// The broker budget always outlasts the quarantine budget of `dlq`, so a
    /// failing message is quarantined before broccoli gives up on it.
    pub fn new(mq: &MqAppConfig, dlq: &DlqConfig) -> Self {
        Self {
            url: mq.url.clone(),
            pool_size: mq.pool_size,
            delivery_attempts: dlq.broker_delivery_attempts(),
        }
    }
}

pub async fn init_mq(config: MqConfig) -> Result<MqQueue, MqError> {
    debug!(
        delivery_attempts = config.delivery_attempts,
        "Configuring broker retry strategy"
    );
    BroccoliQueue::builder(&config.url)
        .pool_connections(config.pool_size)
        .failed_message_retry_strategy(
            RetryStrategy::new().with_attempts(config.delivery_attempts),
        )
        .build()
        .await
        .map_err(|e| MqError::Connect {
            url: config.url.clone(),
            reason: e.to_string(),
        })
}

/// How a handler wants the broker to treat the message it was given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Done with this message, never deliver it again.
    Ack,
    /// Hand it back to the broker for a later delivery.
    Redeliver(String),
}

/// Translate a [`Delivery`] into the result `process_messages` handlers return.
///
/// broccoli acknowledges on `Ok` and schedules a redelivery on `Err`.
pub fn settle(delivery: Delivery) -> Result<(), BroccoliError> {
    match delivery {
        Delivery::Ack => Ok(()),
        Delivery::Redeliver(reason) => {
            debug!(reason = %reason, "Requesting redelivery");
            Err(BroccoliError::Job(reason))
        }
    }
}
