use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use common::retry::{RetryAttempt, RetryDecision, RetryTracker, calculate_backoff};
use common::{DlqConfig, DlqEnvelope, DlqErrorCode, DlqMessageType};
use mq::{BroccoliError, BrokerMessage, Delivery, Mq, settle};
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::dlq::DeadLetterSink;
use crate::error::ProcessError;
use crate::processor::{DeliveryContext, TaskProcessor};

/// Read the submission id out of a broker payload.
///
/// Producers send either the decimal id as a string (`"42"`) or a bare JSON
/// number. Ids are positive.
pub fn parse_submission_id(payload: &Value) -> Result<i64, ProcessError> {
    let id = match payload {
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| ProcessError::InvalidPayload(format!("{s:?} is not an id: {e}")))?,
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| ProcessError::InvalidPayload(format!("{n} is not an integer id")))?,
        other => {
            return Err(ProcessError::InvalidPayload(format!(
                "expected a submission id, got {other}"
            )));
        }
    };

    if id <= 0 {
        return Err(ProcessError::InvalidPayload(format!(
            "submission id must be positive, got {id}"
        )));
    }
    Ok(id)
}

fn exhausted_message_id(submission_id: i64) -> String {
    format!("judge-task-{submission_id}")
}

fn invalid_message_id() -> String {
    format!("judge-task-invalid-{}", uuid::Uuid::now_v7())
}

/// Settles every delivery of the judge task queue.
pub struct JudgeTaskConsumer {
    processor: Arc<TaskProcessor>,
    dead_letters: Arc<dyn DeadLetterSink>,
    retry_tracker: Arc<Mutex<RetryTracker>>,
    shutdown: CancellationToken,
    processing_timeout: Duration,
    backoff_base_ms: u64,
    backoff_max_ms: u64,
    in_flight: AtomicUsize,
    idle: Notify,
}

/// Counts a delivery as in flight until dropped.
struct InFlight<'a>(&'a JudgeTaskConsumer);

impl<'a> InFlight<'a> {
    fn enter(consumer: &'a JudgeTaskConsumer) -> Self {
        consumer.in_flight.fetch_add(1, Ordering::AcqRel);
        Self(consumer)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

impl JudgeTaskConsumer {
    pub fn new(
        processor: Arc<TaskProcessor>,
        dead_letters: Arc<dyn DeadLetterSink>,
        retry_tracker: Arc<Mutex<RetryTracker>>,
        shutdown: CancellationToken,
        processing_timeout: Duration,
    ) -> Self {
        let dlq = DlqConfig::default();
        Self {
            processor,
            dead_letters,
            retry_tracker,
            shutdown,
            processing_timeout,
            backoff_base_ms: dlq.redelivery_backoff_base_ms,
            backoff_max_ms: dlq.redelivery_backoff_max_ms,
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        }
    }

    /// Delay before a failed delivery is handed back: `base_ms` doubled per
    /// recorded failure, capped at `max_ms`.
    pub fn with_redelivery_backoff(mut self, base_ms: u64, max_ms: u64) -> Self {
        self.backoff_base_ms = base_ms;
        self.backoff_max_ms = max_ms;
        self
    }

    /// Deliveries currently inside [`JudgeTaskConsumer::handle`].
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Wait up to `grace` for in-flight deliveries to settle.
    ///
    /// Returns false if some were still running when `grace` ran out.
    pub async fn drain(&self, grace: Duration) -> bool {
        let settled = async {
            loop {
                let idle = self.idle.notified();
                if self.in_flight() == 0 {
                    return;
                }
                idle.await;
            }
        };
        tokio::time::timeout(grace, settled).await.is_ok()
    }

    /// Consume `queue` until the broker connection fails.
    pub async fn run(
        self: Arc<Self>,
        mq: Arc<Mq>,
        queue: &str,
        concurrency: usize,
    ) -> Result<(), BroccoliError> {
        info!(queue = %queue, concurrency, "Starting judge task consumer");

        mq.process_messages(
            queue,
            Some(concurrency),
            None,
            move |message: BrokerMessage<Value>| {
                let consumer = Arc::clone(&self);
                async move { settle(consumer.handle(message.payload).await) }
            },
        )
        .await
    }

    /// Process one payload and decide what the broker should do with it.
    pub async fn handle(&self, payload: Value) -> Delivery {
        let _in_flight = InFlight::enter(self);

        let submission_id = match parse_submission_id(&payload) {
            Ok(id) => id,
            Err(e) => {
                error!(payload = %payload, error = %e, "Unparsable judge task");
                return self.quarantine_invalid(payload, e).await;
            }
        };

        let ctx = DeliveryContext::new(&self.shutdown, self.processing_timeout);
        let key = submission_id.to_string();

        match self.processor.process(submission_id, &ctx).await {
            Ok(outcome) => {
                self.retry_tracker.lock().await.clear(&key);
                debug!(submission_id, outcome = %outcome, "Judge task done");
                Delivery::Ack
            }
            Err(ProcessError::Cancelled) if self.shutdown.is_cancelled() => {
                info!(submission_id, "Shutting down, handing task back to the broker");
                Delivery::Redeliver(ProcessError::Cancelled.to_string())
            }
            Err(e) if !e.is_retryable() => self.quarantine_invalid(payload, e).await,
            Err(e) => {
                let reason = e.to_string();
                let decision = self
                    .retry_tracker
                    .lock()
                    .await
                    .record_failure(&key, &reason);

                match decision {
                    RetryDecision::Redeliver { attempt, .. } => {
                        let delay =
                            calculate_backoff(attempt, self.backoff_base_ms, self.backoff_max_ms);
                        warn!(
                            submission_id,
                            step = e.step(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Judge task failed, requesting redelivery"
                        );
                        self.hold_back(delay).await;
                        Delivery::Redeliver(reason)
                    }
                    RetryDecision::Exhausted { history } => {
                        error!(
                            submission_id,
                            step = e.step(),
                            retry_count = history.len(),
                            error = %e,
                            "Redelivery budget exhausted, quarantining"
                        );
                        let envelope = DlqEnvelope {
                            message_id: exhausted_message_id(submission_id),
                            message_type: DlqMessageType::JudgeTask,
                            submission_id: Some(submission_id),
                            payload,
                            error_code: DlqErrorCode::MaxRetriesExceeded,
                            error_message: reason,
                            retry_history: history,
                        };
                        self.send_to_dlq(envelope).await
                    }
                }
            }
        }
    }

    /// broccoli republishes a rejected message at once, so the delay happens
    /// here. Shutdown cuts it short.
    async fn hold_back(&self, delay: Duration) {
        if delay.is_zero() {
            return;
        }
        tokio::select! {
            _ = self.shutdown.cancelled() => {}
            _ = tokio::time::sleep(delay) => {}
        }
    }

    async fn quarantine_invalid(&self, payload: Value, err: ProcessError) -> Delivery {
        let envelope = DlqEnvelope {
            message_id: invalid_message_id(),
            message_type: DlqMessageType::JudgeTask,
            submission_id: None,
            payload,
            error_code: DlqErrorCode::DeserializationError,
            error_message: err.to_string(),
            retry_history: vec![RetryAttempt::new(1, err.to_string())],
        };
        self.send_to_dlq(envelope).await
    }

    async fn send_to_dlq(&self, envelope: DlqEnvelope) -> Delivery {
        match self.dead_letters.quarantine(&envelope).await {
            Ok(_) => Delivery::Ack,
            Err(e) => {
                // Keep the message; the next delivery starts a fresh budget.
                error!(
                    submission_id = envelope.submission_id,
                    message_id = %envelope.message_id,
                    error = %e,
                    "Failed to quarantine message"
                );
                Delivery::Redeliver(format!("quarantine failed: {e}"))
            }
        }
    }
}
