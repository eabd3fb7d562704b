use async_trait::async_trait;
use chrono::Utc;
use common::{DlqEnvelope, SubmissionDlqErrorCode};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    PaginatorTrait, QueryFilter, Set, SqlErr, TransactionTrait,
};
use tracing::{info, warn};

use crate::entity::dead_letter_message;
use crate::store::mark_submission_system_error;

pub struct DlqService<'a, C: ConnectionTrait> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> DlqService<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }

    /// Persist a failed message. A second call with the same `message_id`
    /// returns the row written by the first.
    pub async fn send_to_dlq(
        &self,
        envelope: &DlqEnvelope,
    ) -> Result<dead_letter_message::Model, DbErr> {
        // Inside a Postgres transaction a unique violation aborts everything
        // after it, so look for the existing row first.
        if let Some(existing) = self.find_by_message_id(&envelope.message_id).await? {
            return Ok(existing);
        }

        let now = Utc::now();
        let first_failed_at = envelope
            .retry_history
            .first()
            .map(|r| r.timestamp)
            .unwrap_or(now);
        let retry_history = serde_json::to_value(&envelope.retry_history)
            .map_err(|e| DbErr::Custom(format!("Failed to encode retry history: {e}")))?;

        let model = dead_letter_message::ActiveModel {
            message_id: Set(envelope.message_id.clone()),
            message_type: Set(envelope.message_type.to_string()),
            submission_id: Set(envelope.submission_id),
            payload: Set(envelope.payload.clone()),
            error_message: Set(envelope.error_message.clone()),
            error_code: Set(envelope.error_code.to_string()),
            retry_count: Set(envelope.retry_history.len() as i32),
            retry_history: Set(retry_history),
            first_failed_at: Set(first_failed_at),
            created_at: Set(now),
            resolved: Set(false),
            resolved_at: Set(None),
            ..Default::default()
        };

        match model.insert(self.conn).await {
            Ok(inserted) => Ok(inserted),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                self.find_by_message_id(&envelope.message_id)
                    .await?
                    .ok_or_else(|| {
                        DbErr::Custom(
                            "UniqueConstraintViolation but existing row not found".to_string(),
                        )
                    })
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<dead_letter_message::Model>, DbErr> {
        dead_letter_message::Entity::find()
            .filter(dead_letter_message::Column::MessageId.eq(message_id))
            .one(self.conn)
            .await
    }

    /// Check if a submission already has an unresolved DLQ entry.
    pub async fn has_unresolved_entry(&self, submission_id: i64) -> Result<bool, DbErr> {
        let count = dead_letter_message::Entity::find()
            .filter(dead_letter_message::Column::SubmissionId.eq(submission_id))
            .filter(dead_letter_message::Column::Resolved.eq(false))
            .count(self.conn)
            .await?;

        Ok(count > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineOutcome {
    pub dlq_id: i32,
    /// The submission was still `Pending` and is now `SystemError`.
    pub submission_marked: bool,
}

/// Dead-letter a message and fail its submission in one transaction.
///
/// The submission is only touched if it is still `Pending`; a row that
/// already has a verdict keeps it.
pub async fn quarantine_submission(
    db: &DatabaseConnection,
    envelope: &DlqEnvelope,
) -> Result<QuarantineOutcome, DbErr> {
    let txn = db.begin().await?;

    let entry = DlqService::new(&txn).send_to_dlq(envelope).await?;

    let submission_marked = match envelope.submission_id {
        Some(submission_id) => {
            mark_submission_system_error(
                &txn,
                submission_id,
                SubmissionDlqErrorCode::DISPATCH_FAILED,
                &envelope.error_message,
            )
            .await?
        }
        None => false,
    };

    txn.commit().await?;

    if envelope.submission_id.is_some() && !submission_marked {
        warn!(
            submission_id = envelope.submission_id,
            message_id = %envelope.message_id,
            "Submission already final, DLQ entry recorded without status change"
        );
    }

    info!(
        submission_id = envelope.submission_id,
        message_id = %envelope.message_id,
        error_code = %envelope.error_code,
        dlq_id = entry.id,
        "Quarantined message"
    );

    Ok(QuarantineOutcome {
        dlq_id: entry.id,
        submission_marked,
    })
}

/// Where the consumer sends messages it gives up on.
#[async_trait]
pub trait DeadLetterSink: Send + Sync {
    async fn quarantine(&self, envelope: &DlqEnvelope) -> Result<QuarantineOutcome, DbErr>;
}

#[async_trait]
impl DeadLetterSink for DatabaseConnection {
    async fn quarantine(&self, envelope: &DlqEnvelope) -> Result<QuarantineOutcome, DbErr> {
        quarantine_submission(self, envelope).await
    }
}
