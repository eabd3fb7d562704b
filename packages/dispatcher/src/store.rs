//! Persistence of judge results.
//!
//! A judged submission is written in one transaction: the submission row is
//! updated only while it is still `Pending`, and an `Accepted` result bumps the
//! problem's `accepted_count` in the same unit of work.

use async_trait::async_trait;
use chrono::Utc;
use common::SubmissionStatus;
use sea_orm::sea_query::{Expr, ExprTrait};
use sea_orm::{
    ActiveValue::Set, ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, TransactionTrait,
};
use thiserror::Error;
use tracing::{debug, warn};

use crate::entity::{problem, submission};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] DbErr),

    #[error("Integrity violation: {0}")]
    IntegrityViolation(String),
}

/// Terminal state computed for a submission, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgedSubmission {
    pub id: i64,
    pub problem_id: i64,
    pub status: SubmissionStatus,
    pub run_time: Option<i64>,
    pub memory: Option<i64>,
    pub judge_info: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The row moved from `Pending` to its terminal state.
    Committed,
    /// The row had already left `Pending`; nothing was written.
    AlreadyFinal,
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn find(&self, id: i64) -> Result<Option<submission::Model>, StoreError>;

    async fn commit(&self, judged: &JudgedSubmission) -> Result<CommitOutcome, StoreError>;
}

#[derive(Clone)]
pub struct DbSubmissionStore {
    db: DatabaseConnection,
}

impl DbSubmissionStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SubmissionStore for DbSubmissionStore {
    async fn find(&self, id: i64) -> Result<Option<submission::Model>, StoreError> {
        Ok(submission::Entity::find_by_id(id).one(&self.db).await?)
    }

    async fn commit(&self, judged: &JudgedSubmission) -> Result<CommitOutcome, StoreError> {
        let txn = self.db.begin().await?;

        match write_judged(&txn, judged).await {
            Ok(outcome) => {
                txn.commit().await?;
                Ok(outcome)
            }
            Err(e) => {
                if let Err(rollback_err) = txn.rollback().await {
                    warn!(
                        submission_id = judged.id,
                        error = %rollback_err,
                        "Failed to roll back judge result transaction"
                    );
                }
                Err(e)
            }
        }
    }
}

/// Both writes of the commit protocol, on an open transaction.
async fn write_judged<C: ConnectionTrait>(
    conn: &C,
    judged: &JudgedSubmission,
) -> Result<CommitOutcome, StoreError> {
    let now = Utc::now();

    let update = submission::ActiveModel {
        status: Set(judged.status),
        run_time: Set(judged.run_time),
        memory: Set(judged.memory),
        judge_info: Set(judged.judge_info.clone()),
        error_message: Set(judged.error_message.clone()),
        updated_at: Set(now),
        ..Default::default()
    };

    let result = submission::Entity::update_many()
        .set(update)
        .filter(submission::Column::Id.eq(judged.id))
        .filter(submission::Column::Status.eq(SubmissionStatus::Pending))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        debug!(
            submission_id = judged.id,
            "Submission no longer pending, skipping write"
        );
        return Ok(CommitOutcome::AlreadyFinal);
    }

    if judged.status.is_accepted() {
        let result = problem::Entity::update_many()
            .col_expr(
                problem::Column::AcceptedCount,
                Expr::col(problem::Column::AcceptedCount).add(1),
            )
            .col_expr(problem::Column::UpdatedAt, Expr::value(now))
            .filter(problem::Column::Id.eq(judged.problem_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(StoreError::IntegrityViolation(format!(
                "problem {} of submission {} does not exist",
                judged.problem_id, judged.id
            )));
        }
    }

    Ok(CommitOutcome::Committed)
}

/// Move a still-pending submission to `SystemError`.
///
/// Returns whether the row was changed; a submission that already reached a
/// terminal state is left alone.
pub async fn mark_submission_system_error<C: ConnectionTrait>(
    conn: &C,
    submission_id: i64,
    error_code: &str,
    error_message: &str,
) -> Result<bool, DbErr> {
    let update = submission::ActiveModel {
        status: Set(SubmissionStatus::SystemError),
        error_message: Set(Some(format!("{error_code}: {error_message}"))),
        updated_at: Set(Utc::now()),
        ..Default::default()
    };

    let result = submission::Entity::update_many()
        .set(update)
        .filter(submission::Column::Id.eq(submission_id))
        .filter(submission::Column::Status.eq(SubmissionStatus::Pending))
        .exec(conn)
        .await?;

    Ok(result.rows_affected > 0)
}
