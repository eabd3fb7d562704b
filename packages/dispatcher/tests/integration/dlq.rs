use ::common::retry::RetryAttempt;
use ::common::{DlqEnvelope, DlqErrorCode, DlqMessageType, SubmissionStatus};
use dispatcher::dlq::{DlqService, quarantine_submission};
use dispatcher::entity::dead_letter_message;
use sea_orm::EntityTrait;
use serde_json::json;

use crate::common::TestDb;

fn exhausted(submission_id: i64) -> DlqEnvelope {
    DlqEnvelope {
        message_id: format!("judge-task-{submission_id}"),
        message_type: DlqMessageType::JudgeTask,
        submission_id: Some(submission_id),
        payload: json!(submission_id.to_string()),
        error_code: DlqErrorCode::MaxRetriesExceeded,
        error_message: "No available sandbox".into(),
        retry_history: vec![
            RetryAttempt::new(1, "No available sandbox"),
            RetryAttempt::new(2, "No available sandbox"),
        ],
    }
}

#[tokio::test]
async fn quarantine_marks_pending_submission() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::Pending).await;

    let outcome = quarantine_submission(&t.db, &exhausted(42)).await.unwrap();
    assert!(outcome.submission_marked);

    let row = t.submission(42).await;
    assert_eq!(row.status, SubmissionStatus::SystemError);
    let message = row.error_message.unwrap();
    assert!(message.contains("DISPATCH_FAILED"));
    assert!(message.contains("No available sandbox"));

    let entry = dead_letter_message::Entity::find_by_id(outcome.dlq_id)
        .one(&t.db)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.error_code, "MAX_RETRIES_EXCEEDED");
    assert_eq!(entry.message_type, "judge_task");
    assert_eq!(entry.submission_id, Some(42));
    assert_eq!(entry.retry_count, 2);
    assert_eq!(entry.retry_history.as_array().map(Vec::len), Some(2));
    assert!(!entry.resolved);

    assert!(DlqService::new(&t.db).has_unresolved_entry(42).await.unwrap());
}

#[tokio::test]
async fn quarantine_keeps_existing_verdict() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::Accepted).await;

    let outcome = quarantine_submission(&t.db, &exhausted(42)).await.unwrap();

    assert!(!outcome.submission_marked);
    assert_eq!(t.submission(42).await.status, SubmissionStatus::Accepted);
}

#[tokio::test]
async fn quarantine_is_idempotent_on_message_id() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::Pending).await;

    let first = quarantine_submission(&t.db, &exhausted(42)).await.unwrap();
    let second = quarantine_submission(&t.db, &exhausted(42)).await.unwrap();

    assert_eq!(first.dlq_id, second.dlq_id);
    let rows = dead_letter_message::Entity::find().all(&t.db).await.unwrap();
    assert_eq!(rows.len(), 1);
}

#[tokio::test]
async fn envelope_without_submission_only_records_entry() {
    let t = TestDb::spawn().await;

    let envelope = DlqEnvelope {
        message_id: "judge-task-invalid-1".into(),
        message_type: DlqMessageType::JudgeTask,
        submission_id: None,
        payload: json!("not-a-number"),
        error_code: DlqErrorCode::DeserializationError,
        error_message: "Invalid payload".into(),
        retry_history: vec![],
    };
    let outcome = quarantine_submission(&t.db, &envelope).await.unwrap();

    assert!(!outcome.submission_marked);
    let entry = DlqService::new(&t.db)
        .find_by_message_id("judge-task-invalid-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.error_code, "DESERIALIZATION_ERROR");
    assert_eq!(entry.payload, json!("not-a-number"));
    assert_eq!(entry.submission_id, None);
}
