use std::sync::Arc;

use ::common::SubmissionStatus;
use dispatcher::store::{CommitOutcome, DbSubmissionStore, JudgedSubmission, StoreError, SubmissionStore};

use crate::common::TestDb;

fn judged(id: i64, problem_id: i64, status: SubmissionStatus) -> JudgedSubmission {
    JudgedSubmission {
        id,
        problem_id,
        status,
        run_time: Some(123),
        memory: Some(1024),
        judge_info: Some("all tests passed".into()),
        error_message: None,
    }
}

#[tokio::test]
async fn accepted_commit_updates_row_and_counter() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::Pending).await;
    let before = t.submission(42).await.updated_at;

    let store = DbSubmissionStore::new(t.db.clone());
    let outcome = store
        .commit(&judged(42, 1, SubmissionStatus::Accepted))
        .await
        .unwrap();

    assert_eq!(outcome, CommitOutcome::Committed);
    let row = t.submission(42).await;
    assert_eq!(row.status, SubmissionStatus::Accepted);
    assert_eq!(row.run_time, Some(123));
    assert_eq!(row.memory, Some(1024));
    assert_eq!(row.judge_info.as_deref(), Some("all tests passed"));
    assert_eq!(row.error_message, None);
    assert!(row.updated_at >= before);
    assert_eq!(t.accepted_count(1).await, 1);
}

#[tokio::test]
async fn rejected_commit_leaves_counter() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::Pending).await;

    let store = DbSubmissionStore::new(t.db.clone());
    store
        .commit(&judged(42, 1, SubmissionStatus::WrongAnswer))
        .await
        .unwrap();

    assert_eq!(t.submission(42).await.status, SubmissionStatus::WrongAnswer);
    assert_eq!(t.accepted_count(1).await, 0);
}

#[tokio::test]
async fn final_row_is_not_overwritten() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::WrongAnswer).await;

    let store = DbSubmissionStore::new(t.db.clone());
    let outcome = store
        .commit(&judged(42, 1, SubmissionStatus::Accepted))
        .await
        .unwrap();

    assert_eq!(outcome, CommitOutcome::AlreadyFinal);
    assert_eq!(t.submission(42).await.status, SubmissionStatus::WrongAnswer);
    assert_eq!(t.accepted_count(1).await, 0);
}

#[tokio::test]
async fn missing_problem_rolls_back_submission_update() {
    let t = TestDb::spawn().await;
    t.create_submission(42, 404, SubmissionStatus::Pending).await;

    let store = DbSubmissionStore::new(t.db.clone());
    let err = store
        .commit(&judged(42, 404, SubmissionStatus::Accepted))
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::IntegrityViolation(_)));
    let row = t.submission(42).await;
    assert_eq!(row.status, SubmissionStatus::Pending);
    assert_eq!(row.run_time, None);
}

#[tokio::test]
async fn concurrent_commits_count_once() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::Pending).await;

    let store = Arc::new(DbSubmissionStore::new(t.db.clone()));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .commit(&judged(42, 1, SubmissionStatus::Accepted))
                    .await
            })
        })
        .collect();

    let mut committed = 0;
    for handle in handles {
        if handle.await.unwrap().unwrap() == CommitOutcome::Committed {
            committed += 1;
        }
    }

    assert_eq!(committed, 1);
    assert_eq!(t.accepted_count(1).await, 1);
}
