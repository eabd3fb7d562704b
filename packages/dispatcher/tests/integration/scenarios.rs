//! Whole-pipeline runs: payload in, row and counter out. The sandbox is a
//! wiremock server registered through static discovery.

use std::sync::Arc;
use std::time::Duration;

use ::common::SubmissionStatus;
use ::common::retry::RetryTracker;
use dispatcher::consumer::JudgeTaskConsumer;
use dispatcher::discovery::{DiscoveryWatcher, StaticDiscovery, WatchBackoff};
use dispatcher::dlq::DeadLetterSink;
use dispatcher::processor::TaskProcessor;
use dispatcher::sandbox::HttpSandboxClient;
use dispatcher::scheduler::{RandomPolicy, SandboxSelector};
use dispatcher::store::DbSubmissionStore;
use mq::Delivery;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common::TestDb;

struct Pipeline {
    consumer: JudgeTaskConsumer,
    selector: Arc<SandboxSelector>,
    _shutdown: tokio_util::sync::DropGuard,
}

async fn pipeline(t: &TestDb, endpoints: Vec<String>) -> Pipeline {
    let shutdown = CancellationToken::new();
    let watcher = DiscoveryWatcher::new(
        Arc::new(StaticDiscovery::new(endpoints)),
        WatchBackoff::default(),
        shutdown.clone(),
    );

    let selector = Arc::new(SandboxSelector::new(Box::new(RandomPolicy)));
    selector.subscribe(watcher.watch("/sandboxes"));
    wait_for_first_snapshot(&selector).await;

    let processor = Arc::new(TaskProcessor::new(
        Arc::new(DbSubmissionStore::new(t.db.clone())),
        selector.clone(),
        Arc::new(HttpSandboxClient::new(Duration::from_secs(5)).unwrap()),
    ));
    let dead_letters: Arc<dyn DeadLetterSink> = Arc::new(t.db.clone());

    Pipeline {
        consumer: JudgeTaskConsumer::new(
            processor,
            dead_letters,
            Arc::new(Mutex::new(RetryTracker::new(3))),
            shutdown.clone(),
            Duration::from_secs(10),
        )
        .with_redelivery_backoff(0, 0),
        selector,
        _shutdown: shutdown.drop_guard(),
    }
}

async fn wait_for_first_snapshot(selector: &SandboxSelector) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while selector.snapshot().generation() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("discovery never produced a snapshot");
}

async fn sandbox(verdict: serde_json::Value) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/judge"))
        .respond_with(ResponseTemplate::new(200).set_body_json(verdict))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn scenario_a_accepted_submission_is_committed() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::Pending).await;
    let server = sandbox(json!({
        "status": "Accepted",
        "message": "",
        "time_used": 123,
        "memory_used": 1024,
    }))
    .await;

    let p = pipeline(&t, vec![server.address().to_string()]).await;
    assert_eq!(p.consumer.handle(json!("42")).await, Delivery::Ack);

    let row = t.submission(42).await;
    assert_eq!(row.status, SubmissionStatus::Accepted);
    assert_eq!(row.run_time, Some(123));
    assert_eq!(row.memory, Some(1024));
    assert_eq!(row.error_message, None);
    assert_eq!(t.accepted_count(1).await, 1);

    // A redelivery of the same id changes nothing.
    assert_eq!(p.consumer.handle(json!("42")).await, Delivery::Ack);
    assert_eq!(t.accepted_count(1).await, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn scenario_b_already_judged_submission_is_skipped() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::Accepted).await;
    let before = t.submission(42).await;
    let server = sandbox(json!({
        "status": "WrongAnswer",
        "message": "",
        "time_used": 1,
        "memory_used": 1,
    }))
    .await;

    let p = pipeline(&t, vec![server.address().to_string()]).await;
    assert_eq!(p.consumer.handle(json!("42")).await, Delivery::Ack);

    assert_eq!(t.submission(42).await, before);
    assert_eq!(t.accepted_count(1).await, 0);
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn scenario_c_missing_submission_is_acked() {
    let t = TestDb::spawn().await;
    let server = sandbox(json!({
        "status": "Accepted",
        "message": "",
        "time_used": 1,
        "memory_used": 1,
    }))
    .await;

    let p = pipeline(&t, vec![server.address().to_string()]).await;
    assert_eq!(p.consumer.handle(json!(99)).await, Delivery::Ack);

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn scenario_d_no_sandbox_requests_redelivery() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::Pending).await;

    let p = pipeline(&t, vec![]).await;
    assert!(p.selector.snapshot().is_empty());

    assert!(matches!(
        p.consumer.handle(json!("42")).await,
        Delivery::Redeliver(_)
    ));
    let row = t.submission(42).await;
    assert_eq!(row.status, SubmissionStatus::Pending);
    assert_eq!(row.run_time, None);
}

#[tokio::test]
async fn repeated_failures_end_in_quarantine() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::Pending).await;

    let p = pipeline(&t, vec![]).await;
    for _ in 0..3 {
        assert!(matches!(
            p.consumer.handle(json!("42")).await,
            Delivery::Redeliver(_)
        ));
    }
    assert_eq!(p.consumer.handle(json!("42")).await, Delivery::Ack);

    let row = t.submission(42).await;
    assert_eq!(row.status, SubmissionStatus::SystemError);
    assert!(row.error_message.unwrap().contains("DISPATCH_FAILED"));
}

#[tokio::test]
async fn unknown_verdict_is_recorded_as_system_error() {
    let t = TestDb::spawn().await;
    t.create_problem(1).await;
    t.create_submission(42, 1, SubmissionStatus::Pending).await;
    let server = sandbox(json!({
        "status": "Partially Correct",
        "message": "3/10",
        "time_used": 50,
        "memory_used": 64,
    }))
    .await;

    let p = pipeline(&t, vec![server.address().to_string()]).await;
    assert_eq!(p.consumer.handle(json!("42")).await, Delivery::Ack);

    let row = t.submission(42).await;
    assert_eq!(row.status, SubmissionStatus::SystemError);
    assert_eq!(row.judge_info.as_deref(), Some("3/10"));
    assert!(row.error_message.unwrap().contains("Partially Correct"));
    assert_eq!(t.accepted_count(1).await, 0);
}
