//! Test: Trigger Dispatch - storage events start isolated runs

use crate::helpers::*;
use mlops_pipeline::execution::{EventTrigger, StorageEvent, TriggerRule};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn trigger_with(backend: Arc<RecordingBackend>) -> EventTrigger {
    let runner = runner_with(backend, quick_policy(5));
    EventTrigger::new(TriggerRule::new("raw/", ".zip"), Arc::new(runner)).scoped_to(BUCKET)
}

#[tokio::test(start_paused = true)]
async fn test_matching_event_starts_one_run() {
    let backend = Arc::new(RecordingBackend::new());
    let trigger = trigger_with(backend.clone());

    let handle = trigger
        .on_object_created(StorageEvent::object_created(BUCKET, "raw/batch-001.zip"))
        .expect("matching key should start a run");
    let report = handle.await.unwrap().unwrap();

    assert_succeeded(&report);
    assert_eq!(report.object_key(), "raw/batch-001.zip");
    assert_eq!(backend.count("preprocess", Op::Run), 1);
}

#[tokio::test(start_paused = true)]
async fn test_non_matching_events_start_nothing() {
    let backend = Arc::new(RecordingBackend::new());
    let trigger = trigger_with(backend.clone());

    for event in [
        StorageEvent::object_created(BUCKET, "raw/batch-001.csv"),
        StorageEvent::object_created(BUCKET, "json/batch-001.zip"),
        StorageEvent::object_created("other-bucket", "raw/batch-001.zip"),
    ] {
        assert!(trigger.on_object_created(event).is_none());
    }
    assert!(backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_notification_records_each_start_a_run() {
    let backend = Arc::new(RecordingBackend::new());
    let trigger = trigger_with(backend.clone());

    let notification = r#"{
        "Records": [
            {"eventName": "ObjectCreated:Put",
             "s3": {"bucket": {"name": "test-bucket"}, "object": {"key": "raw/a.zip"}}},
            {"eventName": "ObjectCreated:CompleteMultipartUpload",
             "s3": {"bucket": {"name": "test-bucket"}, "object": {"key": "raw/b.zip"}}},
            {"eventName": "ObjectRemoved:Delete",
             "s3": {"bucket": {"name": "test-bucket"}, "object": {"key": "raw/c.zip"}}}
        ]
    }"#;

    let (tx, rx) = mpsc::channel(8);
    for event in StorageEvent::from_s3_notification(notification).unwrap() {
        tx.send(event).await.unwrap();
    }
    drop(tx);

    let reports = trigger.watch(rx).await;
    let keys: HashSet<_> = reports.iter().map(|r| r.object_key().to_string()).collect();
    assert_eq!(keys, HashSet::from(["raw/a.zip".to_string(), "raw/b.zip".to_string()]));
    assert_eq!(backend.count("preprocess", Op::Run), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_runs_are_isolated() {
    let backend = Arc::new(
        RecordingBackend::new()
            .pending("train", 2)
            .with_run_delay(Duration::from_secs(1)),
    );
    let trigger = trigger_with(backend.clone());

    let first = trigger
        .on_object_created(StorageEvent::object_created(BUCKET, "raw/a.zip"))
        .unwrap();
    let second = trigger
        .on_object_created(StorageEvent::object_created(BUCKET, "raw/b.zip"))
        .unwrap();
    let (first, second) = tokio::join!(first, second);
    let (first, second) = (first.unwrap().unwrap(), second.unwrap().unwrap());

    assert_succeeded(&first);
    assert_succeeded(&second);
    assert_ne!(first.run_id, second.run_id);
    assert_ne!(first.context.resource_name, second.context.resource_name);
    assert_eq!(first.context.source_object(), Some("raw/a.zip"));
    assert_eq!(second.context.source_object(), Some("raw/b.zip"));

    // neither run saw the other's training output
    let first_model = first.result("train").unwrap().output_location;
    let second_model = second.result("train").unwrap().output_location;
    assert_ne!(first_model, second_model);

    let fileuris: HashSet<_> = backend
        .calls_for("preprocess")
        .into_iter()
        .filter_map(|c| c.spec)
        .map(|s| s.arguments["--fileuri"].clone())
        .collect();
    assert_eq!(fileuris, HashSet::from(["raw/a.zip".to_string(), "raw/b.zip".to_string()]));
    assert_eq!(backend.count("train", Op::Submit), 2);
}
