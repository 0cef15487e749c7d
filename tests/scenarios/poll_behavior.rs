//! Test: Poll Behavior - bounded polling surfaces timeouts and fatal status errors distinctly

use crate::helpers::*;
use mlops_pipeline::backend::BackendError;
use mlops_pipeline::core::FailureKind;
use mlops_pipeline::execution::PollPolicy;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn test_training_never_finishes() {
    let backend = Arc::new(RecordingBackend::new().pending("train", 1_000));
    let runner = runner_with(backend.clone(), quick_policy(6));

    let report = runner.execute("raw/batch-001.zip").await.unwrap();

    assert_failed_at(&report, 1, FailureKind::PendingTimeout);
    assert_eq!(backend.count("train", Op::Check), 6);
    assert_keys(&report, &["fileuri", "preprocess"]);
    assert!(backend.calls_for("register-model").is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_status_error_is_not_a_timeout() {
    let backend = Arc::new(
        RecordingBackend::new().fail_status("train", BackendError::new("AccessDenied", "no permission")),
    );
    let runner = runner_with(backend.clone(), quick_policy(6));

    let report = runner.execute("raw/batch-001.zip").await.unwrap();

    assert_failed_at(&report, 1, FailureKind::Status);
    assert_eq!(backend.count("train", Op::Check), 1);
}

#[tokio::test(start_paused = true)]
async fn test_checks_spaced_by_interval() {
    let backend = Arc::new(RecordingBackend::new().pending("batch-transform", 3));
    let interval = Duration::from_secs(30);
    let runner = runner_with(backend.clone(), PollPolicy::fixed(interval, 10));

    let report = runner.execute("raw/batch-001.zip").await.unwrap();
    assert_succeeded(&report);

    let checks: Vec<_> = backend
        .calls_for("batch-transform")
        .into_iter()
        .filter(|c| c.op == Op::Check)
        .map(|c| c.at)
        .collect();
    assert_eq!(checks.len(), 4);
    for pair in checks.windows(2) {
        assert_eq!(pair[1] - pair[0], interval);
    }
}

#[tokio::test(start_paused = true)]
async fn test_pending_in_one_stage_does_not_spill_over() {
    let backend = Arc::new(RecordingBackend::new().pending("train", 2).pending("register-model", 1));
    let runner = runner_with(backend.clone(), quick_policy(3));

    let report = runner.execute("raw/batch-001.zip").await.unwrap();

    assert_succeeded(&report);
    assert_eq!(backend.count("train", Op::Check), 3);
    assert_eq!(backend.count("register-model", Op::Check), 2);
    assert_eq!(backend.count("batch-transform", Op::Check), 1);
}
