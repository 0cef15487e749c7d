//! Test: Failure Handling - a failing stage ends the run where it stands

use crate::helpers::*;
use mlops_pipeline::backend::BackendError;
use mlops_pipeline::core::{FailureKind, RunStatus, StageOutcome};
use mlops_pipeline::persistence::{InMemoryRunLog, RunLog};
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn test_register_model_submit_rejected() {
    let backend = Arc::new(
        RecordingBackend::new()
            .fail_submit("register-model", BackendError::new("ValidationException", "bad model data")),
    );
    let runner = runner_with(backend.clone(), quick_policy(5));

    let report = runner.execute("raw/batch-001.zip").await.unwrap();

    assert_failed_at(&report, 2, FailureKind::Submit);
    assert_keys(&report, &["fileuri", "preprocess", "train"]);
    assert_eq!(backend.calls_for("batch-transform").len(), 0);
    assert_eq!(backend.calls_for("postprocess").len(), 0);

    let (_, cause) = report.failure().unwrap();
    assert_eq!(cause.stage, "register-model");
    assert!(cause.message.contains("ValidationException"));
}

#[tokio::test(start_paused = true)]
async fn test_preprocess_failure_leaves_only_seed() {
    let backend = Arc::new(
        RecordingBackend::new().fail_run("preprocess", BackendError::new("EntityNotFound", "no script")),
    );
    let runner = runner_with(backend.clone(), quick_policy(5));

    let report = runner.execute("raw/batch-001.zip").await.unwrap();

    assert_failed_at(&report, 0, FailureKind::Backend);
    assert_keys(&report, &["fileuri"]);
    assert_eq!(backend.invoked_stages(), vec!["preprocess"]);
}

#[tokio::test(start_paused = true)]
async fn test_postprocess_failure_keeps_earlier_results() {
    let backend = Arc::new(
        RecordingBackend::new().fail_run("postprocess", BackendError::new("JobRunFailed", "bad csv")),
    );
    let runner = runner_with(backend.clone(), quick_policy(5));

    let report = runner.execute("raw/batch-001.zip").await.unwrap();

    assert_failed_at(&report, 4, FailureKind::Backend);
    assert_keys(&report, &["fileuri", "preprocess", "train", "model", "transform"]);
    let outcomes: Vec<_> = report.records.iter().map(|r| r.succeeded()).collect();
    assert_eq!(outcomes, vec![true, true, true, true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_run_recorded_in_history() {
    let backend = Arc::new(
        RecordingBackend::new()
            .fail_submit("register-model", BackendError::new("ValidationException", "bad model data")),
    );
    let log = Arc::new(InMemoryRunLog::new());
    let runner = runner_with(backend, quick_policy(5)).with_run_log(log.clone());

    let report = runner.execute("raw/batch-001.zip").await.unwrap();

    let summary = log.load_run(report.run_id).await.unwrap().unwrap();
    assert_eq!(summary.status, RunStatus::Failed);
    assert_eq!(summary.failed_stage.as_deref(), Some("register-model"));
    assert_eq!(summary.failure_kind, Some(FailureKind::Submit));
    assert_eq!(summary.completed_stages, 2);

    let entries = log.stage_entries(report.run_id).await.unwrap();
    assert_eq!(entries.len(), 3);
    assert!(matches!(
        entries[2].outcome,
        StageOutcome::Failed {
            kind: FailureKind::Submit,
            ..
        }
    ));
    assert!(entries[2].payload.is_none());
}
