//! Test: Success Chain - every stage runs once, in order, fed by the one before

use crate::helpers::*;
use mlops_pipeline::execution::StageResult;
use std::sync::Arc;

#[tokio::test(start_paused = true)]
async fn test_full_run_produces_five_results() {
    let backend = Arc::new(RecordingBackend::new().pending("train", 3).pending("batch-transform", 2));
    let runner = runner_with(backend.clone(), quick_policy(10));

    let report = runner.execute("raw/batch-001.zip").await.unwrap();

    assert_succeeded(&report);
    assert_keys(
        &report,
        &["fileuri", "preprocess", "train", "model", "transform", "postprocess"],
    );
    assert_eq!(report.records.len(), 5);
    assert_eq!(
        backend.invoked_stages(),
        vec!["preprocess", "train", "register-model", "batch-transform", "postprocess"]
    );
}

#[tokio::test(start_paused = true)]
async fn test_each_stage_invoked_exactly_once() {
    let backend = Arc::new(RecordingBackend::new().pending("train", 4));
    let runner = runner_with(backend.clone(), quick_policy(10));

    runner.execute("raw/batch-001.zip").await.unwrap();

    assert_eq!(backend.count("preprocess", Op::Run), 1);
    assert_eq!(backend.count("train", Op::Submit), 1);
    assert_eq!(backend.count("train", Op::Check), 5);
    assert_eq!(backend.count("register-model", Op::Submit), 1);
    assert_eq!(backend.count("batch-transform", Op::Submit), 1);
    assert_eq!(backend.count("postprocess", Op::Run), 1);
    assert_eq!(backend.count("preprocess", Op::Submit), 0);
    assert_eq!(backend.in_flight(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stage_inputs_flow_from_earlier_results() {
    let backend = Arc::new(RecordingBackend::new());
    let runner = runner_with(backend.clone(), quick_policy(3));

    let report = runner.execute("raw/batch-001.zip").await.unwrap();
    assert_succeeded(&report);

    let preprocess = backend.spec_for("preprocess").unwrap();
    assert_eq!(preprocess.arguments["--fileuri"], "raw/batch-001.zip");
    assert_eq!(preprocess.arguments["--bucket"], BUCKET);

    let train = report.result("train").unwrap();
    let register = backend.spec_for("register-model").unwrap();
    assert_eq!(Some(&register.inputs["model_data"]), train.output_location.as_ref());

    let model = report.result("model").unwrap();
    let transform = backend.spec_for("batch-transform").unwrap();
    assert_eq!(transform.options["model_name"], model.job_id.as_str());

    let transform_result = report.result("transform").unwrap();
    let postprocess = backend.spec_for("postprocess").unwrap();
    assert_eq!(
        Some(&postprocess.arguments["--forecastdir"]),
        transform_result.output_location.as_ref()
    );
    assert_eq!(
        transform_result.output_location.as_deref(),
        Some("s3://test-bucket/json/forecast")
    );
}

#[tokio::test(start_paused = true)]
async fn test_async_jobs_named_after_run() {
    let backend = Arc::new(RecordingBackend::new());
    let runner = runner_with(backend.clone(), quick_policy(3));

    let report = runner.execute("raw/batch-001.zip").await.unwrap();

    let train = backend.spec_for("train").unwrap();
    assert_eq!(train.job_name, report.context.resource_name);
    assert!(train.image.is_some());
    assert!(backend.spec_for("preprocess").unwrap().image.is_none());

    let stored: StageResult = report.result("preprocess").unwrap();
    assert_eq!(stored.output_location.as_deref(), Some("s3://test-bucket/json"));
}

#[tokio::test(start_paused = true)]
async fn test_stages_start_after_predecessor_finishes() {
    let backend = Arc::new(RecordingBackend::new().pending("train", 2).pending("register-model", 1));
    let runner = runner_with(backend, quick_policy(5));

    let report = runner.execute("raw/batch-001.zip").await.unwrap();
    assert_succeeded(&report);

    let indices: Vec<_> = report.records.iter().map(|r| r.index).collect();
    assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    for pair in report.records.windows(2) {
        assert!(pair[0].succeeded());
        assert!(
            pair[1].started_at >= pair[0].finished_at,
            "{} started before {} finished",
            pair[1].stage,
            pair[0].stage
        );
    }
}
