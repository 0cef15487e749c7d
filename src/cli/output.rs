//! CLI output formatting

use crate::{
    core::{PipelineDefinition, RunStatus, StageOutcome},
    execution::{ExecutionEvent, RunReport},
    persistence::{RunSummary, StageLogEntry},
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a stage progress bar
pub fn create_progress_bar(total: usize) -> ProgressBar {
    let progress = ProgressBar::new(total as u64);
    let bar_style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    progress.set_style(bar_style);
    progress.enable_steady_tick(Duration::from_millis(100));
    progress
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::NotStarted => style("NOT STARTED").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.simple().to_string()[..8].to_string()
}

/// One-line run summary for history listings
pub fn format_run_summary(summary: &RunSummary) -> String {
    let status_icon = match summary.status {
        RunStatus::Succeeded => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        RunStatus::NotStarted => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} ({}/{}) - {}",
        status_icon,
        style(short_id(&summary.run_id)).dim(),
        style(&summary.object_key).bold(),
        format_status(summary.status),
        summary.completed_stages,
        summary.total_stages,
        style(summary.started_at.format("%Y-%m-%d %H:%M:%S")).dim()
    );
    if let (Some(stage), Some(kind)) = (&summary.failed_stage, summary.failure_kind) {
        line.push_str(&format!(" [{} at {}]", style(kind).red(), style(stage).yellow()));
    }
    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> String {
    match event {
        ExecutionEvent::RunStarted {
            run_id,
            pipeline_name,
            object_key,
        } => format!(
            "{} Starting {} for {} ({})",
            ROCKET,
            style(pipeline_name).bold(),
            style(object_key).cyan(),
            style(short_id(run_id)).dim()
        ),
        ExecutionEvent::StageStarted { stage, index, .. } => {
            format!("{} [{}] {}", SPINNER, index + 1, style(stage).cyan())
        }
        ExecutionEvent::StageCompleted { stage, result, .. } => match &result.output_location {
            Some(location) => format!(
                "{} {} → {}",
                CHECK,
                style(stage).green(),
                style(location).dim()
            ),
            None => format!("{} {} ({})", CHECK, style(stage).green(), style(&result.job_id).dim()),
        },
        ExecutionEvent::StageFailed {
            stage, kind, error, ..
        } => format!(
            "{} {} {}: {}",
            CROSS,
            style(stage).red(),
            style(kind).red().bold(),
            style(error).dim()
        ),
        ExecutionEvent::RunCompleted { run_id, status } => format!(
            "{} Run ({}) {}",
            INFO,
            style(short_id(run_id)).dim(),
            format_status(*status)
        ),
    }
}

/// Stage plan of a pipeline, one line per stage
pub fn format_stage_plan(definition: &PipelineDefinition) -> Vec<String> {
    definition
        .stages()
        .iter()
        .enumerate()
        .map(|(i, stage)| {
            let polling = match &stage.poll {
                Some(policy) => format!(
                    "poll every {}s, up to {} checks",
                    policy.interval.as_secs(),
                    policy.max_attempts
                ),
                None => "synchronous".to_string(),
            };
            format!(
                "{}. {} ({}) → $.{} [{}]",
                i + 1,
                style(&stage.name).bold(),
                stage.kind(),
                stage.result_key,
                style(polling).dim()
            )
        })
        .collect()
}

/// Final line for a finished run
pub fn format_run_result(report: &RunReport) -> String {
    match report.failure() {
        None => format!(
            "{} {} completed {}",
            CHECK,
            style(report.object_key()).bold(),
            style("successfully").green()
        ),
        Some((index, cause)) => format!(
            "{} {} {} at stage {} ({}): {}",
            CROSS,
            style(report.object_key()).bold(),
            style("failed").red(),
            index + 1,
            style(&cause.stage).yellow(),
            style(cause.kind).red()
        ),
    }
}

/// Stage log line for `history --run-id`
pub fn format_stage_entry(entry: &StageLogEntry) -> String {
    match &entry.outcome {
        StageOutcome::Succeeded => format!("{} {}", CHECK, style(&entry.stage).green()),
        StageOutcome::Failed { kind, error } => format!(
            "{} {} {}: {}",
            CROSS,
            style(&entry.stage).red(),
            style(kind).red(),
            style(error).dim()
        ),
    }
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
