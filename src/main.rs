use anyhow::{Context, Result};
use mlops_pipeline::cli::commands::{HistoryCommand, RunCommand, ValidateCommand};
use mlops_pipeline::cli::output::*;
use mlops_pipeline::cli::{Cli, Command};
use mlops_pipeline::core::{PipelineConfig, PipelineDefinition};
use mlops_pipeline::execution::{
    EventTrigger, ExecutionEvent, PipelineRunner, StorageEvent, TriggerRule,
};
use mlops_pipeline::persistence::{InMemoryRunLog, RunLog, RunSummary};
use mlops_pipeline::{JobBackends, SimulatedBackend};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    // Execute command
    match &cli.command {
        Command::Run(cmd) => run_pipeline(cmd).await?,
        Command::Validate(cmd) => validate_pipeline(cmd)?,
        Command::History(cmd) => show_history(cmd).await?,
    }

    Ok(())
}

#[cfg(feature = "sqlite")]
async fn open_history() -> Result<Arc<dyn RunLog>> {
    let store = mlops_pipeline::persistence::SqliteRunLog::with_default_path()
        .await
        .context("Failed to open run history")?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "sqlite"))]
async fn open_history() -> Result<Arc<dyn RunLog>> {
    anyhow::bail!("Run history needs the `sqlite` feature")
}

async fn run_pipeline(cmd: &RunCommand) -> Result<()> {
    // Load pipeline config
    let config = PipelineConfig::from_file(&cmd.file).context("Failed to load pipeline config")?;

    println!("{} Loaded pipeline: {}", INFO, style(&config.name).bold());

    let mut definition = PipelineDefinition::from_config(&config);
    if let Some(ms) = cmd.poll_interval_ms {
        definition = definition.with_poll_interval(Duration::from_millis(ms.max(1)));
    }
    let total_stages = definition.len();

    // Collect the storage events to replay
    let mut events: Vec<StorageEvent> = cmd
        .key
        .iter()
        .map(|key| StorageEvent::object_created(config.bucket.clone(), key.clone()))
        .collect();
    if let Some(path) = &cmd.event {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read event file {}", path))?;
        events.extend(StorageEvent::from_s3_notification(&raw)?);
    }

    let run_log: Arc<dyn RunLog> = if cmd.no_history {
        Arc::new(InMemoryRunLog::new())
    } else {
        open_history().await?
    };

    let progress = create_progress_bar(0);
    let printer = progress.clone();
    let runner = PipelineRunner::new(
        definition,
        JobBackends::simulated(SimulatedBackend::new(cmd.pending_checks)),
    )
    .with_run_log(run_log)
    .with_event_handler(move |event| {
        if matches!(
            event,
            ExecutionEvent::StageCompleted { .. } | ExecutionEvent::StageFailed { .. }
        ) {
            printer.inc(1);
        }
        printer.println(format_execution_event(&event));
    });

    let trigger = EventTrigger::new(TriggerRule::from(&config.trigger), Arc::new(runner))
        .scoped_to(config.bucket.clone());

    let (tx, rx) = mpsc::channel(events.len().max(1));
    let mut accepted = 0;
    for event in events {
        if trigger.accepts(&event) {
            accepted += 1;
        } else {
            println!(
                "{} Skipping {} (no trigger match)",
                WARN,
                style(format!("{}/{}", event.bucket, event.key)).dim()
            );
        }
        tx.send(event)
            .await
            .map_err(|_| anyhow::anyhow!("Trigger channel closed"))?;
    }
    drop(tx);

    if accepted == 0 {
        progress.finish_and_clear();
        println!("{} No events matched the trigger", INFO);
        return Ok(());
    }

    progress.set_length((accepted * total_stages) as u64);
    let reports = trigger.watch(rx).await;
    progress.finish_and_clear();

    println!();
    for report in &reports {
        println!("{}", format_run_result(report));
    }

    if !cmd.no_history {
        println!("\n{} Runs saved to history", INFO);
    }

    let failed = reports.iter().filter(|r| !r.succeeded()).count();
    if failed > 0 || reports.len() < accepted {
        std::process::exit(1);
    }

    Ok(())
}

fn validate_pipeline(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating pipeline...", INFO);

    let result = PipelineConfig::from_file(&cmd.file);

    match result {
        Ok(config) => {
            let definition = PipelineDefinition::from_config(&config);

            println!("{} Pipeline configuration is valid!", CHECK);
            println!("  Name: {}", style(&config.name).bold());
            println!("  Bucket: {}", style(&config.bucket).cyan());
            println!(
                "  Trigger: {}*{}",
                style(&config.trigger.prefix).cyan(),
                style(&config.trigger.suffix).cyan()
            );
            if let Some(image) = config.resolved_image() {
                println!("  Image: {}", style(image).dim());
            }
            println!("  Stages:");
            for line in format_stage_plan(&definition) {
                println!("    {}", line);
            }

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_history().await?;

    // If specific run ID is requested
    if let Some(run_id) = &cmd.run_id {
        let run_id = uuid::Uuid::parse_str(run_id).context("Invalid run ID format")?;

        match store.load_run(run_id).await? {
            Some(summary) => {
                let entries = store.stage_entries(run_id).await?;
                if cmd.json {
                    let data = serde_json::json!({ "run": summary, "stages": entries });
                    println!("{}", serde_json::to_string_pretty(&data)?);
                } else {
                    print_run_details(&summary);
                    for entry in &entries {
                        println!("    {}", format_stage_entry(entry));
                    }
                }
            }
            None => {
                println!("{} Run not found", WARN);
            }
        }
        return Ok(());
    }

    let runs = store.list_runs(cmd.limit).await?;

    if runs.is_empty() {
        println!("{} No runs found", INFO);
        return Ok(());
    }

    if cmd.json {
        let data = serde_json::json!({ "runs": runs });
        println!("{}", serde_json::to_string_pretty(&data)?);
    } else {
        println!("{} Run history (showing latest {}):", INFO, cmd.limit);
        for summary in &runs {
            println!("  {}", format_run_summary(summary));
        }
    }

    Ok(())
}

fn print_run_details(summary: &RunSummary) {
    println!("{} Run Details", INFO);
    println!("  ID: {}", style(summary.run_id).cyan());
    println!("  Pipeline: {}", style(&summary.pipeline_name).bold());
    println!("  Object: {}", style(&summary.object_key).bold());
    println!("  Resource name: {}", style(&summary.resource_name).dim());
    println!("  Status: {}", format_status(summary.status));
    println!("  Started: {}", style(summary.started_at.to_rfc3339()).dim());
    if let Some(completed) = summary.completed_at {
        println!("  Completed: {}", style(completed.to_rfc3339()).dim());
        if let Ok(duration) = completed.signed_duration_since(summary.started_at).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }
    if let (Some(stage), Some(kind)) = (&summary.failed_stage, summary.failure_kind) {
        println!("  Failed at: {} ({})", style(stage).yellow(), style(kind).red());
    }
    if let Some(error) = &summary.error {
        println!("  Error: {}", style(error).red());
    }
    println!(
        "  Progress: {} ({}/{})",
        style(format!("{:.0}%", summary.progress() * 100.0)).cyan(),
        summary.completed_stages,
        summary.total_stages
    );
    println!("  Stages:");
}
