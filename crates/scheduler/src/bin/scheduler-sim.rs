//! scheduler-sim -- drive the frame scheduler with a synthetic mixing workload.
//!
//! Registers a burst of audio, AI and UI tasks with configurable costs,
//! lets the background driver drain them, then prints stats and the most
//! recent traces as JSON.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use mixx_scheduler::{
    Scheduler, SchedulerConfig, SharedTraceLog, Task, TaskError, TaskHandle, TaskPriority,
};

// ── CLI ─────────────────────────────────────────────────────────────

/// Synthetic workload runner for the audio/AI/UI frame scheduler.
#[derive(Parser, Debug)]
#[command(name = "scheduler-sim", version, about)]
struct Cli {
    /// Path to a scheduler TOML config. Defaults plus env overrides when absent.
    #[arg(long, env = "MIXX_SCHEDULER_CONFIG")]
    config: Option<PathBuf>,

    /// Number of audio tasks to register.
    #[arg(long, default_value_t = 32)]
    audio: usize,

    /// Number of AI tasks to register.
    #[arg(long, default_value_t = 6)]
    ai: usize,

    /// Number of UI tasks to register.
    #[arg(long, default_value_t = 40)]
    ui: usize,

    /// Simulated cost of each audio task in milliseconds (blocking).
    #[arg(long, default_value_t = 2)]
    audio_cost_ms: u64,

    /// Simulated cost of each AI task in milliseconds (async).
    #[arg(long, default_value_t = 20)]
    ai_cost_ms: u64,

    /// Simulated cost of each UI task in milliseconds (blocking).
    #[arg(long, default_value_t = 1)]
    ui_cost_ms: u64,

    /// Make every Nth task fail. 0 disables failures.
    #[arg(long, default_value_t = 0)]
    fail_every: usize,

    /// Number of recent traces to include in the report.
    #[arg(long, default_value_t = 20)]
    traces: usize,
}

fn load_config(cli: &Cli) -> anyhow::Result<SchedulerConfig> {
    let config = match &cli.config {
        Some(path) => {
            let cfg = SchedulerConfig::from_file(path)?;
            info!(path = %path.display(), "loaded scheduler config");
            cfg
        }
        None => SchedulerConfig::from_env()?,
    };
    Ok(config)
}

fn should_fail(cli: &Cli, seq: usize) -> bool {
    cli.fail_every > 0 && (seq + 1) % cli.fail_every == 0
}

fn blocking_task(id: String, priority: TaskPriority, cost: Duration, fail: bool) -> Task {
    Task::from_fn(id, priority, move || {
        std::thread::sleep(cost);
        if fail {
            return Err(TaskError::failed("simulated failure"));
        }
        Ok(())
    })
}

fn async_task(id: String, priority: TaskPriority, cost: Duration, fail: bool) -> Task {
    Task::from_future(id, priority, async move {
        tokio::time::sleep(cost).await;
        if fail {
            return Err(TaskError::failed("simulated failure"));
        }
        Ok(())
    })
}

fn register_workload(scheduler: &Scheduler, cli: &Cli) -> anyhow::Result<Vec<TaskHandle>> {
    let mut handles = Vec::with_capacity(cli.audio + cli.ai + cli.ui);
    let mut seq = 0;

    // Interleave tiers so ordering comes from the scheduler, not registration.
    let rounds = cli.audio.max(cli.ai).max(cli.ui);
    for round in 0..rounds {
        if round < cli.ui {
            let task = blocking_task(
                format!("ui-{round}"),
                TaskPriority::Ui,
                Duration::from_millis(cli.ui_cost_ms),
                should_fail(cli, seq),
            );
            handles.push(scheduler.register(task)?);
            seq += 1;
        }
        if round < cli.ai {
            let task = async_task(
                format!("ai-{round}"),
                TaskPriority::Ai,
                Duration::from_millis(cli.ai_cost_ms),
                should_fail(cli, seq),
            );
            handles.push(scheduler.register(task)?);
            seq += 1;
        }
        if round < cli.audio {
            let task = blocking_task(
                format!("audio-{round}"),
                TaskPriority::Audio,
                Duration::from_millis(cli.audio_cost_ms),
                should_fail(cli, seq),
            )
            .on_overrun(|actual, budget| {
                warn!(
                    actual_ms = actual.as_millis() as u64,
                    budget_ms = budget.as_millis() as u64,
                    "audio task overran"
                );
            });
            handles.push(scheduler.register(task)?);
            seq += 1;
        }
    }
    Ok(handles)
}

// ── Main ────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    config.log_summary();

    let trace_log = SharedTraceLog::new(config.trace_capacity);
    let scheduler = Arc::new(Scheduler::new(config).with_trace_mirror(Arc::new(trace_log.clone())));
    let driver = scheduler.spawn_driver();

    let handles = register_workload(&scheduler, &cli)?;
    info!(tasks = handles.len(), "workload registered");

    let results = futures::future::join_all(handles.into_iter().map(TaskHandle::wait)).await;
    let failed = results.iter().filter(|r| r.is_err()).count();
    info!(total = results.len(), failed, "workload drained");

    driver.shutdown().await;

    let report = serde_json::json!({
        "stats": scheduler.get_stats(),
        "pending": scheduler.queue_depths(),
        "mirrored_traces": trace_log.len(),
        "traces": scheduler.get_traces(cli.traces),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
