mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use coordinator_core::{Coordinator, CoordinatorConfig, Handler, ListFilter, WorkState, WorkUnit};

use config::ScenarioFile;

#[derive(Parser)]
#[command(name = "coordinator", about = "Demo driver for the in-process work coordinator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a sample scenario file (no coordinator required)
    Init {
        /// Where to write the scenario (defaults to the XDG config path)
        path: Option<PathBuf>,
        /// Overwrite an existing scenario file
        #[arg(long)]
        force: bool,
    },
    /// Run a scenario: register services/tasks, submit a burst of work,
    /// and print the event stream until it drains
    Run {
        /// Scenario file to run (defaults to the XDG config path)
        path: Option<PathBuf>,
    },
}

fn cmd_init(path: Option<PathBuf>, force: bool) -> Result<()> {
    let path = path.unwrap_or_else(config::default_scenario_path);

    if path.exists() && !force {
        anyhow::bail!("scenario file already exists at {}\nUse --force to overwrite.", path.display());
    }

    config::save_scenario(&path, &config::sample_scenario())?;

    println!("Scenario written to {}", path.display());
    println!("Next: run `coordinator run {}`", path.display());
    Ok(())
}

/// Build a synthetic handler: sleeps for `duration_ms`, then fails with
/// probability `fail_rate`. Stands in for whatever a real caller's
/// service-backed handler would do.
fn simulated_handler(duration_ms: u64, fail_rate: f64) -> Handler {
    let duration = Duration::from_millis(duration_ms);
    Handler::sync(move |work| {
        std::thread::sleep(duration);
        if rand::random::<f64>() < fail_rate {
            anyhow::bail!("simulated failure for task {}", work.task);
        }
        Ok(serde_json::json!({ "work_id": work.id.to_string(), "echo": work.params }))
    })
}

fn install_event_log(coordinator: &Coordinator) -> Result<()> {
    coordinator
        .set_on_start(Arc::new(|w: &WorkUnit| {
            println!("[start]    {} ({})", w.id, w.task);
        }))
        .context("on_start already registered")?;
    coordinator
        .set_on_complete(Arc::new(|w: &WorkUnit, result: &serde_json::Value, duration_secs: f64| {
            println!("[complete] {} ({}) in {duration_secs:.3}s -> {result}", w.id, w.task);
        }))
        .context("on_complete already registered")?;
    coordinator
        .set_on_failure(Arc::new(|w: &WorkUnit, error: &str| {
            println!("[failure]  {} ({}) attempt {} -> {error}", w.id, w.task, w.attempt);
        }))
        .context("on_failure already registered")?;
    coordinator
        .set_on_skip(Arc::new(|w: &WorkUnit| {
            println!("[skip]     {} ({})", w.id, w.task);
        }))
        .context("on_skip already registered")?;
    Ok(())
}

async fn cmd_run(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(config::default_scenario_path);
    let scenario: ScenarioFile = config::load_scenario(&path)?;

    let coordinator = Coordinator::new(CoordinatorConfig::default());
    install_event_log(&coordinator)?;

    for service in &scenario.service {
        coordinator
            .register_service(&service.name, service.concurrent, service.rate.as_deref())
            .with_context(|| format!("failed to register service {:?}", service.name))?;
    }
    for task in &scenario.task {
        coordinator
            .register_task(
                &task.name,
                &task.service,
                task.max_attempts,
                simulated_handler(task.duration_ms, task.fail_rate),
            )
            .with_context(|| format!("failed to register task {:?}", task.name))?;
    }

    coordinator.start().await;

    let mut submitted = 0u32;
    for submit in &scenario.submit {
        for _ in 0..submit.count {
            coordinator
                .submit(&submit.task, serde_json::json!({}))
                .with_context(|| format!("failed to submit task {:?}", submit.task))?;
            submitted += 1;
        }
    }
    println!("Submitted {submitted} unit(s). Waiting for the scenario to drain...\n");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(scenario.stop_after_secs);
    loop {
        let progress = coordinator.progress();
        if progress.pending == 0 && progress.running == 0 {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            println!("\nTimed out waiting for drain; remaining work is shown below.");
            for blocked in coordinator.debug_blocked() {
                println!("  blocked: {} ({}) - {}", blocked.id, blocked.task, blocked.reason);
            }
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    print_summary(&coordinator);
    coordinator.stop(Some(Duration::from_secs(10))).await;
    Ok(())
}

fn print_summary(coordinator: &Coordinator) {
    let progress = coordinator.progress();
    println!(
        "\npending={} running={} completed={} failed={} cancelled={}",
        progress.pending, progress.running, progress.completed, progress.failed, progress.cancelled
    );

    let failed = coordinator.list(ListFilter { state: Some(WorkState::Failed), task: None });
    if !failed.is_empty() {
        println!("\nFailed units:");
        for unit in failed {
            println!("  {} ({}) - {}", unit.id, unit.task, unit.error.unwrap_or_default());
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { path, force } => cmd_init(path, force)?,
        Commands::Run { path } => cmd_run(path).await?,
    }

    Ok(())
}
