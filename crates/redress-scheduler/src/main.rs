use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use redress::EngineConfig;
use redress_scheduler::{assemble, log_notifications, SchedulerLoop};
use tracing::info;

/// Grievance escalation sweep daemon
#[derive(Parser, Debug)]
#[command(name = "redress-scheduler")]
#[command(about = "Escalates and auto-closes grievances whose deadlines lapsed")]
struct Args {
    /// Engine config file (TOML)
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Hierarchy file with authorities and rules (overrides REDRESS_HIERARCHY_PATH)
    #[arg(long)]
    hierarchy: Option<PathBuf>,

    /// Seconds between sweeps (overrides REDRESS_SWEEP_INTERVAL_SECS)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Grievances evaluated in parallel per sweep
    #[arg(long)]
    max_concurrency: Option<usize>,

    /// RocksDB state directory (heavy-state builds only)
    #[arg(long)]
    state_path: Option<PathBuf>,

    /// Run a single sweep, print the report as JSON and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

fn load_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    config.apply_env();

    if let Some(path) = &args.hierarchy {
        config.hierarchy_path = path.clone();
    }
    if let Some(secs) = args.interval_secs {
        config.sweep.interval_secs = secs;
    }
    if let Some(n) = args.max_concurrency {
        config.sweep.max_concurrency = n;
    }
    if let Some(path) = &args.state_path {
        config.state_path = Some(path.clone());
    }
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("redress=info".parse()?)
                .add_directive("redress_scheduler=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;
    info!(
        hierarchy = %config.hierarchy_path.display(),
        interval_secs = config.sweep.interval_secs,
        max_concurrency = config.sweep.max_concurrency,
        "Starting redress scheduler"
    );

    let interval = config.sweep.interval();
    let assembly = assemble(config)
        .await
        .context("assembling grievance service")?;
    let scheduler = SchedulerLoop::new(assembly.service.clone(), assembly.clock.clone(), interval);

    if args.once {
        let (report, retry) = scheduler.run_once().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        info!(
            retried = retry.retried,
            succeeded = retry.succeeded,
            "Single sweep complete"
        );
        return Ok(());
    }

    let cancel = scheduler.cancel_token();
    let notifications = tokio::spawn(log_notifications(assembly.bus.subscribe(), cancel.clone()));

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        shutdown.cancel();
    });

    let stats = scheduler.run().await;
    cancel.cancel();
    notifications.await.context("notification logger panicked")?;

    info!(
        sweeps = stats.sweeps,
        transitions = stats.transitions,
        manual = stats.manual_interventions,
        failures = stats.failures,
        dropped = stats.dropped_side_effects,
        "Scheduler exited"
    );
    Ok(())
}
