use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use timegate::batch::{run_batch, BatchReport};
use timegate::cancel::CancelSource;
use timegate::config::{LimiterMode, TimegateConfig};

/// Run a batch of simulated jobs through a slot limiter.
#[derive(Debug, Parser)]
#[command(name = "timegate", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Limiter flavour
    #[arg(long, value_enum)]
    mode: Option<LimiterMode>,

    /// Maximum number of slots held at once
    #[arg(long)]
    capacity: Option<usize>,

    /// Window between a slot's release and its reuse, in milliseconds
    #[arg(long)]
    window_ms: Option<u64>,

    /// Number of jobs in the batch
    #[arg(long)]
    jobs: Option<usize>,

    /// Simulated work per job, in milliseconds
    #[arg(long)]
    work_ms: Option<u64>,

    /// Random extra work per job, in milliseconds
    #[arg(long)]
    jitter_ms: Option<u64>,

    /// Cancel jobs still waiting after this many milliseconds
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Print the batch report as JSON
    #[arg(long)]
    report_json: bool,
}

impl Args {
    fn apply(&self, config: &mut TimegateConfig) {
        if let Some(mode) = self.mode {
            config.limiter.mode = mode;
        }
        if let Some(capacity) = self.capacity {
            config.limiter.capacity = capacity;
        }
        if let Some(window_ms) = self.window_ms {
            config.limiter.window_ms = window_ms;
        }
        if let Some(jobs) = self.jobs {
            config.batch.jobs = jobs;
        }
        if let Some(work_ms) = self.work_ms {
            config.batch.work_ms = work_ms;
        }
        if let Some(jitter_ms) = self.jitter_ms {
            config.batch.jitter_ms = jitter_ms;
        }
        if self.deadline_ms.is_some() {
            config.batch.deadline_ms = self.deadline_ms;
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_thread_ids(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_thread_ids(true)
            .init();
    }

    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = TimegateConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;
    info!(
        mode = ?config.limiter.mode,
        capacity = config.limiter.capacity,
        window_ms = config.limiter.window_ms,
        "Configuration loaded"
    );

    let limiter = config.limiter.build()?;

    let cancel = CancelSource::new();
    if let Some(deadline_ms) = config.batch.deadline_ms {
        cancel.cancel_after(Duration::from_millis(deadline_ms));
    }

    let signal = cancel.signal();
    let batch = run_batch(limiter.clone(), &config.batch, signal);
    tokio::pin!(batch);

    // Cancel waiting jobs on Ctrl+C but let running ones finish.
    let report = tokio::select! {
        report = &mut batch => report?,
        _ = shutdown_signal() => {
            cancel.cancel();
            batch.await?
        }
    };

    limiter.close();
    print_report(&report, args.report_json)?;

    info!("Timegate stopped");
    Ok(())
}

fn print_report(report: &BatchReport, as_json: bool) -> anyhow::Result<()> {
    if as_json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }

    for job in &report.jobs {
        match (job.started_ms, job.finished_ms) {
            (Some(started), Some(finished)) => println!(
                "Job {:>3} started {:>6} ms, completed {:>6} ms",
                job.job, started, finished
            ),
            _ => println!("Job {:>3} {:?}", job.job, job.status),
        }
    }
    println!(
        "{} jobs through {} slots in {} ms",
        report.jobs.len(),
        report.capacity,
        report.elapsed_ms
    );
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, cancelling waiting jobs");
        }
        _ = terminate => {
            info!("Received SIGTERM, cancelling waiting jobs");
        }
    }
}
