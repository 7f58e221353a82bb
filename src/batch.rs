//! Batch driver that pushes simulated jobs through a limiter.
//!
//! Each job holds a slot for its simulated work, so the report shows how the
//! limiter spaced the job starts out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::cancel::CancelSignal;
use crate::config::BatchConfig;
use crate::error::{Result, TimegateError};
use crate::limiter::{run_guarded_async, SlotLimiter};

/// How a job ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Completed,
    Cancelled,
    Closed,
}

/// Outcome of a single job.
#[derive(Debug, Clone, Serialize)]
pub struct JobOutcome {
    /// 1-based job number
    pub job: usize,
    pub status: JobStatus,
    /// Milliseconds from batch start until the job got its slot
    pub started_ms: Option<u64>,
    /// Milliseconds from batch start until the job finished its work
    pub finished_ms: Option<u64>,
}

/// Outcomes of every job in a batch, in job order.
#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub capacity: usize,
    pub jobs: Vec<JobOutcome>,
    /// Milliseconds from batch start until the last job ended
    pub elapsed_ms: u64,
}

impl BatchReport {
    /// Number of jobs with the given status.
    pub fn count(&self, status: JobStatus) -> usize {
        self.jobs.iter().filter(|j| j.status == status).count()
    }

    /// Start offsets of the jobs that ran, sorted ascending.
    pub fn start_offsets(&self) -> Vec<Duration> {
        let mut offsets: Vec<Duration> = self
            .jobs
            .iter()
            .filter_map(|j| j.started_ms)
            .map(Duration::from_millis)
            .collect();
        offsets.sort();
        offsets
    }
}

/// Run `config.jobs` jobs concurrently through `limiter`.
///
/// Jobs whose acquire is cancelled or hits a closed limiter are reported,
/// not treated as errors. A job task that panics fails the batch.
pub async fn run_batch<L>(
    limiter: Arc<L>,
    config: &BatchConfig,
    cancel: CancelSignal,
) -> Result<BatchReport>
where
    L: SlotLimiter + ?Sized + 'static,
{
    let batch_start = Instant::now();
    info!(
        jobs = config.jobs,
        capacity = limiter.capacity(),
        work_ms = config.work_ms,
        "Starting batch"
    );

    let handles = (1..=config.jobs).map(|job| {
        let limiter = limiter.clone();
        let cancel = cancel.clone();
        let work = job_duration(config.work_ms, config.jitter_ms);
        tokio::spawn(async move { run_job(limiter.as_ref(), job, work, batch_start, cancel).await })
    });

    let mut jobs = Vec::with_capacity(config.jobs);
    for joined in join_all(handles).await {
        jobs.push(joined.map_err(TimegateError::from)?);
    }

    let report = BatchReport {
        capacity: limiter.capacity(),
        jobs,
        elapsed_ms: batch_start.elapsed().as_millis() as u64,
    };
    info!(
        completed = report.count(JobStatus::Completed),
        cancelled = report.count(JobStatus::Cancelled),
        elapsed_ms = report.elapsed_ms,
        "Batch finished"
    );
    Ok(report)
}

async fn run_job<L>(
    limiter: &L,
    job: usize,
    work: Duration,
    batch_start: Instant,
    cancel: CancelSignal,
) -> JobOutcome
where
    L: SlotLimiter + ?Sized,
{
    let ran = run_guarded_async(
        limiter,
        async {
            let started = batch_start.elapsed();
            info!(
                job = job,
                started = %Local::now().format("%S%.3f"),
                offset_ms = started.as_millis() as u64,
                "Job started"
            );
            tokio::time::sleep(work).await;
            (started, batch_start.elapsed())
        },
        cancel,
    )
    .await;

    match ran {
        Ok((started, finished)) => JobOutcome {
            job,
            status: JobStatus::Completed,
            started_ms: Some(started.as_millis() as u64),
            finished_ms: Some(finished.as_millis() as u64),
        },
        Err(e) => {
            debug!(job = job, error = %e, "Job did not run");
            let status = if e.is_cancelled() {
                JobStatus::Cancelled
            } else {
                JobStatus::Closed
            };
            JobOutcome {
                job,
                status,
                started_ms: None,
                finished_ms: None,
            }
        }
    }
}

fn job_duration(work_ms: u64, jitter_ms: u64) -> Duration {
    let jitter = if jitter_ms == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=jitter_ms)
    };
    Duration::from_millis(work_ms + jitter)
}
