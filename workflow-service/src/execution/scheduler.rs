// Fan-out Scheduler
// Runs a matrix group's jobs concurrently with timeout and fail-fast

use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::matrix::JobConfig;
use crate::runners::{JobRunner, RunContext, RunOutcome};

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

/// Terminal status of one fan-out job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    /// All fatal steps exited zero
    Success,
    /// A fatal step exited non-zero
    Failure,
    /// Cut short by fail-fast after a sibling failed
    Cancelled,
    /// Never started (gate closed or group abandoned)
    Skipped,
    /// Exceeded its wall-clock limit
    TimedOut,
}

impl JobStatus {
    /// True for statuses that prove the job's work completed and passed.
    pub fn is_success(&self) -> bool {
        matches!(self, JobStatus::Success)
    }

    /// True for statuses that prove the job's work failed.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobStatus::Failure | JobStatus::TimedOut)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Success => "success",
            JobStatus::Failure => "failure",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Skipped => "skipped",
            JobStatus::TimedOut => "timed-out",
        };
        write!(f, "{}", s)
    }
}

/// Result of one job in a fan-out group
#[derive(Debug, Clone)]
pub struct JobResult {
    /// Stable job identifier derived from its matrix values
    pub job_id: String,

    /// Terminal status
    pub status: JobStatus,

    /// Wall-clock time from launch to terminal status
    pub duration: Duration,

    /// Captured runner output (empty for cancelled/skipped jobs)
    pub output: String,

    /// Step that failed the job, when the status is failure
    pub failed_step: Option<String>,
}

impl JobResult {
    fn from_outcome(job_id: String, outcome: RunOutcome, duration: Duration) -> Self {
        let status = if outcome.success() {
            JobStatus::Success
        } else {
            JobStatus::Failure
        };
        Self {
            job_id,
            status,
            duration,
            output: outcome.output,
            failed_step: outcome.failed_step,
        }
    }

    fn terminal(job_id: String, status: JobStatus, duration: Duration) -> Self {
        Self {
            job_id,
            status,
            duration,
            output: String::new(),
            failed_step: None,
        }
    }
}

/// Knobs for one fan-out group, taken from the stage configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Cancel the remaining jobs after the first failure or timeout
    pub fail_fast: bool,

    /// Per-job wall-clock limit
    pub timeout: Option<Duration>,

    /// Upper bound on concurrently running jobs
    pub max_parallel: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fail_fast: true,
            timeout: None,
            max_parallel: None,
        }
    }
}

/// Launches every job of a group concurrently and collects a result for
/// each one. The group is a flat set: no job depends on another, and
/// completion order carries no meaning.
///
/// Timeouts are independent per job; a slow job never stalls its
/// siblings. With fail-fast on, the first failure or timeout broadcasts
/// cancellation and still-running jobs land as cancelled, but every job
/// still reports exactly one terminal result.
pub struct FanoutScheduler {
    config: SchedulerConfig,
    event_tx: Option<ProgressSender>,
}

impl FanoutScheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            event_tx: None,
        }
    }

    /// Set the progress event sender
    pub fn with_progress(mut self, event_tx: ProgressSender) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Run a fan-out group to completion and return one result per job.
    ///
    /// Results arrive in completion order; callers correlate by `job_id`.
    pub async fn run_group(
        &self,
        stage_name: &str,
        configs: Vec<JobConfig>,
        runner: Arc<dyn JobRunner>,
        ctx: Arc<RunContext>,
    ) -> Vec<JobResult> {
        let total = configs.len();
        if total == 0 {
            return Vec::new();
        }

        let permits = self.config.max_parallel.unwrap_or(total).max(1);
        let semaphore = Arc::new(Semaphore::new(permits));
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (result_tx, mut result_rx) = mpsc::unbounded_channel::<JobResult>();

        for config in configs {
            let runner = Arc::clone(&runner);
            let ctx = Arc::clone(&ctx);
            let semaphore = Arc::clone(&semaphore);
            let cancel_rx = cancel_rx.clone();
            let result_tx = result_tx.clone();
            let event_tx = self.event_tx.clone();
            let stage = stage_name.to_string();
            let timeout = self.config.timeout;

            tokio::spawn(async move {
                let result = Self::run_job(
                    config, runner, ctx, semaphore, cancel_rx, event_tx, &stage, timeout,
                )
                .await;
                let _ = result_tx.send(result);
            });
        }
        drop(result_tx);

        let mut results = Vec::with_capacity(total);
        while let Some(result) = result_rx.recv().await {
            if self.config.fail_fast && result.status.is_failure() {
                // First failure cancels the rest of the group
                if !*cancel_tx.borrow() {
                    warn!(
                        stage = stage_name,
                        job = %result.job_id,
                        status = %result.status,
                        "job failed, cancelling remaining jobs"
                    );
                    let _ = cancel_tx.send(true);
                }
            }
            results.push(result);
        }

        debug!(
            stage = stage_name,
            jobs = results.len(),
            "fan-out group complete"
        );
        results
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_job(
        config: JobConfig,
        runner: Arc<dyn JobRunner>,
        ctx: Arc<RunContext>,
        semaphore: Arc<Semaphore>,
        mut cancel_rx: watch::Receiver<bool>,
        event_tx: Option<ProgressSender>,
        stage: &str,
        timeout: Option<Duration>,
    ) -> JobResult {
        let job_id = config.id().to_string();
        let start = Instant::now();

        // A job cancelled while queued behind the parallelism limit never ran
        let _permit = tokio::select! {
            _ = wait_cancelled(&mut cancel_rx) => {
                return JobResult::terminal(job_id, JobStatus::Cancelled, start.elapsed());
            }
            permit = semaphore.acquire_owned() => match permit {
                Ok(permit) => permit,
                // Semaphore closed: the group is being torn down
                Err(_) => {
                    return JobResult::terminal(job_id, JobStatus::Cancelled, start.elapsed());
                }
            },
        };

        event_tx.send_event(ExecutionEvent::job_started(stage, job_id.clone()));
        let start = Instant::now();

        let result = tokio::select! {
            _ = wait_cancelled(&mut cancel_rx) => {
                JobResult::terminal(job_id, JobStatus::Cancelled, start.elapsed())
            }
            outcome = run_with_timeout(runner.as_ref(), &config, &ctx, timeout) => {
                match outcome {
                    Some(outcome) => JobResult::from_outcome(job_id, outcome, start.elapsed()),
                    None => JobResult::terminal(job_id, JobStatus::TimedOut, start.elapsed()),
                }
            }
        };

        event_tx.send_event(ExecutionEvent::JobCompleted {
            stage_name: stage.to_string(),
            job_id: result.job_id.clone(),
            status: result.status,
            duration: result.duration,
            failed_step: result.failed_step.clone(),
            output: result.output.clone(),
        });
        result
    }
}

/// Run the job, returning `None` when the wall-clock limit elapses first.
async fn run_with_timeout(
    runner: &dyn JobRunner,
    config: &JobConfig,
    ctx: &RunContext,
    timeout: Option<Duration>,
) -> Option<RunOutcome> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, runner.run(config, ctx))
            .await
            .ok(),
        None => Some(runner.run(config, ctx).await),
    }
}

/// Resolves when the group's cancellation flag flips to true. If the
/// sender side goes away without cancelling, this never resolves.
async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
