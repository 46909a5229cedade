// Guardian Aggregator
// Collapses a fan-out group into a single verdict, failing closed

use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::scheduler::{JobResult, JobStatus};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default stall before an inconclusive group is failed. Long enough for
/// a human watching the run to notice something is off, short enough
/// that the run still terminates on its own.
pub const DEFAULT_STALL: Duration = Duration::from_secs(300);

/// What the scheduler reports for a guarded group as a whole
#[derive(Debug, Clone)]
pub enum GroupSignal {
    /// Every job reached a terminal status; results attached
    Completed(Vec<JobResult>),
    /// The group was cancelled before all jobs finished reporting
    Cancelled,
    /// The group never ran at all
    Skipped,
}

/// The guardian's verdict for one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GroupVerdict {
    /// Every job in the group succeeded
    Pass,
    /// At least one job failed or timed out
    Fail,
    /// No job failed, but not every job proved success
    Inconclusive,
}

/// A settled verdict together with what drove it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateOutcome {
    /// Final verdict; never inconclusive after settling
    pub verdict: GroupVerdict,

    /// Job ids that failed or timed out
    pub failed_jobs: Vec<String>,

    /// Job ids that were cancelled or skipped
    pub unproven_jobs: Vec<String>,

    /// Total jobs observed
    pub total_jobs: usize,
}

impl AggregateOutcome {
    pub fn passed(&self) -> bool {
        self.verdict == GroupVerdict::Pass
    }

    /// Human-readable one-line summary
    pub fn summary(&self) -> String {
        match self.verdict {
            GroupVerdict::Pass => format!("all {} jobs passed", self.total_jobs),
            GroupVerdict::Fail if !self.failed_jobs.is_empty() => {
                format!(
                    "{} of {} jobs failed: {}",
                    self.failed_jobs.len(),
                    self.total_jobs,
                    self.failed_jobs.join(", ")
                )
            }
            GroupVerdict::Fail => format!(
                "group did not prove success ({} of {} jobs unproven)",
                self.unproven_jobs.len(),
                self.total_jobs
            ),
            GroupVerdict::Inconclusive => "group outcome inconclusive".to_string(),
        }
    }
}

/// Guards a fan-out group against silently passing.
///
/// A group passes only when every job proved success. Any failure or
/// timeout fails the group immediately. A group that was cancelled or
/// skipped proves nothing, and a group that proves nothing must not look
/// green: the guardian holds such a group open for a bounded stall and
/// then fails it. The stall is deliberate friction, loud in any run that
/// is watching the clock, and it always terminates.
pub struct Guardian {
    stall: Duration,
    event_tx: Option<ProgressSender>,
}

impl Guardian {
    pub fn new() -> Self {
        Self {
            stall: DEFAULT_STALL,
            event_tx: None,
        }
    }

    /// Override the stall applied to inconclusive groups
    pub fn with_stall(mut self, stall: Duration) -> Self {
        self.stall = stall;
        self
    }

    /// Set the progress event sender
    pub fn with_progress(mut self, event_tx: ProgressSender) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Pure classification of a group signal. Deterministic in the
    /// multiset of statuses; result order does not matter.
    pub fn classify(signal: &GroupSignal) -> AggregateOutcome {
        let results = match signal {
            GroupSignal::Completed(results) => results,
            GroupSignal::Cancelled | GroupSignal::Skipped => {
                return AggregateOutcome {
                    verdict: GroupVerdict::Inconclusive,
                    failed_jobs: Vec::new(),
                    unproven_jobs: Vec::new(),
                    total_jobs: 0,
                };
            }
        };

        let failed_jobs: Vec<String> = results
            .iter()
            .filter(|r| r.status.is_failure())
            .map(|r| r.job_id.clone())
            .collect();

        let unproven_jobs: Vec<String> = results
            .iter()
            .filter(|r| matches!(r.status, JobStatus::Cancelled | JobStatus::Skipped))
            .map(|r| r.job_id.clone())
            .collect();

        let verdict = if !failed_jobs.is_empty() {
            GroupVerdict::Fail
        } else if unproven_jobs.is_empty() && !results.is_empty() {
            GroupVerdict::Pass
        } else {
            // Nothing failed, but an empty group or one with cancelled or
            // skipped jobs proves nothing
            GroupVerdict::Inconclusive
        };

        AggregateOutcome {
            verdict,
            failed_jobs,
            unproven_jobs,
            total_jobs: results.len(),
        }
    }

    /// Settle a group signal into a final pass or fail verdict.
    ///
    /// Pass and fail settle immediately. An inconclusive group stalls for
    /// the configured duration and then fails; it never passes and never
    /// hangs forever. Settling is idempotent: the same signal always
    /// yields the same verdict.
    pub async fn settle(&self, stage_name: &str, signal: GroupSignal) -> AggregateOutcome {
        let mut outcome = Self::classify(&signal);
        let mut stalled = false;

        if outcome.verdict == GroupVerdict::Inconclusive {
            warn!(
                stage = stage_name,
                stall_secs = self.stall.as_secs(),
                "group outcome inconclusive, holding before failing"
            );
            self.event_tx.send_event(ExecutionEvent::warning(
                format!(
                    "stage '{}' did not prove success; failing after {}s hold",
                    stage_name,
                    self.stall.as_secs()
                ),
                Some(stage_name.to_string()),
            ));
            tokio::time::sleep(self.stall).await;
            outcome.verdict = GroupVerdict::Fail;
            stalled = true;
        }

        self.event_tx.send_event(ExecutionEvent::GuardianVerdict {
            stage_name: stage_name.to_string(),
            outcome: outcome.clone(),
            stalled,
        });
        outcome
    }
}

impl Default for Guardian {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str, status: JobStatus) -> JobResult {
        JobResult {
            job_id: id.to_string(),
            status,
            duration: Duration::from_millis(10),
            output: String::new(),
            failed_step: None,
        }
    }

    #[test]
    fn test_all_success_passes() {
        let signal = GroupSignal::Completed(vec![
            result("a", JobStatus::Success),
            result("b", JobStatus::Success),
        ]);
        let outcome = Guardian::classify(&signal);
        assert_eq!(outcome.verdict, GroupVerdict::Pass);
        assert!(outcome.passed());
    }

    #[test]
    fn test_single_failure_fails_the_group() {
        let signal = GroupSignal::Completed(vec![
            result("a", JobStatus::Success),
            result("b", JobStatus::Failure),
            result("c", JobStatus::Success),
        ]);
        let outcome = Guardian::classify(&signal);
        assert_eq!(outcome.verdict, GroupVerdict::Fail);
        assert_eq!(outcome.failed_jobs, vec!["b"]);
    }

    #[test]
    fn test_timeout_counts_as_failure() {
        let signal = GroupSignal::Completed(vec![
            result("a", JobStatus::Success),
            result("b", JobStatus::TimedOut),
        ]);
        let outcome = Guardian::classify(&signal);
        assert_eq!(outcome.verdict, GroupVerdict::Fail);
        assert_eq!(outcome.failed_jobs, vec!["b"]);
    }

    #[test]
    fn test_cancelled_jobs_make_group_inconclusive() {
        let signal = GroupSignal::Completed(vec![
            result("a", JobStatus::Success),
            result("b", JobStatus::Cancelled),
        ]);
        let outcome = Guardian::classify(&signal);
        assert_eq!(outcome.verdict, GroupVerdict::Inconclusive);
        assert_eq!(outcome.unproven_jobs, vec!["b"]);
    }

    #[test]
    fn test_failure_outranks_cancelled() {
        // A failure is conclusive even when siblings were cancelled
        let signal = GroupSignal::Completed(vec![
            result("a", JobStatus::Failure),
            result("b", JobStatus::Cancelled),
        ]);
        let outcome = Guardian::classify(&signal);
        assert_eq!(outcome.verdict, GroupVerdict::Fail);
    }

    #[test]
    fn test_cancelled_group_is_inconclusive() {
        let outcome = Guardian::classify(&GroupSignal::Cancelled);
        assert_eq!(outcome.verdict, GroupVerdict::Inconclusive);
    }

    #[test]
    fn test_skipped_group_is_inconclusive() {
        let outcome = Guardian::classify(&GroupSignal::Skipped);
        assert_eq!(outcome.verdict, GroupVerdict::Inconclusive);
    }

    #[test]
    fn test_empty_group_is_inconclusive() {
        let outcome = Guardian::classify(&GroupSignal::Completed(vec![]));
        assert_eq!(outcome.verdict, GroupVerdict::Inconclusive);
    }

    #[test]
    fn test_classify_is_order_independent() {
        let forward = GroupSignal::Completed(vec![
            result("a", JobStatus::Success),
            result("b", JobStatus::Failure),
        ]);
        let reversed = GroupSignal::Completed(vec![
            result("b", JobStatus::Failure),
            result("a", JobStatus::Success),
        ]);
        assert_eq!(
            Guardian::classify(&forward).verdict,
            Guardian::classify(&reversed).verdict
        );
    }

    #[tokio::test]
    async fn test_pass_settles_immediately() {
        let guardian = Guardian::new().with_stall(Duration::from_secs(60));
        let signal = GroupSignal::Completed(vec![result("a", JobStatus::Success)]);

        let start = std::time::Instant::now();
        let outcome = guardian.settle("test", signal).await;
        assert_eq!(outcome.verdict, GroupVerdict::Pass);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_inconclusive_group_stalls_then_fails() {
        let guardian = Guardian::new().with_stall(Duration::from_millis(50));

        let start = std::time::Instant::now();
        let outcome = guardian.settle("test", GroupSignal::Cancelled).await;
        assert_eq!(outcome.verdict, GroupVerdict::Fail);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_settle_is_idempotent() {
        let guardian = Guardian::new().with_stall(Duration::from_millis(10));
        let results = vec![result("a", JobStatus::Skipped)];

        let first = guardian
            .settle("test", GroupSignal::Completed(results.clone()))
            .await;
        let second = guardian
            .settle("test", GroupSignal::Completed(results))
            .await;
        assert_eq!(first.verdict, second.verdict);
        assert_eq!(first.verdict, GroupVerdict::Fail);
    }
}
