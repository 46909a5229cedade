// Workflow Executor
// Orchestrates stage execution: gate, fan-out, guardian verdict

use crate::execution::events::{EventSender, ExecutionEvent, ProgressSender};
use crate::execution::gate::{EnvProbe, SecretGate, SecretProbe};
use crate::execution::guardian::{GroupSignal, Guardian, DEFAULT_STALL};
use crate::execution::matrix::{JobConfig, MatrixExpander};
use crate::execution::scheduler::{FanoutScheduler, JobResult, SchedulerConfig};
use crate::runners::{JobRunner, RunContext, ShellRunner};
use crate::workflow::models::{StageConfig, TriggerEvent, Workflow};
use crate::ServiceError;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Final status of one stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    /// Every job passed (or the guardian ruled pass)
    Success,
    /// A job failed, timed out, or the guardian failed the group
    Failed,
    /// The stage never ran (gate closed or trigger mismatch)
    Skipped,
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            StageStatus::Success => "success",
            StageStatus::Failed => "failed",
            StageStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Result of one stage's execution
#[derive(Debug, Clone)]
pub struct StageResult {
    /// Stage name
    pub name: String,
    /// Final status
    pub status: StageStatus,
    /// One result per fan-out job (empty for skipped stages)
    pub jobs: Vec<JobResult>,
    /// Skip reason, when skipped
    pub skip_reason: Option<String>,
    /// Stage wall-clock duration
    pub duration: Duration,
}

impl StageResult {
    fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StageStatus::Skipped,
            jobs: Vec::new(),
            skip_reason: Some(reason.into()),
            duration: Duration::ZERO,
        }
    }
}

/// Result of a full workflow execution
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// All stage results, in workflow order
    pub stages: Vec<StageResult>,
    /// Total duration
    pub duration: Duration,
    /// Overall success: no stage failed
    pub success: bool,
}

impl ExecutionResult {
    /// Count stages by status
    pub fn counts(&self) -> (usize, usize, usize) {
        let mut succeeded = 0;
        let mut failed = 0;
        let mut skipped = 0;
        for stage in &self.stages {
            match stage.status {
                StageStatus::Success => succeeded += 1,
                StageStatus::Failed => failed += 1,
                StageStatus::Skipped => skipped += 1,
            }
        }
        (succeeded, failed, skipped)
    }
}

/// Configuration for workflow execution
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Working directory for job steps
    pub working_dir: PathBuf,
    /// Stop executing stages after the first stage failure
    pub stop_on_stage_failure: bool,
    /// Stall applied to inconclusive guarded groups before failing them
    pub guardian_stall: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("."),
            stop_on_stage_failure: true,
            guardian_stall: DEFAULT_STALL,
        }
    }
}

/// Workflow executor.
///
/// Runs stages in declaration order. Each stage is gated on its required
/// credentials, expanded into a fan-out group, scheduled concurrently,
/// and, when marked guarded, settled by the guardian so that a group
/// that proved nothing cannot read as green.
pub struct WorkflowExecutor {
    config: ExecutorConfig,
    event_tx: Option<ProgressSender>,
    runner: Arc<dyn JobRunner>,
    probe: Box<dyn SecretProbe + Send + Sync>,
}

impl WorkflowExecutor {
    pub fn new() -> Self {
        Self {
            config: ExecutorConfig::default(),
            event_tx: None,
            runner: Arc::new(ShellRunner::new()),
            probe: Box::new(EnvProbe),
        }
    }

    /// Set executor configuration
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the progress event sender
    pub fn with_progress(mut self, event_tx: ProgressSender) -> Self {
        self.event_tx = Some(event_tx);
        self
    }

    /// Replace the job runner
    pub fn with_runner(mut self, runner: Arc<dyn JobRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Replace the credential probe
    pub fn with_probe(mut self, probe: Box<dyn SecretProbe + Send + Sync>) -> Self {
        self.probe = probe;
        self
    }

    /// Execute a workflow for a triggering event.
    #[instrument(skip_all, fields(workflow = %workflow.display_name()))]
    pub async fn execute(
        &self,
        workflow: &Workflow,
        event: &TriggerEvent,
    ) -> Result<ExecutionResult, ServiceError> {
        let start = Instant::now();

        if !workflow.on.matches(event) {
            return Err(ServiceError::TriggerMismatch {
                workflow: workflow.display_name().to_string(),
                event: event.kind.clone(),
            });
        }

        self.event_tx.send_event(ExecutionEvent::workflow_started(
            workflow.display_name(),
            workflow.stages.len(),
        ));
        info!(stages = workflow.stages.len(), "workflow started");

        let mut stages = Vec::with_capacity(workflow.stages.len());
        let mut failed = false;

        for stage in &workflow.stages {
            if failed && self.config.stop_on_stage_failure {
                self.event_tx.send_event(ExecutionEvent::StageSkipped {
                    stage_name: stage.name.clone(),
                    reason: "earlier stage failed".to_string(),
                });
                stages.push(StageResult::skipped(&stage.name, "earlier stage failed"));
                continue;
            }

            let result = self.execute_stage(workflow, stage).await?;
            if result.status == StageStatus::Failed {
                failed = true;
            }
            stages.push(result);
        }

        let result = ExecutionResult {
            stages,
            duration: start.elapsed(),
            success: !failed,
        };
        self.event_tx.send_event(ExecutionEvent::workflow_completed(
            workflow.display_name(),
            result.success,
            result.duration,
        ));
        info!(
            success = result.success,
            duration_ms = result.duration.as_millis() as u64,
            "workflow finished"
        );
        Ok(result)
    }

    #[instrument(skip_all, fields(stage = %stage.name))]
    async fn execute_stage(
        &self,
        workflow: &Workflow,
        stage: &StageConfig,
    ) -> Result<StageResult, ServiceError> {
        let start = Instant::now();

        // Gate first: an unavailable credential set skips the stage, it
        // never errors
        let decision = SecretGate::evaluate(&stage.name, &stage.secrets, self.probe.as_ref());
        self.event_tx.send_event(ExecutionEvent::GateEvaluated {
            stage_name: stage.name.clone(),
            available: decision.available,
            missing: decision.missing.clone(),
        });

        if !decision.available {
            info!(missing = ?decision.missing, "stage skipped by secret gate");
            let reason = decision.reason();
            self.event_tx.send_event(ExecutionEvent::StageSkipped {
                stage_name: stage.name.clone(),
                reason: reason.clone(),
            });

            if stage.guarded {
                // A guarded stage that never ran must not read as green;
                // the guardian stalls, then fails it
                let guardian = self.guardian();
                let outcome = guardian.settle(&stage.name, GroupSignal::Skipped).await;
                let status = if outcome.passed() {
                    StageStatus::Success
                } else {
                    StageStatus::Failed
                };
                let mut result = StageResult::skipped(&stage.name, reason);
                result.status = status;
                result.duration = start.elapsed();
                return Ok(result);
            }
            return Ok(StageResult::skipped(&stage.name, reason));
        }

        let configs = self.expand_stage(stage)?;
        self.event_tx.send_event(ExecutionEvent::stage_started(
            stage.name.clone(),
            configs.len(),
        ));
        info!(jobs = configs.len(), "stage fan-out started");

        let ctx = Arc::new(self.stage_context(workflow, stage));
        let scheduler = self.scheduler(stage);
        let results = scheduler
            .run_group(&stage.name, configs, Arc::clone(&self.runner), ctx)
            .await;

        let status = if stage.guarded {
            let guardian = self.guardian();
            let outcome = guardian
                .settle(&stage.name, GroupSignal::Completed(results.clone()))
                .await;
            info!(verdict = ?outcome.verdict, "guardian settled stage");
            if outcome.passed() {
                StageStatus::Success
            } else {
                StageStatus::Failed
            }
        } else if results.iter().all(|r| r.status.is_success()) {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };

        let result = StageResult {
            name: stage.name.clone(),
            status,
            jobs: results,
            skip_reason: None,
            duration: start.elapsed(),
        };
        self.event_tx.send_event(ExecutionEvent::stage_completed(
            stage.name.clone(),
            result.status,
            result.duration,
        ));
        Ok(result)
    }

    /// Expand a stage into its fan-out group. A stage without a matrix is
    /// a group of one.
    fn expand_stage(&self, stage: &StageConfig) -> Result<Vec<JobConfig>, ServiceError> {
        match &stage.matrix {
            Some(spec) => Ok(MatrixExpander::expand(spec)?),
            None => Ok(vec![JobConfig::from_values(BTreeMap::new())]),
        }
    }

    fn stage_context(&self, workflow: &Workflow, stage: &StageConfig) -> RunContext {
        let mut env: HashMap<String, String> = workflow.env.clone();
        env.extend(stage.env.clone());
        env.extend(SecretGate::collect(&stage.secrets, self.probe.as_ref()));
        RunContext::new(stage.steps.clone(), self.config.working_dir.clone()).with_env(env)
    }

    fn scheduler(&self, stage: &StageConfig) -> FanoutScheduler {
        let config = SchedulerConfig {
            fail_fast: stage.fail_fast,
            timeout: stage
                .timeout_minutes
                .map(|m| Duration::from_secs(u64::from(m) * 60)),
            max_parallel: stage.max_parallel.map(|n| n as usize),
        };
        let mut scheduler = FanoutScheduler::new(config);
        if let Some(tx) = &self.event_tx {
            scheduler = scheduler.with_progress(tx.clone());
        }
        scheduler
    }

    fn guardian(&self) -> Guardian {
        let mut guardian = Guardian::new().with_stall(self.config.guardian_stall);
        if let Some(tx) = &self.event_tx {
            guardian = guardian.with_progress(tx.clone());
        }
        guardian
    }
}

impl Default for WorkflowExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::scheduler::JobStatus;
    use crate::runners::RunOutcome;
    use crate::workflow::models::{StepConfig, Trigger};

    use async_trait::async_trait;

    /// Runner that passes or fails based on a matrix axis value.
    struct AxisRunner;

    #[async_trait]
    impl JobRunner for AxisRunner {
        async fn run(&self, config: &JobConfig, _ctx: &RunContext) -> RunOutcome {
            let exit_code = if config.get("outcome") == Some("fail") {
                1
            } else {
                0
            };
            RunOutcome {
                exit_code,
                output: String::new(),
                failed_step: None,
            }
        }
    }

    fn workflow(stages: Vec<StageConfig>) -> Workflow {
        Workflow {
            name: Some("ci".to_string()),
            on: Trigger::Single("push".to_string()),
            env: HashMap::new(),
            stages,
        }
    }

    fn stage(name: &str, matrix_yaml: Option<&str>) -> StageConfig {
        StageConfig {
            name: name.to_string(),
            matrix: matrix_yaml.map(|y| serde_yaml::from_str(y).unwrap()),
            fail_fast: true,
            max_parallel: None,
            timeout_minutes: None,
            secrets: Vec::new(),
            guarded: false,
            env: HashMap::new(),
            steps: vec![StepConfig {
                name: None,
                run: "true".to_string(),
                env: HashMap::new(),
                continue_on_error: false,
            }],
        }
    }

    fn executor() -> WorkflowExecutor {
        WorkflowExecutor::new()
            .with_runner(Arc::new(AxisRunner))
            .with_probe(Box::new(HashMap::<String, String>::new()))
            .with_config(ExecutorConfig {
                guardian_stall: Duration::from_millis(20),
                ..Default::default()
            })
    }

    #[tokio::test]
    async fn test_trigger_mismatch_is_an_error() {
        let wf = workflow(vec![stage("build", None)]);
        let result = executor()
            .execute(&wf, &TriggerEvent::schedule())
            .await;
        assert!(matches!(result, Err(ServiceError::TriggerMismatch { .. })));
    }

    #[tokio::test]
    async fn test_matrix_stage_fans_out() {
        let wf = workflow(vec![stage(
            "test",
            Some("axes:\n  - name: outcome\n    values: [pass]\n  - name: os\n    values: [linux, macos]"),
        )]);
        let result = executor().execute(&wf, &TriggerEvent::push("main")).await.unwrap();

        assert!(result.success);
        assert_eq!(result.stages[0].jobs.len(), 2);
    }

    #[tokio::test]
    async fn test_failing_job_fails_the_stage() {
        let wf = workflow(vec![stage(
            "test",
            Some("axes:\n  - name: outcome\n    values: [pass, fail]"),
        )]);
        let result = executor().execute(&wf, &TriggerEvent::push("main")).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.stages[0].status, StageStatus::Failed);
    }

    #[tokio::test]
    async fn test_stage_failure_skips_later_stages() {
        let wf = workflow(vec![
            stage("first", Some("axes:\n  - name: outcome\n    values: [fail]")),
            stage("second", None),
        ]);
        let result = executor().execute(&wf, &TriggerEvent::push("main")).await.unwrap();

        assert_eq!(result.stages[1].status, StageStatus::Skipped);
        assert_eq!(
            result.stages[1].skip_reason.as_deref(),
            Some("earlier stage failed")
        );
    }

    #[tokio::test]
    async fn test_gated_stage_skips_without_credentials() {
        let mut gated = stage("cloud", None);
        gated.secrets = vec!["LIT_API_KEY".to_string()];
        let wf = workflow(vec![gated]);

        let result = executor().execute(&wf, &TriggerEvent::push("main")).await.unwrap();

        assert!(result.success);
        assert_eq!(result.stages[0].status, StageStatus::Skipped);
    }

    #[tokio::test]
    async fn test_guarded_gated_stage_fails_instead_of_skipping() {
        let mut gated = stage("cloud", None);
        gated.secrets = vec!["LIT_API_KEY".to_string()];
        gated.guarded = true;
        let wf = workflow(vec![gated]);

        let result = executor().execute(&wf, &TriggerEvent::push("main")).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.stages[0].status, StageStatus::Failed);
    }

    #[tokio::test]
    async fn test_guarded_stage_with_all_success_passes() {
        let mut guarded = stage("test", Some("axes:\n  - name: outcome\n    values: [pass]"));
        guarded.guarded = true;
        let wf = workflow(vec![guarded]);

        let result = executor().execute(&wf, &TriggerEvent::push("main")).await.unwrap();

        // All jobs succeeded, so the guardian passes the group
        assert!(result.success);
        assert!(result.stages[0]
            .jobs
            .iter()
            .all(|j| j.status == JobStatus::Success));
    }

    #[tokio::test]
    async fn test_stage_without_matrix_runs_one_job() {
        let wf = workflow(vec![stage("build", None)]);
        let result = executor().execute(&wf, &TriggerEvent::push("main")).await.unwrap();

        assert_eq!(result.stages[0].jobs.len(), 1);
        assert_eq!(result.stages[0].jobs[0].job_id, "default");
    }

    #[tokio::test]
    async fn test_secrets_are_passed_to_the_run_context() {
        struct EnvCheckRunner;

        #[async_trait]
        impl JobRunner for EnvCheckRunner {
            async fn run(&self, _config: &JobConfig, ctx: &RunContext) -> RunOutcome {
                let exit_code = if ctx.env.get("LIT_API_KEY").map(String::as_str) == Some("key") {
                    0
                } else {
                    1
                };
                RunOutcome {
                    exit_code,
                    output: String::new(),
                    failed_step: None,
                }
            }
        }

        let mut env = HashMap::new();
        env.insert("LIT_USER_ID".to_string(), "user".to_string());
        env.insert("LIT_API_KEY".to_string(), "key".to_string());

        let mut gated = stage("cloud", None);
        gated.secrets = vec!["LIT_USER_ID".to_string(), "LIT_API_KEY".to_string()];
        let wf = workflow(vec![gated]);

        let exec = WorkflowExecutor::new()
            .with_runner(Arc::new(EnvCheckRunner))
            .with_probe(Box::new(env));
        let result = exec.execute(&wf, &TriggerEvent::push("main")).await.unwrap();

        assert!(result.success);
    }
}
