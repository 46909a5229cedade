// Job Runners
// Capability boundary between the scheduler and whatever executes a job

pub mod shell;

pub use shell::ShellRunner;

use crate::execution::matrix::JobConfig;
use crate::workflow::models::StepConfig;

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;

/// Everything a job needs besides its matrix point: the stage's ordered
/// step sequence and the resolved environment. One context is shared by
/// all jobs in a fan-out group; per-job values come from the `JobConfig`.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Ordered step commands to execute
    pub steps: Vec<StepConfig>,

    /// Base environment: workflow env, stage env, gated-stage secrets
    pub env: HashMap<String, String>,

    /// Working directory for all steps
    pub working_dir: PathBuf,
}

impl RunContext {
    pub fn new(steps: Vec<StepConfig>, working_dir: PathBuf) -> Self {
        Self {
            steps,
            env: HashMap::new(),
            working_dir,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }
}

/// Outcome of one runner invocation.
///
/// The core interprets nothing here beyond the final exit code; the
/// captured output exists for display only.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Exit code of the step sequence (0 = success)
    pub exit_code: i32,

    /// Combined captured output of all executed steps
    pub output: String,

    /// Name of the step that failed the job, if any
    pub failed_step: Option<String>,
}

impl RunOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Executes a single job configuration's ordered step sequence.
///
/// Runners are opaque collaborators: the scheduler hands them a config and
/// a context and observes only the outcome.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, config: &JobConfig, ctx: &RunContext) -> RunOutcome;
}
