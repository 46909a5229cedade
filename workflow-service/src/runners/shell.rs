// Shell Runner
// Executes a job's step sequence through the platform shell

use crate::execution::matrix::JobConfig;
use crate::runners::{JobRunner, RunContext, RunOutcome};

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

/// Shell used to interpret step commands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shell {
    /// Default shell (sh on Unix, cmd on Windows)
    Default,
    /// Bash shell
    Bash,
}

impl Shell {
    /// Get the shell executable and arguments
    fn get_command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Shell::Default => {
                if cfg!(target_os = "windows") {
                    ("cmd", &["/C"])
                } else {
                    ("sh", &["-c"])
                }
            }
            Shell::Bash => ("bash", &["-c"]),
        }
    }
}

/// Runs each step command through the shell with the job's matrix values
/// exposed as environment variables.
///
/// A failing step ends the job unless it is marked `continue-on-error`
/// (report-upload steps); later steps still run and the job's exit code
/// stays at the first fatal failure's code.
pub struct ShellRunner {
    default_shell: Shell,
}

impl ShellRunner {
    /// Create a shell runner, preferring bash when it is on the PATH.
    pub fn new() -> Self {
        let default_shell = if which::which("bash").is_ok() {
            Shell::Bash
        } else {
            Shell::Default
        };
        Self { default_shell }
    }

    /// Create a shell runner with a specific shell
    pub fn with_shell(shell: Shell) -> Self {
        Self {
            default_shell: shell,
        }
    }

    async fn run_step(
        &self,
        script: &str,
        env: &HashMap<String, String>,
        ctx: &RunContext,
    ) -> (i32, String) {
        let (shell_cmd, shell_args) = self.default_shell.get_command();

        let mut cmd = Command::new(shell_cmd);
        cmd.args(shell_args);
        cmd.arg(script);
        cmd.current_dir(&ctx.working_dir);
        cmd.envs(env);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        // Cancellation drops the run future; take the child down with it
        cmd.kill_on_drop(true);

        let output = match cmd.output().await {
            Ok(output) => output,
            Err(e) => {
                return (
                    -1,
                    format!("failed to spawn shell process '{}': {}", shell_cmd, e),
                );
            }
        };

        let mut combined = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(&stderr);
        }

        (output.status.code().unwrap_or(-1), combined)
    }
}

impl Default for ShellRunner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobRunner for ShellRunner {
    async fn run(&self, config: &JobConfig, ctx: &RunContext) -> RunOutcome {
        let mut output = String::new();
        let mut exit_code = 0;
        let mut failed_step = None;

        for step in &ctx.steps {
            let mut env = ctx.env.clone();
            env.extend(config.to_env());
            env.extend(step.env.clone());

            let (code, step_output) = self.run_step(&step.run, &env, ctx).await;

            if !step_output.is_empty() {
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(&step_output);
            }

            if code != 0 {
                if step.continue_on_error {
                    // Non-fatal step (report upload); note it and move on
                    output.push_str(&format!(
                        "\n[{}] exited with code {} (continue-on-error, ignored)",
                        step.display_name(),
                        code
                    ));
                    continue;
                }
                exit_code = code;
                failed_step = Some(step.display_name());
                break;
            }
        }

        RunOutcome {
            exit_code,
            output,
            failed_step,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::matrix::{Axis, MatrixExpander, MatrixSpec};
    use crate::workflow::models::StepConfig;

    fn step(run: &str, continue_on_error: bool) -> StepConfig {
        StepConfig {
            name: None,
            run: run.to_string(),
            env: HashMap::new(),
            continue_on_error,
        }
    }

    fn single_config() -> JobConfig {
        let spec = MatrixSpec {
            axes: vec![Axis {
                name: "os".to_string(),
                values: vec!["local".to_string()],
            }],
            include: vec![],
        };
        MatrixExpander::expand(&spec).unwrap().remove(0)
    }

    #[tokio::test]
    async fn test_successful_step_sequence() {
        let ctx = RunContext::new(
            vec![step("echo one", false), step("echo two", false)],
            std::env::temp_dir(),
        );
        let runner = ShellRunner::new();
        let outcome = runner.run(&single_config(), &ctx).await;

        assert!(outcome.success());
        assert!(outcome.output.contains("one"));
        assert!(outcome.output.contains("two"));
        assert!(outcome.failed_step.is_none());
    }

    #[tokio::test]
    async fn test_failing_step_stops_the_job() {
        let ctx = RunContext::new(
            vec![
                step("echo before", false),
                step("exit 3", false),
                step("echo after", false),
            ],
            std::env::temp_dir(),
        );
        let runner = ShellRunner::new();
        let outcome = runner.run(&single_config(), &ctx).await;

        assert_eq!(outcome.exit_code, 3);
        assert!(outcome.output.contains("before"));
        assert!(!outcome.output.contains("after"));
        assert!(outcome.failed_step.is_some());
    }

    #[tokio::test]
    async fn test_continue_on_error_step_is_non_fatal() {
        let ctx = RunContext::new(
            vec![step("exit 1", true), step("echo done", false)],
            std::env::temp_dir(),
        );
        let runner = ShellRunner::new();
        let outcome = runner.run(&single_config(), &ctx).await;

        assert!(outcome.success());
        assert!(outcome.output.contains("done"));
        assert!(outcome.output.contains("ignored"));
    }

    #[tokio::test]
    async fn test_matrix_values_exposed_as_env() {
        let ctx = RunContext::new(vec![step("echo \"os=$MATRIX_OS\"", false)], std::env::temp_dir());
        let runner = ShellRunner::new();
        let outcome = runner.run(&single_config(), &ctx).await;

        assert!(outcome.success());
        assert!(outcome.output.contains("os=local"));
    }
}
