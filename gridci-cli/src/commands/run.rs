use crate::output;

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use workflow_service::execution::events::progress_channel;
use workflow_service::{
    ExecutionEvent, ExecutorConfig, StageStatus, TriggerEvent, WorkflowExecutor, WorkflowParser,
    WorkflowValidator,
};

/// Run a workflow file locally
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,

    /// Event kind to trigger with (push, pull_request, workflow_dispatch, schedule)
    #[arg(long, short = 'e', default_value = "workflow_dispatch")]
    pub event: String,

    /// Branch the event concerns (for push/pull_request triggers)
    #[arg(long, short = 'b')]
    pub branch: Option<String>,

    /// Set an environment variable for all jobs (can be repeated, format: name=value)
    #[arg(long = "var", short = 'v', value_name = "NAME=VALUE")]
    pub variables: Vec<String>,

    /// Run only a specific stage
    #[arg(long, value_name = "STAGE")]
    pub stage: Option<String>,

    /// Let every job run to completion even after a failure
    #[arg(long)]
    pub no_fail_fast: bool,

    /// Working directory for execution
    #[arg(long, short = 'w', value_name = "DIR")]
    pub working_dir: Option<PathBuf>,

    /// Print job output for failed jobs
    #[arg(long)]
    pub show_output: bool,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let workflow_path = &args.workflow;

    if !workflow_path.exists() {
        color_eyre::eyre::bail!("Workflow file not found: {}", workflow_path.display());
    }

    // Parse variables from --var flags
    let mut variables = HashMap::new();
    for var_str in &args.variables {
        if let Some((name, value)) = var_str.split_once('=') {
            variables.insert(name.to_string(), value.to_string());
        } else {
            color_eyre::eyre::bail!("Invalid variable format '{}'. Expected name=value", var_str);
        }
    }

    // Resolve working directory
    let working_dir = match &args.working_dir {
        Some(dir) => dir.clone(),
        None => std::env::current_dir()?,
    };

    output::status("Parsing", &workflow_path.display().to_string());
    let mut workflow = WorkflowParser::parse_file(workflow_path)
        .map_err(|e| color_eyre::eyre::eyre!("Parse error: {}", e))?;
    workflow.env.extend(variables);

    if let Some(name) = &args.stage {
        if workflow.stage(name).is_none() {
            color_eyre::eyre::bail!("No stage named '{}'", name);
        }
        workflow.stages.retain(|s| &s.name == name);
    }
    if args.no_fail_fast {
        for stage in &mut workflow.stages {
            stage.fail_fast = false;
        }
    }

    if let Err(errors) = WorkflowValidator::validate(&workflow) {
        for err in &errors {
            output::error(&err.to_string());
        }
        color_eyre::eyre::bail!("workflow failed validation");
    }

    let total_jobs: usize = workflow
        .stages
        .iter()
        .map(|s| s.matrix.as_ref().map(|m| m.expected_len()).unwrap_or(1))
        .sum();
    output::info(&format!(
        "Workflow '{}': {} stages, {} jobs",
        workflow.display_name(),
        workflow.stages.len(),
        total_jobs
    ));

    let event = match args.event.as_str() {
        "push" => TriggerEvent::push(args.branch.clone().unwrap_or_else(|| "main".to_string())),
        "pull_request" => {
            TriggerEvent::pull_request(args.branch.clone().unwrap_or_else(|| "main".to_string()))
        }
        "schedule" => TriggerEvent::schedule(),
        "workflow_dispatch" => TriggerEvent::dispatch(),
        other => color_eyre::eyre::bail!("Unknown event kind '{}'", other),
    };

    // Create progress channel and executor
    let (tx, mut rx) = progress_channel();
    let executor = WorkflowExecutor::new()
        .with_config(ExecutorConfig {
            working_dir,
            ..Default::default()
        })
        .with_progress(tx);

    // Spawn execution in background, render events in the foreground
    let exec_handle =
        tokio::spawn(async move { executor.execute(&workflow, &event).await });

    let show_output = args.show_output;
    while let Some(event) = rx.recv().await {
        render_event(&event, show_output);
    }

    let result = exec_handle
        .await?
        .map_err(|e| color_eyre::eyre::eyre!("{}", e))?;

    let (succeeded, failed, skipped) = result.counts();
    println!();
    output::info(&format!(
        "{} succeeded, {} failed, {} skipped",
        succeeded, failed, skipped
    ));

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}

fn render_event(event: &ExecutionEvent, show_output: bool) {
    match event {
        ExecutionEvent::WorkflowStarted {
            workflow_name,
            total_stages,
        } => {
            println!();
            output::header(&format!(
                "Workflow '{}' ({} stages)",
                workflow_name, total_stages
            ));
        }

        ExecutionEvent::WorkflowCompleted {
            success, duration, ..
        } => {
            println!();
            if *success {
                output::success(&format!(
                    "Workflow completed successfully in {:.2}s",
                    duration.as_secs_f64()
                ));
            } else {
                output::failure(&format!(
                    "Workflow failed after {:.2}s",
                    duration.as_secs_f64()
                ));
            }
        }

        ExecutionEvent::GateEvaluated {
            stage_name,
            available,
            missing,
        } => {
            if !available {
                output::warning(&format!(
                    "  Stage '{}' gate closed (missing: {})",
                    stage_name,
                    missing.join(", ")
                ));
            }
        }

        ExecutionEvent::StageStarted {
            stage_name,
            total_jobs,
        } => {
            output::stage_header(stage_name, *total_jobs);
        }

        ExecutionEvent::StageSkipped { stage_name, reason } => {
            output::warning(&format!("  Stage '{}' skipped: {}", stage_name, reason));
        }

        ExecutionEvent::StageCompleted {
            stage_name,
            status,
            duration,
        } => {
            let line = format!(
                "  Stage '{}' {} ({:.2}s)",
                stage_name,
                status,
                duration.as_secs_f64()
            );
            if *status == StageStatus::Failed {
                output::dim_failure(&line);
            } else {
                output::dim_success(&line);
            }
        }

        ExecutionEvent::JobStarted { job_id, .. } => {
            println!("    Job '{}'", job_id);
        }

        ExecutionEvent::JobCompleted {
            job_id,
            status,
            duration,
            failed_step,
            output: job_output,
            ..
        } => {
            let line = format!(
                "    Job '{}' {} ({:.2}s)",
                job_id,
                status,
                duration.as_secs_f64()
            );
            if status.is_failure() {
                output::dim_failure(&line);
                if let Some(step) = failed_step {
                    output::dim_failure(&format!("      failed at step: {}", step));
                }
                if show_output {
                    for out_line in job_output.lines() {
                        output::job_output(out_line);
                    }
                }
            } else {
                output::dim_success(&line);
            }
        }

        ExecutionEvent::GuardianVerdict {
            stage_name,
            outcome,
            stalled,
        } => {
            if outcome.passed() {
                output::check(&format!("  Stage '{}': {}", stage_name, outcome.summary()));
            } else {
                let note = if *stalled { " (held before failing)" } else { "" };
                output::failure(&format!(
                    "  Stage '{}': {}{}",
                    stage_name,
                    outcome.summary(),
                    note
                ));
            }
        }

        ExecutionEvent::Log { message, .. } => {
            output::info(message);
        }
    }
}
