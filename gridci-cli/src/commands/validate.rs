use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use workflow_service::{MatrixExpander, WorkflowParser, WorkflowValidator};

/// Validate a workflow YAML file
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let workflow_path = &args.workflow;

    if !workflow_path.exists() {
        color_eyre::eyre::bail!("Workflow file not found: {}", workflow_path.display());
    }

    // Step 1: Parse YAML syntax and schema
    output::status("Validating", &workflow_path.display().to_string());

    let workflow = match WorkflowParser::parse_file(workflow_path) {
        Ok(w) => w,
        Err(e) => {
            output::error(&format!("Parse error: {}", e.message));
            if !e.context.is_empty() {
                eprintln!("{}", e.context);
            }
            if let Some(suggestion) = &e.suggestion {
                output::info(&format!("Suggestion: {}", suggestion));
            }
            std::process::exit(1);
        }
    };
    output::check("YAML syntax valid");

    // Step 2: Semantic validation
    match WorkflowValidator::validate(&workflow) {
        Ok(()) => output::check("Workflow structure valid"),
        Err(errors) => {
            for err in &errors {
                output::error(&err.to_string());
            }
            std::process::exit(1);
        }
    }

    // Step 3: Summarize what would run
    for stage in &workflow.stages {
        let jobs = match &stage.matrix {
            Some(spec) => MatrixExpander::expand(spec)
                .map(|configs| configs.len())
                .unwrap_or(0),
            None => 1,
        };
        let gate = if stage.secrets.is_empty() {
            String::new()
        } else {
            format!(" [gated on {}]", stage.secrets.join(", "))
        };
        output::info(&format!("stage '{}': {} jobs{}", stage.name, jobs, gate));
    }

    output::success(&format!("'{}' is valid", workflow.display_name()));
    Ok(())
}
