use crate::output;

use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use workflow_service::execution::gate::{EnvProbe, SecretGate};
use workflow_service::{MatrixExpander, WorkflowParser};

/// Expand and print a stage's job matrix
#[derive(Args, Debug)]
pub struct MatrixArgs {
    /// Path to the workflow YAML file
    pub workflow: PathBuf,

    /// Stage to expand (defaults to every stage with a matrix)
    #[arg(long, short = 's')]
    pub stage: Option<String>,
}

pub fn execute(args: MatrixArgs) -> Result<()> {
    let workflow_path = &args.workflow;

    if !workflow_path.exists() {
        color_eyre::eyre::bail!("Workflow file not found: {}", workflow_path.display());
    }

    let workflow = WorkflowParser::parse_file(workflow_path)
        .map_err(|e| color_eyre::eyre::eyre!("Parse error: {}", e))?;

    let stages: Vec<_> = match &args.stage {
        Some(name) => match workflow.stage(name) {
            Some(stage) => vec![stage],
            None => color_eyre::eyre::bail!("No stage named '{}'", name),
        },
        None => workflow.stages.iter().collect(),
    };

    for stage in stages {
        if !stage.secrets.is_empty() {
            let decision = SecretGate::evaluate(&stage.name, &stage.secrets, &EnvProbe);
            if decision.available {
                output::check(&format!("stage '{}' gate open", stage.name));
            } else {
                output::warning(&format!(
                    "stage '{}' gate closed ({})",
                    stage.name,
                    decision.reason()
                ));
            }
        }

        let Some(spec) = &stage.matrix else {
            output::info(&format!("stage '{}' has no matrix (1 job)", stage.name));
            continue;
        };

        let configs = MatrixExpander::expand(spec)
            .map_err(|e| color_eyre::eyre::eyre!("stage '{}': {}", stage.name, e))?;

        output::stage_header(&stage.name, configs.len());
        for config in &configs {
            let pairs: Vec<String> = config
                .values()
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            println!("    {}  ({})", config.id(), pairs.join(", "));
        }
    }

    Ok(())
}
