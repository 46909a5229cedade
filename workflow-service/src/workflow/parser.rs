// Workflow YAML Parser
// Parses gridci workflow files and checks them for semantic problems

use crate::execution::matrix::MatrixExpander;
use crate::workflow::error::{ParseError, ParseErrorKind, ParseResult, ValidationError};
use crate::workflow::models::{StageConfig, Trigger, Workflow};

use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Workflow file parser
pub struct WorkflowParser;

impl WorkflowParser {
    /// Parse a workflow from a YAML string
    pub fn parse(content: &str) -> ParseResult<Workflow> {
        let workflow: Workflow =
            serde_yaml::from_str(content).map_err(|e| ParseError::from_yaml_error(&e, content))?;

        Ok(workflow)
    }

    /// Parse a workflow from a file
    pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<Workflow> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ParseError::new(format!("failed to read file: {}", e), 0, 0)
                .with_kind(ParseErrorKind::IoError)
        })?;

        Self::parse(&content)
    }
}

/// Validator for parsed workflows
pub struct WorkflowValidator;

impl WorkflowValidator {
    /// Validate a parsed workflow for semantic correctness
    pub fn validate(workflow: &Workflow) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if workflow.stages.is_empty() {
            errors.push(ValidationError::new(
                "workflow must have at least one stage",
                "stages",
            ));
        }

        Self::validate_triggers(&workflow.on, &mut errors);

        let mut stage_names: HashSet<&str> = HashSet::new();
        for (i, stage) in workflow.stages.iter().enumerate() {
            if !stage_names.insert(stage.name.as_str()) {
                errors.push(ValidationError::new(
                    format!("duplicate stage name '{}'", stage.name),
                    format!("stages[{}]", i),
                ));
            }
            Self::validate_stage(stage, &format!("stages[{}]", i), &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_triggers(trigger: &Trigger, errors: &mut Vec<ValidationError>) {
        if let Trigger::Detailed(events) = trigger {
            for (kind, config) in events {
                if kind == "schedule" {
                    let cron = config.as_ref().and_then(|c| c.cron.as_deref());
                    match cron {
                        None => errors.push(
                            ValidationError::new(
                                "schedule trigger requires a cron expression",
                                "on.schedule",
                            )
                            .with_suggestion("add 'cron: \"0 0 * * *\"' for a daily UTC run"),
                        ),
                        Some(expr) => {
                            if expr.split_whitespace().count() != 5 {
                                errors.push(
                                    ValidationError::new(
                                        format!(
                                            "cron expression '{}' must have 5 fields",
                                            expr
                                        ),
                                        "on.schedule.cron",
                                    )
                                    .with_suggestion(
                                        "minute hour day-of-month month day-of-week",
                                    ),
                                );
                            }
                        }
                    }
                }
            }
        }
    }

    fn validate_stage(stage: &StageConfig, path: &str, errors: &mut Vec<ValidationError>) {
        if stage.steps.is_empty() {
            errors.push(
                ValidationError::new("stage must have steps", path)
                    .with_suggestion("add 'steps:' to define what each job runs"),
            );
        }

        for (i, step) in stage.steps.iter().enumerate() {
            if step.run.trim().is_empty() {
                errors.push(ValidationError::new(
                    "step has an empty 'run' command",
                    format!("{}.steps[{}]", path, i),
                ));
            }
        }

        for (i, secret) in stage.secrets.iter().enumerate() {
            if secret.trim().is_empty() {
                errors.push(ValidationError::new(
                    "secret name is empty",
                    format!("{}.secrets[{}]", path, i),
                ));
            }
        }

        if let Some(matrix) = &stage.matrix {
            if let Err(e) = MatrixExpander::validate(matrix) {
                errors.push(ValidationError::new(
                    e.to_string(),
                    format!("{}.matrix", path),
                ));
            }
        }

        if stage.max_parallel == Some(0) {
            errors.push(
                ValidationError::new("max-parallel must be at least 1", path.to_string())
                    .with_suggestion("omit max-parallel to run all jobs concurrently"),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_validate_minimal_workflow() {
        let yaml = r#"
name: CI
on: push
stages:
  - name: test
    steps:
      - run: pytest
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        assert!(WorkflowValidator::validate(&workflow).is_ok());
    }

    #[test]
    fn test_parse_error_reports_location() {
        let yaml = r#"
name: CI
on: push
stages:
  - name: test
    steps: "not a list"
"#;
        let err = WorkflowParser::parse(yaml).unwrap_err();
        assert!(err.line > 0);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_validate_rejects_missing_steps() {
        let yaml = r#"
name: CI
on: push
stages:
  - name: test
    steps: []
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        let errors = WorkflowValidator::validate(&workflow).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("must have steps")));
    }

    #[test]
    fn test_validate_rejects_duplicate_stage_names() {
        let yaml = r#"
name: CI
on: push
stages:
  - name: test
    steps:
      - run: pytest
  - name: test
    steps:
      - run: pytest -m cloud
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        let errors = WorkflowValidator::validate(&workflow).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("duplicate stage name")));
    }

    #[test]
    fn test_validate_rejects_unknown_include_axis() {
        let yaml = r#"
name: CI
on: push
stages:
  - name: test
    matrix:
      axes:
        - name: os
          values: [ubuntu-22.04]
      include:
        - os: ubuntu-22.04
          arch: arm64
    steps:
      - run: pytest
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        let errors = WorkflowValidator::validate(&workflow).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("unknown axis 'arch'")));
        assert!(errors.iter().any(|e| e.path == "stages[0].matrix"));
    }

    #[test]
    fn test_validate_schedule_cron() {
        let yaml = r#"
name: CI
on:
  schedule:
    cron: "0 0 * *"
stages:
  - name: test
    steps:
      - run: pytest
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        let errors = WorkflowValidator::validate(&workflow).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("5 fields")));
    }

    #[test]
    fn test_validate_schedule_without_cron() {
        let yaml = r#"
name: CI
on:
  schedule:
stages:
  - name: test
    steps:
      - run: pytest
"#;
        let workflow = WorkflowParser::parse(yaml).unwrap();
        let errors = WorkflowValidator::validate(&workflow).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("requires a cron expression")));
    }

    #[test]
    fn test_parse_file_missing() {
        let err = WorkflowParser::parse_file("/nonexistent/workflow.yml").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::IoError);
    }
}
