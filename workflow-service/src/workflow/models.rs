use crate::execution::matrix::MatrixSpec;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A declarative CI workflow definition.
///
/// This represents the top-level structure of a workflow YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    /// The name of the workflow
    pub name: Option<String>,

    /// The trigger configuration for the workflow
    #[serde(rename = "on")]
    pub on: Trigger,

    /// Workflow-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// The stages that make up this workflow, in execution order
    pub stages: Vec<StageConfig>,
}

impl Workflow {
    /// Get a display name for the workflow, falling back to "workflow".
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("workflow")
    }

    /// Find a stage by name.
    pub fn stage(&self, name: &str) -> Option<&StageConfig> {
        self.stages.iter().find(|s| s.name == name)
    }
}

/// Trigger configuration for when the workflow should run.
///
/// Supports multiple trigger formats:
/// - Simple: `on: push`
/// - List: `on: [push, pull_request]`
/// - Detailed: `on: { pull_request: { branches: [main] } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Trigger {
    /// Single event trigger: `on: push`
    Single(String),

    /// Multiple events: `on: [push, workflow_dispatch]`
    Multiple(Vec<String>),

    /// Detailed event configuration
    Detailed(HashMap<String, Option<EventConfig>>),
}

impl Trigger {
    /// Whether this trigger fires for the given event.
    ///
    /// Branch filters only apply in the detailed form; the simple forms
    /// match on event kind alone.
    pub fn matches(&self, event: &TriggerEvent) -> bool {
        match self {
            Trigger::Single(kind) => kind == &event.kind,
            Trigger::Multiple(kinds) => kinds.iter().any(|k| k == &event.kind),
            Trigger::Detailed(events) => match events.get(&event.kind) {
                None => false,
                Some(None) => true,
                Some(Some(config)) => {
                    if config.branches.is_empty() {
                        return true;
                    }
                    match &event.branch {
                        Some(branch) => config.branches.iter().any(|b| b == branch),
                        None => false,
                    }
                }
            },
        }
    }

    /// Event kinds this trigger responds to.
    pub fn kinds(&self) -> Vec<String> {
        match self {
            Trigger::Single(kind) => vec![kind.clone()],
            Trigger::Multiple(kinds) => kinds.clone(),
            Trigger::Detailed(events) => events.keys().cloned().collect(),
        }
    }
}

/// Configuration for a specific trigger event.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EventConfig {
    /// Branch filters for push/pull_request events
    #[serde(default)]
    pub branches: Vec<String>,

    /// Cron schedule for schedule events (five space-separated fields, UTC)
    #[serde(default)]
    pub cron: Option<String>,
}

/// A concrete event arriving at the trigger surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Event kind: "push", "pull_request", "workflow_dispatch", "schedule"
    pub kind: String,

    /// Branch the event concerns, when applicable
    pub branch: Option<String>,
}

impl TriggerEvent {
    pub fn push(branch: impl Into<String>) -> Self {
        Self {
            kind: "push".to_string(),
            branch: Some(branch.into()),
        }
    }

    pub fn pull_request(base_branch: impl Into<String>) -> Self {
        Self {
            kind: "pull_request".to_string(),
            branch: Some(base_branch.into()),
        }
    }

    pub fn dispatch() -> Self {
        Self {
            kind: "workflow_dispatch".to_string(),
            branch: None,
        }
    }

    pub fn schedule() -> Self {
        Self {
            kind: "schedule".to_string(),
            branch: None,
        }
    }
}

/// One stage of the workflow: a fan-out group of jobs sharing a step
/// sequence, expanded from the stage's matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    /// Stage name
    pub name: String,

    /// Matrix of job configurations; a stage without a matrix runs a
    /// single job
    #[serde(default)]
    pub matrix: Option<MatrixSpec>,

    /// Cancel still-running siblings once any job fails or times out
    #[serde(default = "default_fail_fast", rename = "fail-fast")]
    pub fail_fast: bool,

    /// Maximum number of jobs running concurrently (unlimited if absent)
    #[serde(default, rename = "max-parallel")]
    pub max_parallel: Option<u32>,

    /// Per-job timeout in minutes (no timeout if absent)
    #[serde(default, rename = "timeout-minutes")]
    pub timeout_minutes: Option<u32>,

    /// Credential names that must be present and non-empty for this stage
    /// to run; the stage is skipped when any is missing
    #[serde(default)]
    pub secrets: Vec<String>,

    /// Whether a required check aggregates this group. A guarded group
    /// that ends cancelled or skipped is escalated to a failure instead of
    /// passing silently.
    #[serde(default)]
    pub guarded: bool,

    /// Stage-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Ordered step commands every job in the group runs
    pub steps: Vec<StepConfig>,
}

fn default_fail_fast() -> bool {
    true
}

/// A step within a stage's job sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepConfig {
    /// Display name for the step
    #[serde(default)]
    pub name: Option<String>,

    /// Shell command to run
    pub run: String,

    /// Step-level environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Whether the job continues if this step fails (report-upload steps)
    #[serde(default, rename = "continue-on-error")]
    pub continue_on_error: bool,
}

impl StepConfig {
    /// Get a display name for the step.
    pub fn display_name(&self) -> String {
        if let Some(name) = &self.name {
            name.clone()
        } else {
            let first_line = self.run.lines().next().unwrap_or(&self.run);
            if first_line.len() > 50 {
                // Back off to a char boundary so multibyte commands don't panic
                let mut cut = 47;
                while !first_line.is_char_boundary(cut) {
                    cut -= 1;
                }
                format!("{}...", &first_line[..cut])
            } else {
                format!("Run {}", first_line)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_workflow() {
        let yaml = r#"
name: CI
on: push
stages:
  - name: test
    steps:
      - run: echo "Hello, World!"
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(workflow.name, Some("CI".to_string()));
        assert!(matches!(workflow.on, Trigger::Single(ref s) if s == "push"));
        assert_eq!(workflow.stages.len(), 1);
        assert!(workflow.stages[0].fail_fast);
    }

    #[test]
    fn test_parse_workflow_with_multiple_triggers() {
        let yaml = r#"
name: CI
on: [push, workflow_dispatch]
stages:
  - name: test
    steps:
      - run: pytest
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        assert!(matches!(workflow.on, Trigger::Multiple(ref v) if v.len() == 2));
    }

    #[test]
    fn test_parse_workflow_with_detailed_triggers() {
        let yaml = r#"
name: CI
on:
  push:
  pull_request:
    branches: [main]
  schedule:
    cron: "0 0 * * *"
stages:
  - name: test
    steps:
      - run: pytest
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        if let Trigger::Detailed(events) = &workflow.on {
            assert!(events.contains_key("push"));
            let schedule = events.get("schedule").unwrap().as_ref().unwrap();
            assert_eq!(schedule.cron.as_deref(), Some("0 0 * * *"));
        } else {
            panic!("Expected detailed trigger");
        }
    }

    #[test]
    fn test_trigger_matching() {
        let yaml = r#"
push:
pull_request:
  branches: [main]
workflow_dispatch:
"#;
        let trigger: Trigger = serde_yaml::from_str(yaml).unwrap();

        assert!(trigger.matches(&TriggerEvent::push("feature/x")));
        assert!(trigger.matches(&TriggerEvent::pull_request("main")));
        assert!(!trigger.matches(&TriggerEvent::pull_request("develop")));
        assert!(trigger.matches(&TriggerEvent::dispatch()));
        assert!(!trigger.matches(&TriggerEvent::schedule()));
    }

    #[test]
    fn test_simple_trigger_ignores_branch() {
        let trigger = Trigger::Single("push".to_string());
        assert!(trigger.matches(&TriggerEvent::push("anything")));
        assert!(!trigger.matches(&TriggerEvent::dispatch()));
    }

    #[test]
    fn test_parse_stage_with_matrix_and_secrets() {
        let yaml = r#"
name: CI
on: push
stages:
  - name: test-cloud
    matrix:
      axes:
        - name: os
          values: [ubuntu-22.04]
        - name: python
          values: ["3.10", "3.12"]
      include:
        - os: macos-14
          python: "3.12"
    fail-fast: false
    max-parallel: 2
    timeout-minutes: 35
    secrets: [LIT_USER_ID, LIT_API_KEY]
    guarded: true
    steps:
      - name: Install
        run: pip install -e .
      - name: Test
        run: pytest -m cloud
      - name: Upload coverage
        run: coverage-upload --flags cloud
        continue-on-error: true
"#;
        let workflow: Workflow = serde_yaml::from_str(yaml).unwrap();
        let stage = &workflow.stages[0];

        assert!(!stage.fail_fast);
        assert_eq!(stage.max_parallel, Some(2));
        assert_eq!(stage.timeout_minutes, Some(35));
        assert_eq!(stage.secrets, vec!["LIT_USER_ID", "LIT_API_KEY"]);
        assert!(stage.guarded);

        let matrix = stage.matrix.as_ref().unwrap();
        assert_eq!(matrix.axes.len(), 2);
        assert_eq!(matrix.include.len(), 1);
        assert_eq!(matrix.expected_len(), 3);

        assert!(stage.steps[2].continue_on_error);
        assert_eq!(stage.steps[0].display_name(), "Install");
        assert_eq!(stage.steps[1].display_name(), "Test");
    }

    #[test]
    fn test_step_display_name_from_run() {
        let step = StepConfig {
            name: None,
            run: "pytest -m 'not cloud'".to_string(),
            env: HashMap::new(),
            continue_on_error: false,
        };
        assert_eq!(step.display_name(), "Run pytest -m 'not cloud'");
    }

    #[test]
    fn test_step_display_name_truncates_long_run() {
        let step = StepConfig {
            name: None,
            run: "a".repeat(80),
            env: HashMap::new(),
            continue_on_error: false,
        };
        let name = step.display_name();
        assert!(name.ends_with("..."));
        assert_eq!(name.len(), 50);
    }

    #[test]
    fn test_step_display_name_truncates_multibyte_run() {
        // 60 bytes of 2-byte chars; byte 47 falls mid-character
        let step = StepConfig {
            name: None,
            run: "é".repeat(30),
            env: HashMap::new(),
            continue_on_error: false,
        };
        let name = step.display_name();
        assert!(name.ends_with("..."));
        assert!(name.len() <= 50);
        assert!(name.trim_end_matches("...").chars().all(|c| c == 'é'));
    }
}
