// Execution Events
// Progress reporting and event types for workflow execution

use crate::execution::guardian::AggregateOutcome;
use crate::execution::scheduler::JobStatus;
use crate::execution::executor::StageStatus;

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for execution progress events
pub type ProgressSender = mpsc::UnboundedSender<ExecutionEvent>;

/// Receiver for execution progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<ExecutionEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted during workflow execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    /// Workflow execution started
    WorkflowStarted {
        workflow_name: String,
        total_stages: usize,
    },

    /// Workflow execution completed
    WorkflowCompleted {
        workflow_name: String,
        success: bool,
        duration: Duration,
    },

    /// The secret gate ruled on a credential-gated stage
    GateEvaluated {
        stage_name: String,
        available: bool,
        missing: Vec<String>,
    },

    /// Stage fan-out started
    StageStarted {
        stage_name: String,
        total_jobs: usize,
    },

    /// Stage was skipped (gate unavailable or trigger mismatch)
    StageSkipped { stage_name: String, reason: String },

    /// Stage fan-out completed
    StageCompleted {
        stage_name: String,
        status: StageStatus,
        duration: Duration,
    },

    /// One job of a fan-out group started
    JobStarted {
        stage_name: String,
        job_id: String,
    },

    /// One job of a fan-out group reached a terminal status
    JobCompleted {
        stage_name: String,
        job_id: String,
        status: JobStatus,
        duration: Duration,
        failed_step: Option<String>,
        output: String,
    },

    /// The guardian settled a guarded group
    GuardianVerdict {
        stage_name: String,
        outcome: AggregateOutcome,
        stalled: bool,
    },

    /// Log message (info, warning, error)
    Log {
        level: LogLevel,
        message: String,
        stage_name: Option<String>,
    },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl ExecutionEvent {
    /// Create a workflow started event
    pub fn workflow_started(name: impl Into<String>, total_stages: usize) -> Self {
        Self::WorkflowStarted {
            workflow_name: name.into(),
            total_stages,
        }
    }

    /// Create a workflow completed event
    pub fn workflow_completed(name: impl Into<String>, success: bool, duration: Duration) -> Self {
        Self::WorkflowCompleted {
            workflow_name: name.into(),
            success,
            duration,
        }
    }

    /// Create a stage started event
    pub fn stage_started(name: impl Into<String>, total_jobs: usize) -> Self {
        Self::StageStarted {
            stage_name: name.into(),
            total_jobs,
        }
    }

    /// Create a stage completed event
    pub fn stage_completed(
        name: impl Into<String>,
        status: StageStatus,
        duration: Duration,
    ) -> Self {
        Self::StageCompleted {
            stage_name: name.into(),
            status,
            duration,
        }
    }

    /// Create a job started event
    pub fn job_started(stage_name: impl Into<String>, job_id: impl Into<String>) -> Self {
        Self::JobStarted {
            stage_name: stage_name.into(),
            job_id: job_id.into(),
        }
    }

    /// Create an info log event
    pub fn info(message: impl Into<String>, stage_name: Option<String>) -> Self {
        Self::Log {
            level: LogLevel::Info,
            message: message.into(),
            stage_name,
        }
    }

    /// Create a warning log event
    pub fn warning(message: impl Into<String>, stage_name: Option<String>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
            stage_name,
        }
    }

    /// Create an error log event
    pub fn error(message: impl Into<String>, stage_name: Option<String>) -> Self {
        Self::Log {
            level: LogLevel::Error,
            message: message.into(),
            stage_name,
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: ExecutionEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: ExecutionEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: ExecutionEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
