// Workflow Service Library
// Core service for matrix fan-out workflow parsing and execution

pub mod error;
pub mod execution;
pub mod runners;
pub mod workflow;

// Re-export commonly used types
pub use error::{ServiceError, ServiceResult};

// Re-export workflow configuration types
pub use workflow::{
    ParseError, ParseErrorKind, ParseResult, StageConfig, StepConfig, Trigger, TriggerEvent,
    ValidationError, Workflow, WorkflowParser, WorkflowValidator,
};

// Re-export execution types
pub use execution::{
    progress_channel, AggregateOutcome, ConfigError, ExecutionEvent, ExecutionResult,
    ExecutorConfig, FanoutScheduler, GateDecision, GroupSignal, GroupVerdict, Guardian, JobConfig,
    JobResult, JobStatus, MatrixExpander, MatrixSpec, ProgressSender, SecretGate, StageResult,
    StageStatus, WorkflowExecutor,
};

// Re-export runner types
pub use runners::{JobRunner, RunContext, RunOutcome, ShellRunner};
