// Execution Engine Module
// Matrix expansion, secret gating, fan-out scheduling, aggregation

pub mod events;
pub mod executor;
pub mod gate;
pub mod guardian;
pub mod matrix;
pub mod scheduler;

// Re-export key types
pub use events::{progress_channel, ExecutionEvent, LogLevel, ProgressReceiver, ProgressSender};
pub use executor::{ExecutionResult, ExecutorConfig, StageResult, StageStatus, WorkflowExecutor};
pub use gate::{EnvProbe, GateDecision, SecretGate, SecretProbe};
pub use guardian::{AggregateOutcome, GroupSignal, GroupVerdict, Guardian};
pub use matrix::{Axis, ConfigError, JobConfig, MatrixExpander, MatrixSpec};
pub use scheduler::{FanoutScheduler, JobResult, JobStatus, SchedulerConfig};
