// Workflow configuration: models, parsing, validation

pub mod error;
pub mod models;
pub mod parser;

pub use error::{ParseError, ParseErrorKind, ParseResult, ValidationError};
pub use models::{EventConfig, StageConfig, StepConfig, Trigger, TriggerEvent, Workflow};
pub use parser::{WorkflowParser, WorkflowValidator};
