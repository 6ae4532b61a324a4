pub mod client;
pub mod error;
pub mod types;

pub use client::EngineClient;
pub use error::EngineError;
pub use types::{
    ChatMessage, CheckpointSummary, ConfirmOutcome, Decision, ExecuteRequest, ExecutionId,
    ExecutionSnapshot, ExecutionStatus, ExecutionSummary, HealthStatus, ToolCall,
};
