//! sq-core: Core types and traits for support-query
//!
//! This crate provides the message model, the provider and tool seams, and
//! the query → search → answer pipeline that drives every question.

pub mod error;
pub mod message;
pub mod pipeline;
pub mod provider;
pub mod tool;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::Error;
pub use message::{Message, Role, ToolCall, Usage};
pub use pipeline::{
    NodeName, Pipeline, PipelineConfig, PipelineState, StageOptions, StepUpdate, Topology,
};
pub use provider::{CompletionRequest, CompletionResponse, FinishReason, Provider};
pub use tool::{PropertySchema, Tool, ToolDefinition, ToolOutput, ToolParameters, ToolRegistry};

pub type Result<T> = std::result::Result<T, Error>;
