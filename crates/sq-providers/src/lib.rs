//! sq-providers: LLM provider implementations for support-query
//!
//! This crate provides the OpenAI-compatible chat-completions provider used
//! for both the query model and the answer model.

pub mod openai;

pub use openai::OpenAIProvider;
