//! Graphwise Core Library
//!
//! This crate provides the core functionality for Graphwise, including:
//! - The four-stage question answering pipeline (filter, synthesize, execute, answer)
//! - Tenant configuration store (SQLite)
//! - LLM integration (OpenAI-compatible chat completions)
//! - Neo4j graph gateway
//! - Configuration management

pub mod config;
pub mod error;
pub mod graph;
pub mod llm;
pub mod pipeline;
pub mod tenant;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::pipeline::{Pipeline, PipelineOutcome, QueryRequest, QueryResponse};
    pub use crate::tenant::{TenantConfigStore, TenantSchema};
}
