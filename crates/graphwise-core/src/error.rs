//! Error types for Graphwise

use thiserror::Error;

/// Result type alias using Graphwise's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Graphwise error types with helpful messages and suggestions
#[derive(Error, Debug)]
pub enum Error {
    // Tenant configuration errors (E001-E099)
    #[error("No tenant configuration found for app_id '{0}'. Register the app with `graphwise register`.")]
    ConfigNotFound(String),

    #[error("Invalid tenant configuration for app_id '{0}': {1}")]
    InvalidConfig(String, String),

    // Pipeline stage errors (E100-E199)
    #[error("Schema filtering failed: {0}")]
    SchemaFilterFailed(String),

    #[error("Query synthesis failed: {0}")]
    QuerySynthesisFailed(String),

    #[error("Graph execution failed: {0}")]
    GraphExecutionFailed(String),

    #[error("Answer synthesis failed: {0}")]
    AnswerSynthesisFailed(String),

    #[error("Stage '{0}' timed out after {1} seconds")]
    StageTimeout(&'static str, u64),

    // Network errors (E200-E299)
    #[error("Network error: {0}. Check your internet connection.")]
    NetworkError(#[from] reqwest::Error),

    #[error("LLM API error: {0}. Check your API key with `graphwise config get llm.api_key`.")]
    LlmError(String),

    #[error("Rate limited. Waiting {0} seconds before retry.")]
    RateLimited(u64),

    // Database errors (E300-E399)
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Config errors (E400-E499)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Input errors (E500-E599)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // Generic errors
    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigNotFound(_) => "E001",
            Self::InvalidConfig(..) => "E002",
            Self::SchemaFilterFailed(_) => "E100",
            Self::QuerySynthesisFailed(_) => "E101",
            Self::GraphExecutionFailed(_) => "E102",
            Self::AnswerSynthesisFailed(_) => "E103",
            Self::StageTimeout(..) => "E104",
            Self::NetworkError(_) => "E200",
            Self::LlmError(_) => "E201",
            Self::RateLimited(_) => "E202",
            Self::DatabaseError(_) => "E300",
            Self::ConfigError(_) => "E400",
            Self::InvalidInput(_) => "E500",
            Self::Other(_) | Self::Io(_) => "E9999",
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::ConfigNotFound(app_id) => Some(format!(
                "graphwise register <config.json> (with \"id\": \"{}\")",
                app_id
            )),
            Self::NetworkError(_) => Some("Check internet connection".to_string()),
            Self::LlmError(_) => Some("graphwise config get llm.api_key".to_string()),
            Self::GraphExecutionFailed(_) => {
                Some("Check NEO4J_URI, NEO4J_USER and NEO4J_PASSWORD".to_string())
            }
            _ => None,
        }
    }
}
