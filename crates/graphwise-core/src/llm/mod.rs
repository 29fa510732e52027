//! LLM integration
//!
//! The pipeline treats text generation as an opaque capability: a prompt and
//! a token budget go in, raw text or a parsed JSON object comes out. The
//! [`TextGenerator`] trait is that capability boundary; [`LlmClient`] is the
//! production implementation, and tests substitute deterministic stubs.
//! Generator output is never trusted — every call site re-validates it
//! against its own structural contract.

pub mod client;
pub mod types;

pub use client::{LlmClient, LlmClientBuilder};
pub use types::{ChatRequest, ChatResponse, LlmResponse, Message, MessageRole};

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Options for a single generation call
#[derive(Debug, Clone, Copy)]
pub struct GenerationOptions {
    /// Token budget for the completion
    pub max_tokens: usize,
    /// Parse the response as a JSON object instead of returning raw text
    pub json: bool,
}

impl GenerationOptions {
    /// Request raw text with the given token budget
    pub fn text(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            json: false,
        }
    }

    /// Request a parsed JSON object with the given token budget
    pub fn structured(max_tokens: usize) -> Self {
        Self {
            max_tokens,
            json: true,
        }
    }
}

/// Output of a generation call
#[derive(Debug, Clone)]
pub enum GeneratedOutput {
    /// Raw completion text
    Text(String),
    /// Parsed JSON object extracted from the completion
    Structured(serde_json::Value),
}

impl GeneratedOutput {
    /// Get the structured value, or None for raw text
    pub fn as_structured(&self) -> Option<&serde_json::Value> {
        match self {
            GeneratedOutput::Structured(value) => Some(value),
            GeneratedOutput::Text(_) => None,
        }
    }
}

/// Opaque text-generation capability consumed by the pipeline stages
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a completion for the prompt
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<GeneratedOutput>;
}

#[async_trait]
impl TextGenerator for LlmClient {
    async fn generate(&self, prompt: &str, options: GenerationOptions) -> Result<GeneratedOutput> {
        let messages = vec![Message::user(prompt)];
        let response = self.complete(messages, Some(options.max_tokens)).await?;

        if options.json {
            let json_str = extract_json_from_response(&response.content);
            let value: serde_json::Value = serde_json::from_str(&json_str)
                .map_err(|e| Error::LlmError(format!("Response is not valid JSON: {}", e)))?;
            Ok(GeneratedOutput::Structured(value))
        } else {
            Ok(GeneratedOutput::Text(response.content))
        }
    }
}

/// Extract JSON from a response that might contain markdown or other text
pub fn extract_json_from_response(response: &str) -> String {
    // Try to find JSON in code blocks first
    if let Some(start) = response.find("```json") {
        let json_start = start + 7;
        if let Some(end) = response[json_start..].find("```") {
            return response[json_start..json_start + end].trim().to_string();
        }
    }

    // Try to find JSON in generic code blocks
    if let Some(start) = response.find("```") {
        let potential_start = start + 3;
        if let Some(newline) = response[potential_start..].find('\n') {
            let json_start = potential_start + newline + 1;
            if let Some(end) = response[json_start..].find("```") {
                return response[json_start..json_start + end].trim().to_string();
            }
        }
    }

    // Try to find raw JSON object
    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        return response[start..=end].to_string();
    }

    // Return as-is if no JSON found
    response.to_string()
}
