//! The four-stage question answering pipeline
//!
//! Control flow is strictly linear and single-shot per request:
//!
//! ```text
//! Config Store -> Schema Filter -> Query Synthesizer -> Executor/Validator -> Answer Synthesizer
//! ```
//!
//! Each stage's output is the next stage's only input. No stage re-reads the
//! raw tenant config after the Schema Filter, and no stage re-reads the raw
//! question after the Query Synthesizer except the Answer Synthesizer, which
//! needs it for grounding. There is no state shared between requests; every
//! invocation reconstructs the full chain from scratch.

pub mod answer;
pub mod executor;
pub mod filter;
pub mod synthesizer;

pub use answer::{Answer, AnswerSynthesizer};
pub use executor::{Execution, QueryExecutor};
pub use filter::{FilteredSchema, SchemaFilter};
pub use synthesizer::{QuerySynthesizer, SynthesizedQuery};

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::graph::{GraphGateway, QueryParams};
use crate::llm::TextGenerator;
use crate::tenant::TenantConfigStore;

/// Incoming request envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    /// The natural-language question
    pub content: String,
    /// The requesting user
    pub user_id: String,
    /// The application whose knowledge graph is queried
    pub app_id: String,
}

impl QueryRequest {
    pub fn validate(&self) -> Result<()> {
        if self.content.trim().is_empty() {
            return Err(Error::InvalidInput("content must not be empty".to_string()));
        }
        if self.user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user_id must not be empty".to_string()));
        }
        if self.app_id.trim().is_empty() {
            return Err(Error::InvalidInput("app_id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Terminal outcome of a successful pipeline run
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    /// A grounded answer was synthesized
    Answered(Answer),
    /// The query was valid but nothing in the graph matched
    NoData,
}

/// Outgoing response envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryResponse {
    Ok { answer: String },
    NoData { message: String },
    Error { error: String, details: String },
}

impl QueryResponse {
    pub fn from_outcome(outcome: PipelineOutcome) -> Self {
        match outcome {
            PipelineOutcome::Answered(answer) => QueryResponse::Ok { answer: answer.text },
            PipelineOutcome::NoData => QueryResponse::NoData {
                message: "No relevant data found in the knowledge graph.".to_string(),
            },
        }
    }

    pub fn from_error(error: &Error) -> Self {
        QueryResponse::Error {
            error: "Internal server error".to_string(),
            details: error.to_string(),
        }
    }
}

/// The question answering pipeline
///
/// One instance per process; each `answer` call is fully isolated, so the
/// pipeline is safe to share across concurrent requests.
pub struct Pipeline {
    store: Arc<dyn TenantConfigStore>,
    schema_filter: SchemaFilter,
    synthesizer: QuerySynthesizer,
    executor: QueryExecutor,
    answerer: AnswerSynthesizer,
    stage_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn TenantConfigStore>,
        generator: Arc<dyn TextGenerator>,
        gateway: Arc<dyn GraphGateway>,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            store,
            schema_filter: SchemaFilter::new(generator.clone()),
            synthesizer: QuerySynthesizer::new(generator.clone()),
            executor: QueryExecutor::new(gateway),
            answerer: AnswerSynthesizer::new(generator),
            stage_timeout: Duration::from_secs(config.stage_timeout_secs),
        }
    }

    /// Answer a question against the tenant's knowledge graph
    pub async fn answer(&self, request: &QueryRequest) -> Result<PipelineOutcome> {
        request.validate()?;

        info!(
            app_id = %request.app_id,
            user_id = %request.user_id,
            "Handling query request"
        );

        // Config fetch happens before any generation call
        let schema = self
            .store
            .get(&request.app_id)
            .await?
            .ok_or_else(|| Error::ConfigNotFound(request.app_id.clone()))?;

        let filtered = self
            .bounded(
                "schema_filter",
                self.schema_filter.filter(&request.content, &schema),
            )
            .await?;

        // An empty filtered schema cannot produce a satisfiable query;
        // short-circuit instead of burning a synthesis round-trip.
        if filtered.is_empty() {
            warn!(app_id = %request.app_id, "No schema elements relevant to the question");
            return Ok(PipelineOutcome::NoData);
        }

        let params = QueryParams::new(&request.user_id, &request.app_id);
        let query = self
            .bounded(
                "query_synthesis",
                self.synthesizer
                    .synthesize(&request.content, &filtered, &params),
            )
            .await?;

        let execution = self
            .bounded("graph_execution", self.executor.execute(&query))
            .await?;

        let records = match execution {
            Execution::Retrieved(records) => records,
            Execution::NoData => return Ok(PipelineOutcome::NoData),
        };

        let answer = self
            .bounded(
                "answer_synthesis",
                self.answerer.synthesize(&request.content, &records),
            )
            .await?;

        Ok(PipelineOutcome::Answered(answer))
    }

    /// Bound a stage's gateway round-trip; expiry aborts the remaining stages
    async fn bounded<T>(
        &self,
        stage: &'static str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.stage_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::StageTimeout(stage, self.stage_timeout.as_secs())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> QueryRequest {
        QueryRequest {
            content: "What are the prices available?".to_string(),
            user_id: "user123".to_string(),
            app_id: "demo-app".to_string(),
        }
    }

    #[test]
    fn test_request_validation() {
        assert!(request().validate().is_ok());

        let mut r = request();
        r.content = " ".to_string();
        assert!(r.validate().is_err());

        let mut r = request();
        r.user_id = String::new();
        assert!(r.validate().is_err());

        let mut r = request();
        r.app_id = String::new();
        assert!(r.validate().is_err());
    }

    #[test]
    fn test_request_deserialization() {
        let json = r#"{"content": "prices?", "user_id": "u1", "app_id": "a1"}"#;
        let r: QueryRequest = serde_json::from_str(json).unwrap();
        assert_eq!(r.content, "prices?");
        assert_eq!(r.user_id, "u1");
        assert_eq!(r.app_id, "a1");

        // Missing required field
        let json = r#"{"content": "prices?"}"#;
        assert!(serde_json::from_str::<QueryRequest>(json).is_err());
    }

    #[test]
    fn test_response_envelope_shapes() {
        let ok = QueryResponse::from_outcome(PipelineOutcome::Answered(Answer {
            text: "The basic plan costs $10.".to_string(),
        }));
        let json = serde_json::to_value(&ok).unwrap();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["answer"], "The basic plan costs $10.");

        let no_data = QueryResponse::from_outcome(PipelineOutcome::NoData);
        let json = serde_json::to_value(&no_data).unwrap();
        assert_eq!(json["status"], "no_data");
        assert!(json["message"].as_str().unwrap().contains("No relevant data"));

        let err = QueryResponse::from_error(&Error::SchemaFilterFailed("bad json".to_string()));
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["error"], "Internal server error");
        assert!(json["details"].as_str().unwrap().contains("bad json"));
    }

    #[test]
    fn test_no_data_is_distinct_from_error() {
        let no_data = QueryResponse::from_outcome(PipelineOutcome::NoData);
        let err = QueryResponse::from_error(&Error::GraphExecutionFailed("x".to_string()));
        assert_ne!(
            serde_json::to_value(&no_data).unwrap()["status"],
            serde_json::to_value(&err).unwrap()["status"]
        );
    }
}
