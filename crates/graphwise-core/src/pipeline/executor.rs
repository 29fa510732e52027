//! Query Executor & Validator stage
//!
//! Runs the synthesized query against the graph gateway and rejects empty
//! results before they reach answer synthesis. An execution error aborts the
//! pipeline with no retry of query synthesis; zero records is a normal,
//! expected control-flow branch distinct from failure.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::Result;
use crate::graph::GraphGateway;

use super::synthesizer::SynthesizedQuery;

/// Outcome of executing a synthesized query
#[derive(Debug, Clone)]
pub enum Execution {
    /// Non-empty, ordered records retrieved from the graph
    Retrieved(Vec<serde_json::Value>),
    /// The query was valid but nothing matched
    NoData,
}

/// Query Executor & Validator stage
#[derive(Clone)]
pub struct QueryExecutor {
    gateway: Arc<dyn GraphGateway>,
}

impl QueryExecutor {
    pub fn new(gateway: Arc<dyn GraphGateway>) -> Self {
        Self { gateway }
    }

    /// Execute the query and validate the result set
    pub async fn execute(&self, query: &SynthesizedQuery) -> Result<Execution> {
        debug!(query = %query.text, "Executing synthesized query");

        let records = self.gateway.run(&query.text, &query.params).await?;

        if records.is_empty() {
            info!("Query executed but matched no records");
            return Ok(Execution::NoData);
        }

        info!(records = records.len(), "Records retrieved");
        Ok(Execution::Retrieved(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::graph::QueryParams;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubGateway {
        records: Result<Vec<serde_json::Value>>,
    }

    #[async_trait]
    impl GraphGateway for StubGateway {
        async fn run(
            &self,
            _query_text: &str,
            _params: &QueryParams,
        ) -> Result<Vec<serde_json::Value>> {
            match &self.records {
                Ok(records) => Ok(records.clone()),
                Err(_) => Err(Error::GraphExecutionFailed("boom".to_string())),
            }
        }

        async fn run_all_in_tx(
            &self,
            _statements: &[String],
            _params: &QueryParams,
        ) -> Result<()> {
            Ok(())
        }

        async fn ensure_user_and_app(&self, _params: &QueryParams) -> Result<()> {
            Ok(())
        }
    }

    fn query() -> SynthesizedQuery {
        SynthesizedQuery {
            text: "MATCH (e)-[:OWNED_BY]->(u:User {id: $user_id}) WHERE e:Pricing RETURN e"
                .to_string(),
            params: QueryParams::new("user123", "app456"),
        }
    }

    #[tokio::test]
    async fn test_non_empty_records_retrieved() {
        let executor = QueryExecutor::new(Arc::new(StubGateway {
            records: Ok(vec![json!({"entity": {"plan": "basic", "price": 10}})]),
        }));

        match executor.execute(&query()).await.unwrap() {
            Execution::Retrieved(records) => assert_eq!(records.len(), 1),
            Execution::NoData => panic!("expected records"),
        }
    }

    #[tokio::test]
    async fn test_zero_records_is_no_data_not_error() {
        let executor = QueryExecutor::new(Arc::new(StubGateway { records: Ok(vec![]) }));

        match executor.execute(&query()).await.unwrap() {
            Execution::NoData => {}
            Execution::Retrieved(_) => panic!("expected no data"),
        }
    }

    #[tokio::test]
    async fn test_gateway_error_propagates() {
        let executor = QueryExecutor::new(Arc::new(StubGateway {
            records: Err(Error::GraphExecutionFailed("boom".to_string())),
        }));

        let err = executor.execute(&query()).await.unwrap_err();
        assert!(matches!(err, Error::GraphExecutionFailed(_)));
    }
}
