//! Neo4j graph gateway
//!
//! The pipeline talks to the graph engine through the [`GraphGateway`]
//! trait: run one parameterized read query, or run a batch of write
//! statements inside a single transaction. [`Neo4jGateway`] is the Bolt
//! implementation; tests substitute in-memory stubs.

use async_trait::async_trait;
use neo4rs::{query, Graph};
use serde::Serialize;
use tracing::{debug, error, warn};

use crate::config::GraphConfig;
use crate::error::{Error, Result};

/// Parameters bound into every executed query
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueryParams {
    pub user_id: String,
    pub app_id: String,
}

impl QueryParams {
    pub fn new(user_id: impl Into<String>, app_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            app_id: app_id.into(),
        }
    }
}

/// Gateway to the graph engine consumed by the pipeline
#[async_trait]
pub trait GraphGateway: Send + Sync {
    /// Execute a read query with bound parameters, returning one JSON object per row
    async fn run(&self, query_text: &str, params: &QueryParams) -> Result<Vec<serde_json::Value>>;

    /// Execute a batch of write statements within a single transaction
    ///
    /// Commits only if every statement succeeds; otherwise attempts rollback
    /// and reports both the original and any rollback failure.
    async fn run_all_in_tx(&self, statements: &[String], params: &QueryParams) -> Result<()>;

    /// Ensure the User and App nodes exist and are linked with MEMBER_OF
    async fn ensure_user_and_app(&self, params: &QueryParams) -> Result<()>;
}

/// Bolt-backed gateway to a Neo4j instance
pub struct Neo4jGateway {
    graph: Graph,
}

impl Neo4jGateway {
    /// Connect to Neo4j using the resolved graph configuration
    pub async fn connect(config: &GraphConfig) -> Result<Self> {
        let resolved = config.resolved();
        let password = resolved.password.ok_or_else(|| {
            Error::ConfigError("NEO4J_PASSWORD environment variable is not set".to_string())
        })?;

        let graph = Graph::new(&resolved.uri, &resolved.user, &password)
            .await
            .map_err(|e| Error::GraphExecutionFailed(format!("Connection failed: {}", e)))?;

        debug!(uri = %resolved.uri, user = %resolved.user, "Connected to Neo4j");

        Ok(Self { graph })
    }

    fn bind(query_text: &str, params: &QueryParams) -> neo4rs::Query {
        query(query_text)
            .param("user_id", params.user_id.clone())
            .param("app_id", params.app_id.clone())
    }
}

#[async_trait]
impl GraphGateway for Neo4jGateway {
    async fn run(&self, query_text: &str, params: &QueryParams) -> Result<Vec<serde_json::Value>> {
        debug!(user_id = %params.user_id, app_id = %params.app_id, "Executing graph query");

        let mut stream = self
            .graph
            .execute(Self::bind(query_text, params))
            .await
            .map_err(|e| Error::GraphExecutionFailed(e.to_string()))?;

        let mut records = Vec::new();
        loop {
            let row = stream
                .next()
                .await
                .map_err(|e| Error::GraphExecutionFailed(format!("Row fetch failed: {}", e)))?;
            match row {
                Some(row) => {
                    let record: serde_json::Value = row.to().map_err(|e| {
                        Error::GraphExecutionFailed(format!("Row mapping failed: {}", e))
                    })?;
                    records.push(record);
                }
                None => break,
            }
        }

        debug!(records = records.len(), "Graph query returned");
        Ok(records)
    }

    async fn run_all_in_tx(&self, statements: &[String], params: &QueryParams) -> Result<()> {
        let mut txn = self
            .graph
            .start_txn()
            .await
            .map_err(|e| Error::GraphExecutionFailed(format!("Failed to open transaction: {}", e)))?;

        for statement in statements {
            if let Err(e) = txn.run(Self::bind(statement, params)).await {
                error!(error = %e, "Statement failed, rolling back transaction");
                return match txn.rollback().await {
                    Ok(()) => Err(Error::GraphExecutionFailed(format!(
                        "Statement failed (rolled back): {}",
                        e
                    ))),
                    Err(rollback_err) => {
                        warn!(error = %rollback_err, "Rollback failed");
                        Err(Error::GraphExecutionFailed(format!(
                            "Statement failed: {}; rollback also failed: {}",
                            e, rollback_err
                        )))
                    }
                };
            }
        }

        txn.commit()
            .await
            .map_err(|e| Error::GraphExecutionFailed(format!("Commit failed: {}", e)))
    }

    async fn ensure_user_and_app(&self, params: &QueryParams) -> Result<()> {
        let statement = "MERGE (user:User {id: $user_id}) \
                         MERGE (app:App {id: $app_id}) \
                         MERGE (user)-[:MEMBER_OF]->(app)";

        self.graph
            .run(Self::bind(statement, params))
            .await
            .map_err(|e| Error::GraphExecutionFailed(format!("User/App bootstrap failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_params() {
        let params = QueryParams::new("user123", "app456");
        assert_eq!(params.user_id, "user123");
        assert_eq!(params.app_id, "app456");
    }

    #[test]
    fn test_query_params_serialize() {
        let params = QueryParams::new("user123", "app456");
        let json = serde_json::to_value(&params).unwrap();
        assert_eq!(json["user_id"], "user123");
        assert_eq!(json["app_id"], "app456");
    }
}
