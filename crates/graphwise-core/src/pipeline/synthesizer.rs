//! Query Synthesizer stage
//!
//! Turns the filtered schema plus the question into one executable,
//! ownership-scoped Cypher query. Generation is delegated; the structural
//! constraints (one MATCH, one WHERE, single line, label-based filtering
//! only) are re-validated here because the generator is not trusted to
//! respect the constraints it was asked to follow.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::graph::QueryParams;
use crate::llm::{GenerationOptions, TextGenerator};

use super::filter::FilteredSchema;

/// Token budget for the synthesis completion
const SYNTHESIS_MAX_TOKENS: usize = 1000;

/// Cap on distinct entity/relation types referenced in the query
const MAX_SCHEMA_TYPES: usize = 6;

/// An executable, ownership-scoped graph query with its bound parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedQuery {
    pub text: String,
    pub params: QueryParams,
}

/// Query Synthesizer stage
#[derive(Clone)]
pub struct QuerySynthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl QuerySynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Synthesize one executable query from the filtered schema and question
    pub async fn synthesize(
        &self,
        question: &str,
        filtered: &FilteredSchema,
        params: &QueryParams,
    ) -> Result<SynthesizedQuery> {
        let prompt = build_synthesis_prompt(question, filtered, params);

        let output = self
            .generator
            .generate(&prompt, GenerationOptions::structured(SYNTHESIS_MAX_TOKENS))
            .await
            .map_err(|e| match e {
                Error::LlmError(msg) => Error::QuerySynthesisFailed(msg),
                other => other,
            })?;

        let value = output.as_structured().ok_or_else(|| {
            Error::QuerySynthesisFailed("Generator returned raw text".to_string())
        })?;

        let response: SynthesisResponse = serde_json::from_value(value.clone())
            .map_err(|e| Error::QuerySynthesisFailed(format!("Malformed response: {}", e)))?;

        let text = response.cypher.trim().to_string();
        validate_query_structure(&text)?;

        info!(query = %text, "Query synthesized");

        Ok(SynthesizedQuery {
            text,
            params: params.clone(),
        })
    }
}

/// Raw structured response from the generator
#[derive(Debug, Deserialize)]
struct SynthesisResponse {
    cypher: String,
}

/// Reject queries that violate the execution contract
fn validate_query_structure(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(Error::QuerySynthesisFailed(
            "Generated query is empty".to_string(),
        ));
    }
    if text.contains('\n') {
        return Err(Error::QuerySynthesisFailed(
            "Generated query spans multiple lines".to_string(),
        ));
    }

    let matches = count_keyword(text, "MATCH");
    if matches != 1 {
        return Err(Error::QuerySynthesisFailed(format!(
            "Generated query has {} MATCH clauses, expected exactly 1",
            matches
        )));
    }

    let wheres = count_top_level_keyword(text, "WHERE");
    if wheres != 1 {
        return Err(Error::QuerySynthesisFailed(format!(
            "Generated query has {} WHERE clauses, expected exactly 1",
            wheres
        )));
    }

    debug!("Query structure validated");
    Ok(())
}

/// Count word-boundary occurrences of a Cypher keyword, case-insensitively
fn count_keyword(text: &str, keyword: &str) -> usize {
    let upper = text.to_uppercase();
    let keyword = keyword.to_uppercase();
    let bytes = upper.as_bytes();

    upper
        .match_indices(&keyword)
        .filter(|(idx, _)| {
            let before_ok = *idx == 0 || !bytes[idx - 1].is_ascii_alphanumeric();
            let after = idx + keyword.len();
            let after_ok = after >= bytes.len() || !bytes[after].is_ascii_alphanumeric();
            before_ok && after_ok
        })
        .count()
}

/// Count word-boundary occurrences of a Cypher keyword at parenthesis depth
/// zero. A WHERE inside a list predicate such as
/// `any(label IN [...] WHERE label IN labels(entity))` belongs to the
/// predicate, not the clause structure of the query.
fn count_top_level_keyword(text: &str, keyword: &str) -> usize {
    let upper = text.to_uppercase();
    let keyword = keyword.to_uppercase();
    let bytes = upper.as_bytes();
    let keyword_bytes = keyword.as_bytes();

    let mut depth: usize = 0;
    let mut count = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => depth = depth.saturating_sub(1),
            _ if depth == 0 && bytes[i..].starts_with(keyword_bytes) => {
                let before_ok = i == 0 || !bytes[i - 1].is_ascii_alphanumeric();
                let after = i + keyword_bytes.len();
                let after_ok = after >= bytes.len() || !bytes[after].is_ascii_alphanumeric();
                if before_ok && after_ok {
                    count += 1;
                    i = after;
                    continue;
                }
            }
            _ => {}
        }
        i += 1;
    }
    count
}

/// Build the fixed synthesis prompt from the filtered schema and question
fn build_synthesis_prompt(question: &str, filtered: &FilteredSchema, params: &QueryParams) -> String {
    format!(
        r#"You are an expert in data extraction and Cypher query generation for Neo4j knowledge graphs. Your task is to process the JSON input and generate a MATCH Cypher query to retrieve nodes and relationships from the knowledge graph, adhering to the following instructions:

1. Input JSON Structure:
   {{
     "content": {question},
     "user_id": {user_id},
     "app_id": {app_id},
     "include_nodes": {entities},
     "relations": {relations}
   }}

2. Use the rules from the relation_rules field to determine the valid relationships between nodes:
   {rules}

3. Query Structure:
   - Use MATCH to retrieve nodes and relationships.
   - Ensure that all retrieved entities are directly or indirectly OWNED_BY the user.
   - Use placeholders $user_id and $app_id for parameters; never inline their values.
   - Always RETURN data; never emit a standalone MATCH.

4. Constraints:
   - Use only the node entities and relations required to answer the query, at most {max_types} distinct types.
   - Use the wildcard * wherever the exact type is not constrained.
   - The query must be a single MATCH statement on a single line without newlines; do not concatenate multiple MATCH statements.
   - The query must have exactly one MATCH and exactly one WHERE. Do not encode relation rules in the query; filter by label only, following this pattern:
     MATCH (entity)-[:OWNED_BY]->(user:User {{id: $user_id}}) WHERE any(label IN {entities} WHERE label IN labels(entity)) RETURN entity

5. Output Format (respond with the JSON object only, no prefix or code fences):
   {{
     "cypher": "Generated Cypher query as a string"
   }}

Process the input and generate the MATCH Cypher query as per the instructions."#,
        question = serde_json::to_string(question).unwrap_or_default(),
        user_id = serde_json::to_string(&params.user_id).unwrap_or_default(),
        app_id = serde_json::to_string(&params.app_id).unwrap_or_default(),
        entities = serde_json::to_string(&filtered.entities).unwrap_or_default(),
        relations = serde_json::to_string(&filtered.relations).unwrap_or_default(),
        rules = serde_json::to_string(&filtered.rules).unwrap_or_default(),
        max_types = MAX_SCHEMA_TYPES,
    )
}
