//! Schema Filter stage
//!
//! Narrows the tenant's full schema to the minimal subset relevant to one
//! question. The relevance judgment is delegated to the text generator; this
//! stage owns prompt construction, response parsing, and whitelist
//! enforcement. The generator can hallucinate labels outside the tenant's
//! declared schema, so every returned label is checked against the allowed
//! sets and dropped if absent, and rules are re-derived from the tenant's own
//! declarations rather than trusted from the response.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::llm::{GenerationOptions, TextGenerator};
use crate::tenant::{RelationRule, TenantSchema};

/// Token budget for the filtering completion
const FILTER_MAX_TOKENS: usize = 1000;

/// The subset of a tenant schema judged relevant to one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredSchema {
    pub entities: Vec<String>,
    pub relations: Vec<String>,
    pub rules: BTreeMap<String, RelationRule>,
}

impl FilteredSchema {
    /// True when filtering found nothing relevant to the question
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.relations.is_empty()
    }
}

/// Schema Filter stage
#[derive(Clone)]
pub struct SchemaFilter {
    generator: Arc<dyn TextGenerator>,
}

impl SchemaFilter {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Reduce the tenant schema to the subset relevant to the question
    pub async fn filter(&self, question: &str, schema: &TenantSchema) -> Result<FilteredSchema> {
        let prompt = build_filter_prompt(question, schema);

        let output = self
            .generator
            .generate(&prompt, GenerationOptions::structured(FILTER_MAX_TOKENS))
            .await
            .map_err(|e| match e {
                Error::LlmError(msg) => Error::SchemaFilterFailed(msg),
                other => other,
            })?;

        let value = output
            .as_structured()
            .ok_or_else(|| Error::SchemaFilterFailed("Generator returned raw text".to_string()))?;

        let response: FilterResponse = serde_json::from_value(value.clone())
            .map_err(|e| Error::SchemaFilterFailed(format!("Malformed response: {}", e)))?;

        let filtered = enforce_whitelist(response, schema);

        info!(
            entities = filtered.entities.len(),
            relations = filtered.relations.len(),
            "Schema filtered"
        );

        Ok(filtered)
    }
}

/// Raw structured response from the generator. All three fields are required;
/// a missing field is a stage failure, never an implicit empty schema.
#[derive(Debug, Deserialize)]
struct FilterResponse {
    filtered_entities: Vec<String>,
    filtered_relations: Vec<String>,
    #[allow(dead_code)]
    filtered_rules: BTreeMap<String, RelationRule>,
}

/// Drop any generated label not present in the tenant's declared schema, and
/// restrict rules to the surviving relations using the tenant's own rule
/// declarations.
fn enforce_whitelist(response: FilterResponse, schema: &TenantSchema) -> FilteredSchema {
    let mut entities = Vec::new();
    for label in response.filtered_entities {
        if schema.allows_entity(&label) {
            if !entities.contains(&label) {
                entities.push(label);
            }
        } else {
            warn!(label = %label, "Dropping entity label outside tenant schema");
        }
    }

    let mut relations = Vec::new();
    for label in response.filtered_relations {
        if schema.allows_relation(&label) {
            if !relations.contains(&label) {
                relations.push(label);
            }
        } else {
            warn!(label = %label, "Dropping relation label outside tenant schema");
        }
    }

    let rules: BTreeMap<String, RelationRule> = relations
        .iter()
        .filter_map(|relation| {
            schema
                .relation_rules
                .get(relation)
                .map(|rule| (relation.clone(), rule.clone()))
        })
        .collect();

    debug!(
        entities = ?entities,
        relations = ?relations,
        "Whitelist enforced on filtered schema"
    );

    FilteredSchema {
        entities,
        relations,
        rules,
    }
}

/// Build the fixed filtering prompt from the question and the full schema
fn build_filter_prompt(question: &str, schema: &TenantSchema) -> String {
    format!(
        r#"You are an expert in knowledge graph query generation and data filtering. Your task is to process the input JSON and filter the entities, relationships, and rules relevant to the user's query.

1. Input JSON Structure:
   {{
     "content": {question},
     "entities_allowed": {entities},
     "relations_allowed": {relations},
     "relation_rules": {rules}
   }}

2. Goal:
   - Filter and return only the entities, relationships, and rules that are most closely related to the user's query (`content`).
   - Identify the user's intent by analyzing the query, then select only the entities and relationships directly related to that intent.
   - Ensure the output contains the minimal but sufficient set of entities, relations, and rules to answer the query.

3. Output JSON Structure (respond with the JSON object only, no prefix or code fences):
   {{
     "filtered_entities": ["RelevantEntity1", "RelevantEntity2"],
     "filtered_relations": ["RelevantRelation1"],
     "filtered_rules": {{
       "RelevantRelation1": {{ "from": "Entity1", "to": "Entity2" }}
     }}
   }}

4. Example Input:
   Query: "What are the prices available?"
   Entities Allowed: ["Pricing", "Product", "TargetAudience", "Review"]
   Relations Allowed: ["HAS_PRICING", "TARGETS", "HAS_REVIEW"]
   Rules: {{
     "HAS_PRICING": {{ "from": "Product", "to": "Pricing" }},
     "TARGETS": {{ "from": "Pricing", "to": "TargetAudience" }},
     "HAS_REVIEW": {{ "from": "Product", "to": "Review" }}
   }}

5. Example Output:
   {{
     "filtered_entities": ["Pricing"],
     "filtered_relations": ["HAS_PRICING"],
     "filtered_rules": {{
       "HAS_PRICING": {{ "from": "Product", "to": "Pricing" }}
     }}
   }}

Process the input, analyze the query, and generate the filtered output as per the structure above."#,
        question = serde_json::to_string(question).unwrap_or_default(),
        entities = serde_json::to_string(&schema.entities_allowed).unwrap_or_default(),
        relations = serde_json::to_string(&schema.relations_allowed).unwrap_or_default(),
        rules = serde_json::to_string(&schema.relation_rules).unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::GeneratedOutput;
    use async_trait::async_trait;
    use serde_json::json;

    struct StubGenerator {
        response: serde_json::Value,
    }

    #[async_trait]
    impl TextGenerator for StubGenerator {
        async fn generate(
            &self,
            _prompt: &str,
            _options: GenerationOptions,
        ) -> Result<GeneratedOutput> {
            Ok(GeneratedOutput::Structured(self.response.clone()))
        }
    }

    fn pricing_schema() -> TenantSchema {
        let mut rules = BTreeMap::new();
        rules.insert(
            "HAS_PRICING".to_string(),
            RelationRule {
                from: "Product".to_string(),
                to: "Pricing".to_string(),
            },
        );
        TenantSchema {
            entities_allowed: vec!["Pricing".to_string(), "Product".to_string()],
            relations_allowed: vec!["HAS_PRICING".to_string()],
            relation_rules: rules,
        }
    }

    #[tokio::test]
    async fn test_filter_happy_path() {
        let stub = Arc::new(StubGenerator {
            response: json!({
                "filtered_entities": ["Pricing"],
                "filtered_relations": ["HAS_PRICING"],
                "filtered_rules": {"HAS_PRICING": {"from": "Product", "to": "Pricing"}}
            }),
        });

        let filter = SchemaFilter::new(stub);
        let filtered = filter
            .filter("What are the prices available?", &pricing_schema())
            .await
            .unwrap();

        assert_eq!(filtered.entities, vec!["Pricing"]);
        assert_eq!(filtered.relations, vec!["HAS_PRICING"]);
        assert!(filtered.rules.contains_key("HAS_PRICING"));
    }

    #[tokio::test]
    async fn test_hallucinated_labels_are_dropped() {
        let stub = Arc::new(StubGenerator {
            response: json!({
                "filtered_entities": ["Pricing", "Weather", "Pricing"],
                "filtered_relations": ["HAS_PRICING", "HAS_WEATHER"],
                "filtered_rules": {"HAS_WEATHER": {"from": "Sky", "to": "Weather"}}
            }),
        });

        let filter = SchemaFilter::new(stub);
        let schema = pricing_schema();
        let filtered = filter.filter("anything", &schema).await.unwrap();

        // No schema leakage: every surviving label is tenant-declared
        assert_eq!(filtered.entities, vec!["Pricing"]);
        assert_eq!(filtered.relations, vec!["HAS_PRICING"]);
        for label in &filtered.entities {
            assert!(schema.allows_entity(label));
        }
        for label in &filtered.relations {
            assert!(schema.allows_relation(label));
        }
        // Rules come from the tenant declaration, not the response
        assert_eq!(
            filtered.rules.get("HAS_PRICING"),
            schema.relation_rules.get("HAS_PRICING")
        );
        assert!(!filtered.rules.contains_key("HAS_WEATHER"));
    }

    #[tokio::test]
    async fn test_missing_field_fails_stage() {
        let stub = Arc::new(StubGenerator {
            response: json!({"filtered_entities": ["Pricing"]}),
        });

        let filter = SchemaFilter::new(stub);
        let err = filter
            .filter("anything", &pricing_schema())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SchemaFilterFailed(_)));
    }

    #[tokio::test]
    async fn test_irrelevant_question_yields_empty_schema() {
        let stub = Arc::new(StubGenerator {
            response: json!({
                "filtered_entities": [],
                "filtered_relations": [],
                "filtered_rules": {}
            }),
        });

        let filter = SchemaFilter::new(stub);
        let filtered = filter
            .filter("Tell me about the weather", &pricing_schema())
            .await
            .unwrap();

        assert!(filtered.is_empty());
    }

    #[test]
    fn test_prompt_embeds_question_and_schema() {
        let prompt = build_filter_prompt("What are the prices available?", &pricing_schema());
        assert!(prompt.contains("What are the prices available?"));
        assert!(prompt.contains("\"HAS_PRICING\""));
        assert!(prompt.contains("filtered_entities"));
    }
}
