//! Answer Synthesizer stage
//!
//! Turns the retrieved records plus the original question into a grounded
//! natural-language answer. The prompt confines the generator to the supplied
//! records; this stage is the final gate before a response is returned, so an
//! absent or empty answer fails the request rather than being papered over
//! with a generic fallback.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::error::{Error, Result};
use crate::llm::{GenerationOptions, TextGenerator};

/// Token budget for the answer completion
const ANSWER_MAX_TOKENS: usize = 1500;

/// A grounded natural-language answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Answer {
    pub text: String,
}

/// Answer Synthesizer stage
#[derive(Clone)]
pub struct AnswerSynthesizer {
    generator: Arc<dyn TextGenerator>,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator }
    }

    /// Synthesize an answer from the question and the retrieved records.
    /// The caller guarantees `records` is non-empty.
    pub async fn synthesize(
        &self,
        question: &str,
        records: &[serde_json::Value],
    ) -> Result<Answer> {
        let prompt = build_answer_prompt(question, records);

        let output = self
            .generator
            .generate(&prompt, GenerationOptions::structured(ANSWER_MAX_TOKENS))
            .await
            .map_err(|e| match e {
                Error::LlmError(msg) => Error::AnswerSynthesisFailed(msg),
                other => other,
            })?;

        let value = output.as_structured().ok_or_else(|| {
            Error::AnswerSynthesisFailed("Generator returned raw text".to_string())
        })?;

        let response: AnswerResponse = serde_json::from_value(value.clone())
            .map_err(|e| Error::AnswerSynthesisFailed(format!("Malformed response: {}", e)))?;

        let text = response.answer.trim().to_string();
        if text.is_empty() {
            return Err(Error::AnswerSynthesisFailed(
                "Generator returned an empty answer".to_string(),
            ));
        }

        info!(chars = text.len(), "Answer synthesized");
        Ok(Answer { text })
    }
}

/// Raw structured response from the generator
#[derive(Debug, Deserialize)]
struct AnswerResponse {
    answer: String,
}

/// Build the fixed answering prompt from the question and serialized records
fn build_answer_prompt(question: &str, records: &[serde_json::Value]) -> String {
    format!(
        r#"You are an expert in answering queries based on retrieved knowledge graph data. Based on the user's query and the retrieved data, generate a concise and accurate answer:

1. User Query: {question}
2. Retrieved Data: {records}
3. The app is not a knowledge graph; the app is related to the retrieved data.

Output Format (respond with the JSON object only, no prefix or code fences):
{{
  "answer": "Generated answer using provided data"
}}

Ensure the answer only uses the provided retrieved data. Do not infer or fabricate information."#,
        question = serde_json::to_string(question).unwrap_or_default(),
        records = serde_json::to_string(records).unwrap_or_default(),
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

    fn records() -> Vec<serde_json::Value> {
        vec![json!({"entity": {"plan": "basic", "price": 10}})]
    }

    #[tokio::test]
    async fn test_synthesize_answer() {
        let stub = Arc::new(StubGenerator {
            response: json!({"answer": "The basic plan costs $10."}),
        });

        let synthesizer = AnswerSynthesizer::new(stub);
        let answer = synthesizer
            .synthesize("What are the prices available?", &records())
            .await
            .unwrap();

        assert_eq!(answer.text, "The basic plan costs $10.");
    }

    #[tokio::test]
    async fn test_missing_answer_field_fails() {
        let stub = Arc::new(StubGenerator {
            response: json!({"response": "nope"}),
        });

        let synthesizer = AnswerSynthesizer::new(stub);
        let err = synthesizer.synthesize("q", &records()).await.unwrap_err();
        assert!(matches!(err, Error::AnswerSynthesisFailed(_)));
    }

    #[tokio::test]
    async fn test_empty_answer_fails() {
        let stub = Arc::new(StubGenerator {
            response: json!({"answer": "   "}),
        });

        let synthesizer = AnswerSynthesizer::new(stub);
        let err = synthesizer.synthesize("q", &records()).await.unwrap_err();
        assert!(matches!(err, Error::AnswerSynthesisFailed(_)));
    }

    #[test]
    fn test_prompt_embeds_question_and_records() {
        let prompt = build_answer_prompt("What are the prices available?", &records());
        assert!(prompt.contains("What are the prices available?"));
        assert!(prompt.contains("\"price\":10"));
        assert!(prompt.contains("Do not infer or fabricate"));
    }
}
