//! Constraint extraction from free-text shopping requirements.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use trusty_core::domain::constraint::ConstraintSet;

use crate::llm::LlmClient;

/// Extraction failure. Absorbed by the coordinator into the fallback
/// constraint path; this error never reaches an API caller.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("llm call failed: {0}")]
    Llm(String),
    #[error("llm response was not a valid constraint set: {0}")]
    Parse(String),
}

#[async_trait]
pub trait ConstraintExtractor: Send + Sync {
    async fn extract(&self, requirements: &str) -> Result<ConstraintSet, ExtractionError>;
}

pub struct LlmConstraintExtractor {
    llm: Arc<dyn LlmClient>,
}

const EXTRACTION_PROMPT: &str = "Extract purchase constraints from the shopping request below. \
Respond with a single JSON object and nothing else, using exactly these keys: \
\"max_price\" (number), \"categories\" (array of lowercase strings), \
\"preferences\" (object of string to string).\n\nShopping request:\n";

impl LlmConstraintExtractor {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl ConstraintExtractor for LlmConstraintExtractor {
    async fn extract(&self, requirements: &str) -> Result<ConstraintSet, ExtractionError> {
        let prompt = format!("{EXTRACTION_PROMPT}{requirements}");
        let response = self
            .llm
            .complete(&prompt)
            .await
            .map_err(|error| ExtractionError::Llm(error.to_string()))?;

        parse_constraint_json(&response)
    }
}

/// Tolerates a fenced code block around the JSON, a habit chat models
/// keep regardless of instructions.
fn parse_constraint_json(response: &str) -> Result<ConstraintSet, ExtractionError> {
    let trimmed = response.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```"))
        .unwrap_or(trimmed)
        .trim();

    let set: ConstraintSet =
        serde_json::from_str(body).map_err(|error| ExtractionError::Parse(error.to_string()))?;

    if set.categories.is_empty() {
        return Err(ExtractionError::Parse("categories must not be empty".to_string()));
    }
    if set.max_price.is_sign_negative() || set.max_price.is_zero() {
        return Err(ExtractionError::Parse("max_price must be positive".to_string()));
    }
    Ok(set)
}

/// Deterministic stand-in returning a fixed constraint set.
pub struct StaticExtractor {
    constraints: ConstraintSet,
}

impl StaticExtractor {
    pub fn new(constraints: ConstraintSet) -> Self {
        Self { constraints }
    }
}

#[async_trait]
impl ConstraintExtractor for StaticExtractor {
    async fn extract(&self, _requirements: &str) -> Result<ConstraintSet, ExtractionError> {
        Ok(self.constraints.clone())
    }
}

/// Deterministic stand-in that always fails, for exercising the fallback path.
#[derive(Default)]
pub struct UnavailableExtractor;

#[async_trait]
impl ConstraintExtractor for UnavailableExtractor {
    async fn extract(&self, _requirements: &str) -> Result<ConstraintSet, ExtractionError> {
        Err(ExtractionError::Llm("extractor unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use rust_decimal::Decimal;

    use crate::llm::LlmClient;

    use super::{parse_constraint_json, ConstraintExtractor, ExtractionError, LlmConstraintExtractor};

    struct CannedLlm(&'static str);

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct BrokenLlm;

    #[async_trait]
    impl LlmClient for BrokenLlm {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Err(anyhow!("connection refused"))
        }
    }

    #[tokio::test]
    async fn extracts_constraints_from_plain_json() {
        let extractor = LlmConstraintExtractor::new(Arc::new(CannedLlm(
            r#"{"max_price": 800, "categories": ["electronics"], "preferences": {"brand": "sony"}}"#,
        )));

        let set = extractor.extract("a 4k monitor under $800").await.expect("extract");
        assert_eq!(set.max_price, Decimal::new(800, 0));
        assert_eq!(set.categories, vec!["electronics".to_string()]);
        assert_eq!(set.preferences.get("brand").map(String::as_str), Some("sony"));
    }

    #[tokio::test]
    async fn tolerates_fenced_json_response() {
        let extractor = LlmConstraintExtractor::new(Arc::new(CannedLlm(
            "```json\n{\"max_price\": 300, \"categories\": [\"furniture\"]}\n```",
        )));

        let set = extractor.extract("a gaming chair").await.expect("extract");
        assert_eq!(set.max_price, Decimal::new(300, 0));
    }

    #[tokio::test]
    async fn llm_transport_failure_is_an_extraction_error() {
        let extractor = LlmConstraintExtractor::new(Arc::new(BrokenLlm));
        let error = extractor.extract("anything").await.expect_err("must fail");
        assert!(matches!(error, ExtractionError::Llm(_)));
    }

    #[test]
    fn prose_response_is_a_parse_error() {
        let error = parse_constraint_json("Sure! Here are the constraints you asked for...")
            .expect_err("prose is not json");
        assert!(matches!(error, ExtractionError::Parse(_)));
    }

    #[test]
    fn empty_categories_are_rejected() {
        let error = parse_constraint_json(r#"{"max_price": 100, "categories": []}"#)
            .expect_err("empty categories");
        assert!(matches!(error, ExtractionError::Parse(_)));
    }

    #[test]
    fn non_positive_max_price_is_rejected() {
        let error = parse_constraint_json(r#"{"max_price": 0, "categories": ["misc"]}"#)
            .expect_err("zero max price");
        assert!(matches!(error, ExtractionError::Parse(_)));
    }
}
