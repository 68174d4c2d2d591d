//! Ingredient extraction from conversational input. A rule-based splitter
//! always runs first; the model pass refines it when the circuit breaker
//! allows, and the rules stand in whenever the model is unavailable or
//! returns nothing usable.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use tracing::{info, warn};

use crate::breaker::CircuitBreaker;
use crate::generation::{GenerateArgs, GenerationClient};
use crate::models::{ExtractReason, ExtractSource, IngredientExtraction};
use crate::normalize::normalize_ingredient_list;
use crate::prompts;

pub const MAX_INGREDIENTS: usize = 20;

static HARD_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[，,、；;。\n\s]+").expect("separator regex"));

/// Punctuation-level split plus canonicalization. This is both the candidate
/// pool shown to the model and the full fallback result.
pub fn rule_based_candidates(input_text: &str) -> Vec<String> {
    let parts: Vec<&str> = HARD_SEPARATORS
        .split(input_text)
        .filter(|p| !p.is_empty())
        .collect();
    let mut names = normalize_ingredient_list(&parts);
    names.truncate(MAX_INGREDIENTS);
    names
}

#[derive(Debug, Deserialize)]
struct ExtractShape {
    #[serde(default)]
    ingredients: Vec<String>,
}

pub struct IngredientExtractor {
    client: Arc<GenerationClient>,
    breaker: Arc<CircuitBreaker>,
    model: String,
}

impl IngredientExtractor {
    pub fn new(client: Arc<GenerationClient>, breaker: Arc<CircuitBreaker>, model: String) -> Self {
        Self {
            client,
            breaker,
            model,
        }
    }

    /// Extract a canonical ingredient list. `draft` is a caller-provided
    /// partial list merged into the candidates. Never fails: the rule-based
    /// result backs every model outcome.
    pub async fn extract(&self, input_text: &str, draft: &[String]) -> IngredientExtraction {
        let mut raw_candidates = rule_based_candidates(input_text);
        for name in normalize_ingredient_list(draft) {
            if !raw_candidates.contains(&name) {
                raw_candidates.push(name);
            }
        }
        raw_candidates.truncate(MAX_INGREDIENTS);

        if !self.breaker.try_acquire() {
            info!("extraction breaker open, using rule-based fallback");
            return IngredientExtraction {
                ingredients: raw_candidates.clone(),
                source: ExtractSource::RuleFallback,
                raw_candidates,
                reason: ExtractReason::BreakerOpen,
            };
        }

        let args = GenerateArgs::new(
            format!(
                "{}\n\n{}",
                prompts::SYSTEM_PROMPT_BASE,
                prompts::SYSTEM_PROMPT_INGREDIENT_EXTRACT
            ),
            prompts::build_extract_user_prompt(input_text, &raw_candidates),
            prompts::EXTRACT_TEMPLATE,
            self.model.clone(),
        )
        .retries(0);

        match self.client.generate_json::<ExtractShape>(&args).await {
            Ok(shape) => {
                let mut ingredients = normalize_ingredient_list(&shape.ingredients);
                ingredients.truncate(MAX_INGREDIENTS);
                if ingredients.is_empty() {
                    // Model answered but produced nothing usable. Counts
                    // against the breaker like a failure.
                    self.breaker.record_failure();
                    return IngredientExtraction {
                        ingredients: raw_candidates.clone(),
                        source: ExtractSource::RuleFallback,
                        raw_candidates,
                        reason: ExtractReason::ModelFailedFallback,
                    };
                }
                self.breaker.record_success();
                IngredientExtraction {
                    ingredients,
                    source: ExtractSource::Model,
                    raw_candidates,
                    reason: ExtractReason::ModelSuccess,
                }
            }
            Err(error) => {
                warn!(%error, "ingredient extraction model call failed");
                self.breaker.record_failure();
                IngredientExtraction {
                    ingredients: raw_candidates.clone(),
                    source: ExtractSource::RuleFallback,
                    raw_candidates,
                    reason: ExtractReason::ModelFailedFallback,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;
    use crate::breaker::BreakerState;
    use crate::testutil::ScriptedTransport;
    use serde_json::Value;
    use std::time::Duration;

    fn extractor(
        payloads: Vec<Result<Value, ApiConnectionError>>,
        breaker: Arc<CircuitBreaker>,
    ) -> IngredientExtractor {
        let transport = Arc::new(ScriptedTransport::new(payloads));
        IngredientExtractor::new(
            Arc::new(GenerationClient::new(transport)),
            breaker,
            "test-model".to_string(),
        )
    }

    fn breaker() -> Arc<CircuitBreaker> {
        Arc::new(CircuitBreaker::new(5, Duration::from_secs(600)))
    }

    #[test]
    fn rule_split_handles_punctuation_and_conjunctions() {
        let names = rule_based_candidates("我有西红柿、鸡蛋，还有葱花和大蒜");
        assert_eq!(
            names,
            vec![
                "西红柿".to_string(),
                "鸡蛋".to_string(),
                "小葱".to_string(),
                "大蒜".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn model_result_wins_when_available() {
        let payload = Value::String(r#"{"ingredients": ["番茄", "鸡子"]}"#.to_string());
        let ex = extractor(vec![Ok(payload)], breaker());
        let out = ex.extract("我买了点东西", &[]).await;
        assert_eq!(out.source, ExtractSource::Model);
        assert_eq!(out.reason, ExtractReason::ModelSuccess);
        // Model output still goes through canonicalization.
        assert_eq!(out.ingredients, vec!["西红柿".to_string(), "鸡蛋".to_string()]);
    }

    #[tokio::test]
    async fn model_failure_falls_back_to_rules() {
        let ex = extractor(vec![Err(ApiConnectionError::EmptyContent)], breaker());
        let out = ex.extract("土豆和牛肉", &[]).await;
        assert_eq!(out.source, ExtractSource::RuleFallback);
        assert_eq!(out.reason, ExtractReason::ModelFailedFallback);
        assert_eq!(out.ingredients, vec!["土豆".to_string(), "牛肉".to_string()]);
    }

    #[tokio::test]
    async fn empty_model_answer_counts_as_failure() {
        let payload = Value::String(r#"{"ingredients": []}"#.to_string());
        let b = Arc::new(CircuitBreaker::new(1, Duration::from_secs(600)));
        let ex = extractor(vec![Ok(payload)], b.clone());
        let out = ex.extract("土豆", &[]).await;
        assert_eq!(out.reason, ExtractReason::ModelFailedFallback);
        assert_eq!(out.ingredients, vec!["土豆".to_string()]);
        assert_eq!(b.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn open_breaker_skips_the_model_entirely() {
        let b = Arc::new(CircuitBreaker::new(1, Duration::from_secs(600)));
        b.record_failure();
        // A scripted success that must never be consumed.
        let payload = Value::String(r#"{"ingredients": ["牛肉"]}"#.to_string());
        let ex = extractor(vec![Ok(payload)], b);
        let out = ex.extract("土豆", &[]).await;
        assert_eq!(out.reason, ExtractReason::BreakerOpen);
        assert_eq!(out.ingredients, vec!["土豆".to_string()]);
    }

    #[tokio::test]
    async fn draft_items_merge_into_candidates() {
        let ex = extractor(vec![Err(ApiConnectionError::EmptyContent)], breaker());
        let out = ex
            .extract("我有土豆", &["番茄".to_string(), "土豆".to_string()])
            .await;
        // Draft entries are canonicalized and deduped against the split.
        assert_eq!(out.ingredients, vec!["土豆".to_string(), "西红柿".to_string()]);
    }

    #[tokio::test]
    async fn long_model_lists_are_capped() {
        let many: Vec<String> = (0..30).map(|i| format!("食材{i}号")).collect();
        let payload =
            Value::String(serde_json::json!({ "ingredients": many }).to_string());
        let ex = extractor(vec![Ok(payload)], breaker());
        let out = ex.extract("很多食材", &[]).await;
        assert!(out.ingredients.len() <= MAX_INGREDIENTS);
    }
}
