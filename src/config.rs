use std::env;
use std::path::PathBuf;
use std::time::Duration;

use dotenv::dotenv;

use crate::error::CoreError;

/// Which transport shape the provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStyle {
    /// Structured "responses" call; payload is scanned recursively for text.
    Responses,
    /// Plain chat-completion call; payload is the first choice's content.
    Chat,
}

const DEFAULT_BASE_URL: &str = "https://ark.cn-beijing.volces.com/api/v3";
const DEFAULT_MODEL: &str = "doubao-seed-2-0-pro-260215";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub recommend_model: Option<String>,
    pub websearch_model: Option<String>,
    pub extract_model: Option<String>,
    pub api_style: ApiStyle,
    pub corpus_index_path: PathBuf,
    pub recommend_cache_ttl: Duration,
    pub recipe_cache_ttl: Duration,
    pub image_cache_ttl: Duration,
    pub extract_cache_ttl: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_cooldown: Duration,
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn seconds(name: &str, default_secs: u64) -> Duration {
    let secs = optional(name)
        .and_then(|v| v.parse::<u64>().ok())
        .filter(|v| *v > 0)
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

impl AppConfig {
    /// Gather configuration from the environment (`.env` honored).
    pub fn from_env() -> Result<Self, CoreError> {
        dotenv().ok();

        let api_key = optional("OPENAI_API_KEY")
            .ok_or_else(|| CoreError::Validation("OPENAI_API_KEY is not set".to_string()))?;

        let api_style = match optional("OPENAI_API_STYLE").as_deref() {
            Some("chat") => ApiStyle::Chat,
            _ => ApiStyle::Responses,
        };

        Ok(Self {
            api_key,
            base_url: optional("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: optional("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            recommend_model: optional("OPENAI_RECOMMEND_MODEL"),
            websearch_model: optional("OPENAI_RECIPE_WEBSEARCH_MODEL"),
            extract_model: optional("OPENAI_EXTRACT_MODEL"),
            api_style,
            corpus_index_path: optional("CORPUS_INDEX_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/howtocook-index.json")),
            recommend_cache_ttl: seconds("RECOMMEND_CACHE_TTL_SEC", 600),
            recipe_cache_ttl: seconds("RECIPE_CACHE_TTL_SEC", 600),
            image_cache_ttl: seconds("IMAGE_CACHE_TTL_SEC", 6 * 3600),
            extract_cache_ttl: seconds("EXTRACT_CACHE_TTL_SEC", 30 * 60),
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(10 * 60),
        })
    }

    /// Model used for recommendation generation.
    pub fn recommend_model(&self) -> &str {
        self.recommend_model.as_deref().unwrap_or(&self.model)
    }

    /// Model used for web-search-grounded recipe generation.
    pub fn websearch_model(&self) -> &str {
        self.websearch_model
            .as_deref()
            .or(self.recommend_model.as_deref())
            .unwrap_or(&self.model)
    }

    /// Model used for ingredient extraction.
    pub fn extract_model(&self) -> &str {
        self.extract_model.as_deref().unwrap_or(&self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_routing_falls_back_to_default() {
        let cfg = AppConfig {
            api_key: "k".into(),
            base_url: DEFAULT_BASE_URL.into(),
            model: "base".into(),
            recommend_model: None,
            websearch_model: None,
            extract_model: Some("fast".into()),
            api_style: ApiStyle::Chat,
            corpus_index_path: PathBuf::from("x.json"),
            recommend_cache_ttl: Duration::from_secs(600),
            recipe_cache_ttl: Duration::from_secs(600),
            image_cache_ttl: Duration::from_secs(21600),
            extract_cache_ttl: Duration::from_secs(1800),
            breaker_failure_threshold: 5,
            breaker_cooldown: Duration::from_secs(600),
        };
        assert_eq!(cfg.recommend_model(), "base");
        assert_eq!(cfg.websearch_model(), "base");
        assert_eq!(cfg.extract_model(), "fast");
    }
}
