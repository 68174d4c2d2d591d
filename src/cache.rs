//! In-memory cache tiers keyed by content hashes of the normalized request.
//!
//! Keys must be stable across equivalent requests (owned-ingredient order
//! does not matter) and distinct across different ones, so every field is
//! normalized before hashing.

use std::time::Duration;

use moka::sync::Cache;
use sha2::{Digest, Sha256};

use crate::config::AppConfig;
use crate::models::{IngredientExtraction, RecipeDetail, RecommendOutcome, SourceType};
use crate::normalize::normalize_ingredient_name;

const MAX_ENTRIES: u64 = 1000;

fn hash_parts(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("__").as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Casing and whitespace never change the meaning of a request, so neither
/// may change its key.
fn normalize_request_text(input: &str) -> String {
    input
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

fn owned_fingerprint(owned: &[String]) -> String {
    let mut names: Vec<String> = owned
        .iter()
        .map(|name| normalize_ingredient_name(name))
        .filter(|name| !name.is_empty())
        .collect();
    names.sort();
    names.dedup();
    names.join("|")
}

pub fn recommend_key(input_text: &str, owned: &[String]) -> String {
    hash_parts(&[
        "recommend",
        normalize_request_text(input_text).as_str(),
        owned_fingerprint(owned).as_str(),
    ])
}

pub fn recipe_key(
    dish_name: &str,
    owned: &[String],
    hint_path: Option<&str>,
    hint_source: Option<SourceType>,
) -> String {
    let source = match hint_source {
        Some(SourceType::Corpus) => "corpus",
        Some(SourceType::Model) => "model",
        Some(SourceType::Web) => "web",
        Some(SourceType::Fallback) => "fallback",
        None => "",
    };
    hash_parts(&[
        "recipe",
        normalize_request_text(dish_name).as_str(),
        owned_fingerprint(owned).as_str(),
        hint_path.unwrap_or("").trim(),
        source,
    ])
}

pub fn extract_key(input_text: &str) -> String {
    hash_parts(&["extract", normalize_request_text(input_text).as_str()])
}

pub fn image_key(dish_name: &str, style: &str, model: &str, size: &str) -> String {
    hash_parts(&[
        "image",
        normalize_request_text(dish_name).as_str(),
        style,
        model,
        size,
    ])
}

/// One moka cache per result kind, each with its own TTL.
pub struct CacheTiers {
    pub recommend: Cache<String, RecommendOutcome>,
    pub recipe: Cache<String, RecipeDetail>,
    pub extract: Cache<String, IngredientExtraction>,
    /// Dish name to generated image URL.
    pub image: Cache<String, String>,
}

impl CacheTiers {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_ttls(
            config.recommend_cache_ttl,
            config.recipe_cache_ttl,
            config.extract_cache_ttl,
            config.image_cache_ttl,
        )
    }

    pub fn with_ttls(
        recommend: Duration,
        recipe: Duration,
        extract: Duration,
        image: Duration,
    ) -> Self {
        fn tier<V: Clone + Send + Sync + 'static>(ttl: Duration) -> Cache<String, V> {
            Cache::builder()
                .max_capacity(MAX_ENTRIES)
                .time_to_live(ttl)
                .build()
        }
        Self {
            recommend: tier(recommend),
            recipe: tier(recipe),
            extract: tier(extract),
            image: tier(image),
        }
    }
}
