//! Service facade tying extraction, recommendation and recipe detail to the
//! cache tiers and the history store. Caching policy lives here: successful
//! outcomes (including valid empty ones) are cached, degraded transient
//! outcomes never are.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::breaker::CircuitBreaker;
use crate::cache::{self, CacheTiers};
use crate::config::AppConfig;
use crate::corpus::{CorpusHandle, CorpusIndex};
use crate::error::CoreError;
use crate::extractor::IngredientExtractor;
use crate::generation::GenerationClient;
use crate::models::{
    ExtractReason, ExtractSource, FillOutcome, IngredientExtraction, IngredientItem, RecipeDetail,
    RecommendOutcome, SourceType,
};
use crate::normalize::normalize_ingredient_list;
use crate::recipe::{RecipeFlow, RecipeRequest};
use crate::recommend::RecommendFlow;
use crate::store::{HistoryEntry, HistoryKind, HistoryStore};

const MAX_INPUT_CHARS: usize = 500;
const MAX_DISH_CHARS: usize = 80;

pub struct RecipeService {
    config: AppConfig,
    corpus: CorpusHandle,
    caches: CacheTiers,
    store: Arc<dyn HistoryStore>,
    client: Arc<GenerationClient>,
    extract_breaker: Arc<CircuitBreaker>,
}

impl RecipeService {
    pub fn new(
        config: AppConfig,
        client: Arc<GenerationClient>,
        store: Arc<dyn HistoryStore>,
    ) -> Self {
        let corpus = CorpusHandle::new(config.corpus_index_path.clone());
        Self::assemble(config, corpus, client, store)
    }

    /// Service over an index that is already in memory (tests, CLI warm
    /// start).
    pub fn with_corpus(
        config: AppConfig,
        corpus: CorpusIndex,
        client: Arc<GenerationClient>,
        store: Arc<dyn HistoryStore>,
    ) -> Self {
        Self::assemble(config, CorpusHandle::preloaded(corpus), client, store)
    }

    fn assemble(
        config: AppConfig,
        corpus: CorpusHandle,
        client: Arc<GenerationClient>,
        store: Arc<dyn HistoryStore>,
    ) -> Self {
        let caches = CacheTiers::new(&config);
        let extract_breaker = Arc::new(CircuitBreaker::new(
            config.breaker_failure_threshold,
            config.breaker_cooldown,
        ));
        Self {
            config,
            corpus,
            caches,
            store,
            client,
            extract_breaker,
        }
    }

    pub async fn extract_ingredients(
        &self,
        input_text: &str,
        draft: &[String],
    ) -> Result<IngredientExtraction, CoreError> {
        let input = validate_input(input_text)?;

        let key = cache::extract_key(&input);
        if let Some(mut hit) = self.caches.extract.get(&key) {
            debug!("extraction served from memory cache");
            hit.reason = ExtractReason::CacheReuse;
            return Ok(hit);
        }

        // The history store keeps the last list extracted for this exact
        // input text; reusing it avoids a model round-trip after a restart.
        if let Some(owned) = self.latest_owned_ingredients(Some(input.as_str())).await {
            debug!("extraction reused from history store");
            let reused = IngredientExtraction {
                ingredients: owned.clone(),
                source: ExtractSource::Model,
                raw_candidates: owned,
                reason: ExtractReason::CacheReuse,
            };
            self.caches.extract.insert(key, reused.clone());
            return Ok(reused);
        }

        let extractor = IngredientExtractor::new(
            self.client.clone(),
            self.extract_breaker.clone(),
            self.config.extract_model().to_string(),
        );
        let extraction = extractor.extract(&input, draft).await;

        // Rule-fallback results are not cached: a recovered model should get
        // another chance at the same input within the TTL window.
        if extraction.source == ExtractSource::Model {
            self.caches.extract.insert(key.clone(), extraction.clone());
        }
        self.record(HistoryEntry::new(
            HistoryKind::Extract,
            key,
            Some(input),
            extraction.ingredients.clone(),
            serde_json::to_value(&extraction).unwrap_or_default(),
        ))
        .await;

        Ok(extraction)
    }

    pub async fn recommend(
        &self,
        input_text: &str,
        owned: &[String],
    ) -> Result<RecommendOutcome, CoreError> {
        let input = validate_input(input_text)?;

        let mut owned_norm = normalize_ingredient_list(owned);
        if owned_norm.is_empty() {
            owned_norm = self.extract_ingredients(&input, &[]).await?.ingredients;
        }
        if owned_norm.is_empty() {
            return Err(CoreError::Validation(
                "no usable ingredients in the request".to_string(),
            ));
        }

        let key = cache::recommend_key(&input, &owned_norm);
        if let Some(hit) = self.caches.recommend.get(&key) {
            debug!("recommendation served from memory cache");
            return Ok(hit);
        }
        if let Some(stored) = self.read_store_recommendation(&key).await {
            self.caches.recommend.insert(key, stored.clone());
            return Ok(stored);
        }

        let flow = RecommendFlow::new(
            self.client.clone(),
            self.corpus_or_empty().await,
            self.config.recommend_model().to_string(),
        );
        let outcome = flow.recommend(&input, &owned_norm).await;

        if outcome.transient_failure {
            return Ok(outcome);
        }

        self.caches.recommend.insert(key.clone(), outcome.clone());
        self.record(HistoryEntry::new(
            HistoryKind::Recommend,
            key,
            Some(input),
            owned_norm,
            serde_json::to_value(&outcome).unwrap_or_default(),
        ))
        .await;

        Ok(outcome)
    }

    pub async fn recipe_detail(&self, request: &RecipeRequest) -> Result<RecipeDetail, CoreError> {
        let dish = request.dish_name.trim();
        if dish.is_empty() {
            return Err(CoreError::Validation("dish name is empty".to_string()));
        }
        if dish.chars().count() > MAX_DISH_CHARS {
            return Err(CoreError::Validation("dish name is too long".to_string()));
        }

        let owned_norm = normalize_ingredient_list(&request.owned_ingredients);
        let normalized = RecipeRequest {
            dish_name: dish.to_string(),
            owned_ingredients: owned_norm.clone(),
            hint_path: request.hint_path.clone(),
            hint_source: request.hint_source,
        };

        let key = cache::recipe_key(
            dish,
            &owned_norm,
            normalized.hint_path.as_deref(),
            normalized.hint_source,
        );
        if let Some(hit) = self.caches.recipe.get(&key) {
            debug!("recipe detail served from memory cache");
            return Ok(hit);
        }
        if let Some(stored) = self.read_store_recipe(&key).await {
            self.caches.recipe.insert(key, stored.clone());
            return Ok(stored);
        }

        let flow = RecipeFlow::new(
            self.client.clone(),
            self.corpus_or_empty().await,
            self.config.model.clone(),
            self.config.websearch_model.clone(),
        );
        let detail = flow.detail(&normalized).await;

        // The rule-built fallback is a degraded answer; serving it from
        // cache would mask model recovery for the whole TTL.
        if detail.source_type != SourceType::Fallback {
            self.caches.recipe.insert(key.clone(), detail.clone());
            self.record(HistoryEntry::new(
                HistoryKind::Recipe,
                key,
                Some(normalized.dish_name.clone()),
                owned_norm,
                serde_json::to_value(&detail).unwrap_or_default(),
            ))
            .await;
        }

        Ok(detail)
    }

    /// Complete a recommendation preview into steps, tips and timing.
    pub async fn fill_preview(
        &self,
        dish_name: &str,
        required_ingredients: &[IngredientItem],
        owned: &[String],
    ) -> Result<FillOutcome, CoreError> {
        if dish_name.trim().is_empty() {
            return Err(CoreError::Validation("dish name is empty".to_string()));
        }
        let owned_norm = normalize_ingredient_list(owned);
        let flow = RecipeFlow::new(
            self.client.clone(),
            self.corpus_or_empty().await,
            self.config.model.clone(),
            None,
        );
        Ok(flow.fill(dish_name.trim(), required_ingredients, &owned_norm).await)
    }

    pub async fn cached_image(
        &self,
        dish_name: &str,
        style: &str,
        model: &str,
        size: &str,
    ) -> Option<String> {
        let key = cache::image_key(dish_name, style, model, size);
        if let Some(url) = self.caches.image.get(&key) {
            return Some(url);
        }
        match self
            .store
            .find_cached_image(&key, self.config.image_cache_ttl)
            .await
        {
            Ok(Some(url)) => {
                self.caches.image.insert(key, url.clone());
                Some(url)
            }
            Ok(None) => None,
            Err(error) => {
                warn!(%error, "image history read failed, treating as miss");
                None
            }
        }
    }

    pub async fn remember_image(&self, dish_name: &str, style: &str, model: &str, size: &str, url: String) {
        let key = cache::image_key(dish_name, style, model, size);
        self.caches.image.insert(key.clone(), url.clone());
        self.record(HistoryEntry::new(
            HistoryKind::Image,
            key,
            Some(dish_name.to_string()),
            Vec::new(),
            serde_json::Value::String(url),
        ))
        .await;
    }

    /// Freshest pantry state known to the history store.
    pub async fn latest_owned_ingredients(&self, input_text: Option<&str>) -> Option<Vec<String>> {
        match self.store.find_latest_owned_ingredients(input_text).await {
            Ok(owned) => owned,
            Err(error) => {
                warn!(%error, "history read failed while loading pantry state");
                None
            }
        }
    }

    async fn corpus_or_empty(&self) -> Arc<CorpusIndex> {
        match self.corpus.get().await {
            Ok(corpus) => corpus,
            Err(error) => {
                warn!(%error, "corpus unavailable, continuing without references");
                Arc::new(CorpusIndex::from_docs(Vec::new()))
            }
        }
    }

    async fn read_store_recommendation(&self, key: &str) -> Option<RecommendOutcome> {
        match self
            .store
            .find_cached_recommendation(key, self.config.recommend_cache_ttl)
            .await
        {
            Ok(hit) => hit,
            Err(error) => {
                warn!(%error, "history read failed, treating as miss");
                None
            }
        }
    }

    async fn read_store_recipe(&self, key: &str) -> Option<RecipeDetail> {
        match self
            .store
            .find_cached_recipe_detail(key, self.config.recipe_cache_ttl)
            .await
        {
            Ok(hit) => hit,
            Err(error) => {
                warn!(%error, "history read failed, treating as miss");
                None
            }
        }
    }

    async fn record(&self, entry: HistoryEntry) {
        if let Err(error) = self.store.append_history(entry).await {
            warn!(%error, "history append failed");
        }
    }
}

fn validate_input(input_text: &str) -> Result<String, CoreError> {
    let input = input_text.trim();
    if input.is_empty() {
        return Err(CoreError::Validation("input text is empty".to_string()));
    }
    if input.chars().count() > MAX_INPUT_CHARS {
        return Err(CoreError::Validation("input text is too long".to_string()));
    }
    Ok(input.to_string())
}
