//! Durable history tier behind the in-memory caches. Results are appended as
//! history entries and later reused by request hash; the freshest non-empty
//! ingredient list doubles as the user's pantry state.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::models::{RecipeDetail, RecommendOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    Recommend,
    Recipe,
    Extract,
    Image,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub kind: HistoryKind,
    pub request_hash: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_text: Option<String>,
    #[serde(default)]
    pub owned_ingredients: Vec<String>,
    pub payload: Value,
    pub created_at_ms: u64,
}

pub fn now_epoch_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl HistoryEntry {
    pub fn new(
        kind: HistoryKind,
        request_hash: impl Into<String>,
        input_text: Option<String>,
        owned_ingredients: Vec<String>,
        payload: Value,
    ) -> Self {
        Self {
            kind,
            request_hash: request_hash.into(),
            input_text,
            owned_ingredients,
            payload,
            created_at_ms: now_epoch_ms(),
        }
    }
}

/// Persistence seam. Read failures surface as errors so the service layer
/// can degrade them to cache misses; writes are best-effort there too.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn find_cached_recommendation(
        &self,
        request_hash: &str,
        max_age: Duration,
    ) -> Result<Option<RecommendOutcome>, CoreError>;

    async fn find_cached_recipe_detail(
        &self,
        request_hash: &str,
        max_age: Duration,
    ) -> Result<Option<RecipeDetail>, CoreError>;

    async fn find_cached_image(
        &self,
        request_hash: &str,
        max_age: Duration,
    ) -> Result<Option<String>, CoreError>;

    /// Most recent non-empty owned-ingredient list, optionally restricted to
    /// history recorded for the same input text.
    async fn find_latest_owned_ingredients(
        &self,
        input_text: Option<&str>,
    ) -> Result<Option<Vec<String>>, CoreError>;

    async fn append_history(&self, entry: HistoryEntry) -> Result<(), CoreError>;
}

/// Process-local store. The default backend for the CLI and tests; a real
/// database implements the same trait.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<Vec<HistoryEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn find_payload<T: DeserializeOwned>(
        &self,
        kind: HistoryKind,
        request_hash: &str,
        max_age: Duration,
    ) -> Result<Option<T>, CoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CoreError::Persistence("history lock poisoned".to_string()))?;
        let now = now_epoch_ms();
        let max_age_ms = max_age.as_millis() as u64;

        for entry in entries.iter().rev() {
            if entry.kind != kind || entry.request_hash != request_hash {
                continue;
            }
            if now.saturating_sub(entry.created_at_ms) > max_age_ms {
                continue;
            }
            let value = serde_json::from_value(entry.payload.clone())
                .map_err(|e| CoreError::Persistence(format!("stored payload malformed: {e}")))?;
            return Ok(Some(value));
        }
        Ok(None)
    }

    #[cfg(test)]
    fn backdate_all(&self, by: Duration) {
        let mut entries = self.entries.lock().unwrap();
        for entry in entries.iter_mut() {
            entry.created_at_ms = entry.created_at_ms.saturating_sub(by.as_millis() as u64);
        }
    }
}

#[async_trait]
impl HistoryStore for MemoryStore {
    async fn find_cached_recommendation(
        &self,
        request_hash: &str,
        max_age: Duration,
    ) -> Result<Option<RecommendOutcome>, CoreError> {
        self.find_payload(HistoryKind::Recommend, request_hash, max_age)
    }

    async fn find_cached_recipe_detail(
        &self,
        request_hash: &str,
        max_age: Duration,
    ) -> Result<Option<RecipeDetail>, CoreError> {
        self.find_payload(HistoryKind::Recipe, request_hash, max_age)
    }

    async fn find_cached_image(
        &self,
        request_hash: &str,
        max_age: Duration,
    ) -> Result<Option<String>, CoreError> {
        self.find_payload(HistoryKind::Image, request_hash, max_age)
    }

    async fn find_latest_owned_ingredients(
        &self,
        input_text: Option<&str>,
    ) -> Result<Option<Vec<String>>, CoreError> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CoreError::Persistence("history lock poisoned".to_string()))?;
        Ok(entries
            .iter()
            .rev()
            .filter(|entry| match input_text {
                Some(text) => entry.input_text.as_deref() == Some(text),
                None => true,
            })
            .find(|entry| !entry.owned_ingredients.is_empty())
            .map(|entry| entry.owned_ingredients.clone()))
    }

    async fn append_history(&self, entry: HistoryEntry) -> Result<(), CoreError> {
        self.entries
            .lock()
            .map_err(|_| CoreError::Persistence("history lock poisoned".to_string()))?
            .push(entry);
        Ok(())
    }
}
