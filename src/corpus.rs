//! Pre-built reference corpus index: loaded once per process lifetime,
//! immutable and safe for unlimited concurrent readers afterwards.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

use crate::error::CoreError;
use crate::retriever::normalize_text;

/// One indexed recipe document. Built offline, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceDocument {
    pub title: String,
    pub relative_path: String,
    pub content: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub operations: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIndex {
    #[serde(default)]
    docs: Vec<ReferenceDocument>,
}

pub struct CorpusIndex {
    docs: Vec<ReferenceDocument>,
    by_path: HashMap<String, usize>,
}

impl CorpusIndex {
    pub fn from_docs(docs: Vec<ReferenceDocument>) -> Self {
        let by_path = docs
            .iter()
            .enumerate()
            .map(|(i, doc)| (normalize_text(&doc.relative_path), i))
            .collect();
        Self { docs, by_path }
    }

    pub fn from_json(text: &str) -> Result<Self, CoreError> {
        let raw: RawIndex =
            serde_json::from_str(text).map_err(|e| CoreError::CorpusLoad(e.to_string()))?;
        Ok(Self::from_docs(raw.docs))
    }

    pub async fn load(path: &Path) -> Result<Self, CoreError> {
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            CoreError::CorpusLoad(format!("read {}: {e}", path.display()))
        })?;
        let index = Self::from_json(&text)?;
        info!(count = index.len(), path = %path.display(), "corpus index loaded");
        Ok(index)
    }

    pub fn docs(&self) -> &[ReferenceDocument] {
        &self.docs
    }

    /// O(1) lookup by normalized relative path.
    pub fn get_by_path(&self, path: &str) -> Option<&ReferenceDocument> {
        self.by_path
            .get(&normalize_text(path))
            .and_then(|&i| self.docs.get(i))
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }
}

/// Load-once handle. The first caller populates the index; concurrent callers
/// await the same in-flight load instead of reloading.
pub struct CorpusHandle {
    path: PathBuf,
    cell: OnceCell<Arc<CorpusIndex>>,
}

impl CorpusHandle {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            cell: OnceCell::new(),
        }
    }

    /// Handle around an index that is already in memory (tests, CLI).
    pub fn preloaded(index: CorpusIndex) -> Self {
        let cell = OnceCell::new();
        cell.set(Arc::new(index)).ok();
        Self {
            path: PathBuf::new(),
            cell,
        }
    }

    pub async fn get(&self) -> Result<Arc<CorpusIndex>, CoreError> {
        self.cell
            .get_or_try_init(|| async {
                CorpusIndex::load(&self.path).await.map(Arc::new)
            })
            .await
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_json() -> &'static str {
        r#"{
          "sourceRoot": "data/HowToCook",
          "count": 2,
          "docs": [
            {
              "title": "番茄炒蛋",
              "relativePath": "dishes/vegetable_dish/番茄炒蛋.md",
              "content": "番茄炒蛋\n必备原料和工具\n- 番茄\n- 鸡蛋\n操作\n- 大火快炒 2 分钟",
              "ingredients": ["番茄", "鸡蛋"],
              "operations": ["大火快炒 2 分钟"]
            },
            {
              "title": "红烧肉",
              "relativePath": "dishes/meat_dish/红烧肉.md",
              "content": "红烧肉做法",
              "ingredients": ["五花肉"],
              "operations": []
            }
          ]
        }"#
    }

    #[test]
    fn parses_index_and_keys_by_path() {
        let index = CorpusIndex::from_json(sample_json()).unwrap();
        assert_eq!(index.len(), 2);
        let doc = index
            .get_by_path("dishes/vegetable_dish/番茄炒蛋.md")
            .unwrap();
        assert_eq!(doc.title, "番茄炒蛋");
        // Path lookup normalizes casing.
        assert!(index
            .get_by_path("DISHES/vegetable_dish/番茄炒蛋.md")
            .is_some());
    }

    #[tokio::test]
    async fn handle_loads_once_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(sample_json().as_bytes()).unwrap();

        let handle = CorpusHandle::new(file.path().to_path_buf());
        let first = handle.get().await.unwrap();
        let second = handle.get().await.unwrap();
        assert_eq!(first.len(), 2);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn load_failure_is_reported() {
        let handle = CorpusHandle::new(PathBuf::from("/nonexistent/index.json"));
        assert!(matches!(
            handle.get().await,
            Err(CoreError::CorpusLoad(_))
        ));
    }
}
