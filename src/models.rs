use serde::{Deserialize, Serialize};

/// One ingredient with a free-text magnitude ("300g", "适量").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientItem {
    pub name: String,
    pub amount: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Provenance marker. Never claims `Corpus` without a resolved reference
/// document behind it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Corpus,
    Model,
    Web,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    pub prep_min: u32,
    pub cook_min: u32,
    pub total_min: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub step_no: u32,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_point: Option<String>,
    pub source_tag: SourceType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewStep {
    pub step_no: u32,
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_point: Option<String>,
}

/// Partial recipe embedded in a recommendation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecipePreview {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub servings: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required_ingredients: Option<Vec<IngredientItem>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steps: Option<Vec<PreviewStep>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tips: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub id: String,
    pub name: String,
    pub reason: String,
    pub required_ingredients: Vec<IngredientItem>,
    pub estimated_time_min: u32,
    pub difficulty: Difficulty,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<SourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipe_preview: Option<RecipePreview>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebReference {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailMode {
    Full,
    PreviewOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeDetail {
    pub dish_name: String,
    pub servings: String,
    pub required_ingredients: Vec<IngredientItem>,
    /// Derived via required-minus-owned after normalization, never
    /// model-authored.
    pub missing_ingredients: Vec<IngredientItem>,
    pub steps: Vec<Step>,
    pub tips: Vec<String>,
    pub source_type: SourceType,
    pub detail_mode: DetailMode,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub web_references: Vec<WebReference>,
    pub timing: Timing,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendOutcome {
    pub recommendations: Vec<Recommendation>,
    pub reference_sources: Vec<crate::retriever::ReferenceMatch>,
    /// Valid generation with zero suitable dishes. Normal, cacheable.
    #[serde(default)]
    pub no_match: bool,
    /// Generation and the corpus-only fallback both failed. Never cached.
    #[serde(default)]
    pub transient_failure: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractSource {
    Model,
    RuleFallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractReason {
    ModelSuccess,
    BreakerOpen,
    ModelFailedFallback,
    CacheReuse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientExtraction {
    pub ingredients: Vec<String>,
    pub source: ExtractSource,
    pub raw_candidates: Vec<String>,
    pub reason: ExtractReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillStatus {
    Filled,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FillOutcome {
    pub steps: Vec<Step>,
    pub tips: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timing: Option<Timing>,
    pub fill_status: FillStatus,
    pub retryable: bool,
}
