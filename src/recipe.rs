//! Recipe detail assembly. Three sources, in preference order: parsed corpus
//! documents, model generation (optionally web-grounded), and a rule-built
//! fallback so the caller always receives a usable recipe.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::corpus::{CorpusIndex, ReferenceDocument};
use crate::error::GenerationError;
use crate::fuzzy::{title_similarity, MATCH_THRESHOLD};
use crate::generation::{GenerateArgs, GenerationClient};
use crate::models::{
    DetailMode, FillOutcome, FillStatus, IngredientItem, RecipeDetail, SourceType, Step, Timing,
    WebReference,
};
use crate::normalize::{compute_missing, normalize_ingredient_name, LEXICON};
use crate::prompts;
use crate::retriever::{build_context, ReferenceMatch, RetrievalQuery, Retriever};

const MAX_WEB_REFERENCES: usize = 3;
const MAX_CORPUS_STEPS: usize = 8;
const MAX_CORPUS_TIPS: usize = 3;
/// Wider candidate set than the recommendation grounding pass.
const DETAIL_RETRIEVE_LIMIT: usize = 4;
const FALLBACK_TIMING: Timing = Timing {
    prep_min: 8,
    cook_min: 10,
    total_min: 18,
};

static KEY_POINT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(大火|中火|中小火|小火)[^，。；]{0,16}|[0-9]+(-[0-9]+)?\s*(秒|分钟|min|s)")
        .expect("key point regex")
});
static STATE_CHANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^，。；]*(变色|断生|收汁|金黄)[^，。；]*").expect("state regex"));
static MINUTES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)\s*分钟").expect("minutes regex"));
static SERVINGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([0-9]+)\s*人份").expect("servings regex"));

/// One recipe-detail request. A hint carries provenance from an earlier
/// recommendation; a non-corpus hint pins the detail to plain generation.
#[derive(Debug, Clone)]
pub struct RecipeRequest {
    pub dish_name: String,
    pub owned_ingredients: Vec<String>,
    pub hint_path: Option<String>,
    pub hint_source: Option<SourceType>,
}

/// Model-authored step; numbering and provenance are reassigned locally, so
/// only the text fields are read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ShapeStep {
    instruction: String,
    #[serde(default)]
    key_point: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecipeShape {
    #[serde(default)]
    servings: Option<String>,
    #[serde(default)]
    required_ingredients: Vec<IngredientItem>,
    #[serde(default)]
    steps: Vec<ShapeStep>,
    #[serde(default)]
    tips: Vec<String>,
    #[serde(default)]
    web_references: Vec<WebReference>,
    #[serde(default)]
    timing: Option<Timing>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FillShape {
    #[serde(default)]
    steps: Vec<ShapeStep>,
    #[serde(default)]
    tips: Vec<String>,
    #[serde(default)]
    timing: Option<Timing>,
}

pub struct RecipeFlow {
    client: Arc<GenerationClient>,
    corpus: Arc<CorpusIndex>,
    model: String,
    websearch_model: Option<String>,
}

impl RecipeFlow {
    pub fn new(
        client: Arc<GenerationClient>,
        corpus: Arc<CorpusIndex>,
        model: String,
        websearch_model: Option<String>,
    ) -> Self {
        Self {
            client,
            corpus,
            model,
            websearch_model,
        }
    }

    /// Full recipe detail. Never fails: the rule-built fallback covers every
    /// generation failure.
    pub async fn detail(&self, request: &RecipeRequest) -> RecipeDetail {
        let retriever = Retriever::new(self.corpus.clone());

        // A hint that was generated (model/web/fallback) stays generated. It
        // must not be promoted to corpus even when a title happens to match.
        let pinned_to_model = matches!(
            request.hint_source,
            Some(SourceType::Model) | Some(SourceType::Web) | Some(SourceType::Fallback)
        );

        let resolved = if pinned_to_model {
            None
        } else {
            request
                .hint_path
                .as_deref()
                .and_then(|path| retriever.resolve_by_path(path))
        };

        let refs = match &resolved {
            Some(reference) => vec![reference.clone()],
            None if pinned_to_model => Vec::new(),
            None => retriever.retrieve(&RetrievalQuery {
                dish_name: Some(request.dish_name.clone()),
                owned_ingredients: request.owned_ingredients.clone(),
                input_text: None,
                limit: DETAIL_RETRIEVE_LIMIT,
            }),
        };

        if !pinned_to_model {
            if let Some(detail) = self.try_corpus_detail(request, &resolved, &refs) {
                return detail;
            }
        }

        match self.generate_detail(request, &refs, !pinned_to_model).await {
            Ok(detail) => detail,
            Err(error) => {
                warn!(%error, dish = %request.dish_name, "recipe generation failed, using rule fallback");
                fallback_detail(&request.dish_name, &request.owned_ingredients)
            }
        }
    }

    fn try_corpus_detail(
        &self,
        request: &RecipeRequest,
        resolved: &Option<ReferenceMatch>,
        refs: &[ReferenceMatch],
    ) -> Option<RecipeDetail> {
        let grounded = resolved.as_ref().or_else(|| {
            refs.first()
                .filter(|r| title_similarity(&request.dish_name, &r.title) >= MATCH_THRESHOLD)
        })?;
        let doc = self.corpus.get_by_path(&grounded.path)?;
        info!(path = %grounded.path, "recipe detail served from corpus document");
        Some(parse_reference_document(doc, &request.owned_ingredients))
    }

    /// `allow_web` is false for model-pinned requests; their provenance must
    /// stay `model` even when a web-search model is configured.
    async fn generate_detail(
        &self,
        request: &RecipeRequest,
        refs: &[ReferenceMatch],
        allow_web: bool,
    ) -> Result<RecipeDetail, GenerationError> {
        let use_web = allow_web && refs.is_empty() && self.websearch_model.is_some();

        let mut system = format!(
            "{}\n\n{}\n\n参考片段：\n{}",
            prompts::SYSTEM_PROMPT_BASE,
            prompts::SYSTEM_PROMPT_RECIPE,
            build_context(refs)
        );
        if use_web {
            system.push_str("\n\n");
            system.push_str(prompts::WEB_SEARCH_ADDENDUM);
        }

        let model = if use_web {
            self.websearch_model.as_deref().unwrap_or(&self.model)
        } else {
            &self.model
        };

        let mut args = GenerateArgs::new(
            system,
            prompts::build_recipe_user_prompt(&request.dish_name, &request.owned_ingredients),
            prompts::RECIPE_TEMPLATE,
            model,
        )
        .retries(1)
        .limits(1600, Duration::from_secs(20));
        if use_web {
            args = args.tools(vec![json!({ "type": "web_search" })]);
        }

        let shape = self.client.generate_json::<RecipeShape>(&args).await?;
        if shape.steps.is_empty() || shape.required_ingredients.is_empty() {
            return Err(GenerationError::Rejected(
                "generated recipe has no steps or no ingredients".to_string(),
            ));
        }

        // Provenance is assigned here, never taken from the model.
        let mut web_references = shape.web_references;
        web_references.truncate(MAX_WEB_REFERENCES);
        let source_type = if use_web && !web_references.is_empty() {
            SourceType::Web
        } else {
            web_references.clear();
            SourceType::Model
        };

        let steps = renumber(shape.steps, source_type);
        let missing = compute_missing(&shape.required_ingredients, &request.owned_ingredients);

        Ok(RecipeDetail {
            dish_name: request.dish_name.clone(),
            servings: shape.servings.unwrap_or_else(|| "2人份".to_string()),
            required_ingredients: shape.required_ingredients,
            missing_ingredients: missing,
            steps,
            tips: shape.tips,
            source_type,
            detail_mode: DetailMode::Full,
            web_references,
            timing: shape.timing.unwrap_or(FALLBACK_TIMING),
        })
    }

    /// Complete a recommendation preview with steps, tips and timing.
    pub async fn fill(
        &self,
        dish_name: &str,
        required_ingredients: &[IngredientItem],
        owned_ingredients: &[String],
    ) -> FillOutcome {
        let args = GenerateArgs::new(
            format!(
                "{}\n\n{}",
                prompts::SYSTEM_PROMPT_BASE,
                prompts::SYSTEM_PROMPT_RECIPE_FILL
            ),
            prompts::build_fill_user_prompt(dish_name, required_ingredients, owned_ingredients),
            prompts::FILL_TEMPLATE,
            self.model.clone(),
        )
        .retries(0)
        .limits(700, Duration::from_secs(12));

        match self.client.generate_json::<FillShape>(&args).await {
            Ok(shape) => {
                let allowed = allowed_names(required_ingredients, owned_ingredients);
                let kept: Vec<ShapeStep> = shape
                    .steps
                    .into_iter()
                    .filter(|step| !mentions_foreign_ingredient(&step.instruction, &allowed))
                    .collect();
                let tips: Vec<String> = shape
                    .tips
                    .into_iter()
                    .filter(|tip| !mentions_foreign_ingredient(tip, &allowed))
                    .collect();

                if kept.is_empty() {
                    warn!(dish = %dish_name, "fill result had no usable steps");
                    return failed_fill(false);
                }
                FillOutcome {
                    steps: renumber(kept, SourceType::Model),
                    tips,
                    timing: shape.timing,
                    fill_status: FillStatus::Filled,
                    retryable: false,
                }
            }
            Err(error) => {
                warn!(%error, dish = %dish_name, "preview fill generation failed");
                failed_fill(true)
            }
        }
    }
}

fn failed_fill(retryable: bool) -> FillOutcome {
    FillOutcome {
        steps: Vec::new(),
        tips: Vec::new(),
        timing: None,
        fill_status: FillStatus::Failed,
        retryable,
    }
}

fn renumber(steps: Vec<ShapeStep>, tag: SourceType) -> Vec<Step> {
    steps
        .into_iter()
        .enumerate()
        .map(|(idx, step)| Step {
            step_no: idx as u32 + 1,
            instruction: step.instruction,
            key_point: step.key_point,
            source_tag: tag,
        })
        .collect()
}

fn allowed_names(required: &[IngredientItem], owned: &[String]) -> Vec<String> {
    required
        .iter()
        .map(|item| normalize_ingredient_name(&item.name))
        .chain(owned.iter().map(|name| normalize_ingredient_name(name)))
        .collect()
}

/// True when `text` names a suspicious ingredient that is neither required
/// nor owned. Guards against hallucinated fruit in savory dishes.
fn mentions_foreign_ingredient(text: &str, allowed: &[String]) -> bool {
    LEXICON
        .suspicious_ingredients
        .iter()
        .any(|name| text.contains(name.as_str()) && !allowed.iter().any(|a| a.contains(name.as_str())))
}

/// Section-wise parse of a corpus markdown document into a full detail.
/// The document is authoritative; missing sections degrade to generic
/// placeholders instead of failing the request.
fn parse_reference_document(doc: &ReferenceDocument, owned: &[String]) -> RecipeDetail {
    let ingredient_lines = parse_section(&doc.content, "必备原料和工具");
    let step_lines = parse_section(&doc.content, "操作");
    let mut tip_lines = parse_section(&doc.content, "附加内容");
    tip_lines.truncate(MAX_CORPUS_TIPS);

    let mut required_ingredients: Vec<IngredientItem> = if ingredient_lines.is_empty() {
        doc.ingredients
            .iter()
            .map(|name| IngredientItem {
                name: name.clone(),
                amount: "适量".to_string(),
            })
            .collect()
    } else {
        ingredient_lines.iter().map(|line| split_ingredient(line)).collect()
    };
    if required_ingredients.is_empty() {
        required_ingredients.push(IngredientItem {
            name: "主料".to_string(),
            amount: "适量".to_string(),
        });
    }

    let mut raw_steps = if step_lines.is_empty() {
        doc.operations.clone()
    } else {
        step_lines
    };
    if raw_steps.is_empty() {
        raw_steps.push("按参考做法依次处理原料并烹制，全程注意火候".to_string());
    }
    raw_steps.truncate(MAX_CORPUS_STEPS);

    let steps: Vec<Step> = raw_steps
        .into_iter()
        .enumerate()
        .map(|(idx, instruction)| {
            let key_point = extract_key_point(&instruction);
            Step {
                step_no: idx as u32 + 1,
                instruction,
                key_point,
                source_tag: SourceType::Corpus,
            }
        })
        .collect();

    let timing = estimate_timing(&steps);
    let servings = SERVINGS
        .captures(&doc.content)
        .map(|c| format!("{}人份", &c[1]))
        .unwrap_or_else(|| "2人份".to_string());
    let missing = compute_missing(&required_ingredients, owned);

    RecipeDetail {
        dish_name: doc.title.clone(),
        servings,
        required_ingredients,
        missing_ingredients: missing,
        steps,
        tips: tip_lines,
        source_type: SourceType::Corpus,
        detail_mode: DetailMode::Full,
        web_references: Vec::new(),
        timing,
    }
}

/// Bullet items of the section opened by a heading containing `header`,
/// ending at the next heading of any kind.
fn parse_section(content: &str, header: &str) -> Vec<String> {
    let mut in_section = false;
    let mut items = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if !in_section {
            if trimmed.starts_with('#') && trimmed.contains(header) {
                in_section = true;
            }
            continue;
        }
        if trimmed.starts_with('#') {
            break;
        }
        let item = trimmed
            .trim_start_matches(['-', '*', '·'])
            .trim_start_matches(|c: char| c.is_ascii_digit())
            .trim_start_matches(['.', '、', ')', '）'])
            .trim();
        if !item.is_empty() {
            items.push(item.to_string());
        }
    }

    items
}

fn split_ingredient(line: &str) -> IngredientItem {
    match line.split_once(char::is_whitespace) {
        Some((name, amount)) if !amount.trim().is_empty() => IngredientItem {
            name: name.trim().to_string(),
            amount: amount.trim().to_string(),
        },
        _ => IngredientItem {
            name: line.trim().to_string(),
            amount: "适量".to_string(),
        },
    }
}

/// First heat/duration phrase in the instruction, falling back to a
/// state-change phrase (变色, 收汁, ...).
fn extract_key_point(instruction: &str) -> Option<String> {
    KEY_POINT
        .find(instruction)
        .or_else(|| STATE_CHANGE.find(instruction))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

fn estimate_timing(steps: &[Step]) -> Timing {
    let mut cook: u32 = 0;
    for step in steps {
        for capture in MINUTES.captures_iter(&step.instruction) {
            cook = cook.saturating_add(capture[1].parse::<u32>().unwrap_or(0));
        }
    }
    let cook_min = if cook == 0 { 15 } else { cook.min(120) };
    Timing {
        prep_min: 10,
        cook_min,
        total_min: 10 + cook_min,
    }
}

/// Deterministic last-resort recipe: owned ingredients plus pantry staples,
/// generic stir-fry steps.
pub fn fallback_detail(dish_name: &str, owned: &[String]) -> RecipeDetail {
    let primary = owned
        .first()
        .cloned()
        .unwrap_or_else(|| "主料".to_string());
    let secondary = owned.get(1).cloned();

    let mut required_ingredients = vec![IngredientItem {
        name: primary.clone(),
        amount: "300g".to_string(),
    }];
    if let Some(secondary) = &secondary {
        required_ingredients.push(IngredientItem {
            name: secondary.clone(),
            amount: "150g".to_string(),
        });
    }
    required_ingredients.extend([
        IngredientItem {
            name: "食用油".to_string(),
            amount: "15ml".to_string(),
        },
        IngredientItem {
            name: "盐".to_string(),
            amount: "2g".to_string(),
        },
        IngredientItem {
            name: "生抽".to_string(),
            amount: "8ml".to_string(),
        },
    ]);

    let instructions = [
        format!("{primary}洗净切好，其余食材处理备用"),
        "热锅倒油，中火烧至微微冒烟".to_string(),
        match &secondary {
            Some(secondary) => format!("先下{primary}翻炒至断生，再加入{secondary}同炒"),
            None => format!("下{primary}大火翻炒 2 分钟至断生"),
        },
        "加盐和生抽调味，翻匀后出锅".to_string(),
    ];
    let steps = instructions
        .into_iter()
        .enumerate()
        .map(|(idx, instruction)| {
            let key_point = extract_key_point(&instruction);
            Step {
                step_no: idx as u32 + 1,
                instruction,
                key_point,
                source_tag: SourceType::Fallback,
            }
        })
        .collect();

    let missing = compute_missing(&required_ingredients, owned);

    RecipeDetail {
        dish_name: dish_name.to_string(),
        servings: "2人份".to_string(),
        required_ingredients,
        missing_ingredients: missing,
        steps,
        tips: vec![
            "盐可分两次加，先少后补".to_string(),
            "全程注意火候，避免炒糊".to_string(),
        ],
        source_type: SourceType::Fallback,
        detail_mode: DetailMode::Full,
        web_references: Vec::new(),
        timing: FALLBACK_TIMING,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;
    use crate::testutil::ScriptedTransport;
    use serde_json::Value;

    fn markdown_doc() -> ReferenceDocument {
        ReferenceDocument {
            title: "番茄炒蛋".to_string(),
            relative_path: "dishes/vegetable_dish/番茄炒蛋.md".to_string(),
            content: "# 番茄炒蛋\n\n预估 2人份\n\n## 必备原料和工具\n\n- 番茄 2个\n- 鸡蛋 3个\n- 食用油\n\n## 计算\n\n- 每份需要番茄 1 个\n\n## 操作\n\n- 鸡蛋打散，加少量盐\n- 热锅倒油，大火快炒鸡蛋至金黄盛出\n- 下番茄中火翻炒 3 分钟出汁\n- 倒回鸡蛋翻匀出锅\n\n## 附加内容\n\n- 喜欢甜口可加少量糖\n".to_string(),
            ingredients: vec!["番茄".to_string(), "鸡蛋".to_string()],
            operations: Vec::new(),
        }
    }

    fn corpus() -> Arc<CorpusIndex> {
        Arc::new(CorpusIndex::from_docs(vec![markdown_doc()]))
    }

    fn flow(
        payloads: Vec<Result<Value, ApiConnectionError>>,
        corpus: Arc<CorpusIndex>,
        websearch_model: Option<String>,
    ) -> RecipeFlow {
        let transport = Arc::new(ScriptedTransport::new(payloads));
        RecipeFlow::new(
            Arc::new(GenerationClient::new(transport)),
            corpus,
            "test-model".to_string(),
            websearch_model,
        )
    }

    fn request(dish: &str, owned: &[&str]) -> RecipeRequest {
        RecipeRequest {
            dish_name: dish.to_string(),
            owned_ingredients: owned.iter().map(|s| s.to_string()).collect(),
            hint_path: None,
            hint_source: None,
        }
    }

    fn model_payload() -> Value {
        serde_json::json!({
            "dishName": "随便什么菜",
            "servings": "2人份",
            "requiredIngredients": [
                { "name": "土豆", "amount": "300g" },
                { "name": "盐", "amount": "2g" }
            ],
            "missingIngredients": [
                { "name": "土豆", "amount": "300g" },
                { "name": "盐", "amount": "2g" }
            ],
            "steps": [
                { "stepNo": 7, "instruction": "土豆切丝，清水冲洗", "keyPoint": "去淀粉" },
                { "stepNo": 9, "instruction": "大火快炒 2 分钟", "keyPoint": "断生即可" }
            ],
            "tips": ["出锅前再加盐"],
            "sourceType": "corpus",
            "timing": { "prepMin": 5, "cookMin": 5, "totalMin": 10 }
        })
    }

    #[tokio::test]
    async fn corpus_document_is_parsed_into_detail() {
        let f = flow(Vec::new(), corpus(), None);
        let detail = f.detail(&request("番茄炒蛋", &["番茄"])).await;

        assert_eq!(detail.source_type, SourceType::Corpus);
        assert_eq!(detail.servings, "2人份");
        assert_eq!(detail.steps.len(), 4);
        assert!(detail.steps.iter().all(|s| s.source_tag == SourceType::Corpus));
        // The heat/duration phrase becomes the key point.
        assert!(detail.steps[2]
            .key_point
            .as_deref()
            .is_some_and(|k| k.contains("中火")));
        // Ingredient lines split into name and amount.
        assert!(detail
            .required_ingredients
            .iter()
            .any(|i| i.name == "番茄" && i.amount == "2个"));
        // 番茄 is owned, so only the rest is missing.
        assert!(detail.missing_ingredients.iter().all(|i| i.name != "番茄"));
        assert!(detail.missing_ingredients.iter().any(|i| i.name == "鸡蛋"));
        assert_eq!(detail.timing.cook_min, 3);
        assert_eq!(detail.tips, vec!["喜欢甜口可加少量糖".to_string()]);
    }

    #[tokio::test]
    async fn folded_dish_name_reaches_the_corpus_document() {
        let f = flow(Vec::new(), corpus(), None);
        let detail = f.detail(&request("西红柿炒鸡蛋", &[])).await;
        assert_eq!(detail.source_type, SourceType::Corpus);
        assert_eq!(detail.dish_name, "番茄炒蛋");
    }

    #[tokio::test]
    async fn model_hint_never_upgrades_to_corpus() {
        let mut req = request("番茄炒蛋", &["土豆"]);
        req.hint_source = Some(SourceType::Model);
        let f = flow(
            vec![ScriptedTransport::text(&model_payload().to_string())],
            corpus(),
            None,
        );
        let detail = f.detail(&req).await;
        // The model claimed sourceType corpus; the flow overrides it.
        assert_eq!(detail.source_type, SourceType::Model);
        assert!(detail.steps.iter().all(|s| s.source_tag == SourceType::Model));
    }

    #[tokio::test]
    async fn missing_ingredients_are_always_recomputed() {
        let mut req = request("炒土豆丝", &["土豆"]);
        req.hint_source = Some(SourceType::Model);
        let f = flow(
            vec![ScriptedTransport::text(&model_payload().to_string())],
            corpus(),
            None,
        );
        let detail = f.detail(&req).await;
        // The payload listed owned 土豆 as missing; recomputation drops it.
        assert!(detail.missing_ingredients.iter().all(|i| i.name != "土豆"));
        assert!(detail.missing_ingredients.iter().any(|i| i.name == "盐"));
        // Steps are renumbered from 1 regardless of model numbering.
        assert_eq!(detail.steps[0].step_no, 1);
        assert_eq!(detail.steps[1].step_no, 2);
    }

    #[tokio::test]
    async fn model_hint_skips_web_search_even_when_configured() {
        let payload = serde_json::json!({
            "requiredIngredients": [{ "name": "土豆", "amount": "300g" }],
            "steps": [{ "stepNo": 1, "instruction": "土豆切丝下锅翻炒", "keyPoint": "大火" }],
            "tips": [],
            "webReferences": [
                { "title": "某菜谱站", "url": "https://example.com/a", "snippet": "摘要" }
            ],
            "timing": { "prepMin": 5, "cookMin": 5, "totalMin": 10 }
        });
        let mut req = request("炒土豆丝", &["土豆"]);
        req.hint_source = Some(SourceType::Model);
        let f = flow(
            vec![ScriptedTransport::text(&payload.to_string())],
            Arc::new(CorpusIndex::from_docs(Vec::new())),
            Some("web-model".to_string()),
        );
        let detail = f.detail(&req).await;

        assert_eq!(detail.source_type, SourceType::Model);
        assert!(detail.web_references.is_empty());
        assert!(detail.steps.iter().all(|s| s.source_tag == SourceType::Model));
    }

    #[tokio::test]
    async fn web_references_mark_the_detail_as_web() {
        let payload = serde_json::json!({
            "requiredIngredients": [{ "name": "鳗鱼", "amount": "400g" }],
            "steps": [{ "stepNo": 1, "instruction": "处理鳗鱼", "keyPoint": "去骨" }],
            "tips": [],
            "webReferences": [
                { "title": "蒲烧鳗鱼做法", "url": "https://example.com/unagi", "snippet": "先蒸后烤" }
            ],
            "timing": { "prepMin": 20, "cookMin": 20, "totalMin": 40 }
        });
        let f = flow(
            vec![ScriptedTransport::text(&payload.to_string())],
            Arc::new(CorpusIndex::from_docs(Vec::new())),
            Some("web-model".to_string()),
        );
        let detail = f.detail(&request("蒲烧鳗鱼", &[])).await;
        assert_eq!(detail.source_type, SourceType::Web);
        assert_eq!(detail.web_references.len(), 1);
        assert!(detail.steps.iter().all(|s| s.source_tag == SourceType::Web));
    }

    #[tokio::test]
    async fn generation_failure_yields_the_rule_fallback() {
        let f = flow(
            vec![
                Err(ApiConnectionError::EmptyContent),
                Err(ApiConnectionError::EmptyContent),
            ],
            Arc::new(CorpusIndex::from_docs(Vec::new())),
            None,
        );
        let detail = f.detail(&request("神秘大菜", &["鸡胸肉", "青椒"])).await;

        assert_eq!(detail.source_type, SourceType::Fallback);
        assert_eq!(detail.steps.len(), 4);
        assert_eq!(detail.timing, FALLBACK_TIMING);
        assert!(detail
            .required_ingredients
            .iter()
            .any(|i| i.name == "鸡胸肉" && i.amount == "300g"));
        assert!(detail
            .required_ingredients
            .iter()
            .any(|i| i.name == "生抽" && i.amount == "8ml"));
        // Owned items never show up as missing.
        assert!(detail.missing_ingredients.iter().all(|i| i.name != "鸡胸肉"));
        assert!(detail.missing_ingredients.iter().any(|i| i.name == "盐"));
    }

    #[tokio::test]
    async fn empty_generated_steps_are_rejected() {
        let payload = serde_json::json!({
            "requiredIngredients": [{ "name": "土豆", "amount": "300g" }],
            "steps": [],
            "tips": []
        });
        let f = flow(
            vec![
                ScriptedTransport::text(&payload.to_string()),
                ScriptedTransport::text(&payload.to_string()),
            ],
            Arc::new(CorpusIndex::from_docs(Vec::new())),
            None,
        );
        let detail = f.detail(&request("空菜", &[])).await;
        assert_eq!(detail.source_type, SourceType::Fallback);
    }

    #[tokio::test]
    async fn fill_filters_foreign_suspicious_ingredients() {
        let payload = serde_json::json!({
            "steps": [
                { "stepNo": 1, "instruction": "土豆切丝下锅翻炒", "keyPoint": "大火" },
                { "stepNo": 2, "instruction": "加入蓝莓点缀" }
            ],
            "tips": ["装盘时摆上草莓更好看", "最后大火收汁"],
            "timing": { "prepMin": 5, "cookMin": 8, "totalMin": 13 }
        });
        let f = flow(
            vec![ScriptedTransport::text(&payload.to_string())],
            Arc::new(CorpusIndex::from_docs(Vec::new())),
            None,
        );
        let required = vec![IngredientItem {
            name: "土豆".to_string(),
            amount: "300g".to_string(),
        }];
        let out = f.fill("炒土豆丝", &required, &[]).await;

        assert_eq!(out.fill_status, FillStatus::Filled);
        assert_eq!(out.steps.len(), 1);
        assert_eq!(out.tips, vec!["最后大火收汁".to_string()]);
        assert!(out.timing.is_some());
    }

    #[tokio::test]
    async fn fill_failure_modes_set_retryability() {
        // Transport failure: worth retrying.
        let f = flow(
            vec![Err(ApiConnectionError::EmptyContent)],
            Arc::new(CorpusIndex::from_docs(Vec::new())),
            None,
        );
        let out = f.fill("菜", &[], &[]).await;
        assert_eq!(out.fill_status, FillStatus::Failed);
        assert!(out.retryable);

        // Valid but empty answer: retrying will not help.
        let payload = serde_json::json!({ "steps": [], "tips": [] });
        let f = flow(
            vec![ScriptedTransport::text(&payload.to_string())],
            Arc::new(CorpusIndex::from_docs(Vec::new())),
            None,
        );
        let out = f.fill("菜", &[], &[]).await;
        assert_eq!(out.fill_status, FillStatus::Failed);
        assert!(!out.retryable);
    }

    #[test]
    fn parse_section_respects_heading_boundaries() {
        let content = markdown_doc().content;
        let ingredients = parse_section(&content, "必备原料和工具");
        assert_eq!(ingredients.len(), 3);
        assert_eq!(ingredients[0], "番茄 2个");

        let steps = parse_section(&content, "操作");
        assert_eq!(steps.len(), 4);
        assert!(steps[0].starts_with("鸡蛋打散"));
    }

    #[test]
    fn unexpected_section_does_not_leak_into_the_previous_one() {
        let content = "# 菜\n\n## 必备原料和工具\n\n- 番茄 2个\n\n## 备注\n\n- 这里不是食材\n\n## 操作\n\n- 翻炒\n";
        let ingredients = parse_section(content, "必备原料和工具");
        assert_eq!(ingredients, vec!["番茄 2个".to_string()]);
    }

    #[test]
    fn timing_sum_saturates_on_absurd_durations() {
        let steps: Vec<Step> = (0..2)
            .map(|i| Step {
                step_no: i + 1,
                instruction: "慢炖 4000000000 分钟".to_string(),
                key_point: None,
                source_tag: SourceType::Corpus,
            })
            .collect();
        let timing = estimate_timing(&steps);
        assert_eq!(timing.cook_min, 120);
    }

    #[test]
    fn key_point_extraction_prefers_heat_and_duration() {
        assert!(extract_key_point("大火快炒至断生")
            .is_some_and(|k| k.starts_with("大火")));
        assert!(extract_key_point("炖 30 分钟").is_some_and(|k| k.contains("分钟")));
        assert!(extract_key_point("翻炒至金黄即可")
            .is_some_and(|k| k.contains("金黄")));
        assert_eq!(extract_key_point("盛出装盘"), None);
    }
}
