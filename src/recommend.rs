//! Difficulty-banded dish recommendation: corpus-grounded prompt, full then
//! lite generation, provenance stamping, and a corpus-only fallback when the
//! model is unavailable.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::corpus::CorpusIndex;
use crate::fuzzy::{title_similarity, MATCH_THRESHOLD};
use crate::generation::{GenerateArgs, GenerationClient};
use crate::models::{Difficulty, IngredientItem, Recommendation, RecommendOutcome, SourceType};
use crate::prompts;
use crate::retriever::{build_context, ReferenceMatch, RetrievalQuery, Retriever, DEFAULT_LIMIT};

pub const MAX_RECOMMENDATIONS: usize = 3;
/// Wider net used when stamping provenance onto generated dish names.
const STAMP_CANDIDATE_LIMIT: usize = 8;

const FALLBACK_BANDS: [(Difficulty, &str, u32); 3] = [
    (Difficulty::Easy, "easy", 15),
    (Difficulty::Medium, "medium", 25),
    (Difficulty::Hard, "hard", 40),
];

#[derive(Debug, Deserialize)]
struct RecommendShape {
    #[serde(default)]
    recommendations: Vec<Recommendation>,
}

pub struct RecommendFlow {
    client: Arc<GenerationClient>,
    corpus: Arc<CorpusIndex>,
    model: String,
}

impl RecommendFlow {
    pub fn new(client: Arc<GenerationClient>, corpus: Arc<CorpusIndex>, model: String) -> Self {
        Self {
            client,
            corpus,
            model,
        }
    }

    pub async fn recommend(&self, input_text: &str, owned: &[String]) -> RecommendOutcome {
        let retriever = Retriever::new(self.corpus.clone());
        let refs = retriever.retrieve(&RetrievalQuery {
            input_text: Some(input_text.to_string()),
            owned_ingredients: owned.to_vec(),
            dish_name: None,
            limit: DEFAULT_LIMIT,
        });

        let system = format!(
            "{}\n\n{}\n\n参考片段：\n{}",
            prompts::SYSTEM_PROMPT_BASE,
            prompts::SYSTEM_PROMPT_RECOMMEND,
            build_context(&refs)
        );
        let user = prompts::build_recommend_user_prompt(input_text, owned);

        let full = GenerateArgs::new(&system, &user, prompts::RECOMMEND_TEMPLATE, &self.model)
            .retries(0)
            .limits(1600, Duration::from_secs(22));

        let shape = match self.client.generate_json::<RecommendShape>(&full).await {
            Ok(shape) => Some(shape),
            Err(error) => {
                warn!(%error, "full recommendation template failed, retrying lite");
                let lite =
                    GenerateArgs::new(&system, &user, prompts::RECOMMEND_TEMPLATE_LITE, &self.model)
                        .retries(0)
                        .limits(900, Duration::from_secs(14));
                match self.client.generate_json::<RecommendShape>(&lite).await {
                    Ok(shape) => Some(shape),
                    Err(error) => {
                        warn!(%error, "lite recommendation template failed as well");
                        None
                    }
                }
            }
        };

        match shape {
            Some(shape) => {
                let mut recommendations = dedupe_and_cap(shape.recommendations);
                self.stamp_sources(&retriever, &refs, &mut recommendations);
                let no_match = recommendations.is_empty();
                if no_match {
                    info!("model produced a valid but empty recommendation set");
                }
                RecommendOutcome {
                    recommendations,
                    reference_sources: refs,
                    no_match,
                    transient_failure: false,
                }
            }
            None => self.corpus_fallback(refs),
        }
    }

    /// Attach corpus provenance to each generated dish when a title matches
    /// closely enough; everything else is plain model output.
    fn stamp_sources(
        &self,
        retriever: &Retriever,
        seed_refs: &[ReferenceMatch],
        recommendations: &mut [Recommendation],
    ) {
        for rec in recommendations.iter_mut() {
            let mut candidates = seed_refs.to_vec();
            candidates.extend(retriever.retrieve(&RetrievalQuery {
                dish_name: Some(rec.name.clone()),
                limit: STAMP_CANDIDATE_LIMIT,
                ..Default::default()
            }));

            let best = candidates
                .iter()
                .map(|r| (title_similarity(&rec.name, &r.title), r))
                .filter(|(similarity, _)| *similarity >= MATCH_THRESHOLD)
                .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

            match best {
                Some((_, matched)) => {
                    rec.source_type = Some(SourceType::Corpus);
                    rec.source_path = Some(matched.path.clone());
                    rec.source_title = Some(matched.title.clone());
                }
                None => {
                    rec.source_type = Some(SourceType::Model);
                    rec.source_path = None;
                    rec.source_title = None;
                }
            }
        }
    }

    /// One dish per difficulty band straight from the top retrieval hits.
    /// Used only when both generation passes failed.
    fn corpus_fallback(&self, refs: Vec<ReferenceMatch>) -> RecommendOutcome {
        if refs.is_empty() {
            warn!("generation failed and no corpus hits to fall back on");
            return RecommendOutcome {
                recommendations: Vec::new(),
                reference_sources: refs,
                no_match: false,
                transient_failure: true,
            };
        }

        let recommendations = refs
            .iter()
            .take(FALLBACK_BANDS.len())
            .enumerate()
            .map(|(band, reference)| {
                let (difficulty, slug, minutes) = FALLBACK_BANDS[band];
                let required_ingredients = self
                    .corpus
                    .get_by_path(&reference.path)
                    .map(|doc| {
                        doc.ingredients
                            .iter()
                            .take(6)
                            .map(|name| IngredientItem {
                                name: name.clone(),
                                amount: "适量".to_string(),
                            })
                            .collect()
                    })
                    .unwrap_or_default();

                Recommendation {
                    id: format!("dish_{slug}_1"),
                    name: reference.title.clone(),
                    reason: "本地菜谱库命中，按参考做法推荐".to_string(),
                    required_ingredients,
                    estimated_time_min: minutes,
                    difficulty,
                    source_type: Some(SourceType::Corpus),
                    source_path: Some(reference.path.clone()),
                    source_title: Some(reference.title.clone()),
                    recipe_preview: None,
                }
            })
            .collect();

        info!("serving corpus-only recommendation fallback");
        RecommendOutcome {
            recommendations,
            reference_sources: refs,
            no_match: false,
            transient_failure: false,
        }
    }
}

/// Drop repeated dish names (after canonicalization), then cap the total.
/// Band diversity wins the slots first; leftover slots follow model order.
fn dedupe_and_cap(recommendations: Vec<Recommendation>) -> Vec<Recommendation> {
    use crate::fuzzy::normalize_dish_name;
    use std::collections::HashSet;

    let mut seen = HashSet::new();
    let mut deduped = Vec::new();
    for rec in recommendations {
        let key = normalize_dish_name(&rec.name);
        if key.is_empty() || !seen.insert(key) {
            continue;
        }
        deduped.push(rec);
    }

    let mut selected: Vec<usize> = Vec::new();
    for band in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
        if selected.len() >= MAX_RECOMMENDATIONS {
            break;
        }
        let pick = deduped
            .iter()
            .enumerate()
            .find(|(idx, rec)| rec.difficulty == band && !selected.contains(idx))
            .map(|(idx, _)| idx);
        if let Some(idx) = pick {
            selected.push(idx);
        }
    }
    for idx in 0..deduped.len() {
        if selected.len() >= MAX_RECOMMENDATIONS {
            break;
        }
        if !selected.contains(&idx) {
            selected.push(idx);
        }
    }
    selected.sort_unstable();

    selected.into_iter().map(|idx| deduped[idx].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_connection::connection::ApiConnectionError;
    use crate::corpus::ReferenceDocument;
    use crate::testutil::ScriptedTransport;
    use serde_json::{json, Value};

    fn corpus() -> Arc<CorpusIndex> {
        let docs = vec![
            ReferenceDocument {
                title: "番茄炒蛋".to_string(),
                relative_path: "dishes/vegetable_dish/番茄炒蛋.md".to_string(),
                content: "番茄炒蛋 必备原料和工具 番茄 鸡蛋 操作 大火快炒".to_string(),
                ingredients: vec!["番茄".to_string(), "鸡蛋".to_string()],
                operations: vec!["大火快炒 2 分钟".to_string()],
            },
            ReferenceDocument {
                title: "红烧肉".to_string(),
                relative_path: "dishes/meat_dish/红烧肉.md".to_string(),
                content: "红烧肉 五花肉 小火慢炖 收汁".to_string(),
                ingredients: vec!["五花肉".to_string(), "冰糖".to_string()],
                operations: vec!["小火慢炖 40 分钟".to_string()],
            },
        ];
        Arc::new(CorpusIndex::from_docs(docs))
    }

    fn flow(
        payloads: Vec<Result<Value, ApiConnectionError>>,
        corpus: Arc<CorpusIndex>,
    ) -> RecommendFlow {
        let transport = Arc::new(ScriptedTransport::new(payloads));
        RecommendFlow::new(
            Arc::new(GenerationClient::new(transport)),
            corpus,
            "test-model".to_string(),
        )
    }

    fn rec_json(name: &str, difficulty: &str) -> Value {
        json!({
            "id": format!("dish_{difficulty}_1"),
            "name": name,
            "reason": "家常快手",
            "requiredIngredients": [{ "name": "鸡蛋", "amount": "2个" }],
            "estimatedTimeMin": 15,
            "difficulty": difficulty
        })
    }

    #[tokio::test]
    async fn corpus_title_match_is_stamped_as_corpus() {
        let payload = json!({ "recommendations": [rec_json("西红柿炒鸡蛋", "easy")] });
        let f = flow(vec![ScriptedTransport::text(&payload.to_string())], corpus());
        let out = f.recommend("今晚吃什么", &["西红柿".to_string(), "鸡蛋".to_string()]).await;

        assert_eq!(out.recommendations.len(), 1);
        let rec = &out.recommendations[0];
        assert_eq!(rec.source_type, Some(SourceType::Corpus));
        assert_eq!(
            rec.source_path.as_deref(),
            Some("dishes/vegetable_dish/番茄炒蛋.md")
        );
        assert!(!out.no_match);
        assert!(!out.transient_failure);
    }

    #[tokio::test]
    async fn unmatched_dish_is_stamped_as_model() {
        let payload = json!({ "recommendations": [rec_json("法式焗蜗牛", "hard")] });
        let f = flow(vec![ScriptedTransport::text(&payload.to_string())], corpus());
        let out = f.recommend("来点新鲜的", &[]).await;

        let rec = &out.recommendations[0];
        assert_eq!(rec.source_type, Some(SourceType::Model));
        assert!(rec.source_path.is_none());
    }

    #[tokio::test]
    async fn lite_template_rescues_a_failed_full_pass() {
        let payload = json!({ "recommendations": [rec_json("红烧肉", "medium")] });
        let f = flow(
            vec![
                ScriptedTransport::text("不是 JSON"),
                ScriptedTransport::text(&payload.to_string()),
            ],
            corpus(),
        );
        let out = f.recommend("有五花肉", &["五花肉".to_string()]).await;
        assert_eq!(out.recommendations[0].name, "红烧肉");
        assert!(!out.transient_failure);
    }

    #[tokio::test]
    async fn corpus_fallback_bands_difficulties_and_times() {
        let f = flow(
            vec![
                Err(ApiConnectionError::EmptyContent),
                Err(ApiConnectionError::EmptyContent),
            ],
            corpus(),
        );
        let out = f
            .recommend("番茄 鸡蛋 五花肉", &["番茄".to_string(), "五花肉".to_string()])
            .await;

        assert!(!out.transient_failure);
        assert!(!out.recommendations.is_empty());
        assert_eq!(out.recommendations[0].difficulty, Difficulty::Easy);
        assert_eq!(out.recommendations[0].estimated_time_min, 15);
        assert!(out
            .recommendations
            .iter()
            .all(|r| r.source_type == Some(SourceType::Corpus)));
        if out.recommendations.len() > 1 {
            assert_eq!(out.recommendations[1].difficulty, Difficulty::Medium);
            assert_eq!(out.recommendations[1].estimated_time_min, 25);
        }
    }

    #[tokio::test]
    async fn total_failure_with_no_corpus_hits_is_transient() {
        let f = flow(
            vec![
                Err(ApiConnectionError::EmptyContent),
                Err(ApiConnectionError::EmptyContent),
            ],
            Arc::new(CorpusIndex::from_docs(Vec::new())),
        );
        let out = f.recommend("随便", &[]).await;
        assert!(out.transient_failure);
        assert!(out.recommendations.is_empty());
        assert!(!out.no_match);
    }

    #[tokio::test]
    async fn empty_model_set_is_no_match_not_failure() {
        let payload = json!({ "recommendations": [] });
        let f = flow(vec![ScriptedTransport::text(&payload.to_string())], corpus());
        let out = f.recommend("只有一块姜", &["姜".to_string()]).await;
        assert!(out.no_match);
        assert!(!out.transient_failure);
    }

    #[test]
    fn dedupe_drops_repeats_and_caps_the_total() {
        let recs: Vec<Recommendation> = (0..5)
            .map(|i| {
                serde_json::from_value(rec_json(&format!("快手菜{}号", i), "easy")).unwrap()
            })
            .chain(std::iter::once(
                serde_json::from_value(rec_json("快手菜0号", "easy")).unwrap(),
            ))
            .collect();
        let out = dedupe_and_cap(recs);
        assert_eq!(out.len(), MAX_RECOMMENDATIONS);
        assert_eq!(out[0].name, "快手菜0号");
        assert_eq!(out[2].name, "快手菜2号");
    }

    #[test]
    fn cap_prefers_one_dish_per_band() {
        let recs: Vec<Recommendation> = [
            ("凉拌黄瓜", "easy"),
            ("炒土豆丝", "easy"),
            ("番茄炒蛋", "easy"),
            ("红烧肉", "medium"),
            ("佛跳墙", "hard"),
        ]
        .iter()
        .map(|(name, level)| serde_json::from_value(rec_json(name, level)).unwrap())
        .collect();
        let out = dedupe_and_cap(recs);

        assert_eq!(out.len(), MAX_RECOMMENDATIONS);
        assert_eq!(out[0].difficulty, Difficulty::Easy);
        assert_eq!(out[1].difficulty, Difficulty::Medium);
        assert_eq!(out[2].difficulty, Difficulty::Hard);
        assert_eq!(out[0].name, "凉拌黄瓜");
    }
}
