//! Lexical retrieval over the reference corpus. CJK text has no word
//! boundaries, so queries are shingled into overlapping character bigrams and
//! matched as substrings against normalized document fields.

use std::collections::HashSet;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::corpus::{CorpusIndex, ReferenceDocument};
use crate::fuzzy::fold_dish_text;

/// Score granted when the normalized dish name is a literal substring of the
/// normalized title. Dominates all token-level scoring.
const TITLE_SUBSTRING_BONUS: i64 = 120;
const TITLE_TOKEN_SCORE: i64 = 8;
const INGREDIENT_TOKEN_SCORE: i64 = 5;
const CONTENT_TOKEN_SCORE: i64 = 1;
/// Body window considered for content hits.
const CONTENT_WINDOW_CHARS: usize = 1200;
/// Synthetic score for direct path resolution; not comparable to retrieval
/// scores.
const RESOLVED_SCORE: i64 = 999;

pub const DEFAULT_LIMIT: usize = 3;

static PUNCTUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"[，,。；;：:()（）【】\[\]"'“”‘’]"#).expect("punctuation regex")
});
static NON_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\p{Han}a-z0-9]+").expect("token split regex"));

/// Lowercase, strip whitespace and common CJK/ASCII punctuation.
pub fn normalize_text(input: &str) -> String {
    let lowered = input.to_lowercase();
    let no_space: String = lowered.chars().filter(|c| !c.is_whitespace()).collect();
    PUNCTUATION.replace_all(&no_space, "").into_owned()
}

/// Bigram shingling: tokens of length <= 2 pass through unsplit; longer
/// tokens contribute themselves plus every overlapping 2-char window.
pub fn tokenize(input: &str) -> Vec<String> {
    let normalized = normalize_text(input);
    let mut tokens = Vec::new();
    for piece in NON_TOKEN.split(&normalized) {
        if piece.is_empty() {
            continue;
        }
        let chars: Vec<char> = piece.chars().collect();
        if chars.len() <= 2 {
            tokens.push(piece.to_string());
            continue;
        }
        tokens.push(piece.to_string());
        for window in chars.windows(2) {
            tokens.push(window.iter().collect());
        }
    }
    tokens
}

/// Per-query retrieval hit. Scores are retrieval-internal and not comparable
/// across queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceMatch {
    pub title: String,
    pub path: String,
    pub score: i64,
    pub excerpt: String,
}

#[derive(Debug, Clone, Default)]
pub struct RetrievalQuery {
    pub input_text: Option<String>,
    pub owned_ingredients: Vec<String>,
    pub dish_name: Option<String>,
    pub limit: usize,
}

fn short_text(input: &str, max_chars: usize) -> String {
    let chars: Vec<char> = input.chars().collect();
    if chars.len() <= max_chars {
        return input.to_string();
    }
    let mut out: String = chars[..max_chars].iter().collect();
    out.push_str("...");
    out
}

fn build_excerpt(doc: &ReferenceDocument) -> String {
    let mut parts = Vec::new();
    if !doc.ingredients.is_empty() {
        let names: Vec<&str> = doc.ingredients.iter().take(6).map(String::as_str).collect();
        parts.push(format!("必备原料: {}", names.join("、")));
    }
    if !doc.operations.is_empty() {
        let ops: Vec<&str> = doc.operations.iter().take(3).map(String::as_str).collect();
        parts.push(format!("关键操作: {}", ops.join("；")));
    }
    if parts.is_empty() {
        parts.push(short_text(&doc.content, 140));
    }
    short_text(&parts.join("\n"), 180)
}

fn to_reference(doc: &ReferenceDocument, score: i64) -> ReferenceMatch {
    ReferenceMatch {
        title: doc.title.clone(),
        path: doc.relative_path.clone(),
        score,
        excerpt: build_excerpt(doc),
    }
}

fn score_doc(doc: &ReferenceDocument, tokens: &HashSet<String>, dish_name: Option<&str>) -> i64 {
    let title_norm = normalize_text(&doc.title);
    let ingredient_norm = normalize_text(&doc.ingredients.join(" "));
    let content_window: String = doc.content.chars().take(CONTENT_WINDOW_CHARS).collect();
    let content_norm = normalize_text(&content_window);

    let mut score = 0;

    if let Some(dish) = dish_name {
        // Synonym folding on both sides, so 西红柿炒鸡蛋 can hit 番茄炒蛋.
        let dish_fold = fold_dish_text(&normalize_text(dish));
        let title_fold = fold_dish_text(&title_norm);
        if !dish_fold.is_empty() && title_fold.contains(&dish_fold) {
            score += TITLE_SUBSTRING_BONUS;
        }
    }

    for token in tokens {
        if token.chars().count() <= 1 {
            continue;
        }
        if title_norm.contains(token.as_str()) {
            score += TITLE_TOKEN_SCORE;
        }
        if ingredient_norm.contains(token.as_str()) {
            score += INGREDIENT_TOKEN_SCORE;
        }
        if content_norm.contains(token.as_str()) {
            score += CONTENT_TOKEN_SCORE;
        }
    }

    score
}

pub struct Retriever {
    corpus: Arc<CorpusIndex>,
}

impl Retriever {
    pub fn new(corpus: Arc<CorpusIndex>) -> Self {
        Self { corpus }
    }

    pub fn retrieve(&self, query: &RetrievalQuery) -> Vec<ReferenceMatch> {
        if self.corpus.is_empty() {
            return Vec::new();
        }

        let mut joined = Vec::new();
        if let Some(dish) = &query.dish_name {
            joined.push(dish.clone());
        }
        if let Some(text) = &query.input_text {
            joined.push(text.clone());
        }
        joined.extend(query.owned_ingredients.iter().cloned());

        let tokens: HashSet<String> = tokenize(&joined.join(" ")).into_iter().collect();
        // Title-substring hits alone qualify when a dish name is supplied;
        // otherwise require more than a single coincidental token hit.
        let min_score = if query.dish_name.is_some() { 1 } else { 3 };
        let limit = if query.limit == 0 { DEFAULT_LIMIT } else { query.limit };

        let mut scored: Vec<(i64, &ReferenceDocument)> = self
            .corpus
            .docs()
            .iter()
            .map(|doc| (score_doc(doc, &tokens, query.dish_name.as_deref()), doc))
            .filter(|(score, _)| *score >= min_score)
            .collect();
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        scored
            .into_iter()
            .take(limit)
            .map(|(score, doc)| to_reference(doc, score))
            .collect()
    }

    /// Exact-path, then path-contains, then contains-path matching. Used when
    /// a recommendation already carries a grounding hint and must not be
    /// re-ranked.
    pub fn resolve_by_path(&self, path_hint: &str) -> Option<ReferenceMatch> {
        let normalized = normalize_text(path_hint);
        if normalized.is_empty() {
            return None;
        }

        if let Some(doc) = self.corpus.get_by_path(path_hint) {
            return Some(to_reference(doc, RESOLVED_SCORE));
        }

        let docs = self.corpus.docs();
        docs.iter()
            .find(|doc| normalize_text(&doc.relative_path).contains(&normalized))
            .or_else(|| {
                docs.iter()
                    .find(|doc| normalized.contains(&normalize_text(&doc.relative_path)))
            })
            .map(|doc| to_reference(doc, RESOLVED_SCORE))
    }
}

/// Grounding block handed to the model prompt.
pub fn build_context(refs: &[ReferenceMatch]) -> String {
    if refs.is_empty() {
        return "未命中本地菜谱库，保持原有规则生成。".to_string();
    }

    refs.iter()
        .enumerate()
        .map(|(idx, r)| format!("参考{}: {}\n来源: {}\n{}", idx + 1, r.title, r.path, r.excerpt))
        .collect::<Vec<_>>()
        .join("\n\n")
}
