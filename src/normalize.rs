//! Ingredient canonicalization: synonym folding, conversational noise
//! stripping, quantity removal. Favors precision over recall — a token that
//! looks like noise is dropped entirely.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;

use crate::models::IngredientItem;

/// Synonym/noise tables, loaded from a bundled resource rather than inline
/// literals so the algorithm stays independent of the specific word list.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lexicon {
    pub synonyms: HashMap<String, String>,
    /// Ordered substring folds applied to dish names and titles.
    pub dish_folds: Vec<(String, String)>,
    pub cosmetic_modifiers: Vec<String>,
    pub suspicious_ingredients: Vec<String>,
}

pub static LEXICON: LazyLock<Lexicon> = LazyLock::new(|| {
    serde_json::from_str(include_str!("../data/synonyms.json"))
        .expect("bundled synonyms.json is valid")
});

static SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("和|跟|及|还有|以及|并且").expect("separator regex"));

static STRIP_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\s，,。；;：:()（）]"#).expect("strip regex"));

static PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^(我(现在)?(有|买了|买的|准备了|冰箱里有|家里有))",
        r"^(我刚在超市买了|我在超市买了|刚在超市买了|在超市买了)",
        r"^(还有|以及|并且)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("prefix regex"))
    .collect()
});

static SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(怎么吃|怎么做|能做什么|如何做|咋做|可以做啥|做什么)$").expect("suffix regex")
});

static QUANTITY_LEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?(g|kg|ml|l|克|千克|斤|两|毫升|升|个|只|根|颗|片|瓶|袋|盒|勺)?")
        .expect("leading quantity regex")
});

static QUANTITY_TRAILING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]+(\.[0-9]+)?(g|kg|ml|l|克|千克|斤|两|毫升|升|个|只|根|颗|片|瓶|袋|盒|勺)$")
        .expect("trailing quantity regex")
});

static PURE_NUMERAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+$").expect("numeral"));
static QUANTITY_ONLY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]+(\.[0-9]+)?(g|kg|ml|l|克|千克|斤|两|毫升|升|个|只|根|颗|片|瓶|袋|盒|勺)$")
        .expect("quantity-only regex")
});
static LATIN_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z]{4,}[0-9]*").expect("latin run"));
static CONVERSATIONAL_RESIDUE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"我|买|超市|准备|验收|测试").expect("residue"));

static NOISE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"^我.{0,8}(在超市)?(刚)?(买了|买的|买到|准备了)",
        r"^我(现在)?(有|家里有|冰箱里有)",
        r"^(今天|刚才|刚刚|现在|目前|手头)",
        r"(怎么吃|怎么做|能做什么|如何做|咋做|可以做啥|做什么)$",
        r"^(验收|测试|test)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("noise regex"))
    .collect()
});

fn is_likely_noise(token: &str) -> bool {
    if token.is_empty() {
        return true;
    }
    if PURE_NUMERAL.is_match(token) || QUANTITY_ONLY.is_match(token) || LATIN_RUN.is_match(token) {
        return true;
    }
    if token.chars().count() >= 7 && CONVERSATIONAL_RESIDUE.is_match(token) {
        return true;
    }
    NOISE_PATTERNS.iter().any(|p| p.is_match(token))
}

/// Canonicalize one free-text ingredient token. Idempotent.
pub fn normalize_ingredient_name(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let mut cleaned = STRIP_CHARS.replace_all(&lowered, "").into_owned();

    for prefix in PREFIXES.iter() {
        cleaned = prefix.replace(&cleaned, "").into_owned();
    }
    cleaned = SUFFIX.replace(&cleaned, "").into_owned();

    // Quantity runs only come off when a bare name remains; "300g" alone is
    // left for the noise filter.
    let without_leading = QUANTITY_LEADING.replace(&cleaned, "").into_owned();
    if !without_leading.is_empty() {
        cleaned = without_leading;
    }
    let without_trailing = QUANTITY_TRAILING.replace(&cleaned, "").into_owned();
    if !without_trailing.is_empty() {
        cleaned = without_trailing;
    }

    match LEXICON.synonyms.get(cleaned.as_str()) {
        Some(canonical) => canonical.clone(),
        None => cleaned,
    }
}

/// Split on conjunction separators, canonicalize, drop noise, dedupe while
/// preserving order.
pub fn normalize_ingredient_list<S: AsRef<str>>(items: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for item in items {
        for part in SEPARATORS.split(item.as_ref()) {
            let name = normalize_ingredient_name(part);
            if name.is_empty() || is_likely_noise(&name) {
                continue;
            }
            if seen.insert(name.clone()) {
                out.push(name);
            }
        }
    }
    out
}

/// Required items whose normalized name is absent from the normalized owned
/// set. Always a subset of `required`.
pub fn compute_missing(required: &[IngredientItem], owned: &[String]) -> Vec<IngredientItem> {
    let owned_set: HashSet<String> = owned
        .iter()
        .map(|item| normalize_ingredient_name(item))
        .collect();

    required
        .iter()
        .filter(|item| !owned_set.contains(&normalize_ingredient_name(&item.name)))
        .cloned()
        .collect()
}
