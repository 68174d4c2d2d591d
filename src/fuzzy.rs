//! Fuzzy matching between generated dish names and corpus titles: synonym
//! folding, cosmetic-modifier stripping, and character-bigram Jaccard
//! similarity.

use std::collections::HashSet;

use crate::normalize::LEXICON;
use crate::retriever::normalize_text;

/// Similarity at or above this accepts a corpus title as grounding.
pub const MATCH_THRESHOLD: f64 = 0.72;
/// Containment of one normalized name in the other counts as this.
pub const CONTAINMENT_SCORE: f64 = 0.88;

/// Apply the ordered dish-name substring folds (番茄→西红柿, 鸡蛋→蛋, ...).
pub fn fold_dish_text(input: &str) -> String {
    let mut text = input.to_string();
    for (from, to) in &LEXICON.dish_folds {
        text = text.replace(from.as_str(), to);
    }
    text
}

fn strip_cosmetic_modifiers(input: &str) -> String {
    let mut text = input.to_string();
    let mut changed = true;
    while changed {
        changed = false;
        for modifier in &LEXICON.cosmetic_modifiers {
            if let Some(rest) = text.strip_prefix(modifier.as_str()) {
                if !rest.is_empty() {
                    text = rest.to_string();
                    changed = true;
                }
            }
            if let Some(rest) = text.strip_suffix(modifier.as_str()) {
                if !rest.is_empty() {
                    text = rest.to_string();
                    changed = true;
                }
            }
        }
    }
    text
}

/// Canonical form of a dish name for matching purposes.
pub fn normalize_dish_name(raw: &str) -> String {
    strip_cosmetic_modifiers(&fold_dish_text(&normalize_text(raw)))
}

fn bigrams(input: &str) -> HashSet<(char, char)> {
    let chars: Vec<char> = input.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

/// Intersection-over-union of character bigram sets. Strings of one or two
/// characters are compared as whole tokens.
pub fn bigram_jaccard(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a.chars().count() <= 2 || b.chars().count() <= 2 {
        return if a == b { 1.0 } else { 0.0 };
    }

    let set_a = bigrams(a);
    let set_b = bigrams(b);
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// Similarity between a generated dish name and a corpus title, after both
/// are normalized.
pub fn title_similarity(dish_name: &str, title: &str) -> f64 {
    let a = normalize_dish_name(dish_name);
    let b = normalize_dish_name(title);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }
    if a.contains(&b) || b.contains(&a) {
        return CONTAINMENT_SCORE;
    }
    bigram_jaccard(&a, &b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosmetic_suffix_strips_to_equality() {
        assert!(title_similarity("麻婆豆腐", "麻婆豆腐做法") >= MATCH_THRESHOLD);
        assert!(title_similarity("家常红烧肉", "红烧肉") >= MATCH_THRESHOLD);
    }

    #[test]
    fn unrelated_dishes_stay_below_threshold() {
        assert!(title_similarity("西红柿炒蛋", "红烧肉") < MATCH_THRESHOLD);
        assert!(bigram_jaccard("西红柿炒蛋", "红烧肉") < MATCH_THRESHOLD);
    }

    #[test]
    fn synonym_folding_aligns_names() {
        // 番茄炒蛋 and 西红柿炒鸡蛋 converge through the dish folds.
        assert!(title_similarity("西红柿炒鸡蛋", "番茄炒蛋") >= MATCH_THRESHOLD);
    }

    #[test]
    fn short_names_compare_whole() {
        assert_eq!(bigram_jaccard("蛋", "蛋"), 1.0);
        assert_eq!(bigram_jaccard("蛋", "肉"), 0.0);
    }

    #[test]
    fn containment_scores_fixed_value() {
        let sim = title_similarity("青椒土豆丝", "青椒土豆丝(加辣版)");
        assert!((sim - CONTAINMENT_SCORE).abs() < 1e-9 || sim == 1.0);
    }
}
