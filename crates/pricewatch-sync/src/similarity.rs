//! Token-level fuzzy name similarity for product comparison.

use std::collections::HashMap;

use pricewatch_core::Product;
use serde::Serialize;

/// Candidates must score strictly above this to be ranked.
pub const SIMILARITY_THRESHOLD: f64 = 0.3;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedProduct {
    #[serde(flatten)]
    pub product: Product,
    pub similarity: f64,
}

pub fn tokenize(name: &str) -> Vec<String> {
    name.split_whitespace().map(str::to_lowercase).collect()
}

fn bigrams(token: &str) -> impl Iterator<Item = (char, char)> + '_ {
    token.chars().zip(token.chars().skip(1))
}

/// Dice coefficient over character bigrams: `2 * shared / (bigrams(a) + bigrams(b))`.
///
/// Equal tokens score 1; a token with no bigram scores 0 against anything else.
/// Repeated bigrams are matched at most as often as they occur in both tokens.
fn bigram_dice(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let mut counts: HashMap<(char, char), usize> = HashMap::new();
    let mut a_total = 0usize;
    for bigram in bigrams(a) {
        *counts.entry(bigram).or_insert(0) += 1;
        a_total += 1;
    }
    let mut b_total = 0usize;
    let mut shared = 0usize;
    for bigram in bigrams(b) {
        b_total += 1;
        if let Some(remaining) = counts.get_mut(&bigram) {
            if *remaining > 0 {
                *remaining -= 1;
                shared += 1;
            }
        }
    }
    if a_total == 0 || b_total == 0 {
        return 0.0;
    }
    (2 * shared) as f64 / (a_total + b_total) as f64
}

/// Mean over base tokens of the best bigram Dice score against any candidate token.
///
/// An empty base token list scores 0.
pub fn token_set_similarity(base_tokens: &[String], candidate_tokens: &[String]) -> f64 {
    if base_tokens.is_empty() {
        return 0.0;
    }
    let total = base_tokens
        .iter()
        .map(|bt| {
            candidate_tokens
                .iter()
                .map(|ct| bigram_dice(bt, ct))
                .fold(0.0, f64::max)
        })
        .sum::<f64>();
    total / base_tokens.len() as f64
}

pub fn name_similarity(base: &str, candidate: &str) -> f64 {
    token_set_similarity(&tokenize(base), &tokenize(candidate))
}

pub fn passes_threshold(similarity: f64) -> bool {
    similarity > SIMILARITY_THRESHOLD
}

/// Scores every candidate against `base`, drops those at or below the threshold and
/// sorts by similarity descending. Equal scores keep input order.
pub fn rank(base: &Product, candidates: &[Product]) -> Vec<RankedProduct> {
    let base_tokens = tokenize(&base.name);
    let mut ranked = candidates
        .iter()
        .filter_map(|candidate| {
            let similarity = token_set_similarity(&base_tokens, &tokenize(&candidate.name));
            passes_threshold(similarity).then(|| RankedProduct {
                product: candidate.clone(),
                similarity,
            })
        })
        .collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    ranked
}
