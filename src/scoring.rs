//! Scoring primitives for retrieval and ranking.
//!
//! Reference BM25, score normalization, weighted fusion, and the IR
//! evaluation helpers (precision/recall/F1/MRR) used by retrieval
//! quality checks.

use std::collections::HashMap;

/// BM25 term-saturation parameter.
pub const BM25_K1: f64 = 1.5;

/// BM25 length-normalization parameter.
pub const BM25_B: f64 = 0.75;

/// Computes a BM25 score for a document given query terms.
///
/// This is the reference implementation; production lexical scoring
/// goes through the FTS index, which computes the same quantity. The
/// `term_doc_freq` map carries, per term, the number of documents that
/// contain it.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn bm25_score(
    query_terms: &[String],
    document: &str,
    avg_doc_length: f64,
    doc_count: usize,
    term_doc_freq: &HashMap<String, usize>,
) -> f64 {
    let doc_terms: Vec<String> = document.to_lowercase().split_whitespace().map(String::from).collect();
    let doc_length = doc_terms.len() as f64;

    let mut term_freq: HashMap<&str, usize> = HashMap::new();
    for term in &doc_terms {
        *term_freq.entry(term.as_str()).or_insert(0) += 1;
    }

    let mut score = 0.0;
    for term in query_terms {
        let Some(&tf) = term_freq.get(term.as_str()) else {
            continue;
        };
        let tf = tf as f64;
        let df = term_doc_freq.get(term).copied().unwrap_or(0) as f64;

        let idf = (((doc_count as f64) - df + 0.5) / (df + 0.5) + 1.0).ln();
        let tf_component = (tf * (BM25_K1 + 1.0))
            / (tf + BM25_K1 * (1.0 - BM25_B + BM25_B * doc_length / avg_doc_length));

        score += idf * tf_component;
    }

    score
}

/// Normalizes scores to the [0, 1] range via min-max scaling.
///
/// A constant score list maps to all-ones.
#[must_use]
pub fn normalize_scores(scores: &[f64]) -> Vec<f64> {
    let Some(&first) = scores.first() else {
        return Vec::new();
    };
    let (min, max) = scores.iter().fold((first, first), |(lo, hi), &s| {
        (lo.min(s), hi.max(s))
    });

    if (max - min).abs() < f64::EPSILON {
        return vec![1.0; scores.len()];
    }
    scores.iter().map(|s| (s - min) / (max - min)).collect()
}

/// Scales scores so the maximum becomes 1.0.
///
/// Used for the lexical leg of hybrid retrieval, where only relative
/// magnitude matters. Non-positive maxima yield all zeros.
#[must_use]
pub fn normalize_by_max(scores: &[f64]) -> Vec<f64> {
    let max = scores.iter().fold(0.0_f64, |hi, &s| hi.max(s));
    if max <= 0.0 {
        return vec![0.0; scores.len()];
    }
    scores.iter().map(|s| s / max).collect()
}

/// Combines multiple score lists with weights.
///
/// Each list is min-max normalized before combining; the result is the
/// weighted mean. Returns `None` when the list/weight counts differ or
/// the lists have unequal lengths.
#[must_use]
pub fn combine_scores(scores_list: &[Vec<f64>], weights: &[f64]) -> Option<Vec<f64>> {
    if scores_list.is_empty() || scores_list.len() != weights.len() {
        return None;
    }
    let num_items = scores_list[0].len();
    if scores_list.iter().any(|s| s.len() != num_items) {
        return None;
    }
    let weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 {
        return None;
    }

    let normalized: Vec<Vec<f64>> = scores_list.iter().map(|s| normalize_scores(s)).collect();

    let combined = (0..num_items)
        .map(|i| {
            let weighted: f64 = normalized
                .iter()
                .zip(weights)
                .map(|(scores, w)| scores[i] * w)
                .sum();
            weighted / weight_sum
        })
        .collect();

    Some(combined)
}

/// Computes recall of retrieved ids against a relevant set.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn recall(retrieved: &[String], relevant: &[String]) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let hits = relevant.iter().filter(|r| retrieved.contains(r)).count();
    hits as f64 / relevant.len() as f64
}

/// Computes precision of retrieved ids against a relevant set.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn precision(retrieved: &[String], relevant: &[String]) -> f64 {
    if retrieved.is_empty() {
        return 0.0;
    }
    let hits = retrieved.iter().filter(|r| relevant.contains(r)).count();
    hits as f64 / retrieved.len() as f64
}

/// Computes the F1 score of retrieved ids against a relevant set.
#[must_use]
pub fn f1(retrieved: &[String], relevant: &[String]) -> f64 {
    let p = precision(retrieved, relevant);
    let r = recall(retrieved, relevant);
    if p + r == 0.0 {
        return 0.0;
    }
    2.0 * p * r / (p + r)
}

/// Computes Mean Reciprocal Rank over a set of rankings.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_reciprocal_rank(rankings: &[Vec<String>], relevant: &[String]) -> f64 {
    if rankings.is_empty() {
        return 0.0;
    }

    let total: f64 = rankings
        .iter()
        .map(|ranking| {
            ranking
                .iter()
                .position(|item| relevant.contains(item))
                .map_or(0.0, |pos| 1.0 / (pos as f64 + 1.0))
        })
        .sum();

    total / rankings.len() as f64
}
