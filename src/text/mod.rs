//! Text processing primitives.
//!
//! Tokenization, stopword filtering, n-gram extraction, token
//! estimation, and sentence splitting shared by the retrieval engine
//! and the grounding validator.

mod sentence;

pub use sentence::split_sentences;

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;
use unicode_segmentation::UnicodeSegmentation;

/// Common English stopwords, sorted for binary search.
static STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "been", "being", "but", "by", "can", "could",
    "did", "do", "does", "doing", "done", "for", "from", "had", "has", "have", "having", "he",
    "her", "here", "hers", "herself", "him", "himself", "his", "how", "i", "if", "in", "into",
    "is", "it", "its", "itself", "just", "me", "might", "more", "most", "must", "my", "myself",
    "no", "nor", "not", "now", "of", "on", "only", "or", "other", "our", "ours", "ourselves",
    "out", "over", "own", "same", "she", "should", "so", "some", "such", "than", "that", "the",
    "their", "theirs", "them", "themselves", "then", "there", "these", "they", "this", "those",
    "through", "to", "too", "under", "until", "up", "very", "was", "we", "were", "what", "when",
    "where", "which", "while", "who", "whom", "why", "will", "with", "would", "you", "your",
    "yours", "yourself", "yourselves",
];

/// Minimum token length kept by the filtered tokenizers.
const MIN_TOKEN_LEN: usize = 3;

/// Returns true if the (lowercase) word is a stopword.
#[must_use]
pub fn is_stopword(word: &str) -> bool {
    STOPWORDS.binary_search(&word).is_ok()
}

#[allow(clippy::expect_used)]
fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| Regex::new(r"[a-z0-9]+").expect("valid regex"))
}

/// Tokenizes text into lowercase word-character runs.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    word_regex()
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Tokenizes text, dropping stopwords and tokens shorter than three
/// characters. This is the query-term extractor used by retrieval.
#[must_use]
pub fn tokenize_filtered(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.len() >= MIN_TOKEN_LEN && !is_stopword(t))
        .collect()
}

/// Returns the set of content words in the text (lowercased, stopwords
/// removed). Used for overlap scoring in the validator.
#[must_use]
pub fn content_word_set(text: &str) -> HashSet<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| !is_stopword(t))
        .collect()
}

/// Extracts n-grams over the token stream.
#[must_use]
pub fn ngrams(text: &str, n: usize) -> Vec<String> {
    let tokens = tokenize(text);
    if n == 0 || tokens.len() < n {
        return Vec::new();
    }
    tokens.windows(n).map(|w| w.join(" ")).collect()
}

/// Extracts the most frequent key phrases (bigrams and trigrams whose
/// boundary words are not stopwords).
#[must_use]
pub fn key_phrases(text: &str, max_phrases: usize) -> Vec<String> {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for phrase in ngrams(text, 2).into_iter().chain(ngrams(text, 3)) {
        let words: Vec<&str> = phrase.split(' ').collect();
        let (Some(first), Some(last)) = (words.first(), words.last()) else {
            continue;
        };
        if is_stopword(first) || is_stopword(last) {
            continue;
        }
        *freq.entry(phrase).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(max_phrases);
    ranked.into_iter().map(|(phrase, _)| phrase).collect()
}

/// Estimates token count using the ~4 characters per token heuristic.
#[must_use]
pub const fn estimate_tokens(text: &str) -> usize {
    text.len() / 4
}

/// Truncates text to an approximate token limit, preferring a sentence
/// boundary when one falls within the last 20% of the budget.
#[must_use]
pub fn truncate_to_tokens(text: &str, max_tokens: usize) -> String {
    let max_chars = max_tokens.saturating_mul(4);
    if text.len() <= max_chars {
        return text.to_string();
    }

    let truncated = &text[..char_boundary(text, max_chars)];
    if let Some(last_period) = truncated.rfind('.') {
        if last_period * 5 > max_chars * 4 {
            return truncated[..=last_period].to_string();
        }
    }
    format!("{truncated}...")
}

/// Returns the first `max_chars` characters of the text, cut at a
/// grapheme boundary, with an ellipsis when anything was dropped.
#[must_use]
pub fn ellipsize(text: &str, max_chars: usize) -> String {
    let mut end = 0;
    let mut count = 0;
    for (offset, grapheme) in text.grapheme_indices(true) {
        if count == max_chars {
            break;
        }
        end = offset + grapheme.len();
        count += 1;
    }
    if end >= text.len() {
        text.to_string()
    } else {
        format!("{}...", &text[..end])
    }
}

/// Finds a valid UTF-8 character boundary at or before the given position.
fn char_boundary(s: &str, pos: usize) -> usize {
    if pos >= s.len() {
        return s.len();
    }
    let mut boundary = pos;
    while !s.is_char_boundary(boundary) && boundary > 0 {
        boundary -= 1;
    }
    boundary
}
