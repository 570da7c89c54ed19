//! Grounding validation.
//!
//! Decomposes a generated answer into sentences and classifies each
//! against the retrieved context using a cascade of matching
//! strategies: citation check, exact substring, word-overlap
//! paraphrase, and embedding similarity. The cascade is ordered and
//! short-circuits on the first strategy whose threshold passes.

mod extractive;

pub use extractive::{ExtractiveOutcome, VerifiedQuote, parse_extractive_response};

use crate::core::{GroundingResult, MatchType, ValidationResult};
use crate::context::ContextChunk;
use crate::embedding::{Embedder, dot_similarity};
use crate::text::{content_word_set, ellipsize, split_sentences};
use crate::Result;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

/// Similarity threshold for accepting a cited chunk as support.
const CITED_SIMILARITY_THRESHOLD: f64 = 0.5;

/// Minimum residue length for the exact-substring strategy.
const EXACT_MIN_LEN: usize = 20;

/// Word-overlap threshold for the paraphrase strategy.
const PARAPHRASE_THRESHOLD: f64 = 0.6;

/// Embedding-similarity threshold for the inferred strategy.
const INFERRED_THRESHOLD: f64 = 0.7;

/// Grounding score below which the answer carries a fatal error.
const FATAL_GROUNDING_FLOOR: f64 = 0.5;

/// Maximum excerpt length returned as evidence.
const EXCERPT_MAX_LEN: usize = 200;

#[allow(clippy::expect_used)]
fn marker_regex() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid regex"))
}

/// Validates that answers are grounded in retrieved context.
pub struct Validator {
    min_confidence: f64,
}

impl Validator {
    /// Creates a validator with the given grounding threshold.
    #[must_use]
    pub const fn new(min_grounding_confidence: f64) -> Self {
        Self {
            min_confidence: min_grounding_confidence,
        }
    }

    /// Validates an answer against the context chunks.
    ///
    /// # Errors
    ///
    /// Returns an error if the embedder fails.
    pub fn validate(
        &self,
        answer: &str,
        context_chunks: &[ContextChunk],
        embedder: &dyn Embedder,
    ) -> Result<ValidationResult> {
        if answer.trim().is_empty() || context_chunks.is_empty() {
            return Ok(ValidationResult::empty("Empty answer or context"));
        }

        let sentences = split_sentences(answer);
        if sentences.is_empty() {
            return Ok(ValidationResult::empty("Answer contains no sentences"));
        }

        let mut sentence_results = Vec::with_capacity(sentences.len());
        for sentence in &sentences {
            sentence_results.push(validate_sentence(sentence, context_chunks, embedder)?);
        }

        let grounded_count = sentence_results.iter().filter(|r| r.is_grounded).count();
        #[allow(clippy::cast_precision_loss)]
        let grounding_score = grounded_count as f64 / sentence_results.len() as f64;

        let mut warnings = Vec::new();
        let mut errors = Vec::new();

        let ungrounded = sentence_results.len() - grounded_count;
        if ungrounded > 0 {
            warnings.push(format!("{ungrounded} sentence(s) could not be verified"));
        }
        if grounding_score < FATAL_GROUNDING_FLOOR {
            errors.push("Less than 50% of the answer is grounded in sources".to_string());
        }
        if !marker_regex().is_match(answer) {
            warnings.push("Answer contains no citation markers".to_string());
        }

        let is_valid = grounding_score >= self.min_confidence && errors.is_empty();
        debug!(grounding_score, is_valid, "answer validated");

        Ok(ValidationResult {
            is_valid,
            grounding_score,
            sentence_results,
            warnings,
            errors,
        })
    }

    /// Decides whether a validated answer must be rejected.
    ///
    /// Returns the rejection reason, or `None` to accept.
    #[must_use]
    pub fn rejection_reason(&self, result: &ValidationResult) -> Option<String> {
        if let Some(error) = result.errors.first() {
            return Some(error.clone());
        }
        if result.grounding_score < self.min_confidence {
            return Some(format!(
                "Answer grounding ({:.0}%) below threshold ({:.0}%)",
                result.grounding_score * 100.0,
                self.min_confidence * 100.0
            ));
        }
        None
    }

}

/// Runs the matching cascade for a single sentence.
fn validate_sentence(
    sentence: &str,
    context_chunks: &[ContextChunk],
    embedder: &dyn Embedder,
) -> Result<GroundingResult> {
    // Strategy 1: citation markers verified by semantic similarity.
    for capture in marker_regex().captures_iter(sentence) {
        let Ok(marker_number) = capture[1].parse::<usize>() else {
            continue;
        };
        let Some(chunk) = marker_number
            .checked_sub(1)
            .and_then(|idx| context_chunks.get(idx))
        else {
            continue;
        };

        let similarity = semantic_similarity(sentence, &chunk.content, embedder)?;
        if similarity > CITED_SIMILARITY_THRESHOLD {
            return Ok(GroundingResult {
                sentence: sentence.to_string(),
                is_grounded: true,
                confidence: similarity,
                matched_chunks: vec![chunk.chunk_id.clone()],
                matched_excerpts: vec![find_matching_excerpt(sentence, &chunk.content)],
                match_type: MatchType::Cited,
            });
        }
    }

    // Strategy 2: exact substring of a chunk (markers stripped).
    let clean_sentence = strip_markers(sentence).to_lowercase();
    if clean_sentence.len() >= EXACT_MIN_LEN {
        for chunk in context_chunks {
            if chunk.content.to_lowercase().contains(&clean_sentence) {
                return Ok(GroundingResult {
                    sentence: sentence.to_string(),
                    is_grounded: true,
                    confidence: 1.0,
                    matched_chunks: vec![chunk.chunk_id.clone()],
                    matched_excerpts: vec![clean_sentence],
                    match_type: MatchType::Exact,
                });
            }
        }
    }

    // Strategy 3: word-overlap paraphrase.
    let mut best_overlap = 0.0;
    let mut best_overlap_chunk: Option<&ContextChunk> = None;
    for chunk in context_chunks {
        let score = overlap_score(sentence, &chunk.content);
        if score > best_overlap {
            best_overlap = score;
            best_overlap_chunk = Some(chunk);
        }
    }
    if best_overlap > PARAPHRASE_THRESHOLD {
        if let Some(chunk) = best_overlap_chunk {
            return Ok(GroundingResult {
                sentence: sentence.to_string(),
                is_grounded: true,
                confidence: best_overlap,
                matched_chunks: vec![chunk.chunk_id.clone()],
                matched_excerpts: vec![find_matching_excerpt(sentence, &chunk.content)],
                match_type: MatchType::Paraphrase,
            });
        }
    }

    // Strategy 4: embedding similarity.
    let mut best_semantic = 0.0;
    let mut best_semantic_chunk: Option<&ContextChunk> = None;
    for chunk in context_chunks {
        let score = semantic_similarity(sentence, &chunk.content, embedder)?;
        if score > best_semantic {
            best_semantic = score;
            best_semantic_chunk = Some(chunk);
        }
    }
    if best_semantic > INFERRED_THRESHOLD {
        if let Some(chunk) = best_semantic_chunk {
            return Ok(GroundingResult {
                sentence: sentence.to_string(),
                is_grounded: true,
                confidence: best_semantic,
                matched_chunks: vec![chunk.chunk_id.clone()],
                matched_excerpts: vec![find_matching_excerpt(sentence, &chunk.content)],
                match_type: MatchType::Inferred,
            });
        }
    }

    // Strategy 5: ungrounded, keeping the best score seen as the
    // confidence diagnostic.
    Ok(GroundingResult {
        sentence: sentence.to_string(),
        is_grounded: false,
        confidence: best_overlap.max(best_semantic),
        matched_chunks: Vec::new(),
        matched_excerpts: Vec::new(),
        match_type: MatchType::Ungrounded,
    })
}

/// Strips `[k]` citation markers from a sentence.
#[must_use]
pub fn strip_markers(sentence: &str) -> String {
    marker_regex().replace_all(sentence, "").trim().to_string()
}

/// Computes the stopword-free word-overlap score between a sentence
/// and chunk content: `|sentence ∩ chunk| / |sentence|`. Stopwords are
/// subtracted from both sides.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn overlap_score(sentence: &str, content: &str) -> f64 {
    let sentence_words = content_word_set(&strip_markers(sentence));
    if sentence_words.is_empty() {
        return 0.0;
    }
    let content_words = content_word_set(content);

    let overlap = sentence_words.intersection(&content_words).count();
    overlap as f64 / sentence_words.len() as f64
}

/// Computes embedding cosine similarity, clamped to [0, 1].
fn semantic_similarity(a: &str, b: &str, embedder: &dyn Embedder) -> Result<f64> {
    let emb_a = embedder.embed(a)?;
    let emb_b = embedder.embed(b)?;
    Ok(f64::from(dot_similarity(&emb_a, &emb_b)).clamp(0.0, 1.0))
}

/// Finds the chunk sentence with the highest word overlap against the
/// answer sentence, truncated to 200 characters.
#[must_use]
pub fn find_matching_excerpt(sentence: &str, content: &str) -> String {
    let sentence_words = content_word_set(sentence);

    let mut best_excerpt = "";
    let mut best_overlap = 0usize;
    let content_sentences = split_sentences(content);
    for excerpt in &content_sentences {
        let excerpt_words = content_word_set(excerpt);
        let overlap = sentence_words.intersection(&excerpt_words).count();
        if overlap > best_overlap {
            best_overlap = overlap;
            best_excerpt = excerpt;
        }
    }

    ellipsize(best_excerpt, EXCERPT_MAX_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashedEmbedder;

    const DIM: usize = 64;

    fn chunk(id: &str, marker: usize, content: &str) -> ContextChunk {
        ContextChunk {
            marker: format!("[{marker}]"),
            content: content.to_string(),
            citation: format!("source-{id}.txt"),
            chunk_id: id.to_string(),
        }
    }

    fn validator() -> Validator {
        Validator::new(0.7)
    }

    fn embedder() -> HashedEmbedder {
        HashedEmbedder::new(DIM)
    }

    #[test]
    fn test_empty_answer_invalid() {
        let result = validator()
            .validate("", &[chunk("c1", 1, "content")], &embedder())
            .unwrap();
        assert!(!result.is_valid);
        assert!(result.grounding_score.abs() < f64::EPSILON);
        assert!(result.warnings[0].contains("Empty"));
    }

    #[test]
    fn test_empty_context_invalid() {
        let result = validator()
            .validate("Some answer.", &[], &embedder())
            .unwrap();
        assert!(!result.is_valid);
        assert!(result.grounding_score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_exact_match_strategy() {
        let chunks = vec![chunk(
            "c1",
            1,
            "The capital of France is Paris, a city on the Seine.",
        )];
        let result = validator()
            .validate("The capital of France is Paris.", &chunks, &embedder())
            .unwrap();

        assert!(result.is_valid);
        assert!((result.grounding_score - 1.0).abs() < f64::EPSILON);
        let sentence = &result.sentence_results[0];
        // No markers: the citation strategy is skipped, exact fires.
        assert_eq!(sentence.match_type, MatchType::Exact);
        assert!((sentence.confidence - 1.0).abs() < f64::EPSILON);
        assert_eq!(sentence.matched_chunks, vec!["c1".to_string()]);
    }

    #[test]
    fn test_cited_match_strategy() {
        let chunks = vec![
            chunk("c1", 1, "The capital of France is Paris."),
            chunk("c2", 2, "Bananas are yellow fruit."),
        ];
        let result = validator()
            .validate("The capital of France is Paris [1].", &chunks, &embedder())
            .unwrap();

        let sentence = &result.sentence_results[0];
        assert!(sentence.is_grounded);
        assert_eq!(sentence.match_type, MatchType::Cited);
        assert_eq!(sentence.matched_chunks, vec!["c1".to_string()]);
        assert!(!sentence.matched_excerpts[0].is_empty());
    }

    #[test]
    fn test_cited_marker_out_of_range_falls_through() {
        let chunks = vec![chunk("c1", 1, "The capital of France is Paris.")];
        // Marker [9] has no chunk; the residue still matches exactly.
        let result = validator()
            .validate("The capital of France is Paris [9].", &chunks, &embedder())
            .unwrap();
        let sentence = &result.sentence_results[0];
        assert!(sentence.is_grounded);
        assert_eq!(sentence.match_type, MatchType::Exact);
    }

    #[test]
    fn test_paraphrase_strategy() {
        let chunks = vec![chunk(
            "c1",
            1,
            "Refunds are processed within thirty days of purchase for all customers.",
        )];
        // Shares most content words, but is not a substring.
        let result = validator()
            .validate(
                "Customers get refunds processed within thirty days.",
                &chunks,
                &embedder(),
            )
            .unwrap();

        let sentence = &result.sentence_results[0];
        assert!(sentence.is_grounded);
        assert_eq!(sentence.match_type, MatchType::Paraphrase);
        assert!(sentence.confidence > 0.6);
    }

    #[test]
    fn test_ungrounded_strategy() {
        let chunks = vec![chunk("c1", 1, "The capital of France is Paris.")];
        let result = validator()
            .validate(
                "Quantum entanglement enables faster-than-light communication.",
                &chunks,
                &embedder(),
            )
            .unwrap();

        let sentence = &result.sentence_results[0];
        assert!(!sentence.is_grounded);
        assert_eq!(sentence.match_type, MatchType::Ungrounded);
        assert!(sentence.matched_chunks.is_empty());
        assert!(sentence.matched_excerpts.is_empty());
        assert!(!result.is_valid);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn test_grounding_score_fraction() {
        let chunks = vec![chunk(
            "c1",
            1,
            "The capital of France is Paris, a city on the Seine.",
        )];
        let answer = "The capital of France is Paris. Unicorns graze on the moon.";
        let result = validator().validate(answer, &chunks, &embedder()).unwrap();

        assert!((result.grounding_score - 0.5).abs() < f64::EPSILON);
        assert!(!result.is_valid);
        // Exactly at the fatal floor: 0.5 is not < 0.5.
        assert!(result.errors.is_empty());
        assert!(result.warnings.iter().any(|w| w.contains("could not be verified")));
    }

    #[test]
    fn test_no_marker_warning() {
        let chunks = vec![chunk(
            "c1",
            1,
            "The capital of France is Paris, a city on the Seine.",
        )];
        let result = validator()
            .validate("The capital of France is Paris.", &chunks, &embedder())
            .unwrap();
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.contains("no citation markers"))
        );
    }

    #[test]
    fn test_fatal_error_below_half() {
        let chunks = vec![chunk("c1", 1, "Entirely unrelated reference text.")];
        let answer = "Made up claim one. Made up claim two. Made up claim three.";
        let result = validator().validate(answer, &chunks, &embedder()).unwrap();

        assert!(result.grounding_score < 0.5);
        assert!(!result.errors.is_empty());
        assert!(validator().rejection_reason(&result).is_some());
    }

    #[test]
    fn test_rejection_reason_threshold() {
        let result = ValidationResult {
            is_valid: false,
            grounding_score: 0.6,
            sentence_results: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        };
        let reason = validator().rejection_reason(&result).unwrap();
        assert!(reason.contains("60%"));
        assert!(reason.contains("70%"));
    }

    #[test]
    fn test_rejection_reason_accepts_valid() {
        let result = ValidationResult {
            is_valid: true,
            grounding_score: 0.9,
            sentence_results: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
        };
        assert!(validator().rejection_reason(&result).is_none());
    }

    #[test]
    fn test_strip_markers() {
        assert_eq!(strip_markers("Paris [1] is the capital [2]."), "Paris  is the capital .");
        assert_eq!(strip_markers("No markers here."), "No markers here.");
    }

    #[test]
    fn test_overlap_score_symmetric_stopword_removal() {
        // Stopword-only sentences score zero.
        assert!(overlap_score("it is the", "anything at all").abs() < f64::EPSILON);

        let score = overlap_score(
            "refunds processed within thirty days",
            "Refunds are processed within thirty days of purchase.",
        );
        assert!((score - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overlap_score_partial() {
        let score = overlap_score(
            "refunds processed instantly forever",
            "Refunds are processed within thirty days.",
        );
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_find_matching_excerpt_picks_best_sentence() {
        let content = "Shipping takes five days. Refunds are processed within thirty days. \
                       Support is available by email.";
        let excerpt = find_matching_excerpt("refunds within thirty days", content);
        assert_eq!(excerpt, "Refunds are processed within thirty days.");
    }

    #[test]
    fn test_find_matching_excerpt_truncates() {
        let long_sentence = format!("Refunds {}", "detail ".repeat(60));
        let excerpt = find_matching_excerpt("refunds detail", &long_sentence);
        assert!(excerpt.ends_with("..."));
        assert!(excerpt.len() <= EXCERPT_MAX_LEN + 3);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn grounding_score_in_unit_range(
                sentences in proptest::collection::vec("[a-zA-Z ]{5,40}\\.", 1..6)
            ) {
                let answer = sentences.join(" ");
                let chunks = vec![chunk("c1", 1, "The capital of France is Paris.")];
                let result = validator().validate(&answer, &chunks, &embedder()).unwrap();
                prop_assert!(result.grounding_score >= 0.0);
                prop_assert!(result.grounding_score <= 1.0);

                let grounded = result.sentence_results.iter().filter(|r| r.is_grounded).count();
                let all = result.sentence_results.len();
                prop_assert_eq!(
                    (result.grounding_score - 1.0).abs() < f64::EPSILON,
                    grounded == all && all > 0
                );
            }
        }
    }
}
