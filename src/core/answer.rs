//! Answer, grounding, and refusal records.
//!
//! The query pipeline's outcome is a tagged variant: either a grounded
//! answer with sentence-level provenance, or an explicit refusal.
//! Callers pattern-match; there is no stringly-typed status field.

use serde::{Deserialize, Serialize};

/// How a sentence was matched against the retrieved context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    /// Sentence carries a `[k]` marker and is similar to the cited chunk.
    Cited,
    /// Sentence (markers stripped) is a verbatim substring of a chunk.
    Exact,
    /// High word overlap with a chunk.
    Paraphrase,
    /// High embedding similarity with a chunk.
    Inferred,
    /// No strategy matched.
    Ungrounded,
}

impl MatchType {
    /// Returns the match type as a stable lowercase string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Cited => "cited",
            Self::Exact => "exact",
            Self::Paraphrase => "paraphrase",
            Self::Inferred => "inferred",
            Self::Ungrounded => "ungrounded",
        }
    }
}

/// Result of grounding validation for a single answer sentence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingResult {
    /// The sentence text.
    pub sentence: String,
    /// Whether a matching strategy succeeded.
    pub is_grounded: bool,
    /// Confidence in [0, 1] from the matching strategy.
    pub confidence: f64,
    /// Ids of chunks supporting this sentence.
    pub matched_chunks: Vec<String>,
    /// Excerpts from those chunks that support the sentence.
    pub matched_excerpts: Vec<String>,
    /// Which strategy matched.
    pub match_type: MatchType,
}

/// Aggregate validation result for an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the answer passes the grounding threshold with no
    /// fatal errors.
    pub is_valid: bool,
    /// Fraction of sentences grounded, in [0, 1].
    pub grounding_score: f64,
    /// Per-sentence results.
    pub sentence_results: Vec<GroundingResult>,
    /// Non-fatal findings.
    pub warnings: Vec<String>,
    /// Fatal findings.
    pub errors: Vec<String>,
}

impl ValidationResult {
    /// Builds the invalid result used for empty answers or context.
    #[must_use]
    pub fn empty(warning: &str) -> Self {
        Self {
            is_valid: false,
            grounding_score: 0.0,
            sentence_results: Vec::new(),
            warnings: vec![warning.to_string()],
            errors: Vec::new(),
        }
    }
}

/// A citation to a source chunk attached to an answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceCitation {
    /// Supporting chunk id.
    pub chunk_id: String,
    /// Owning document's filename.
    pub document_name: String,
    /// Page number, when known.
    pub page_number: Option<u32>,
    /// Section title, when known.
    pub section: Option<String>,
    /// The text that supports the claim.
    pub excerpt: String,
    /// Relevance or confidence score for this citation.
    pub relevance_score: f64,
    /// How the citation was matched.
    pub match_type: String,
}

/// A sentence of the answer with its grounding evidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundedSentence {
    /// Sentence text.
    pub text: String,
    /// Supporting citations.
    pub citations: Vec<SourceCitation>,
    /// Grounding confidence.
    pub confidence: f64,
    /// Whether the sentence is grounded.
    pub is_grounded: bool,
}

/// A grounded answer with full provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerResponse {
    /// The answer text.
    pub answer: String,
    /// Sentence-level grounding evidence.
    pub grounded_sentences: Vec<GroundedSentence>,
    /// Fraction of sentences grounded.
    pub grounding_score: f64,
    /// Source citations for the context chunks used.
    pub sources_used: Vec<SourceCitation>,
    /// Total candidates retrieved before context assembly.
    pub total_sources_retrieved: usize,
    /// Whether the answer passed validation.
    pub is_grounded: bool,
    /// Joined validation warnings, when any.
    pub warning: Option<String>,
    /// Persisted query id for analytics.
    pub query_id: String,
    /// End-to-end processing time in milliseconds.
    pub processing_time_ms: u64,
    /// Name of the generation model used.
    pub model_used: String,
}

/// An explicit refusal when no grounded answer can be produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoAnswerResponse {
    /// Why the answer was refused.
    pub reason: String,
    /// Suggestions for reformulating the query.
    pub suggestions: Vec<String>,
    /// Relevant but unverified text, when available (truncated).
    pub partial_info: Option<String>,
    /// Number of sources that were checked.
    pub sources_checked: usize,
}

/// Outcome of a query: a grounded answer or an explicit refusal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// A validated, grounded answer.
    Answered(Box<AnswerResponse>),
    /// A refusal with diagnostics.
    Refused(NoAnswerResponse),
}

impl QueryOutcome {
    /// Returns the answer when the outcome is `Answered`.
    #[must_use]
    pub fn answer(&self) -> Option<&AnswerResponse> {
        match self {
            Self::Answered(answer) => Some(answer),
            Self::Refused(_) => None,
        }
    }

    /// Returns the refusal when the outcome is `Refused`.
    #[must_use]
    pub const fn refusal(&self) -> Option<&NoAnswerResponse> {
        match self {
            Self::Answered(_) => None,
            Self::Refused(refusal) => Some(refusal),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_match_type_as_str() {
        assert_eq!(MatchType::Cited.as_str(), "cited");
        assert_eq!(MatchType::Ungrounded.as_str(), "ungrounded");
    }

    #[test]
    fn test_validation_result_empty() {
        let result = ValidationResult::empty("empty answer or context");
        assert!(!result.is_valid);
        assert!(result.grounding_score.abs() < f64::EPSILON);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn test_query_outcome_accessors() {
        let refused = QueryOutcome::Refused(NoAnswerResponse {
            reason: "no sources".to_string(),
            suggestions: vec![],
            partial_info: None,
            sources_checked: 0,
        });
        assert!(refused.answer().is_none());
        assert_eq!(refused.refusal().map(|r| r.sources_checked), Some(0));
    }

    #[test]
    fn test_query_outcome_serialization_tag() {
        let refused = QueryOutcome::Refused(NoAnswerResponse {
            reason: "r".to_string(),
            suggestions: vec![],
            partial_info: None,
            sources_checked: 1,
        });
        let json = serde_json::to_string(&refused).unwrap();
        assert!(json.contains("\"status\":\"refused\""));
    }
}
