//! Extractive-answer verification.
//!
//! The extractive generation path instructs the model to answer only
//! in literal quotes, each followed by a `[k]` marker, or the
//! `NOT_FOUND` sentinel. Verification here is mechanical: every quote
//! must be a case-insensitive substring of the chunk its marker names.

use crate::context::ContextChunk;
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

/// Sentinel the extractive prompt mandates when no answer exists.
pub const NOT_FOUND_SENTINEL: &str = "NOT_FOUND";

/// A quote extracted from the model response, with its verification
/// status.
#[derive(Debug, Clone, Serialize)]
pub struct VerifiedQuote {
    /// The quoted text.
    pub quote: String,
    /// The citation marker, e.g. `[1]`.
    pub marker: String,
    /// Citation string of the referenced chunk, when the marker
    /// resolves.
    pub citation: Option<String>,
    /// Id of the referenced chunk, when the marker resolves.
    pub chunk_id: Option<String>,
    /// Whether the quote is a substring of the referenced chunk.
    pub verified: bool,
}

/// Parsed and verified extractive response.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractiveOutcome {
    /// The raw response text, absent when the model reported
    /// `NOT_FOUND`.
    pub answer: Option<String>,
    /// Whether the model produced an answer at all.
    pub found: bool,
    /// The extracted quotes with verification results.
    pub quotes: Vec<VerifiedQuote>,
    /// True only when every extracted quote verified.
    pub all_verified: bool,
}

#[allow(clippy::expect_used)]
fn quote_regex() -> &'static Regex {
    static QUOTE: OnceLock<Regex> = OnceLock::new();
    QUOTE.get_or_init(|| Regex::new(r#""([^"]+)"\s*\[(\d+)\]"#).expect("valid regex"))
}

/// Parses an extractive response and verifies each quote against the
/// context chunk its marker names (`[k]` refers to chunk `k-1`).
///
/// A quote whose substring check fails is retained but flagged
/// `verified = false`.
#[must_use]
pub fn parse_extractive_response(
    response: &str,
    context_chunks: &[ContextChunk],
) -> ExtractiveOutcome {
    if response.to_uppercase().contains(NOT_FOUND_SENTINEL) {
        return ExtractiveOutcome {
            answer: None,
            found: false,
            quotes: Vec::new(),
            all_verified: false,
        };
    }

    let mut quotes = Vec::new();
    for capture in quote_regex().captures_iter(response) {
        let quote = capture[1].to_string();
        let marker_number: Option<usize> = capture[2].parse().ok();

        let chunk = marker_number
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| context_chunks.get(idx));

        let verified = chunk.is_some_and(|chunk| {
            chunk
                .content
                .to_lowercase()
                .contains(&quote.to_lowercase())
        });

        quotes.push(VerifiedQuote {
            marker: format!("[{}]", &capture[2]),
            citation: chunk.map(|c| c.citation.clone()),
            chunk_id: chunk.map(|c| c.chunk_id.clone()),
            quote,
            verified,
        });
    }

    let all_verified = !quotes.is_empty() && quotes.iter().all(|q| q.verified);

    ExtractiveOutcome {
        answer: Some(response.to_string()),
        found: true,
        quotes,
        all_verified,
    }
}
