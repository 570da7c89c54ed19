//! Core domain types for the RLG engine.
//!
//! Documents, chunks, and the answer/validation records that flow
//! through the query pipeline.

mod answer;
mod chunk;
mod document;

pub use answer::{
    AnswerResponse, GroundedSentence, GroundingResult, MatchType, NoAnswerResponse, QueryOutcome,
    SourceCitation, ValidationResult,
};
pub use chunk::{Chunk, ChunkRole, HEADING_CONFIDENCE_WEIGHT, content_hash};
pub use document::{Document, DocumentMetadata, DocumentStatus, DocumentType};

/// Returns the current Unix timestamp in seconds.
#[allow(clippy::cast_possible_wrap)]
#[must_use]
pub fn now_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Generates a fresh UUID string id.
#[must_use]
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
