//! Durable storage: chunk store, lexical index, and analytics records.

pub mod schema;
mod sqlite;

pub use sqlite::SqliteStorage;

use serde::Serialize;

/// Default database file name under the data directory.
pub const DEFAULT_DB_NAME: &str = "rlg.db";

/// Analytics record for a processed query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryRecord {
    /// Query id (UUID string).
    pub id: String,
    /// The question text.
    pub question: String,
    /// Candidates retrieved before context assembly.
    pub chunks_retrieved: usize,
    /// Chunks that made it into the prompt context.
    pub chunks_used: usize,
    /// Retrieval wall time in milliseconds.
    pub retrieval_time_ms: Option<u64>,
    /// Generation wall time in milliseconds.
    pub generation_time_ms: Option<u64>,
    /// Tokens reported by the generator.
    pub tokens_used: Option<u64>,
    /// Grounding score of the validated answer.
    pub grounding_score: Option<f64>,
    /// Whether the answer passed validation.
    pub is_grounded: bool,
    /// Creation timestamp (unix seconds).
    pub created_at: i64,
}

impl QueryRecord {
    /// Creates a fresh record for a question.
    #[must_use]
    pub fn new(question: &str) -> Self {
        Self {
            id: crate::core::new_id(),
            question: question.to_string(),
            chunks_retrieved: 0,
            chunks_used: 0,
            retrieval_time_ms: None,
            generation_time_ms: None,
            tokens_used: None,
            grounding_score: None,
            is_grounded: false,
            created_at: crate::core::now_timestamp(),
        }
    }
}

/// Stored answer with citation provenance.
#[derive(Debug, Clone, Serialize)]
pub struct AnswerRecord {
    /// Answer id (UUID string).
    pub id: String,
    /// Owning query id.
    pub query_id: String,
    /// The generated answer text.
    pub answer_text: String,
    /// JSON array of `{chunk_id, citation}` objects.
    pub source_chunks: String,
    /// Grounding score from validation.
    pub grounding_score: f64,
    /// Whether the answer passed validation.
    pub is_valid: bool,
    /// Name of the generation model used.
    pub model_used: String,
    /// Creation timestamp (unix seconds).
    pub created_at: i64,
}

/// Aggregate query analytics.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct QueryStats {
    /// Total queries recorded.
    pub total_queries: usize,
    /// Queries whose answer passed validation.
    pub grounded_queries: usize,
    /// Mean grounding score across recorded queries.
    pub average_grounding_score: f64,
}

/// Storage-level statistics.
#[derive(Debug, Clone, Serialize)]
pub struct StorageStats {
    /// Number of documents.
    pub document_count: usize,
    /// Number of documents in the `Indexed` state.
    pub indexed_document_count: usize,
    /// Total number of chunks.
    pub chunk_count: usize,
    /// Total queries recorded.
    pub query_count: usize,
    /// Schema version.
    pub schema_version: u32,
    /// Database file size in bytes, when file-backed.
    pub db_size: Option<u64>,
}
