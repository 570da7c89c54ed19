//! # RLG-RS
//!
//! Retrieval-Locked Generation engine: grounded question answering
//! over local documents.
//!
//! Given a natural-language question and a corpus of ingested
//! documents, the engine returns an answer whose every sentence is
//! traceable to source excerpts, or an explicit refusal. Unlike plain
//! retrieve-and-generate pipelines, a post-generation **grounding
//! validator** rejects responses not supported by retrieved evidence.
//!
//! ## Subsystems
//!
//! - **Ingestion**: structure-aware chunking of heterogeneous documents
//!   into citation-bearing chunks with preserved structural metadata
//! - **Hybrid retrieval**: BM25 (`SQLite` FTS5) + dense vectors +
//!   structural signals, fused with configurable weights
//! - **Grounding validation**: sentence-level claim verification
//!   against retrieved context via a cascade of matching strategies

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped I/O (memmap2)
#![warn(unsafe_code)]

pub mod cli;
pub mod config;
pub mod context;
pub mod core;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod generate;
pub mod index;
pub mod ingest;
pub mod retrieval;
pub mod scoring;
pub mod storage;
pub mod text;
pub mod validate;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export core domain types
pub use core::{
    AnswerResponse, Chunk, ChunkRole, Document, DocumentMetadata, DocumentStatus, DocumentType,
    GroundingResult, MatchType, NoAnswerResponse, QueryOutcome, ValidationResult,
};

// Re-export configuration
pub use config::Settings;

// Re-export the orchestrator
pub use engine::{Engine, EngineStats, QueryRequest};

// Re-export storage types
pub use storage::SqliteStorage;

// Re-export index types
pub use index::{IndexStats, VectorIndex};

// Re-export service traits and implementations
pub use embedding::{Embedder, HashedEmbedder, OllamaEmbedder, create_embedder};
pub use generate::{GenerateOptions, Generation, Generator, OllamaGenerator};
pub use ingest::{ALLOWED_EXTENSIONS, Extractor, Ingestor};
pub use retrieval::{RetrievalFilter, RetrievedChunk, Retriever};
pub use validate::Validator;

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
