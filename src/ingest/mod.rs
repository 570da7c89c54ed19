//! Document ingestion.
//!
//! Converts source files into addressable, citation-bearing chunks:
//! extension dispatch, pluggable text extraction, structure-aware
//! chunking, and atomic index population. Ingestion is idempotent on
//! the SHA-256 of the raw file bytes.

pub mod chunker;
pub mod extract;

pub use chunker::{DraftChunk, MIN_CHUNK_SIZE};
pub use extract::{ExtractEvent, Extraction, Extractor, HtmlExtractor, MarkdownExtractor,
    PageText, TextExtractor};

use crate::config::Settings;
use crate::core::{Chunk, Document, DocumentMetadata, DocumentType};
use crate::embedding::Embedder;
use crate::error::{Error, IngestionError, IoError, Result};
use crate::index::VectorIndex;
use crate::storage::SqliteStorage;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, info, warn};

/// File extensions accepted for upload.
pub const ALLOWED_EXTENSIONS: &[&str] = &[
    "pdf", "docx", "doc", "txt", "html", "htm", "md", "xlsx", "xls", "png", "jpg", "jpeg",
];

/// Files at or above this size are read through a memory map.
const MMAP_THRESHOLD: u64 = 1024 * 1024;

/// Document ingestion pipeline.
///
/// Holds the extractor registry and chunking configuration; storage,
/// index, and embedder handles are passed per call so the orchestrator
/// keeps ownership.
pub struct Ingestor {
    extractors: Vec<Box<dyn Extractor>>,
    chunk_size: usize,
}

impl Ingestor {
    /// Creates an ingestor with the built-in extractors registered.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            extractors: vec![
                Box::new(TextExtractor),
                Box::new(MarkdownExtractor),
                Box::new(HtmlExtractor),
            ],
            chunk_size: settings.chunk_size,
        }
    }

    /// Registers an additional extractor (e.g. a PDF or OCR plugin).
    /// Later registrations take precedence over built-ins.
    pub fn register_extractor(&mut self, extractor: Box<dyn Extractor>) {
        self.extractors.insert(0, extractor);
    }

    fn extractor_for(&self, file_type: DocumentType) -> Option<&dyn Extractor> {
        self.extractors
            .iter()
            .find(|e| e.supports(file_type))
            .map(AsRef::as_ref)
    }

    /// Ingests a file into the corpus.
    ///
    /// Idempotent on the file hash: re-ingesting identical bytes
    /// returns the existing document unchanged. On failure after the
    /// document row exists, the document transitions to `Failed`, no
    /// chunk rows remain, and the error propagates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadInput`] for unsupported extensions (before
    /// any row is persisted), [`IngestionError`] for extraction
    /// failures, and storage errors for persistence failures.
    pub fn ingest_path(
        &self,
        storage: &mut SqliteStorage,
        index: &VectorIndex,
        embedder: &dyn Embedder,
        batch_size: usize,
        path: &Path,
        metadata: &DocumentMetadata,
    ) -> Result<Document> {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| Error::bad_input("path has no filename"))?;

        let extension = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
            return Err(Error::bad_input(format!(
                "unsupported file type: .{extension} (allowed: {})",
                ALLOWED_EXTENSIONS.join(", ")
            )));
        }

        let file_type = DocumentType::from_extension(&extension)
            .ok_or_else(|| Error::bad_input(format!("unsupported file type: .{extension}")))?;

        // Fail before persisting anything when we cannot parse the format.
        let extractor = self
            .extractor_for(file_type)
            .ok_or(IngestionError::NoExtractor { extension })?;

        let bytes = read_file_bytes(path)?;
        let file_hash = hex_digest(&bytes);

        if let Some(existing) = storage.find_document_by_hash(&file_hash)? {
            info!(document_id = %existing.id, "duplicate upload, returning existing document");
            return Ok(existing);
        }

        let document = Document::new(
            filename,
            path.to_string_lossy().to_string(),
            file_type,
            bytes.len() as u64,
            file_hash,
            metadata,
        );
        storage.insert_document(&document)?;
        debug!(document_id = %document.id, extractor = extractor.name(), "ingesting");

        match self.extract_and_index(storage, index, embedder, batch_size, &document, &bytes) {
            Ok((chunk_count, page_count)) => {
                storage.mark_document_indexed(&document.id, chunk_count, page_count)?;
                info!(document_id = %document.id, chunk_count, "document indexed");
                storage
                    .get_document(&document.id)?
                    .ok_or_else(|| Error::not_found("document", document.id.clone()))
            }
            Err(err) => {
                warn!(document_id = %document.id, error = %err, "ingestion failed");
                // Partial chunk writes must not survive the failure.
                let orphaned = storage.delete_document_chunks(&document.id)?;
                if !orphaned.is_empty() {
                    index.remove(&orphaned)?;
                }
                storage.mark_document_failed(&document.id, &err.to_string())?;
                Err(err)
            }
        }
    }

    /// Re-ingests a document from its stored source file, replacing its
    /// chunks and index entries. Equivalent to delete-then-ingest in
    /// observable state, but keeps the document id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids, [`IoError`] when
    /// the stored file is gone, and ingestion errors as for ingest.
    pub fn reindex_document(
        &self,
        storage: &mut SqliteStorage,
        index: &VectorIndex,
        embedder: &dyn Embedder,
        batch_size: usize,
        document_id: &str,
    ) -> Result<Document> {
        let document = storage
            .get_document(document_id)?
            .ok_or_else(|| Error::not_found("document", document_id))?;

        let path = Path::new(&document.filepath);
        if !path.exists() {
            return Err(IoError::FileNotFound {
                path: document.filepath.clone(),
            }
            .into());
        }

        let old_chunks = storage.delete_document_chunks(document_id)?;
        if !old_chunks.is_empty() {
            index.remove(&old_chunks)?;
        }

        let bytes = read_file_bytes(path)?;
        match self.extract_and_index(storage, index, embedder, batch_size, &document, &bytes) {
            Ok((chunk_count, page_count)) => {
                storage.mark_document_indexed(document_id, chunk_count, page_count)?;
                info!(document_id, chunk_count, "document reindexed");
                storage
                    .get_document(document_id)?
                    .ok_or_else(|| Error::not_found("document", document_id))
            }
            Err(err) => {
                let orphaned = storage.delete_document_chunks(document_id)?;
                if !orphaned.is_empty() {
                    index.remove(&orphaned)?;
                }
                storage.mark_document_failed(document_id, &err.to_string())?;
                Err(err)
            }
        }
    }

    /// Extracts, chunks, persists, and indexes a document's content.
    /// Returns `(chunk_count, page_count)`.
    fn extract_and_index(
        &self,
        storage: &mut SqliteStorage,
        index: &VectorIndex,
        embedder: &dyn Embedder,
        batch_size: usize,
        document: &Document,
        bytes: &[u8],
    ) -> Result<(u32, u32)> {
        let extractor = self
            .extractor_for(document.file_type)
            .ok_or_else(|| IngestionError::NoExtractor {
                extension: document.file_type.as_str().to_string(),
            })?;

        let extraction = extractor.extract(bytes)?;

        let (drafts, page_count) = match extraction {
            Extraction::Text(pages) => {
                let page_count = pages
                    .iter()
                    .filter_map(|p| p.page_number)
                    .max()
                    .unwrap_or(0);
                (chunker::chunk_text(&pages, self.chunk_size), page_count)
            }
            Extraction::Units(events) => {
                let page_count = events
                    .iter()
                    .filter_map(|e| e.page_number)
                    .max()
                    .unwrap_or(0);
                let drafts = chunker::merge_small_chunks(chunker::chunk_units(&events));
                (drafts, page_count)
            }
        };

        let chunks = chunker::finalize_chunks(&document.id, drafts);
        storage.insert_chunks(&chunks)?;

        // Search must never surface a chunk whose document is not yet
        // Indexed; vectors are added before the status flips.
        self.index_chunks(index, embedder, batch_size, &chunks)?;

        #[allow(clippy::cast_possible_truncation)]
        Ok((chunks.len() as u32, page_count))
    }

    /// Embeds chunk contents in batches and appends them to the index.
    fn index_chunks(
        &self,
        index: &VectorIndex,
        embedder: &dyn Embedder,
        batch_size: usize,
        chunks: &[Chunk],
    ) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let batch_size = batch_size.max(1);
        let mut ids = Vec::with_capacity(chunks.len());
        let mut vectors = Vec::with_capacity(chunks.len());

        for batch in chunks.chunks(batch_size) {
            let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
            let embeddings = embedder.embed_batch(&texts)?;
            for (chunk, embedding) in batch.iter().zip(embeddings) {
                ids.push(chunk.id.clone());
                vectors.push(embedding);
            }
        }

        index.add(&ids, &vectors)
    }
}

/// Computes the SHA-256 hex digest of raw bytes.
#[must_use]
pub fn hex_digest(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Reads a file's bytes, memory-mapping large files.
///
/// # Errors
///
/// Returns an error if the file is missing or unreadable.
#[allow(unsafe_code)]
pub fn read_file_bytes(path: &Path) -> Result<Vec<u8>> {
    let path_str = path.to_string_lossy().to_string();

    if !path.exists() {
        return Err(IoError::FileNotFound { path: path_str }.into());
    }

    let file = std::fs::File::open(path).map_err(|e| IoError::ReadFailed {
        path: path_str.clone(),
        reason: e.to_string(),
    })?;
    let size = file
        .metadata()
        .map_err(|e| IoError::ReadFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?
        .len();

    if size >= MMAP_THRESHOLD {
        // Safety: the map is read-only and dropped before return.
        let mmap = unsafe {
            memmap2::Mmap::map(&file).map_err(|e| IoError::MmapFailed {
                path: path_str,
                reason: e.to_string(),
            })?
        };
        Ok(mmap.to_vec())
    } else {
        std::fs::read(path).map_err(|e| {
            IoError::ReadFailed {
                path: path_str,
                reason: e.to_string(),
            }
            .into()
        })
    }
}
