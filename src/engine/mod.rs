//! Query orchestration.
//!
//! The [`Engine`] owns the long-lived services (storage, vector index,
//! embedder, generator) and glues the pipeline together: retrieval,
//! context assembly, generation, grounding validation, and the
//! answer-or-refusal decision, with per-query analytics records.

use crate::config::Settings;
use crate::context::{ContextBuilder, ContextChunk};
use crate::core::{
    AnswerResponse, Chunk, Document, DocumentMetadata, DocumentStatus, GroundedSentence,
    NoAnswerResponse, QueryOutcome, SourceCitation, ValidationResult,
};
use crate::embedding::{Embedder, create_embedder};
use crate::error::{Error, Result};
use crate::generate::{GenerateOptions, Generation, Generator, OllamaGenerator};
use crate::index::{IndexStats, VectorIndex};
use crate::ingest::Ingestor;
use crate::retrieval::{RetrievalFilter, RetrievedChunk, Retriever};
use crate::storage::{AnswerRecord, QueryRecord, QueryStats, SqliteStorage};
use crate::text::ellipsize;
use crate::validate::{Validator, parse_extractive_response};
use serde::Serialize;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Length of the partial-info diagnostic attached to refusals.
const PARTIAL_INFO_LEN: usize = 200;

/// A question with its retrieval constraints.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    /// The question text.
    pub question: String,
    /// Restrict retrieval to these document ids.
    pub document_ids: Option<Vec<String>>,
    /// Restrict retrieval to these categories.
    pub categories: Option<Vec<String>>,
    /// Drop sources below this reliability.
    pub min_reliability: f64,
    /// Number of sources to answer from.
    pub top_k: usize,
    /// Refuse instead of returning an ungrounded answer.
    pub require_grounding: bool,
}

impl QueryRequest {
    /// Creates a request with default constraints.
    #[must_use]
    pub fn new(question: &str) -> Self {
        Self {
            question: question.to_string(),
            document_ids: None,
            categories: None,
            min_reliability: 0.5,
            top_k: 5,
            require_grounding: true,
        }
    }

    fn filter(&self) -> RetrievalFilter {
        RetrievalFilter {
            document_ids: self.document_ids.clone(),
            categories: self.categories.clone(),
            min_reliability: self.min_reliability,
        }
    }
}

/// Aggregate engine statistics.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    /// Number of documents.
    pub documents: usize,
    /// Documents in the `Indexed` state.
    pub indexed_documents: usize,
    /// Total chunks.
    pub chunks: usize,
    /// Query analytics.
    pub queries: QueryStats,
    /// Vector index statistics.
    pub vector_index: IndexStats,
}

/// Result of the shared retrieve-and-assemble prefix of every ask path.
enum Prepared {
    Refused(NoAnswerResponse),
    Ready {
        retrieved: Vec<RetrievedChunk>,
        context: String,
        context_chunks: Vec<ContextChunk>,
        retrieval_ms: u64,
    },
}

/// The grounded question-answering engine.
pub struct Engine {
    settings: Settings,
    storage: SqliteStorage,
    index: VectorIndex,
    embedder: Box<dyn Embedder>,
    generator: Box<dyn Generator>,
    ingestor: Ingestor,
    retriever: Retriever,
    validator: Validator,
    context_builder: ContextBuilder,
}

impl Engine {
    /// Wires an engine from explicit service handles.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the settings are invalid.
    pub fn new(
        settings: Settings,
        storage: SqliteStorage,
        index: VectorIndex,
        embedder: Box<dyn Embedder>,
        generator: Box<dyn Generator>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            ingestor: Ingestor::new(&settings),
            retriever: Retriever::new(&settings),
            validator: Validator::new(settings.min_grounding_confidence),
            context_builder: ContextBuilder::default(),
            settings,
            storage,
            index,
            embedder,
            generator,
        })
    }

    /// Builds an engine from settings: opens the database and vector
    /// index, creates the configured embedder, and connects the Ollama
    /// generator.
    ///
    /// # Errors
    ///
    /// Returns storage, index, or configuration errors.
    pub fn from_settings(settings: Settings) -> Result<Self> {
        settings.ensure_directories()?;

        let mut storage = SqliteStorage::open(&settings.database_url)?;
        storage.init()?;
        let index = VectorIndex::open(&settings.index_dir, settings.embedding_dimension)?;
        let embedder = create_embedder(&settings)?;
        let generator: Box<dyn Generator> = Box::new(OllamaGenerator::new(
            &settings.ollama_host,
            &settings.ollama_model,
            settings.ollama_timeout,
        )?);

        Self::new(settings, storage, index, embedder, generator)
    }

    /// Returns the settings this engine was built with.
    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Registers an additional extractor plugin.
    pub fn register_extractor(&mut self, extractor: Box<dyn crate::ingest::Extractor>) {
        self.ingestor.register_extractor(extractor);
    }

    // ==================== Document Lifecycle ====================

    /// Ingests a file in place (no upload copy).
    ///
    /// # Errors
    ///
    /// See [`Ingestor::ingest_path`].
    pub fn ingest_path(&mut self, path: &Path, metadata: &DocumentMetadata) -> Result<Document> {
        self.ingestor.ingest_path(
            &mut self.storage,
            &self.index,
            self.embedder.as_ref(),
            self.settings.embedding_batch_size,
            path,
            metadata,
        )
    }

    /// Copies a file into the upload directory, then ingests the copy.
    /// The copy is removed again when ingestion fails.
    ///
    /// # Errors
    ///
    /// See [`Ingestor::ingest_path`], plus I/O errors from the copy.
    pub fn ingest_file(&mut self, path: &Path, metadata: &DocumentMetadata) -> Result<Document> {
        let filename = path
            .file_name()
            .ok_or_else(|| Error::bad_input("path has no filename"))?;
        let upload_path = self.settings.upload_dir.join(filename);

        std::fs::copy(path, &upload_path).map_err(|e| crate::error::IoError::WriteFailed {
            path: upload_path.to_string_lossy().to_string(),
            reason: e.to_string(),
        })?;

        match self.ingest_path(&upload_path, metadata) {
            Ok(document) => Ok(document),
            Err(err) => {
                // The saved upload must not outlive a failed ingest.
                if let Err(cleanup) = std::fs::remove_file(&upload_path) {
                    warn!(path = %upload_path.display(), error = %cleanup, "failed to remove upload");
                }
                Err(err)
            }
        }
    }

    /// Fetches a document by id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids.
    pub fn document(&self, id: &str) -> Result<Document> {
        self.storage
            .get_document(id)?
            .ok_or_else(|| Error::not_found("document", id))
    }

    /// Lists documents with optional status and category filters.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn documents(
        &self,
        status: Option<DocumentStatus>,
        category: Option<&str>,
    ) -> Result<Vec<Document>> {
        self.storage.list_documents(status, category)
    }

    /// Lists a document's chunks in sequence order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids.
    pub fn document_chunks(&self, id: &str) -> Result<Vec<Chunk>> {
        self.document(id)?;
        self.storage.document_chunks(id)
    }

    /// Deletes a document, its chunks, its index entries, and the
    /// stored source file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for unknown ids.
    pub fn delete_document(&mut self, id: &str) -> Result<()> {
        let document = self.document(id)?;

        let chunk_ids: Vec<String> = self
            .storage
            .document_chunks(id)?
            .into_iter()
            .map(|c| c.id)
            .collect();
        if !chunk_ids.is_empty() {
            self.index.remove(&chunk_ids)?;
        }
        self.storage.delete_document(id)?;

        let path = Path::new(&document.filepath);
        if path.exists() {
            if let Err(err) = std::fs::remove_file(path) {
                warn!(path = %document.filepath, error = %err, "failed to remove source file");
            }
        }

        info!(document_id = id, chunks = chunk_ids.len(), "document deleted");
        Ok(())
    }

    /// Re-ingests a document from its stored source file.
    ///
    /// # Errors
    ///
    /// See [`Ingestor::reindex_document`].
    pub fn reindex_document(&mut self, id: &str) -> Result<Document> {
        self.ingestor.reindex_document(
            &mut self.storage,
            &self.index,
            self.embedder.as_ref(),
            self.settings.embedding_batch_size,
            id,
        )
    }

    // ==================== Query Pipeline ====================

    /// Runs retrieval only. Used by the search command for debugging
    /// ranking behavior.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadInput`] for empty queries.
    pub fn search(&self, query: &str, filter: &RetrievalFilter, top_k: usize) -> Result<Vec<RetrievedChunk>> {
        self.retriever.retrieve(
            &self.storage,
            &self.index,
            self.embedder.as_ref(),
            query,
            filter,
            top_k,
        )
    }

    /// Answers a question with grounding validation.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadInput`] for empty questions and service
    /// errors from retrieval, generation, or validation. An ungrounded
    /// answer is not an error: it surfaces as
    /// [`QueryOutcome::Refused`].
    pub fn ask(&mut self, request: &QueryRequest) -> Result<QueryOutcome> {
        self.ask_inner(request, None)
    }

    /// Answers a question, streaming generated fragments to `on_token`
    /// before validation runs on the assembled text.
    ///
    /// # Errors
    ///
    /// As for [`Engine::ask`].
    pub fn ask_stream(
        &mut self,
        request: &QueryRequest,
        on_token: &mut dyn FnMut(&str),
    ) -> Result<QueryOutcome> {
        self.ask_inner(request, Some(on_token))
    }

    fn ask_inner(
        &mut self,
        request: &QueryRequest,
        on_token: Option<&mut dyn FnMut(&str)>,
    ) -> Result<QueryOutcome> {
        let start = Instant::now();
        let mut record = QueryRecord::new(&request.question);

        let prepared = self.prepare(request, &mut record)?;
        let (retrieved, context, context_chunks, retrieval_ms) = match prepared {
            Prepared::Refused(refusal) => {
                self.storage.insert_query_record(&record)?;
                return Ok(QueryOutcome::Refused(refusal));
            }
            Prepared::Ready {
                retrieved,
                context,
                context_chunks,
                retrieval_ms,
            } => (retrieved, context, context_chunks, retrieval_ms),
        };
        record.retrieval_time_ms = Some(retrieval_ms);

        // Generation with the grounded prompt framing.
        let prompt = ContextBuilder::grounded_prompt(&context, &request.question, &context_chunks);
        let options = GenerateOptions {
            temperature: 0.1,
            max_tokens: self.settings.max_generation_tokens,
            stop: Vec::new(),
        };

        let generation_start = Instant::now();
        let generation = match on_token {
            Some(on_token) => self
                .generator
                .generate_stream(&prompt, &options, on_token)?,
            None => self.generator.generate(&prompt, &options)?,
        };
        record.generation_time_ms = Some(elapsed_ms(generation_start));
        record.tokens_used = Some(generation.tokens_used);

        // Grounding validation gates the response.
        let validation =
            self.validator
                .validate(&generation.text, &context_chunks, self.embedder.as_ref())?;
        record.grounding_score = Some(validation.grounding_score);
        record.is_grounded = validation.is_valid;

        if request.require_grounding {
            if let Some(reason) = self.validator.rejection_reason(&validation) {
                self.storage.insert_query_record(&record)?;
                info!(reason = %reason, "answer rejected by grounding validator");
                return Ok(QueryOutcome::Refused(NoAnswerResponse {
                    reason,
                    suggestions: vec![
                        "The sources may not contain this information".to_string(),
                        "Try asking a more specific question".to_string(),
                    ],
                    partial_info: Some(ellipsize(&generation.text, PARTIAL_INFO_LEN)),
                    sources_checked: retrieved.len(),
                }));
            }
        }

        let answer = self.build_answer(
            request,
            &record,
            &retrieved,
            &context_chunks,
            &generation,
            &validation,
            elapsed_ms(start),
        );

        record.chunks_used = context_chunks.len();
        self.storage.insert_query_record(&record)?;
        self.storage.insert_answer_record(&AnswerRecord {
            id: crate::core::new_id(),
            query_id: record.id.clone(),
            answer_text: generation.text.clone(),
            source_chunks: serde_json::to_string(
                &context_chunks
                    .iter()
                    .map(|c| serde_json::json!({ "chunk_id": c.chunk_id, "citation": c.citation }))
                    .collect::<Vec<_>>(),
            )?,
            grounding_score: validation.grounding_score,
            is_valid: validation.is_valid,
            model_used: self.generator.model_name().to_string(),
            created_at: crate::core::now_timestamp(),
        })?;

        Ok(QueryOutcome::Answered(Box::new(answer)))
    }

    /// Answers a question in extractive mode: the model may only quote
    /// sources verbatim, and every quote is verified mechanically.
    ///
    /// # Errors
    ///
    /// As for [`Engine::ask`].
    pub fn ask_extractive(&mut self, request: &QueryRequest) -> Result<QueryOutcome> {
        let start = Instant::now();
        let mut record = QueryRecord::new(&request.question);

        let prepared = self.prepare(request, &mut record)?;
        let (retrieved, context, context_chunks, retrieval_ms) = match prepared {
            Prepared::Refused(refusal) => {
                self.storage.insert_query_record(&record)?;
                return Ok(QueryOutcome::Refused(refusal));
            }
            Prepared::Ready {
                retrieved,
                context,
                context_chunks,
                retrieval_ms,
            } => (retrieved, context, context_chunks, retrieval_ms),
        };
        record.retrieval_time_ms = Some(retrieval_ms);

        let prompt =
            ContextBuilder::extractive_prompt(&context, &request.question, &context_chunks);
        let options = GenerateOptions {
            temperature: 0.0,
            max_tokens: self.settings.max_generation_tokens,
            stop: Vec::new(),
        };

        let generation_start = Instant::now();
        let generation = self.generator.generate(&prompt, &options)?;
        record.generation_time_ms = Some(elapsed_ms(generation_start));
        record.tokens_used = Some(generation.tokens_used);

        let outcome = parse_extractive_response(&generation.text, &context_chunks);
        if !outcome.found {
            self.storage.insert_query_record(&record)?;
            return Ok(QueryOutcome::Refused(NoAnswerResponse {
                reason: "No extractable answer found in sources".to_string(),
                suggestions: vec!["The information may not be in the documents".to_string()],
                partial_info: None,
                sources_checked: retrieved.len(),
            }));
        }

        let grounded_sentences: Vec<GroundedSentence> = outcome
            .quotes
            .iter()
            .map(|quote| {
                let confidence = if quote.verified { 1.0 } else { 0.5 };
                GroundedSentence {
                    text: format!("\"{}\"", quote.quote),
                    citations: vec![SourceCitation {
                        chunk_id: quote.chunk_id.clone().unwrap_or_default(),
                        document_name: quote.citation.clone().unwrap_or_default(),
                        page_number: None,
                        section: None,
                        excerpt: quote.quote.clone(),
                        relevance_score: confidence,
                        match_type: if quote.verified { "exact" } else { "unverified" }
                            .to_string(),
                    }],
                    confidence,
                    is_grounded: quote.verified,
                }
            })
            .collect();

        let grounding_score = if outcome.all_verified { 1.0 } else { 0.7 };
        record.grounding_score = Some(grounding_score);
        record.is_grounded = outcome.all_verified;
        record.chunks_used = context_chunks.len();
        self.storage.insert_query_record(&record)?;

        Ok(QueryOutcome::Answered(Box::new(AnswerResponse {
            answer: generation.text,
            grounded_sentences,
            grounding_score,
            sources_used: Vec::new(),
            total_sources_retrieved: retrieved.len(),
            is_grounded: outcome.all_verified,
            warning: (!outcome.all_verified)
                .then(|| "Some quotes could not be verified".to_string()),
            query_id: record.id,
            processing_time_ms: elapsed_ms(start),
            model_used: self.generator.model_name().to_string(),
        })))
    }

    /// Returns aggregate engine statistics.
    ///
    /// # Errors
    ///
    /// Returns storage errors.
    pub fn stats(&self) -> Result<EngineStats> {
        let storage = self.storage.stats()?;
        Ok(EngineStats {
            documents: storage.document_count,
            indexed_documents: storage.indexed_document_count,
            chunks: storage.chunk_count,
            queries: self.storage.query_stats()?,
            vector_index: self.index.stats(),
        })
    }

    /// Returns true when the generation service is reachable.
    #[must_use]
    pub fn generator_available(&self) -> bool {
        self.generator.is_available()
    }

    // ==================== Internals ====================

    /// Shared prefix of every ask path: validate, retrieve, assemble.
    fn prepare(&self, request: &QueryRequest, record: &mut QueryRecord) -> Result<Prepared> {
        if request.question.trim().is_empty() {
            return Err(Error::bad_input("question must not be empty"));
        }

        let retrieval_start = Instant::now();
        // Retrieve beyond top_k; context assembly dedups and truncates.
        let retrieved = self.retriever.retrieve(
            &self.storage,
            &self.index,
            self.embedder.as_ref(),
            &request.question,
            &request.filter(),
            request.top_k * 2,
        )?;
        let retrieval_ms = elapsed_ms(retrieval_start);
        record.chunks_retrieved = retrieved.len();

        if retrieved.is_empty() {
            return Ok(Prepared::Refused(NoAnswerResponse {
                reason: "No relevant documents found".to_string(),
                suggestions: vec![
                    "Try rephrasing your question".to_string(),
                    "Upload relevant documents first".to_string(),
                    "Broaden your search categories".to_string(),
                ],
                partial_info: None,
                sources_checked: 0,
            }));
        }

        let (context, context_chunks) = self.context_builder.build_context(&retrieved);
        if context_chunks.is_empty() {
            return Ok(Prepared::Refused(NoAnswerResponse {
                reason: "Retrieved content too short or irrelevant".to_string(),
                suggestions: vec!["Provide more detailed documents".to_string()],
                partial_info: None,
                sources_checked: retrieved.len(),
            }));
        }

        Ok(Prepared::Ready {
            retrieved,
            context,
            context_chunks,
            retrieval_ms,
        })
    }

    /// Assembles the full answer response with sentence-level evidence.
    #[allow(clippy::too_many_arguments)]
    fn build_answer(
        &self,
        request: &QueryRequest,
        record: &QueryRecord,
        retrieved: &[RetrievedChunk],
        context_chunks: &[ContextChunk],
        generation: &Generation,
        validation: &ValidationResult,
        processing_time_ms: u64,
    ) -> AnswerResponse {
        let grounded_sentences: Vec<GroundedSentence> = validation
            .sentence_results
            .iter()
            .map(|result| {
                let citations: Vec<SourceCitation> = result
                    .matched_chunks
                    .iter()
                    .zip(&result.matched_excerpts)
                    .filter_map(|(chunk_id, excerpt)| {
                        context_chunks
                            .iter()
                            .find(|c| &c.chunk_id == chunk_id)
                            .map(|context_chunk| SourceCitation {
                                chunk_id: chunk_id.clone(),
                                document_name: document_name_of(&context_chunk.citation),
                                page_number: None,
                                section: None,
                                excerpt: excerpt.clone(),
                                relevance_score: result.confidence,
                                match_type: result.match_type.as_str().to_string(),
                            })
                    })
                    .collect();

                GroundedSentence {
                    text: result.sentence.clone(),
                    citations,
                    confidence: result.confidence,
                    is_grounded: result.is_grounded,
                }
            })
            .collect();

        let sources_used: Vec<SourceCitation> = context_chunks
            .iter()
            .take(request.top_k)
            .map(|context_chunk| {
                let origin = retrieved
                    .iter()
                    .find(|r| r.chunk_id == context_chunk.chunk_id);
                SourceCitation {
                    chunk_id: context_chunk.chunk_id.clone(),
                    document_name: document_name_of(&context_chunk.citation),
                    page_number: origin.and_then(|r| r.page_number),
                    section: origin.and_then(|r| r.section_title.clone()),
                    excerpt: ellipsize(&context_chunk.content, 150),
                    relevance_score: origin.map_or(0.0, |r| r.final_score),
                    match_type: "direct".to_string(),
                }
            })
            .collect();

        AnswerResponse {
            answer: generation.text.clone(),
            grounded_sentences,
            grounding_score: validation.grounding_score,
            sources_used,
            total_sources_retrieved: retrieved.len(),
            is_grounded: validation.is_valid,
            warning: (!validation.warnings.is_empty())
                .then(|| validation.warnings.join("; ")),
            query_id: record.id.clone(),
            processing_time_ms,
            model_used: self.generator.model_name().to_string(),
        }
    }
}

/// Extracts the document-name component of a composed citation.
fn document_name_of(citation: &str) -> String {
    citation
        .split('|')
        .next()
        .unwrap_or(citation)
        .trim()
        .to_string()
}

#[allow(clippy::cast_possible_truncation)]
fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}
