//! Hybrid retrieval engine.
//!
//! Fuses lexical (FTS5 BM25), dense (vector index), and structural
//! signals into a single ranking, with constraint filtering by
//! document allowlist, category, and reliability.

use crate::config::Settings;
use crate::core::{Chunk, ChunkRole, DocumentStatus};
use crate::embedding::Embedder;
use crate::index::VectorIndex;
use crate::scoring::normalize_by_max;
use crate::storage::SqliteStorage;
use crate::text::tokenize_filtered;
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// A retrieved chunk with its scoring breakdown.
#[derive(Debug, Clone, serde::Serialize)]
pub struct RetrievedChunk {
    /// Chunk id.
    pub chunk_id: String,
    /// Chunk content.
    pub content: String,
    /// Owning document id.
    pub document_id: String,
    /// Owning document's filename.
    pub document_name: String,
    /// Page number, when known.
    pub page_number: Option<u32>,
    /// Section title, when known.
    pub section_title: Option<String>,
    /// Structural role.
    pub role: ChunkRole,
    /// Dense sequence position within the document.
    pub sequence_index: u32,
    /// Normalized BM25 score component.
    pub bm25_score: f64,
    /// Dense (cosine) score component.
    pub dense_score: f64,
    /// Structural score component in [0, 1].
    pub structural_score: f64,
    /// Fused final score.
    pub final_score: f64,
    /// Chunk confidence weight applied during fusion.
    pub confidence_weight: f64,
}

impl RetrievedChunk {
    /// Composes the human-readable citation for this chunk.
    #[must_use]
    pub fn citation(&self) -> String {
        let mut parts = vec![self.document_name.clone()];
        if let Some(page) = self.page_number {
            parts.push(format!("p.{page}"));
        }
        if let Some(section) = &self.section_title {
            parts.push(format!("\u{a7}{section}"));
        }
        parts.join(" | ")
    }
}

/// Constraints applied to a retrieval call.
#[derive(Debug, Clone, Default)]
pub struct RetrievalFilter {
    /// Restrict candidates to these document ids.
    pub document_ids: Option<Vec<String>>,
    /// Restrict candidates to documents in these categories.
    pub categories: Option<Vec<String>>,
    /// Drop candidates from documents below this reliability.
    pub min_reliability: f64,
}

/// Hybrid retrieval over the lexical and dense indices.
pub struct Retriever {
    bm25_weight: f64,
    dense_weight: f64,
    structural_weight: f64,
    candidate_pool: usize,
}

impl Retriever {
    /// Creates a retriever from the configured fusion weights.
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self {
            bm25_weight: settings.bm25_weight,
            dense_weight: settings.dense_weight,
            structural_weight: settings.structural_weight,
            candidate_pool: settings.top_k_retrieval * 2,
        }
    }

    /// Retrieves the top `top_k` chunks for a query.
    ///
    /// Pipeline: term extraction, lexical + dense candidate generation,
    /// union merge, constraint filtering, structural rerank, weighted
    /// fusion, and a stable sort with dense-score then chunk-id ties.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BadInput`] for an empty query, or storage and
    /// model errors from the underlying services.
    pub fn retrieve(
        &self,
        storage: &SqliteStorage,
        index: &VectorIndex,
        embedder: &dyn Embedder,
        query: &str,
        filter: &RetrievalFilter,
        top_k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        if query.trim().is_empty() {
            return Err(Error::bad_input("query must not be empty"));
        }

        // Step 1: term extraction.
        let query_terms = tokenize_filtered(query);

        // Step 2: lexical candidates, normalized so the best hit is 1.0.
        let lexical_hits = storage.search_fts(&query_terms, self.candidate_pool)?;
        let lexical_scores = normalize_by_max(
            &lexical_hits.iter().map(|(_, s)| *s).collect::<Vec<f64>>(),
        );

        // Step 3: dense candidates; scores are used as-is.
        let query_vector = embedder.embed(query)?;
        let dense_hits = if query_vector.iter().all(|v| *v == 0.0) {
            Vec::new()
        } else {
            index.search(&query_vector, self.candidate_pool)
        };

        debug!(
            lexical = lexical_hits.len(),
            dense = dense_hits.len(),
            terms = query_terms.len(),
            "retrieval candidates"
        );

        // Step 4: union merge with zero defaults.
        let mut candidates: HashMap<String, (f64, f64)> = HashMap::new();
        for ((chunk_id, _), normalized) in lexical_hits.iter().zip(lexical_scores) {
            candidates.entry(chunk_id.clone()).or_insert((0.0, 0.0)).0 = normalized;
        }
        for (chunk_id, score) in dense_hits {
            candidates.entry(chunk_id).or_insert((0.0, 0.0)).1 = f64::from(score);
        }

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        // Step 5: load candidates and filter on document constraints.
        let chunk_ids: Vec<String> = candidates.keys().cloned().collect();
        let chunks = storage.get_chunks_by_ids(&chunk_ids)?;

        let document_ids: HashSet<String> =
            chunks.iter().map(|c| c.document_id.clone()).collect();
        let mut documents = HashMap::new();
        for document_id in document_ids {
            if let Some(document) = storage.get_document(&document_id)? {
                documents.insert(document_id, document);
            }
        }

        let allowlist: Option<HashSet<&str>> = filter
            .document_ids
            .as_ref()
            .map(|ids| ids.iter().map(String::as_str).collect());
        let categories: Option<HashSet<&str>> = filter
            .categories
            .as_ref()
            .map(|cats| cats.iter().map(String::as_str).collect());

        let query_lower = query.to_lowercase();
        let mut results = Vec::new();

        for chunk in chunks {
            let Some(document) = documents.get(&chunk.document_id) else {
                continue;
            };
            // Indices may briefly hold chunks of in-flight documents;
            // they are not eligible retrieval results.
            if document.status != DocumentStatus::Indexed {
                continue;
            }
            if let Some(allowlist) = &allowlist {
                if !allowlist.contains(document.id.as_str()) {
                    continue;
                }
            }
            if let Some(categories) = &categories {
                match document.category.as_deref() {
                    Some(category) if categories.contains(category) => {}
                    _ => continue,
                }
            }
            if document.reliability_score < filter.min_reliability {
                continue;
            }

            let (bm25_score, dense_score) =
                candidates.get(&chunk.id).copied().unwrap_or((0.0, 0.0));

            // Step 6: structural score.
            let structural_score = structural_score(&chunk, &query_lower, &query_terms);

            // Step 7: weighted fusion with document and chunk boosts.
            let final_score = (self.bm25_weight * bm25_score
                + self.dense_weight * dense_score
                + self.structural_weight * structural_score)
                * document.reliability_score
                * chunk.confidence_weight;

            results.push(RetrievedChunk {
                chunk_id: chunk.id,
                content: chunk.content,
                document_id: document.id.clone(),
                document_name: document.filename.clone(),
                page_number: chunk.page_number,
                section_title: chunk.section_title,
                role: chunk.role,
                sequence_index: chunk.sequence_index,
                bm25_score,
                dense_score,
                structural_score,
                final_score,
                confidence_weight: chunk.confidence_weight,
            });
        }

        // Step 8: sort (final desc, dense desc, chunk id asc) and truncate.
        results.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| {
                    b.dense_score
                        .partial_cmp(&a.dense_score)
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
                .then_with(|| a.chunk_id.cmp(&b.chunk_id))
        });
        results.truncate(top_k);

        Ok(results)
    }

    /// Returns chunks within ±`window` sequence positions of the given
    /// chunk in its document, ordered by sequence index. Off the main
    /// query path; used for debugging and prompt expansion.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] for an unknown chunk id.
    pub fn context_window(
        &self,
        storage: &SqliteStorage,
        chunk_id: &str,
        window: u32,
    ) -> Result<Vec<Chunk>> {
        let chunk = storage
            .get_chunk(chunk_id)?
            .ok_or_else(|| Error::not_found("chunk", chunk_id))?;
        storage.adjacent_chunks(&chunk.document_id, chunk.sequence_index, window)
    }

    /// Expands retrieved results with adjacent chunks at half score,
    /// re-sorted by final score.
    ///
    /// # Errors
    ///
    /// Returns storage errors from adjacency lookups.
    pub fn expand_with_neighbors(
        &self,
        storage: &SqliteStorage,
        retrieved: &[RetrievedChunk],
        window: u32,
    ) -> Result<Vec<RetrievedChunk>> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut expanded = Vec::new();

        for item in retrieved {
            if seen.insert(item.chunk_id.clone()) {
                expanded.push(item.clone());
            }

            let neighbors =
                storage.adjacent_chunks(&item.document_id, item.sequence_index, window)?;
            for neighbor in neighbors {
                if !seen.insert(neighbor.id.clone()) {
                    continue;
                }
                expanded.push(RetrievedChunk {
                    chunk_id: neighbor.id,
                    content: neighbor.content,
                    document_id: neighbor.document_id,
                    document_name: item.document_name.clone(),
                    page_number: neighbor.page_number,
                    section_title: neighbor.section_title,
                    role: neighbor.role,
                    sequence_index: neighbor.sequence_index,
                    bm25_score: 0.0,
                    dense_score: 0.0,
                    structural_score: 0.0,
                    final_score: item.final_score * 0.5,
                    confidence_weight: neighbor.confidence_weight,
                });
            }
        }

        expanded.sort_by(|a, b| {
            b.final_score
                .partial_cmp(&a.final_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(expanded)
    }
}

/// Computes the structural score for a candidate chunk.
///
/// +0.5 when the lowercased query appears verbatim in the content,
/// +0.3 scaled by query-term coverage, +0.2 for headings. The
/// coefficients cap the sum at 1.0.
#[allow(clippy::cast_precision_loss)]
fn structural_score(chunk: &Chunk, query_lower: &str, query_terms: &[String]) -> f64 {
    let content_lower = chunk.content.to_lowercase();
    let mut score = 0.0;

    if content_lower.contains(query_lower) {
        score += 0.5;
    }

    if !query_terms.is_empty() {
        let covered = query_terms
            .iter()
            .filter(|t| content_lower.contains(t.as_str()))
            .count();
        score += 0.3 * (covered as f64 / query_terms.len() as f64);
    }

    if chunk.role == ChunkRole::Heading {
        score += 0.2;
    }

    score
}
