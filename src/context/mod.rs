//! Context assembly for grounded generation.
//!
//! Deduplicates retrieved chunks, assigns `[k]` citation markers,
//! packs content under a token budget, and frames the grounded and
//! extractive prompts handed to the external generator.

use crate::retrieval::RetrievedChunk;
use crate::text::estimate_tokens;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt::Write;

/// Default token budget for assembled context.
pub const DEFAULT_MAX_TOKENS: usize = 4000;

/// Length of the content prefix used as the dedup key.
const DEDUP_PREFIX_LEN: usize = 100;

/// Header line introducing the reference block in prompts.
const CONTEXT_HEADER: &str = "REFERENCE SOURCES (use citation markers in your answer):";

/// A chunk formatted for the generator context, with its marker.
#[derive(Debug, Clone, Serialize)]
pub struct ContextChunk {
    /// Citation marker, e.g. `[1]`.
    pub marker: String,
    /// Chunk content.
    pub content: String,
    /// Composed citation string.
    pub citation: String,
    /// Chunk id.
    pub chunk_id: String,
}

/// Builds generator context from retrieved chunks.
pub struct ContextBuilder {
    max_tokens: usize,
}

impl Default for ContextBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TOKENS)
    }
}

impl ContextBuilder {
    /// Creates a builder with the given token budget.
    #[must_use]
    pub const fn new(max_tokens: usize) -> Self {
        Self { max_tokens }
    }

    /// Assembles the context block and its chunk records.
    ///
    /// Chunks are deduplicated by their first 100 characters
    /// (order-preserving), numbered `[1]`, `[2]`, ... in retrieved
    /// order, and accumulated until the estimated token budget would be
    /// exceeded.
    #[must_use]
    pub fn build_context(&self, retrieved: &[RetrievedChunk]) -> (String, Vec<ContextChunk>) {
        if retrieved.is_empty() {
            return (String::new(), Vec::new());
        }

        // Dedup by content prefix; both indices often surface the same
        // paragraph from near-duplicate documents.
        let mut seen_prefixes: HashSet<String> = HashSet::new();
        let unique: Vec<&RetrievedChunk> = retrieved
            .iter()
            .filter(|chunk| {
                let prefix: String = chunk.content.chars().take(DEDUP_PREFIX_LEN).collect();
                seen_prefixes.insert(prefix)
            })
            .collect();

        let mut context_chunks = Vec::new();
        let mut parts: Vec<String> = Vec::new();
        let mut used_tokens = 0usize;

        for (i, chunk) in unique.iter().enumerate() {
            let marker = format!("[{}]", i + 1);
            let formatted = format!("{marker} {}", chunk.content);

            let formatted_tokens = estimate_tokens(&formatted);
            if used_tokens + formatted_tokens > self.max_tokens {
                break;
            }
            used_tokens += formatted_tokens;

            parts.push(formatted);
            context_chunks.push(ContextChunk {
                marker,
                content: chunk.content.clone(),
                citation: chunk.citation(),
                chunk_id: chunk.chunk_id.clone(),
            });
        }

        let context = format!("{CONTEXT_HEADER}\n\n{}", parts.join("\n\n"));
        (context, context_chunks)
    }

    /// Frames the grounded-generation prompt: strict rules, the
    /// reference block, the citation key, and the question last.
    #[must_use]
    pub fn grounded_prompt(
        context: &str,
        question: &str,
        context_chunks: &[ContextChunk],
    ) -> String {
        let citation_key = citation_key(context_chunks);

        let mut prompt = String::new();
        let _ = writeln!(
            prompt,
            "You are a precise question-answering assistant. Your answers MUST be grounded in the provided sources."
        );
        prompt.push('\n');
        prompt.push_str("STRICT RULES:\n");
        prompt.push_str("1. ONLY use information from the REFERENCE SOURCES below\n");
        let _ = writeln!(
            prompt,
            "2. ALWAYS cite sources using the citation markers {}",
            marker_list(context_chunks)
        );
        prompt.push_str(
            "3. If information is not in the sources, say \"I cannot find this information in the provided sources\"\n",
        );
        prompt.push_str("4. NEVER make up facts or use external knowledge\n");
        prompt.push_str("5. Quote exact phrases when possible to maintain accuracy\n");
        prompt.push('\n');
        prompt.push_str(context);
        prompt.push_str("\n\nCITATION KEY:\n");
        prompt.push_str(&citation_key);
        let _ = write!(prompt, "\n\nQUESTION: {question}\n\nANSWER (with citations):");

        prompt
    }

    /// Frames the extractive prompt: exact quotes with markers, or the
    /// `NOT_FOUND` sentinel.
    #[must_use]
    pub fn extractive_prompt(
        context: &str,
        question: &str,
        context_chunks: &[ContextChunk],
    ) -> String {
        let mut prompt = String::new();
        prompt.push_str(
            "You are an EXTRACTIVE question answering system. You MUST follow these rules:\n",
        );
        prompt.push('\n');
        prompt.push_str("CRITICAL RULES:\n");
        prompt.push_str("1. Your answer MUST use EXACT QUOTES from the sources\n");
        prompt.push_str("2. Place quotes inside \"quotation marks\"\n");
        let _ = writeln!(
            prompt,
            "3. Add citation markers {} after each quote",
            marker_list(context_chunks)
        );
        prompt.push_str(
            "4. If you cannot find the answer in the sources, respond: \"NOT_FOUND\"\n",
        );
        prompt.push_str("5. Do NOT paraphrase - use the exact words from sources\n");
        prompt.push('\n');
        prompt.push_str(context);
        let _ = write!(
            prompt,
            "\n\nQUESTION: {question}\n\nEXTRACTIVE ANSWER (quotes with citations only):"
        );

        prompt
    }
}

/// Renders the `[k] = citation` key block.
fn citation_key(context_chunks: &[ContextChunk]) -> String {
    context_chunks
        .iter()
        .map(|c| format!("{} = {}", c.marker, c.citation))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Renders the available markers, e.g. `[1], [2], [3]`.
fn marker_list(context_chunks: &[ContextChunk]) -> String {
    context_chunks
        .iter()
        .map(|c| c.marker.clone())
        .collect::<Vec<_>>()
        .join(", ")
}
