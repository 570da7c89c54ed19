//! Output formatting for CLI commands.
//!
//! Supports text and JSON output formats.

use crate::core::{Chunk, Document, QueryOutcome};
use crate::engine::EngineStats;
use crate::retrieval::RetrievedChunk;
use serde::Serialize;
use std::fmt::Write;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// JSON output.
    Json,
}

impl OutputFormat {
    /// Parses format from string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

fn format_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
}

/// Formats an error for display.
#[must_use]
pub fn format_error(error: &crate::Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => {
            format_json(&serde_json::json!({ "error": error.to_string() }))
        }
    }
}

/// Formats engine statistics.
#[must_use]
pub fn format_stats(stats: &EngineStats, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(stats),
        OutputFormat::Text => {
            let mut output = String::new();
            output.push_str("RLG-RS Status\n");
            output.push_str("=============\n\n");
            let _ = writeln!(output, "  Documents:       {}", stats.documents);
            let _ = writeln!(output, "  Indexed:         {}", stats.indexed_documents);
            let _ = writeln!(output, "  Chunks:          {}", stats.chunks);
            let _ = writeln!(output, "  Vectors:         {}", stats.vector_index.count);
            let _ = writeln!(output, "  Dimension:       {}", stats.vector_index.dimension);
            let _ = writeln!(output, "  Queries:         {}", stats.queries.total_queries);
            let _ = writeln!(
                output,
                "  Grounded:        {}",
                stats.queries.grounded_queries
            );
            let _ = writeln!(
                output,
                "  Avg grounding:   {:.2}",
                stats.queries.average_grounding_score
            );
            output
        }
    }
}

/// Formats a single document.
#[must_use]
pub fn format_document(document: &Document, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(document),
        OutputFormat::Text => {
            let mut output = String::new();
            let _ = writeln!(output, "Document {}", document.id);
            let _ = writeln!(output, "  Filename:    {}", document.filename);
            let _ = writeln!(output, "  Type:        {}", document.file_type.as_str());
            let _ = writeln!(output, "  Status:      {}", document.status.as_str());
            if let Some(error) = &document.error_message {
                let _ = writeln!(output, "  Error:       {error}");
            }
            if let Some(title) = &document.title {
                let _ = writeln!(output, "  Title:       {title}");
            }
            if let Some(category) = &document.category {
                let _ = writeln!(output, "  Category:    {category}");
            }
            let _ = writeln!(output, "  Reliability: {:.2}", document.reliability_score);
            let _ = writeln!(output, "  Pages:       {}", document.page_count);
            let _ = writeln!(output, "  Chunks:      {}", document.chunk_count);
            output
        }
    }
}

/// Formats a document list.
#[must_use]
pub fn format_document_list(documents: &[Document], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(&documents),
        OutputFormat::Text => {
            if documents.is_empty() {
                return "No documents found.\n".to_string();
            }

            let mut output = String::new();
            let _ = writeln!(
                output,
                "{:<38} {:<24} {:<10} {:<8} Category",
                "ID", "Filename", "Status", "Chunks"
            );
            output.push_str(&"-".repeat(90));
            output.push('\n');

            for document in documents {
                let _ = writeln!(
                    output,
                    "{:<38} {:<24} {:<10} {:<8} {}",
                    document.id,
                    truncate(&document.filename, 24),
                    document.status.as_str(),
                    document.chunk_count,
                    document.category.as_deref().unwrap_or("-")
                );
            }
            output
        }
    }
}

/// Formats a chunk listing.
#[must_use]
pub fn format_chunks(chunks: &[Chunk], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(&chunks),
        OutputFormat::Text => {
            if chunks.is_empty() {
                return "No chunks.\n".to_string();
            }

            let mut output = String::new();
            for chunk in chunks {
                let _ = writeln!(
                    output,
                    "[{}] {} ({})",
                    chunk.sequence_index,
                    truncate(&chunk.content, 80),
                    chunk.role.as_str()
                );
            }
            output
        }
    }
}

/// Formats retrieval results.
#[must_use]
pub fn format_search_results(results: &[RetrievedChunk], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(&results),
        OutputFormat::Text => {
            if results.is_empty() {
                return "No results.\n".to_string();
            }

            let mut output = String::new();
            for (i, result) in results.iter().enumerate() {
                let _ = writeln!(
                    output,
                    "{}. [{:.3}] {} (bm25 {:.2} | dense {:.2} | struct {:.2})",
                    i + 1,
                    result.final_score,
                    result.citation(),
                    result.bm25_score,
                    result.dense_score,
                    result.structural_score
                );
                let _ = writeln!(output, "   {}", truncate(&result.content, 100));
            }
            output
        }
    }
}

/// Formats a query outcome: grounded answer or refusal.
#[must_use]
pub fn format_outcome(outcome: &QueryOutcome, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => format_json(outcome),
        OutputFormat::Text => match outcome {
            QueryOutcome::Answered(answer) => {
                let mut output = String::new();
                let _ = writeln!(output, "{}", answer.answer.trim());
                output.push('\n');
                let _ = writeln!(
                    output,
                    "grounding: {:.0}% ({})",
                    answer.grounding_score * 100.0,
                    if answer.is_grounded {
                        "grounded"
                    } else {
                        "not grounded"
                    }
                );
                if let Some(warning) = &answer.warning {
                    let _ = writeln!(output, "warning: {warning}");
                }
                if !answer.sources_used.is_empty() {
                    output.push_str("sources:\n");
                    for source in &answer.sources_used {
                        let _ = writeln!(
                            output,
                            "  - {} ({:.2}) {}",
                            source.document_name,
                            source.relevance_score,
                            truncate(&source.excerpt, 70)
                        );
                    }
                }
                output
            }
            QueryOutcome::Refused(refusal) => {
                let mut output = String::new();
                let _ = writeln!(output, "No grounded answer: {}", refusal.reason);
                let _ = writeln!(output, "sources checked: {}", refusal.sources_checked);
                if let Some(partial) = &refusal.partial_info {
                    let _ = writeln!(output, "partial info: {partial}");
                }
                for suggestion in &refusal.suggestions {
                    let _ = writeln!(output, "  - {suggestion}");
                }
                output
            }
        },
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    crate::text::ellipsize(s, max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DocumentMetadata, DocumentType, NoAnswerResponse};

    fn sample_document() -> Document {
        Document::new(
            "report.txt".to_string(),
            "/tmp/report.txt".to_string(),
            DocumentType::Txt,
            10,
            "hash".to_string(),
            &DocumentMetadata::new(),
        )
    }

    #[test]
    fn test_output_format_parse() {
        assert_eq!(OutputFormat::parse("json"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("JSON"), OutputFormat::Json);
        assert_eq!(OutputFormat::parse("text"), OutputFormat::Text);
        assert_eq!(OutputFormat::parse("anything"), OutputFormat::Text);
    }

    #[test]
    fn test_format_document_text() {
        let output = format_document(&sample_document(), OutputFormat::Text);
        assert!(output.contains("report.txt"));
        assert!(output.contains("processing"));
    }

    #[test]
    fn test_format_document_json() {
        let output = format_document(&sample_document(), OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["filename"], "report.txt");
    }

    #[test]
    fn test_format_document_list_empty() {
        let output = format_document_list(&[], OutputFormat::Text);
        assert!(output.contains("No documents"));
    }

    #[test]
    fn test_format_refusal() {
        let outcome = QueryOutcome::Refused(NoAnswerResponse {
            reason: "No relevant documents found".to_string(),
            suggestions: vec!["Upload documents".to_string()],
            partial_info: None,
            sources_checked: 0,
        });
        let output = format_outcome(&outcome, OutputFormat::Text);
        assert!(output.contains("No grounded answer"));
        assert!(output.contains("sources checked: 0"));

        let json = format_outcome(&outcome, OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["status"], "refused");
    }

    #[test]
    fn test_format_error_json() {
        let error = crate::Error::bad_input("empty question");
        let output = format_error(&error, OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert!(parsed["error"].as_str().unwrap().contains("empty question"));
    }
}
