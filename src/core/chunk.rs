//! Chunk representation.
//!
//! Chunks are the addressable text segments produced by ingestion.
//! Each belongs to exactly one document, carries structural metadata
//! for ranking and citation, and is immutable once indexed
//! (re-indexing is delete-then-insert).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Structural role of a chunk within its document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkRole {
    /// Body paragraph.
    Paragraph,
    /// Section heading.
    Heading,
    /// List item.
    ListItem,
    /// Table cell.
    TableCell,
    /// Code block.
    CodeBlock,
    /// Figure or table caption.
    Caption,
    /// Footnote.
    Footnote,
    /// Block quote.
    Quote,
}

impl ChunkRole {
    /// Returns the role as a stable snake_case string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Heading => "heading",
            Self::ListItem => "list_item",
            Self::TableCell => "table_cell",
            Self::CodeBlock => "code_block",
            Self::Caption => "caption",
            Self::Footnote => "footnote",
            Self::Quote => "quote",
        }
    }

    /// Parses a role from its stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "paragraph" => Some(Self::Paragraph),
            "heading" => Some(Self::Heading),
            "list_item" => Some(Self::ListItem),
            "table_cell" => Some(Self::TableCell),
            "code_block" => Some(Self::CodeBlock),
            "caption" => Some(Self::Caption),
            "footnote" => Some(Self::Footnote),
            "quote" => Some(Self::Quote),
            _ => None,
        }
    }
}

/// Confidence weight applied to heading chunks during ranking.
pub const HEADING_CONFIDENCE_WEIGHT: f64 = 1.2;

/// A text segment from a document, optimized for grounded retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Opaque chunk id (UUID string).
    pub id: String,
    /// Owning document id.
    pub document_id: String,
    /// Chunk content.
    pub content: String,
    /// Truncated SHA-256 of the content, for deduplication.
    pub content_hash: String,
    /// Page number in the source, when known.
    pub page_number: Option<u32>,
    /// Title of the enclosing section, when known.
    pub section_title: Option<String>,
    /// Dense 0-based position within the document.
    pub sequence_index: u32,
    /// Structural role.
    pub role: ChunkRole,
    /// Heading level 1..=6 for heading chunks.
    pub heading_level: Option<u8>,
    /// Ranking confidence weight (1.0 default, 1.2 for headings).
    pub confidence_weight: f64,
    /// Start offset in the extracted source text, when tracked.
    pub char_start: Option<u32>,
    /// End offset in the extracted source text, when tracked.
    pub char_end: Option<u32>,
    /// Creation timestamp (unix seconds).
    pub created_at: i64,
}

impl Chunk {
    /// Creates a paragraph chunk with a computed content hash.
    #[must_use]
    pub fn new(document_id: &str, content: String, sequence_index: u32) -> Self {
        let content_hash = content_hash(&content);
        Self {
            id: super::new_id(),
            document_id: document_id.to_string(),
            content,
            content_hash,
            page_number: None,
            section_title: None,
            sequence_index,
            role: ChunkRole::Paragraph,
            heading_level: None,
            confidence_weight: 1.0,
            char_start: None,
            char_end: None,
            created_at: super::now_timestamp(),
        }
    }

    /// Composes the human-readable citation for this chunk:
    /// `filename | p.N | §section`, with absent parts omitted.
    #[must_use]
    pub fn citation(&self, filename: &str) -> String {
        let mut parts = vec![filename.to_string()];
        if let Some(page) = self.page_number {
            parts.push(format!("p.{page}"));
        }
        if let Some(section) = &self.section_title {
            parts.push(format!("\u{a7}{section}"));
        }
        parts.join(" | ")
    }

    /// Estimates token count using the ~4 chars per token heuristic.
    #[must_use]
    pub fn estimate_tokens(&self) -> usize {
        crate::text::estimate_tokens(&self.content)
    }
}

/// Computes the truncated (32 hex chars) SHA-256 hash of chunk content.
#[must_use]
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    hex[..32].to_string()
}
