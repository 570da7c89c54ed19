//! Document representation.
//!
//! A document is an uploaded source file tracked through its ingestion
//! lifecycle. Chunks reference their document by id; documents never
//! hold chunk references (chunk listings go through the store).

use serde::{Deserialize, Serialize};

/// Ingestion lifecycle status of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Created but not yet processed.
    Pending,
    /// Extraction and chunking in progress.
    Processing,
    /// Fully chunked and present in both indices.
    Indexed,
    /// Ingestion failed; see `error_message`.
    Failed,
}

impl DocumentStatus {
    /// Returns the status as a stable lowercase string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Indexed => "indexed",
            Self::Failed => "failed",
        }
    }

    /// Parses a status from its stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "indexed" => Some(Self::Indexed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Source file format, detected from the extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    /// PDF document.
    Pdf,
    /// Word document (`.docx` / `.doc`).
    Docx,
    /// Plain text.
    Txt,
    /// HTML page.
    Html,
    /// Spreadsheet (`.xlsx` / `.xls`).
    Xlsx,
    /// Markdown.
    Markdown,
    /// Image to be OCR'd.
    Image,
}

impl DocumentType {
    /// Detects the document type from a file extension (with or
    /// without the leading dot). Unknown extensions return `None`.
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_lowercase().as_str() {
            "pdf" => Some(Self::Pdf),
            "docx" | "doc" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            "html" | "htm" => Some(Self::Html),
            "xlsx" | "xls" => Some(Self::Xlsx),
            "md" => Some(Self::Markdown),
            "png" | "jpg" | "jpeg" => Some(Self::Image),
            _ => None,
        }
    }

    /// Returns the type as a stable lowercase string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Docx => "docx",
            Self::Txt => "txt",
            Self::Html => "html",
            Self::Xlsx => "xlsx",
            Self::Markdown => "md",
            Self::Image => "image",
        }
    }

    /// Parses a type from its stored string form.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Docx),
            "txt" => Some(Self::Txt),
            "html" => Some(Self::Html),
            "xlsx" => Some(Self::Xlsx),
            "md" => Some(Self::Markdown),
            "image" => Some(Self::Image),
            _ => None,
        }
    }
}

/// A source document in the knowledge base.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Opaque document id (UUID string).
    pub id: String,
    /// Original filename.
    pub filename: String,
    /// Path to the stored source file.
    pub filepath: String,
    /// Detected file format.
    pub file_type: DocumentType,
    /// File size in bytes.
    pub file_size: u64,
    /// SHA-256 of the raw file bytes, for deduplication.
    pub file_hash: String,
    /// Lifecycle status.
    pub status: DocumentStatus,
    /// Error description when status is `Failed`.
    pub error_message: Option<String>,
    /// Optional display title.
    pub title: Option<String>,
    /// Optional author.
    pub author: Option<String>,
    /// Optional category used for retrieval filtering.
    pub category: Option<String>,
    /// Optional comma-separated tags.
    pub tags: Option<String>,
    /// Reliability weight in [0, 1] applied during ranking.
    pub reliability_score: f64,
    /// Page count (for paginated formats).
    pub page_count: u32,
    /// Number of chunks produced at indexing.
    pub chunk_count: u32,
    /// Creation timestamp (unix seconds).
    pub created_at: i64,
    /// Last update timestamp (unix seconds).
    pub updated_at: i64,
    /// Timestamp the document reached `Indexed`.
    pub indexed_at: Option<i64>,
}

/// Caller-supplied metadata attached to a document at upload.
#[derive(Debug, Clone, Default)]
pub struct DocumentMetadata {
    /// Optional display title (defaults to the filename).
    pub title: Option<String>,
    /// Optional author.
    pub author: Option<String>,
    /// Optional category.
    pub category: Option<String>,
    /// Optional comma-separated tags.
    pub tags: Option<String>,
    /// Reliability weight; clamped to [0, 1] at intake.
    pub reliability_score: f64,
}

impl DocumentMetadata {
    /// Creates metadata with the default reliability of 1.0.
    #[must_use]
    pub fn new() -> Self {
        Self {
            reliability_score: 1.0,
            ..Self::default()
        }
    }
}

impl Document {
    /// Creates a new document record in the `Processing` state.
    #[must_use]
    pub fn new(
        filename: String,
        filepath: String,
        file_type: DocumentType,
        file_size: u64,
        file_hash: String,
        metadata: &DocumentMetadata,
    ) -> Self {
        let now = super::now_timestamp();
        Self {
            id: super::new_id(),
            title: metadata.title.clone().or_else(|| Some(filename.clone())),
            filename,
            filepath,
            file_type,
            file_size,
            file_hash,
            status: DocumentStatus::Processing,
            error_message: None,
            author: metadata.author.clone(),
            category: metadata.category.clone(),
            tags: metadata.tags.clone(),
            reliability_score: metadata.reliability_score.clamp(0.0, 1.0),
            page_count: 0,
            chunk_count: 0,
            created_at: now,
            updated_at: now,
            indexed_at: None,
        }
    }

    /// Returns the tag list parsed from the comma-separated field.
    #[must_use]
    pub fn tag_list(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}
