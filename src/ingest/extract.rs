//! Text extraction from source files.
//!
//! Extraction is a pluggable step: an [`Extractor`] turns raw file
//! bytes into either monolithic page text (segmented downstream by the
//! structural chunker) or a stream of structural unit events (mapped
//! one-to-one onto chunks). Built-ins cover plain text, Markdown, and
//! HTML; anything else is supplied by registering an extractor.

use crate::core::{ChunkRole, DocumentType};
use crate::error::{IngestionError, Result};
use regex::Regex;
use std::sync::OnceLock;

/// A page (or the whole body, for unpaginated formats) of plain text.
#[derive(Debug, Clone)]
pub struct PageText {
    /// Extracted text.
    pub text: String,
    /// Source page number, when the format is paginated.
    pub page_number: Option<u32>,
}

/// A structural unit extracted from a structured format.
#[derive(Debug, Clone)]
pub struct ExtractEvent {
    /// Unit text.
    pub text: String,
    /// Source page number, when known.
    pub page_number: Option<u32>,
    /// Structural role of the unit.
    pub role: ChunkRole,
    /// Heading level for heading units.
    pub heading_level: Option<u8>,
}

/// Output of an extractor.
#[derive(Debug, Clone)]
pub enum Extraction {
    /// Monolithic text, to be segmented by the structural chunker.
    Text(Vec<PageText>),
    /// Structural units, mapped onto chunks by the structured chunker.
    Units(Vec<ExtractEvent>),
}

/// Pluggable text-extraction strategy.
pub trait Extractor: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Returns true if this extractor handles the given format.
    fn supports(&self, file_type: DocumentType) -> bool;

    /// Extracts text or structural units from the raw file bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes cannot be parsed.
    fn extract(&self, bytes: &[u8]) -> Result<Extraction>;
}

/// Plain-text extractor. Invalid UTF-8 sequences are replaced rather
/// than failing the whole document.
pub struct TextExtractor;

impl Extractor for TextExtractor {
    fn name(&self) -> &'static str {
        "text"
    }

    fn supports(&self, file_type: DocumentType) -> bool {
        file_type == DocumentType::Txt
    }

    fn extract(&self, bytes: &[u8]) -> Result<Extraction> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        Ok(Extraction::Text(vec![PageText {
            text,
            page_number: None,
        }]))
    }
}

/// Markdown extractor: ATX headings become heading units, other
/// non-blank lines become paragraph units.
pub struct MarkdownExtractor;

#[allow(clippy::expect_used)]
fn heading_regex() -> &'static Regex {
    static HEADING: OnceLock<Regex> = OnceLock::new();
    HEADING.get_or_init(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("valid regex"))
}

impl Extractor for MarkdownExtractor {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn supports(&self, file_type: DocumentType) -> bool {
        file_type == DocumentType::Markdown
    }

    fn extract(&self, bytes: &[u8]) -> Result<Extraction> {
        let text = String::from_utf8_lossy(bytes);
        let mut events = Vec::new();

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(captures) = heading_regex().captures(line) {
                #[allow(clippy::cast_possible_truncation)]
                let level = captures[1].len() as u8;
                events.push(ExtractEvent {
                    text: captures[2].trim().to_string(),
                    page_number: None,
                    role: ChunkRole::Heading,
                    heading_level: Some(level),
                });
            } else {
                let role = if line.starts_with("- ") || line.starts_with("* ") {
                    ChunkRole::ListItem
                } else {
                    ChunkRole::Paragraph
                };
                let text = line
                    .trim_start_matches("- ")
                    .trim_start_matches("* ")
                    .to_string();
                events.push(ExtractEvent {
                    text,
                    page_number: None,
                    role,
                    heading_level: None,
                });
            }
        }

        Ok(Extraction::Units(events))
    }
}

/// HTML extractor: headings, paragraphs, and list items in document
/// order.
pub struct HtmlExtractor;

impl Extractor for HtmlExtractor {
    fn name(&self) -> &'static str {
        "html"
    }

    fn supports(&self, file_type: DocumentType) -> bool {
        file_type == DocumentType::Html
    }

    fn extract(&self, bytes: &[u8]) -> Result<Extraction> {
        let raw = String::from_utf8_lossy(bytes);
        let document = scraper::Html::parse_document(&raw);

        let selector = scraper::Selector::parse("h1, h2, h3, h4, h5, h6, p, li")
            .map_err(|e| IngestionError::ExtractionFailed {
                reason: format!("selector: {e}"),
            })?;

        let mut events = Vec::new();
        for element in document.select(&selector) {
            let text = element.text().collect::<String>().trim().to_string();
            if text.is_empty() {
                continue;
            }

            let tag = element.value().name();
            let (role, heading_level) = match tag {
                "li" => (ChunkRole::ListItem, None),
                "p" => (ChunkRole::Paragraph, None),
                _ => {
                    let level = tag.trim_start_matches('h').parse::<u8>().ok();
                    (ChunkRole::Heading, level)
                }
            };

            events.push(ExtractEvent {
                text,
                page_number: None,
                role,
                heading_level,
            });
        }

        Ok(Extraction::Units(events))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_extractor() {
        let extraction = TextExtractor.extract(b"hello world").unwrap();
        match extraction {
            Extraction::Text(pages) => {
                assert_eq!(pages.len(), 1);
                assert_eq!(pages[0].text, "hello world");
                assert!(pages[0].page_number.is_none());
            }
            Extraction::Units(_) => panic!("expected monolithic text"),
        }
    }

    #[test]
    fn test_text_extractor_invalid_utf8_replaced() {
        let extraction = TextExtractor.extract(&[b'h', b'i', 0xff]).unwrap();
        match extraction {
            Extraction::Text(pages) => assert!(pages[0].text.starts_with("hi")),
            Extraction::Units(_) => panic!("expected monolithic text"),
        }
    }

    #[test]
    fn test_markdown_headings_and_paragraphs() {
        let md = "# Refund Policy\n\nRefunds are issued within 30 days.\n\n## Exceptions\n- Digital goods\n";
        let Extraction::Units(events) = MarkdownExtractor.extract(md.as_bytes()).unwrap() else {
            panic!("expected units");
        };

        assert_eq!(events.len(), 4);
        assert_eq!(events[0].role, ChunkRole::Heading);
        assert_eq!(events[0].heading_level, Some(1));
        assert_eq!(events[0].text, "Refund Policy");
        assert_eq!(events[1].role, ChunkRole::Paragraph);
        assert_eq!(events[2].heading_level, Some(2));
        assert_eq!(events[3].role, ChunkRole::ListItem);
        assert_eq!(events[3].text, "Digital goods");
    }

    #[test]
    fn test_markdown_blank_lines_skipped() {
        let Extraction::Units(events) = MarkdownExtractor.extract(b"\n\n  \n").unwrap() else {
            panic!("expected units");
        };
        assert!(events.is_empty());
    }

    #[test]
    fn test_html_structure() {
        let html = "<html><body><h1>Title</h1><p>First paragraph.</p><ul><li>Item one</li></ul></body></html>";
        let Extraction::Units(events) = HtmlExtractor.extract(html.as_bytes()).unwrap() else {
            panic!("expected units");
        };

        assert_eq!(events.len(), 3);
        assert_eq!(events[0].role, ChunkRole::Heading);
        assert_eq!(events[0].heading_level, Some(1));
        assert_eq!(events[0].text, "Title");
        assert_eq!(events[1].role, ChunkRole::Paragraph);
        assert_eq!(events[2].role, ChunkRole::ListItem);
    }

    #[test]
    fn test_html_empty_elements_skipped() {
        let html = "<html><body><p>  </p><p>kept</p></body></html>";
        let Extraction::Units(events) = HtmlExtractor.extract(html.as_bytes()).unwrap() else {
            panic!("expected units");
        };
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].text, "kept");
    }

    #[test]
    fn test_supports() {
        assert!(TextExtractor.supports(DocumentType::Txt));
        assert!(!TextExtractor.supports(DocumentType::Pdf));
        assert!(MarkdownExtractor.supports(DocumentType::Markdown));
        assert!(HtmlExtractor.supports(DocumentType::Html));
        assert!(!HtmlExtractor.supports(DocumentType::Docx));
    }
}
