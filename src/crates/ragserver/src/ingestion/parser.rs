//! The parse(10) stage. Actual PDF byte decoding is explicitly out of
//! scope (spec.md §1); `PdfParser` is the trait seam a real decoder would
//! implement, and [`HeuristicPdfParser`] is the minimal whitespace/heading
//! heuristic default named in SPEC_FULL.md §6.

use async_trait::async_trait;
use ragcore::error::{CoreError, Result};

/// A structural unit of a parsed document: a page, paragraph, heading,
/// table, or caption, carrying exactly the metadata the Chunker and
/// downstream stages need.
#[derive(Debug, Clone)]
pub struct ParsedBlock {
    pub page: i64,
    pub section: Option<String>,
    pub text: String,
    pub is_table: bool,
    pub is_caption: bool,
    pub heading_level: Option<i32>,
}

#[async_trait]
pub trait PdfParser: Send + Sync {
    async fn parse(&self, bytes: &[u8]) -> Result<Vec<ParsedBlock>>;
}

/// Splits on form-feed page breaks and blank lines, tagging short
/// all-caps or numbered lines as headings and lines starting with a pipe
/// or containing multiple tab stops as table rows. No OCR, no layout
/// analysis — a placeholder for the real decoder this platform plugs in.
pub struct HeuristicPdfParser;

impl HeuristicPdfParser {
    pub fn new() -> Self {
        Self
    }

    fn looks_like_heading(line: &str) -> Option<i32> {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.len() > 80 {
            return None;
        }
        let is_all_caps = trimmed.chars().filter(|c| c.is_alphabetic()).all(|c| c.is_uppercase());
        let word_count = trimmed.split_whitespace().count();
        if is_all_caps && word_count <= 10 {
            return Some(1);
        }
        if trimmed.ends_with(':') && word_count <= 8 {
            return Some(2);
        }
        None
    }

    fn looks_like_table_row(line: &str) -> bool {
        line.matches('\t').count() >= 2 || line.matches('|').count() >= 2
    }

    fn looks_like_caption(line: &str) -> bool {
        let trimmed = line.trim_start();
        trimmed.starts_with("Figure ") || trimmed.starts_with("Table ") || trimmed.starts_with("Fig.")
    }
}

impl Default for HeuristicPdfParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PdfParser for HeuristicPdfParser {
    async fn parse(&self, bytes: &[u8]) -> Result<Vec<ParsedBlock>> {
        let text = String::from_utf8_lossy(bytes);
        if text.trim().is_empty() {
            return Err(CoreError::validation("document contains no extractable text"));
        }

        let mut blocks = Vec::new();
        let mut section: Option<String> = None;

        for (page_index, page_text) in text.split('\x0c').enumerate() {
            let page = page_index as i64 + 1;
            for paragraph in page_text.split("\n\n") {
                let paragraph = paragraph.trim();
                if paragraph.is_empty() {
                    continue;
                }
                let first_line = paragraph.lines().next().unwrap_or("");
                if let Some(level) = Self::looks_like_heading(first_line) {
                    section = Some(first_line.trim().to_string());
                    blocks.push(ParsedBlock {
                        page,
                        section: section.clone(),
                        text: first_line.trim().to_string(),
                        is_table: false,
                        is_caption: false,
                        heading_level: Some(level),
                    });
                    continue;
                }
                blocks.push(ParsedBlock {
                    page,
                    section: section.clone(),
                    text: paragraph.to_string(),
                    is_table: Self::looks_like_table_row(paragraph),
                    is_caption: Self::looks_like_caption(paragraph),
                    heading_level: None,
                });
            }
        }

        if blocks.is_empty() {
            return Err(CoreError::validation("document contains no extractable text"));
        }
        Ok(blocks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_empty_document() {
        let parser = HeuristicPdfParser::new();
        let err = parser.parse(b"   \n\n  ").await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn tags_heading_and_carries_section_forward() {
        let parser = HeuristicPdfParser::new();
        let doc = b"PHOTOSYNTHESIS OVERVIEW\n\nPhotosynthesis is the process by which plants convert light into energy.";
        let blocks = parser.parse(doc).await.unwrap();
        assert_eq!(blocks[0].heading_level, Some(1));
        assert_eq!(blocks[1].section.as_deref(), Some("PHOTOSYNTHESIS OVERVIEW"));
    }

    #[tokio::test]
    async fn splits_on_form_feed_page_breaks() {
        let parser = HeuristicPdfParser::new();
        let doc = "Page one text.\x0cPage two text.".as_bytes();
        let blocks = parser.parse(doc).await.unwrap();
        assert_eq!(blocks[0].page, 1);
        assert_eq!(blocks[1].page, 2);
    }

    #[tokio::test]
    async fn tags_figure_captions() {
        let parser = HeuristicPdfParser::new();
        let doc = b"Figure 1. The light-dependent reactions.";
        let blocks = parser.parse(doc).await.unwrap();
        assert!(blocks[0].is_caption);
    }
}
