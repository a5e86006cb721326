use anyhow::{anyhow, Context, Result};
use lopdf::Document as PdfDocument;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ParsedDocument {
    pub content: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub pages: usize,
    pub char_count: usize,
}

pub struct DocumentParser;

impl DocumentParser {
    /// Whether the path looks like a PDF (case-insensitive extension)
    pub fn is_pdf(path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("pdf"))
            .unwrap_or(false)
    }

    /// Parse PDF using lopdf. Blocking; run it on a blocking thread.
    pub fn parse(path: &Path) -> Result<ParsedDocument> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| anyhow!("Invalid file name: {:?}", path))?
            .to_string();

        let doc = PdfDocument::load(path).context("Failed to load PDF file")?;
        let pages = doc.get_pages();
        let page_count = pages.len();

        let mut content = String::new();

        for (page_num, _) in pages.iter() {
            match doc.extract_text(&[*page_num]) {
                Ok(text) => {
                    content.push_str(&text);
                    content.push('\n');
                }
                Err(e) => {
                    warn!("Failed to extract text from page {} of {}: {}", page_num, file_name, e);
                }
            }
        }

        debug!("Parsed {} characters from {} ({} pages)", content.len(), file_name, page_count);

        Ok(ParsedDocument {
            metadata: DocumentMetadata {
                file_name,
                pages: page_count,
                char_count: content.chars().count(),
            },
            content,
        })
    }
}
