use anyhow::{anyhow, Result};
use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub content: String,
}

pub struct TextChunker {
    splitter: TextSplitter<text_splitter::Characters>,
}

impl TextChunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        let config = ChunkConfig::new(chunk_size)
            .with_overlap(chunk_overlap)
            .map_err(|e| anyhow!("Invalid chunk configuration: {}", e))?;

        Ok(Self {
            splitter: TextSplitter::new(config),
        })
    }

    /// Split on natural boundaries (paragraphs, sentences, words) up to the
    /// configured size in characters
    pub fn chunk(&self, text: &str) -> Vec<Chunk> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let chunks: Vec<Chunk> = self
            .splitter
            .chunks(text)
            .enumerate()
            .map(|(index, content)| Chunk {
                index,
                content: content.to_string(),
            })
            .collect();

        debug!("Created {} chunks from {} chars", chunks.len(), text.len());

        chunks
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_respect_size() {
        let chunker = TextChunker::new(800, 100).unwrap();
        let text = "Neo-Latin literature flourished across Europe. ".repeat(100);

        let chunks = chunker.chunk(&text);
        assert!(chunks.len() > 1);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
            assert!(chunk.content.chars().count() <= 800);
        }
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        let chunker = TextChunker::new(800, 100).unwrap();
        assert!(chunker.chunk("  \n ").is_empty());
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        assert!(TextChunker::new(100, 100).is_err());
    }
}
