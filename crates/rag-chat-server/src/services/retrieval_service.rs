use crate::database::{ChunkMatch, Repository};
use anyhow::{Context, Result};
use pgvector::Vector;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use crate::services::conversation::manager::{EmbeddingProvider, RetrievalProvider};
use crate::services::conversation::types::RetrievedPassage;

/// Vector-store retrieval: embed the query, then nearest-neighbour search
pub struct RetrievalService {
    repository: Arc<Repository>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
}

impl RetrievalService {
    pub fn new(repository: Arc<Repository>, embedding_provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            repository,
            embedding_provider,
        }
    }
}

#[async_trait::async_trait]
impl RetrievalProvider for RetrievalService {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>> {
        let started = Instant::now();

        let embedding = self
            .embedding_provider
            .embed(query)
            .await
            .context("Failed to embed query")?;

        let limit = i64::try_from(k).unwrap_or(i64::MAX);
        let chunks = self
            .repository
            .search_chunks(Vector::from(embedding), limit)
            .await
            .context("Vector search failed")?;

        info!(
            "Vector search returned {} chunks in {}ms",
            chunks.len(),
            started.elapsed().as_millis()
        );

        Ok(rank_passages(chunks))
    }
}

/// Chunks arrive closest-first; rank follows that order, starting at 1
pub fn rank_passages(chunks: Vec<ChunkMatch>) -> Vec<RetrievedPassage> {
    chunks
        .into_iter()
        .enumerate()
        .map(|(i, chunk)| {
            debug!(
                "Rank {}: {} #{} (distance {:.4})",
                i + 1,
                chunk.source_file,
                chunk.chunk_index,
                chunk.distance
            );
            RetrievedPassage {
                content: chunk.content,
                source_id: chunk.source_file,
                rank: i + 1,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(file: &str, index: i32, distance: f64) -> ChunkMatch {
        ChunkMatch {
            chunk_id: index as i64,
            source_file: file.to_string(),
            chunk_index: index,
            content: format!("{} chunk {}", file, index),
            distance,
        }
    }

    #[test]
    fn test_rank_passages_keeps_order_and_counts_from_one() {
        let passages = rank_passages(vec![chunk("a.pdf", 3, 0.1), chunk("b.pdf", 0, 0.2)]);

        assert_eq!(passages.len(), 2);
        assert_eq!(passages[0].rank, 1);
        assert_eq!(passages[0].source_id, "a.pdf");
        assert_eq!(passages[0].content, "a.pdf chunk 3");
        assert_eq!(passages[1].rank, 2);
    }

    #[test]
    fn test_rank_passages_empty() {
        assert!(rank_passages(Vec::new()).is_empty());
    }
}
