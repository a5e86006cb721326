use super::{ChunkMatch, DbPool, NewChunk};
use anyhow::{Context, Result};
use pgvector::Vector;
use tracing::{debug, info};

pub struct Repository {
    pub pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Create the pgvector extension, chunk table and indexes if missing
    pub async fn ensure_schema(&self, dimension: usize) -> Result<()> {
        let statements = [
            "CREATE EXTENSION IF NOT EXISTS vector".to_string(),
            format!(
                r#"CREATE TABLE IF NOT EXISTS document_chunks (
                    chunk_id BIGSERIAL PRIMARY KEY,
                    source_file TEXT NOT NULL,
                    chunk_index INT NOT NULL,
                    content TEXT NOT NULL,
                    embedding vector({}) NOT NULL,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
                )"#,
                dimension
            ),
            "CREATE INDEX IF NOT EXISTS idx_document_chunks_source ON document_chunks (source_file)"
                .to_string(),
        ];

        for statement in &statements {
            sqlx::query(statement)
                .execute(self.pool.get_pool())
                .await
                .with_context(|| format!("Failed to apply schema statement: {}", statement))?;
        }

        info!("Vector store schema ready (dimension {})", dimension);
        Ok(())
    }

    /// Cosine-distance nearest neighbours, closest first
    pub async fn search_chunks(&self, query_embedding: Vector, limit: i64) -> Result<Vec<ChunkMatch>> {
        let chunks = sqlx::query_as::<_, ChunkMatch>(
            r#"SELECT
                chunk_id,
                source_file,
                chunk_index,
                content,
                (embedding <=> $1)::float8 AS distance
               FROM document_chunks
               ORDER BY embedding <=> $1
               LIMIT $2"#,
        )
        .bind(query_embedding)
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Found {} relevant chunks", chunks.len());

        Ok(chunks)
    }

    /// Files that already have chunks stored
    pub async fn list_source_files(&self) -> Result<Vec<String>> {
        let files = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT source_file FROM document_chunks ORDER BY source_file",
        )
        .fetch_all(self.pool.get_pool())
        .await?;

        Ok(files)
    }

    /// Insert all chunks of one file atomically
    pub async fn insert_chunks(&self, chunks: &[NewChunk]) -> Result<usize> {
        let mut tx = self.pool.get_pool().begin().await?;

        for chunk in chunks {
            sqlx::query(
                r#"INSERT INTO document_chunks (source_file, chunk_index, content, embedding)
                   VALUES ($1, $2, $3, $4)"#,
            )
            .bind(&chunk.source_file)
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .bind(&chunk.embedding)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Inserted {} chunks", chunks.len());

        Ok(chunks.len())
    }
}
