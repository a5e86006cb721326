use pgvector::Vector;
use serde::Serialize;
use sqlx::FromRow;

/// Nearest-neighbour hit from the chunk table
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChunkMatch {
    pub chunk_id: i64,
    pub source_file: String,
    pub chunk_index: i32,
    pub content: String,
    pub distance: f64,
}

/// Chunk ready to be stored
#[derive(Debug, Clone)]
pub struct NewChunk {
    pub source_file: String,
    pub chunk_index: i32,
    pub content: String,
    pub embedding: Vector,
}
