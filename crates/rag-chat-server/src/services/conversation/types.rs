use serde::Serialize;
use thiserror::Error;

/// Passage returned by the retrieval port, ranked best-first
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPassage {
    pub content: String,
    pub source_id: String,
    /// 1-based position in the ranking
    pub rank: usize,
}

/// Outcome of a retrieval attempt. Failures never reach the caller as errors,
/// they become an empty context instead.
#[derive(Debug, Clone)]
pub enum Retrieval {
    Found(Vec<RetrievedPassage>),
    Unavailable { reason: String },
}

impl Retrieval {
    pub fn into_passages(self) -> Vec<RetrievedPassage> {
        match self {
            Self::Found(passages) => passages,
            Self::Unavailable { .. } => Vec::new(),
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Sampling options forwarded to the completion backend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_tokens: usize,
    pub stop_sequences: Vec<String>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 1024,
            stop_sequences: vec!["Human:".to_string(), "Assistant:".to_string()],
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompletionError {
    /// Backend could not be reached at all
    #[error("completion backend unreachable: {0}")]
    Unavailable(String),

    /// Backend answered but generation failed
    #[error("generation failed: {0}")]
    Failed(String),
}

/// Result of a blocking completion
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Full(String),
    Degraded { text: String, reason: String },
}

impl Completion {
    pub fn text(&self) -> &str {
        match self {
            Self::Full(text) => text,
            Self::Degraded { text, .. } => text,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            Self::Full(text) => text,
            Self::Degraded { text, .. } => text,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

/// Item of a guarded completion stream
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Text(String),
    /// Emitted once, as the last item, after a generation failure
    Fallback(String),
}

/// Per-invocation lifecycle of a streamed reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Pending,
    Streaming,
    Failed,
    Done,
}

impl StreamPhase {
    pub fn can_advance_to(self, next: StreamPhase) -> bool {
        use StreamPhase::*;
        matches!(
            (self, next),
            (Pending, Streaming)
                | (Pending, Failed)
                | (Pending, Done)
                | (Streaming, Streaming)
                | (Streaming, Failed)
                | (Streaming, Done)
                | (Failed, Done)
        )
    }
}

/// Summary of one ingestion run over the document directory
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionReport {
    pub files_found: usize,
    pub files_skipped: usize,
    pub files_indexed: usize,
    pub files_failed: usize,
    pub chunks_added: usize,
}

impl IngestionReport {
    /// No PDFs at all is a failure. A run where every file was already
    /// indexed succeeds, as does one where at least one new file made it in.
    pub fn is_success(&self) -> bool {
        self.files_found > 0 && (self.files_indexed > 0 || self.files_failed == 0)
    }
}

/// Memory statistics for monitoring
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MemoryStats {
    pub active_sessions: usize,
    pub retained_turns: usize,
}
