//! Conversation orchestration module
//!
//! Provides the retrieval-augmented chat flow with:
//! - Per-session bounded memory (DashMap) with FIFO session gates
//! - Context formatting and deterministic prompt assembly
//! - Guarded generation with fallback replies
//! - Source attribution heuristic

pub mod attribution;
pub mod context_builder;
pub mod generation;
pub mod manager;
pub mod memory;
pub mod types;

pub use attribution::SourceAttribution;
pub use context_builder::{ContextFormatter, PromptBuilder};
pub use generation::Generator;
pub use manager::{
    ChatEventStream, ConversationManager, EmbeddingProvider, IngestionProvider, LlmProvider,
    RetrievalProvider, TokenStream,
};
pub use memory::ConversationMemory;
pub use types::{
    Completion, CompletionError, Fragment, GenerationOptions, IngestionReport, MemoryStats,
    Retrieval, RetrievedPassage,
};

pub use crate::models::chat::{ChatMessage, SessionId};
