pub mod conversation;
pub mod document_service;
pub mod embedding_service;
pub mod llm_service;
pub mod retrieval_service;

pub use document_service::DocumentService;
pub use embedding_service::EmbeddingService;
pub use llm_service::LlmService;
pub use retrieval_service::RetrievalService;
