use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

use rag_chat_server::config::Settings;
use rag_chat_server::database::{DbPool, Repository};
use rag_chat_server::services::conversation::{ConversationManager, ConversationMemory};
use rag_chat_server::services::{DocumentService, EmbeddingService, LlmService, RetrievalService};
use rag_chat_server::utils::init_logger;
use rag_chat_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logger()?;

    info!("🚀 Starting RAG chat server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    // Initialize database pool (lazy; retrieval degrades while it is down)
    let db_pool = DbPool::new(&settings.database)?;
    let repository = Arc::new(Repository::new(db_pool.clone()));

    if db_pool.ping().await {
        if let Err(e) = repository.ensure_schema(settings.embedding.dimension).await {
            warn!("Could not prepare vector store schema: {:#}", e);
        }
    }

    // Initialize services
    let embedding_service = Arc::new(EmbeddingService::new(settings.embedding.clone())?);
    let llm_service = Arc::new(LlmService::new(settings.llm.clone())?);

    match llm_service.resolve_model().await {
        Ok(model) => info!("✅ Language model: {}", model),
        Err(e) => warn!("Could not list installed models, keeping {}: {:#}", settings.llm.model, e),
    }

    let retrieval_service = Arc::new(RetrievalService::new(
        repository.clone(),
        embedding_service.clone(),
    ));

    let document_service = Arc::new(DocumentService::new(
        repository,
        embedding_service,
        &settings.rag,
    )?);

    let memory = Arc::new(ConversationMemory::new(settings.rag.max_history_pairs));

    let conversation_manager = Arc::new(ConversationManager::new(
        &settings,
        memory,
        retrieval_service,
        llm_service,
    ));

    let state = AppState {
        conversation_manager,
        ingestion: document_service,
    };

    // Build router
    let app = build_router(state);

    // Server address
    let addr = SocketAddr::from((
        settings
            .server
            .host
            .parse::<std::net::IpAddr>()
            .context("Invalid server.host")?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    // Start server
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
