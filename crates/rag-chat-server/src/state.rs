use axum::extract::FromRef;
use std::sync::Arc;

use crate::services::conversation::{ConversationManager, IngestionProvider};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub conversation_manager: Arc<ConversationManager>,
    pub ingestion: Arc<dyn IngestionProvider>,
}

impl FromRef<AppState> for Arc<ConversationManager> {
    fn from_ref(state: &AppState) -> Self {
        state.conversation_manager.clone()
    }
}

impl FromRef<AppState> for Arc<dyn IngestionProvider> {
    fn from_ref(state: &AppState) -> Self {
        state.ingestion.clone()
    }
}
