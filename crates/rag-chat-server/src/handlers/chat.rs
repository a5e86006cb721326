use crate::models::chat::*;
use crate::services::conversation::ConversationManager;
use crate::utils::error::ApiError;
use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::info;

pub async fn chat_handler(
    State(manager): State<Arc<ConversationManager>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let session_id = request.resolve_session_id();

    info!(
        "Chat request: session={}, message_len={}",
        session_id,
        request.message.len()
    );

    let response = manager.chat(&request.message, &session_id).await?;
    Ok(Json(response))
}

pub async fn chat_stream_handler(
    State(manager): State<Arc<ConversationManager>>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let session_id = request.resolve_session_id();

    info!(
        "Streaming chat request: session={}, message_len={}",
        session_id,
        request.message.len()
    );

    let events = manager.chat_stream(request.message, session_id)?;
    let stream = events.map(|event| Ok(create_sse_event(event.kind(), &event)));

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

pub async fn clear_handler(
    State(manager): State<Arc<ConversationManager>>,
    Json(request): Json<ClearRequest>,
) -> Json<StatusResponse> {
    if let Some(session_id) = request.session_id.as_deref().map(str::trim) {
        if !session_id.is_empty() {
            manager.clear_conversation(session_id).await;
        }
    }

    Json(StatusResponse::success(None))
}

// Helper: Create SSE event
fn create_sse_event<T: serde::Serialize>(event_type: &str, data: &T) -> Event {
    Event::default()
        .event(event_type)
        .data(serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string()))
}
