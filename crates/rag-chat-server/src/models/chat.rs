use serde::{Deserialize, Serialize};

// ===== CONVERSATION TYPES =====

/// Opaque, caller-supplied (or generated) conversation key
pub type SessionId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Speaker label used when rendering history into a prompt
    pub fn speaker(&self) -> &'static str {
        match self {
            Self::User => "Human",
            Self::Assistant => "Assistant",
        }
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

impl ChatRequest {
    /// Session to use for this request, generating one when absent or blank
    pub fn resolve_session_id(&self) -> SessionId {
        self.session_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

#[derive(Debug, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

// ===== RESPONSE MODELS =====

/// A cited corpus file with a short preview of the best passage from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    pub file: String,
    #[serde(rename = "content_preview")]
    pub preview: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub response: String,
    pub sources: Vec<SourceInfo>,
    pub session_id: SessionId,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusResponse {
    pub fn success(message: Option<String>) -> Self {
        Self {
            status: "success".to_string(),
            message,
        }
    }
}

/// Incremental event of a streamed chat
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StreamEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<SourceInfo>,
}

impl StreamEvent {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self {
            chunk: Some(text.into()),
            error: None,
            done: false,
            session_id: None,
            sources: Vec::new(),
        }
    }

    pub fn done(session_id: SessionId, sources: Vec<SourceInfo>) -> Self {
        Self {
            chunk: None,
            error: None,
            done: true,
            session_id: Some(session_id),
            sources,
        }
    }

    pub fn failed(message: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            chunk: None,
            error: Some(message.into()),
            done: true,
            session_id: Some(session_id),
            sources: Vec::new(),
        }
    }

    /// SSE event name for this payload
    pub fn kind(&self) -> &'static str {
        if self.error.is_some() {
            "error"
        } else if self.done {
            "done"
        } else {
            "message"
        }
    }
}
