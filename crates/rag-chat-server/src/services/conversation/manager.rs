/// manager.rs
use anyhow::Result;
use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::Settings;
use crate::models::chat::{ChatResponse, SessionId, SourceInfo, StreamEvent};
use crate::utils::error::ApiError;

use super::attribution::{collect_sources, SourceAttribution};
use super::context_builder::{ContextFormatter, PromptBuilder};
use super::generation::{Generator, StreamTracker};
use super::memory::ConversationMemory;
use super::types::{
    Completion, CompletionError, Fragment, GenerationOptions, IngestionReport, MemoryStats, Retrieval,
    RetrievedPassage, StreamPhase,
};

/// Raw fragment stream produced by a completion backend
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// Events of one streamed chat, ending with exactly one `done` event
pub type ChatEventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Trait for embedding service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Trait for retrieval service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait RetrievalProvider: Send + Sync {
    /// Up to `k` passages, best-first
    async fn search(&self, query: &str, k: usize) -> Result<Vec<RetrievedPassage>>;
}

/// Trait for LLM service
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, CompletionError>;

    async fn complete_stream(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TokenStream, CompletionError>;

    async fn is_available(&self) -> bool;
}

/// Trait for document ingestion
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait IngestionProvider: Send + Sync {
    async fn process_all(&self) -> Result<IngestionReport>;
}

pub struct ConversationManager {
    memory: Arc<ConversationMemory>,
    retrieval_provider: Arc<dyn RetrievalProvider>,
    generator: Generator,
    formatter: ContextFormatter,
    prompt_builder: PromptBuilder,
    attribution: SourceAttribution,
    top_k: usize,
    preview_chars: usize,
}

impl ConversationManager {
    pub fn new(
        settings: &Settings,
        memory: Arc<ConversationMemory>,
        retrieval_provider: Arc<dyn RetrievalProvider>,
        llm_provider: Arc<dyn LlmProvider>,
    ) -> Self {
        Self {
            memory,
            retrieval_provider,
            generator: Generator::from_config(llm_provider, &settings.llm),
            formatter: ContextFormatter::new(settings.rag.context_char_limit),
            prompt_builder: PromptBuilder::new(
                settings.prompts.system_prompt.clone(),
                settings.prompts.context_header.clone(),
                settings.history_window_turns(),
            ),
            attribution: SourceAttribution::new(&settings.attribution),
            top_k: settings.rag.retrieval_top_k,
            preview_chars: settings.rag.source_preview_chars,
        }
    }

    /// Answer one message and record the exchange in the session's memory
    pub async fn chat(&self, query: &str, session_id: &str) -> Result<ChatResponse, ApiError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ApiError::EmptyInput);
        }

        let _turn = self.memory.acquire_session(session_id).await;
        let started = Instant::now();
        info!("Chat request for session {}", session_id);

        let passages = self.retrieve(query).await.into_passages();
        let prompt = self.prepare_prompt(query, session_id, &passages);

        let completion = self
            .generator
            .complete(&prompt)
            .await
            .map_err(Self::engine_error)?;

        if let Completion::Degraded { reason, .. } = &completion {
            debug!("Session {} answered with fallback ({})", session_id, reason);
        }

        let response = completion.into_text();
        self.memory.append_exchange(session_id, query, response.as_str());

        let sources = self.attribute(&passages, query, &response);

        info!(
            "Chat for session {} finished in {}ms ({} sources)",
            session_id,
            started.elapsed().as_millis(),
            sources.len()
        );

        Ok(ChatResponse {
            response,
            sources,
            session_id: session_id.to_string(),
        })
    }

    /// Streamed variant of [`chat`](Self::chat).
    ///
    /// Blank input is rejected before any work starts. The session gate is held
    /// until the stream finishes or is dropped; a dropped stream commits nothing.
    pub fn chat_stream(
        self: Arc<Self>,
        query: String,
        session_id: SessionId,
    ) -> Result<ChatEventStream, ApiError> {
        let query = query.trim().to_string();
        if query.is_empty() {
            return Err(ApiError::EmptyInput);
        }

        let manager = self;

        let stream = async_stream::stream! {
            let _turn = manager.memory.acquire_session(&session_id).await;
            info!("Streaming chat request for session {}", session_id);

            let mut tracker = StreamTracker::new(&session_id);
            let passages = manager.retrieve(&query).await.into_passages();
            let prompt = manager.prepare_prompt(&query, &session_id, &passages);

            match manager.generator.stream(&prompt).await {
                Err(e) => {
                    error!("Streaming chat for session {} aborted: {}", session_id, e);
                    tracker.advance(StreamPhase::Failed);
                    tracker.advance(StreamPhase::Done);
                    yield StreamEvent::failed(Self::engine_error(e).to_string(), session_id.clone());
                }
                Ok(mut fragments) => {
                    let mut accumulated = String::new();

                    while let Some(fragment) = fragments.next().await {
                        let text = match fragment {
                            Fragment::Text(text) => {
                                tracker.advance(StreamPhase::Streaming);
                                text
                            }
                            Fragment::Fallback(text) => {
                                tracker.advance(StreamPhase::Failed);
                                text
                            }
                        };
                        accumulated.push_str(&text);
                        yield StreamEvent::chunk(text);
                    }

                    let response = accumulated.trim().to_string();
                    manager.memory.append_exchange(&session_id, &query, response.as_str());
                    tracker.advance(StreamPhase::Done);

                    let sources = manager.attribute(&passages, &query, &response);
                    yield StreamEvent::done(session_id.clone(), sources);
                }
            }
        };

        Ok(Box::pin(stream))
    }

    /// Drop a session's memory. Clearing an unknown session is not an error.
    ///
    /// Waits behind any in-flight chat of the session, so a clear issued
    /// after a chat also lands after its exchange.
    pub async fn clear_conversation(&self, session_id: &str) -> bool {
        let _turn = self.memory.acquire_session(session_id).await;
        self.memory.clear(session_id)
    }

    pub fn memory_stats(&self) -> MemoryStats {
        self.memory.stats()
    }

    pub async fn is_engine_available(&self) -> bool {
        self.generator.is_available().await
    }

    async fn retrieve(&self, query: &str) -> Retrieval {
        let started = Instant::now();

        match self.retrieval_provider.search(query, self.top_k).await {
            Ok(passages) => {
                debug!(
                    "Retrieved {} passages in {}ms",
                    passages.len(),
                    started.elapsed().as_millis()
                );
                Retrieval::Found(passages)
            }
            Err(e) => {
                warn!("Retrieval failed, answering without context: {:#}", e);
                Retrieval::Unavailable {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn prepare_prompt(&self, query: &str, session_id: &str, passages: &[RetrievedPassage]) -> String {
        let context = self.formatter.format(passages);
        let history = self.memory.get(session_id);
        self.prompt_builder.build(query, &context, &history)
    }

    fn attribute(&self, passages: &[RetrievedPassage], query: &str, response: &str) -> Vec<SourceInfo> {
        if self.attribution.should_show_sources(passages, query, response) {
            collect_sources(passages, self.preview_chars)
        } else {
            Vec::new()
        }
    }

    fn engine_error(e: CompletionError) -> ApiError {
        match e {
            CompletionError::Unavailable(reason) => ApiError::EngineUnavailable(reason),
            CompletionError::Failed(reason) => ApiError::InternalError(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    const FALLBACK: &str =
        "I apologize, but I'm having trouble generating a response right now. Please try again.";

    fn neo_latin_passages() -> Vec<RetrievedPassage> {
        vec![
            RetrievedPassage {
                content: "Renaissance Latin poetry flourished among humanist circles in Italy."
                    .to_string(),
                source_id: "handbook.pdf".to_string(),
                rank: 1,
            },
            RetrievedPassage {
                content: "Another chunk from the same handbook.".to_string(),
                source_id: "handbook.pdf".to_string(),
                rank: 2,
            },
        ]
    }

    fn retrieval_with(passages: Vec<RetrievedPassage>) -> MockRetrievalProvider {
        let mut mock = MockRetrievalProvider::new();
        mock.expect_search()
            .returning(move |_, _| Ok(passages.clone()));
        mock
    }

    fn llm_answering(answer: &'static str) -> MockLlmProvider {
        let mut mock = MockLlmProvider::new();
        mock.expect_complete()
            .returning(move |_, _| Ok(answer.to_string()));
        mock.expect_complete_stream().returning(move |_, _| {
            let pieces: Vec<Result<String, CompletionError>> = answer
                .split_inclusive(' ')
                .map(|piece| Ok(piece.to_string()))
                .collect();
            Ok(Box::pin(futures::stream::iter(pieces)) as TokenStream)
        });
        mock
    }

    fn manager(retrieval: MockRetrievalProvider, llm: MockLlmProvider) -> Arc<ConversationManager> {
        Arc::new(ConversationManager::new(
            &Settings::default(),
            Arc::new(ConversationMemory::new(5)),
            Arc::new(retrieval),
            Arc::new(llm),
        ))
    }

    #[tokio::test]
    async fn test_chat_happy_path_records_exchange_and_sources() {
        let manager = manager(
            retrieval_with(neo_latin_passages()),
            llm_answering("  Renaissance Latin poetry imitated Virgil.  "),
        );

        let result = manager
            .chat("Tell me about Renaissance Latin poetry", "s1")
            .await
            .unwrap();

        assert_eq!(result.response, "Renaissance Latin poetry imitated Virgil.");
        assert_eq!(result.session_id, "s1");
        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].file, "handbook.pdf");

        let history = manager.memory.get("s1");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Tell me about Renaissance Latin poetry");
        assert_eq!(history[1].content, "Renaissance Latin poetry imitated Virgil.");
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_message_before_any_call() {
        // No expectations: any backend call would panic
        let manager = manager(MockRetrievalProvider::new(), MockLlmProvider::new());

        let result = manager.chat("   ", "s1").await;
        assert!(matches!(result, Err(ApiError::EmptyInput)));
        assert!(manager.memory.get("s1").is_empty());
    }

    #[tokio::test]
    async fn test_chat_survives_retrieval_failure() {
        let mut retrieval = MockRetrievalProvider::new();
        retrieval
            .expect_search()
            .returning(|_, _| Err(anyhow::anyhow!("vector store offline")));

        let mut llm = MockLlmProvider::new();
        llm.expect_complete()
            .withf(|prompt, _| !prompt.contains("Relevant information"))
            .returning(|_, _| Ok("Latin answer".to_string()));

        let manager = manager(retrieval, llm);
        let result = manager
            .chat("Tell me about Renaissance Latin poetry", "s1")
            .await
            .unwrap();

        assert_eq!(result.response, "Latin answer");
        assert!(result.sources.is_empty());
    }

    #[tokio::test]
    async fn test_chat_generation_failure_returns_fallback() {
        let mut llm = MockLlmProvider::new();
        llm.expect_complete()
            .returning(|_, _| Err(CompletionError::Failed("HTTP 500".to_string())));

        let manager = manager(retrieval_with(neo_latin_passages()), llm);
        let result = manager.chat("Tell me about Latin", "s1").await.unwrap();

        assert_eq!(result.response, FALLBACK);
        assert_eq!(manager.memory.get("s1").len(), 2);
    }

    #[tokio::test]
    async fn test_chat_unreachable_engine_is_surfaced() {
        let mut llm = MockLlmProvider::new();
        llm.expect_complete()
            .returning(|_, _| Err(CompletionError::Unavailable("connection refused".to_string())));

        let manager = manager(retrieval_with(vec![]), llm);
        let result = manager.chat("Tell me about Latin", "s1").await;

        assert!(matches!(result, Err(ApiError::EngineUnavailable(_))));
        assert!(manager.memory.get("s1").is_empty());
    }

    #[tokio::test]
    async fn test_history_reaches_next_prompt() {
        let mut llm = MockLlmProvider::new();
        let mut calls = 0;
        llm.expect_complete().times(2).returning(move |prompt, _| {
            calls += 1;
            if calls == 1 {
                assert!(!prompt.contains("Conversation history:"));
                Ok("first answer".to_string())
            } else {
                assert!(prompt
                    .contains("Conversation history:\nHuman: first\nAssistant: first answer"));
                Ok("second answer".to_string())
            }
        });

        let manager = manager(retrieval_with(vec![]), llm);
        manager.chat("first", "s1").await.unwrap();
        manager.chat("second", "s1").await.unwrap();

        assert_eq!(manager.memory.get("s1").len(), 4);
    }

    #[tokio::test]
    async fn test_stream_and_blocking_agree() {
        let answer = "Renaissance Latin poetry imitated Virgil.";
        let query = "Tell me about Renaissance Latin poetry";

        let blocking = manager(retrieval_with(neo_latin_passages()), llm_answering(answer));
        let blocking_result = blocking.chat(query, "s").await.unwrap();

        let streaming = manager(retrieval_with(neo_latin_passages()), llm_answering(answer));
        let events: Vec<StreamEvent> = streaming
            .clone()
            .chat_stream(query.to_string(), "s".to_string())
            .unwrap()
            .collect()
            .await;

        let streamed_text: String = events.iter().filter_map(|e| e.chunk.clone()).collect();
        assert_eq!(streamed_text.trim(), blocking_result.response);

        let terminal = events.last().unwrap();
        assert!(terminal.done);
        assert_eq!(terminal.session_id.as_deref(), Some("s"));
        assert_eq!(terminal.sources, blocking_result.sources);
        assert_eq!(events.iter().filter(|e| e.done).count(), 1);

        assert_eq!(blocking.memory.get("s"), streaming.memory.get("s"));
    }

    #[tokio::test]
    async fn test_stream_rejects_blank_message() {
        let manager = manager(MockRetrievalProvider::new(), MockLlmProvider::new());
        assert!(matches!(
            manager.chat_stream("\n".to_string(), "s".to_string()),
            Err(ApiError::EmptyInput)
        ));
    }

    #[tokio::test]
    async fn test_stream_unreachable_engine_emits_single_error_event() {
        let mut llm = MockLlmProvider::new();
        llm.expect_complete_stream()
            .returning(|_, _| Err(CompletionError::Unavailable("connection refused".to_string())));

        let manager = manager(retrieval_with(vec![]), llm);
        let events: Vec<StreamEvent> = manager
            .clone()
            .chat_stream("hello".to_string(), "s".to_string())
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 1);
        assert!(events[0].done);
        assert!(events[0].error.is_some());
        assert!(manager.memory.get("s").is_empty());
    }

    #[tokio::test]
    async fn test_stream_mid_failure_commits_partial_plus_fallback() {
        let mut llm = MockLlmProvider::new();
        llm.expect_complete_stream().returning(|_, _| {
            let items: Vec<Result<String, CompletionError>> = vec![
                Ok("Partial ".to_string()),
                Err(CompletionError::Failed("connection reset".to_string())),
            ];
            Ok(Box::pin(futures::stream::iter(items)) as TokenStream)
        });

        let manager = manager(retrieval_with(vec![]), llm);
        let events: Vec<StreamEvent> = manager
            .clone()
            .chat_stream("question".to_string(), "s".to_string())
            .unwrap()
            .collect()
            .await;

        assert_eq!(events.len(), 3);
        assert_eq!(events[1].chunk.as_deref(), Some(FALLBACK));
        assert!(events[2].done);
        assert!(events[2].error.is_none());

        let history = manager.memory.get("s");
        assert_eq!(history[1].content, format!("Partial {}", FALLBACK));
    }

    #[tokio::test]
    async fn test_dropped_stream_commits_nothing_and_releases_session() {
        let manager = manager(
            retrieval_with(vec![]),
            llm_answering("one two three four"),
        );

        let mut stream = manager
            .clone()
            .chat_stream("question".to_string(), "s".to_string())
            .unwrap();
        let first = stream.next().await.unwrap();
        assert_eq!(first.chunk.as_deref(), Some("one "));
        drop(stream);

        assert!(manager.memory.get("s").is_empty());

        // The gate was released, so the next turn is not blocked
        let result = manager.chat("again", "s").await.unwrap();
        assert_eq!(result.response, "one two three four");
    }

    /// Holds every completion until released
    struct HeldLlm {
        entered: Arc<tokio::sync::Notify>,
        release: Arc<tokio::sync::Notify>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for HeldLlm {
        async fn complete(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<String, CompletionError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok("answer".to_string())
        }

        async fn complete_stream(
            &self,
            _prompt: &str,
            _options: &GenerationOptions,
        ) -> Result<TokenStream, CompletionError> {
            Err(CompletionError::Failed("not used".to_string()))
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_clear_waits_for_in_flight_chat() {
        let entered = Arc::new(tokio::sync::Notify::new());
        let release = Arc::new(tokio::sync::Notify::new());
        let manager = Arc::new(ConversationManager::new(
            &Settings::default(),
            Arc::new(ConversationMemory::new(5)),
            Arc::new(retrieval_with(vec![])),
            Arc::new(HeldLlm {
                entered: entered.clone(),
                release: release.clone(),
            }),
        ));

        let chat = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.chat("first", "s").await })
        };
        entered.notified().await;

        let clear = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.clear_conversation("s").await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!clear.is_finished());

        release.notify_one();
        assert_eq!(chat.await.unwrap().unwrap().response, "answer");

        // The clear came second, so it removes the exchange the chat stored
        assert!(clear.await.unwrap());
        assert!(manager.memory.get("s").is_empty());
        assert_eq!(manager.memory_stats().active_sessions, 0);
    }

    #[tokio::test]
    async fn test_clear_conversation_is_idempotent() {
        let manager = manager(retrieval_with(vec![]), llm_answering("answer"));
        manager.chat("question", "s").await.unwrap();

        assert!(manager.clear_conversation("s").await);
        assert!(!manager.clear_conversation("s").await);
        assert!(manager.memory.get("s").is_empty());
        assert_eq!(manager.memory_stats().active_sessions, 0);
    }
}
