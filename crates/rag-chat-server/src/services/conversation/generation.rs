use futures::stream::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use super::manager::LlmProvider;
use super::types::{Completion, CompletionError, Fragment, GenerationOptions, StreamPhase};
use crate::config::LlmConfig;

/// Guarded stream handed to the orchestrator. Never yields an error:
/// failures surface as a final `Fragment::Fallback`.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Fragment> + Send>>;

/// Wraps the completion port with fallback handling
pub struct Generator {
    provider: Arc<dyn LlmProvider>,
    options: GenerationOptions,
    fallback: String,
}

impl Generator {
    pub fn new(provider: Arc<dyn LlmProvider>, options: GenerationOptions, fallback: String) -> Self {
        Self {
            provider,
            options,
            fallback,
        }
    }

    pub fn from_config(provider: Arc<dyn LlmProvider>, config: &LlmConfig) -> Self {
        let options = GenerationOptions {
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            stop_sequences: config.stop_sequences.clone(),
        };
        Self::new(provider, options, config.fallback_response.clone())
    }

    pub async fn is_available(&self) -> bool {
        self.provider.is_available().await
    }

    /// Blocking completion. Only an unreachable backend is an error.
    pub async fn complete(&self, prompt: &str) -> Result<Completion, CompletionError> {
        let started = Instant::now();

        match self.provider.complete(prompt, &self.options).await {
            Ok(text) => {
                info!(
                    "Completion finished in {}ms ({} chars)",
                    started.elapsed().as_millis(),
                    text.len()
                );
                Ok(Completion::Full(text.trim().to_string()))
            }
            Err(CompletionError::Failed(reason)) => {
                warn!("Generation failed, answering with fallback: {}", reason);
                Ok(Completion::Degraded {
                    text: self.fallback.clone(),
                    reason,
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Incremental completion. A start failure other than "unreachable"
    /// behaves like a failure before the first fragment.
    pub async fn stream(&self, prompt: &str) -> Result<FragmentStream, CompletionError> {
        let inner = match self.provider.complete_stream(prompt, &self.options).await {
            Ok(inner) => Some(inner),
            Err(CompletionError::Failed(reason)) => {
                warn!("Could not start generation stream: {}", reason);
                None
            }
            Err(e) => return Err(e),
        };

        let fallback = self.fallback.clone();

        let stream = async_stream::stream! {
            match inner {
                None => {
                    yield Fragment::Fallback(fallback);
                }
                Some(mut inner) => {
                    let mut fragments = 0usize;
                    while let Some(item) = inner.next().await {
                        match item {
                            Ok(text) => {
                                if text.is_empty() {
                                    continue;
                                }
                                fragments += 1;
                                yield Fragment::Text(text);
                            }
                            Err(e) => {
                                warn!("Generation stream broke after {} fragments: {}", fragments, e);
                                yield Fragment::Fallback(fallback.clone());
                                break;
                            }
                        }
                    }
                    debug!("Generation stream finished ({} fragments)", fragments);
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Tracks the lifecycle of one streamed reply and reports abandoned streams
pub struct StreamTracker {
    session_id: String,
    phase: StreamPhase,
    started: Instant,
}

impl StreamTracker {
    pub fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            phase: StreamPhase::Pending,
            started: Instant::now(),
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }

    pub fn advance(&mut self, next: StreamPhase) {
        if self.phase.can_advance_to(next) {
            self.phase = next;
        } else {
            warn!(
                "Ignoring stream transition {:?} -> {:?} for session {}",
                self.phase, next, self.session_id
            );
        }
    }
}

impl Drop for StreamTracker {
    fn drop(&mut self) {
        if self.phase == StreamPhase::Done {
            debug!(
                "Stream for session {} completed in {}ms",
                self.session_id,
                self.started.elapsed().as_millis()
            );
        } else {
            warn!(
                "Stream for session {} abandoned in phase {:?}, nothing committed",
                self.session_id, self.phase
            );
        }
    }
}
