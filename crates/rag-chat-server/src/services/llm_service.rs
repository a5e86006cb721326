use crate::config::LlmConfig;
use futures::stream::{Stream, StreamExt};
use parking_lot::RwLock;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tracing::{debug, info, warn};
use anyhow::{Context, Result};

// Import trait and types from manager
use crate::services::conversation::manager::{LlmProvider, TokenStream};
use crate::services::conversation::types::{CompletionError, GenerationOptions};

#[derive(Debug, Serialize)]
pub struct GenerateRequest<'a> {
    pub model: String,
    pub prompt: &'a str,
    pub stream: bool,
    pub options: GenerateOptions<'a>,
}

#[derive(Debug, Serialize)]
pub struct GenerateOptions<'a> {
    pub temperature: f32,
    pub num_predict: usize,
    pub stop: &'a [String],
}

/// One JSON object of Ollama's `/api/generate` output
#[derive(Debug, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// Ollama completion client
pub struct LlmService {
    client: Client,
    config: LlmConfig,
    model: RwLock<String>,
}

impl LlmService {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            model: RwLock::new(config.model.clone()),
            config,
        })
    }

    pub fn model(&self) -> String {
        self.model.read().clone()
    }

    /// Make sure the configured model is installed, otherwise switch to the
    /// first installed model that is not an embedding model.
    pub async fn resolve_model(&self) -> Result<String> {
        let installed = self.list_models().await?;
        let configured = self.config.model.clone();

        match pick_model(&configured, &installed) {
            Some(name) if name == configured => {
                info!("Using model {}", name);
            }
            Some(name) => {
                warn!(
                    "Model {} not installed, falling back to {}",
                    configured, name
                );
                *self.model.write() = name;
            }
            None => {
                warn!(
                    "No usable generation model installed (wanted {}), keeping configured name",
                    configured
                );
            }
        }

        Ok(self.model())
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .send()
            .await
            .context("Failed to call Ollama tags API")?
            .error_for_status()
            .context("Ollama tags API returned an error")?;

        let tags: TagsResponse = response
            .json()
            .await
            .context("Failed to parse Ollama tags response")?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn send_generate(
        &self,
        prompt: &str,
        options: &GenerationOptions,
        stream: bool,
    ) -> Result<reqwest::Response, CompletionError> {
        let request = GenerateRequest {
            model: self.model(),
            prompt,
            stream,
            options: GenerateOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
                stop: &options.stop_sequences,
            },
        };

        debug!(
            "Calling Ollama generate (model {}, stream {}, prompt {} chars)",
            request.model,
            stream,
            prompt.len()
        );

        let response = self
            .client
            .post(format!("{}/api/generate", self.config.base_url))
            .json(&request)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Failed(format!(
                "Ollama API error: {} - {}",
                status, body
            )));
        }

        Ok(response)
    }
}

#[async_trait::async_trait]
impl LlmProvider for LlmService {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<String, CompletionError> {
        let response = self.send_generate(prompt, options, false).await?;

        let body = response
            .text()
            .await
            .map_err(|e| CompletionError::Failed(format!("Failed to read Ollama response: {}", e)))?;

        let chunk = parse_generate_line(&body)?;
        Ok(chunk.response)
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<TokenStream, CompletionError> {
        let response = self.send_generate(prompt, options, true).await?;
        Ok(decode_ndjson(response.bytes_stream()))
    }

    async fn is_available(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.config.base_url))
            .timeout(std::time::Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Ollama not reachable: {}", e);
                false
            }
        }
    }
}

/// Connection failures mean the engine is down; anything later is a failed generation
fn map_send_error(e: reqwest::Error) -> CompletionError {
    if e.is_connect() {
        CompletionError::Unavailable(e.to_string())
    } else {
        CompletionError::Failed(format!("Failed to call Ollama API: {}", e))
    }
}

/// Configured model if installed (bare or `:latest`), otherwise the first
/// installed model that is not an embedding model.
pub fn pick_model(configured: &str, installed: &[String]) -> Option<String> {
    let tagged = format!("{}:latest", configured);
    if installed.iter().any(|name| name == configured || *name == tagged) {
        return Some(configured.to_string());
    }

    installed
        .iter()
        .find(|name| !name.to_lowercase().contains("embed"))
        .cloned()
}

pub fn parse_generate_line(line: &str) -> Result<GenerateChunk, CompletionError> {
    let chunk: GenerateChunk = serde_json::from_str(line)
        .map_err(|e| CompletionError::Failed(format!("Malformed Ollama output: {}", e)))?;

    match &chunk.error {
        Some(message) => Err(CompletionError::Failed(message.clone())),
        None => Ok(chunk),
    }
}

/// Accumulates raw bytes and hands out complete lines. Lines may span
/// network chunks, including in the middle of a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn next_line(&mut self) -> Option<String> {
        let pos = self.buffer.iter().position(|b| *b == b'\n')?;
        let line: Vec<u8> = self.buffer.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }

    /// Whatever is left once the body ends without a final newline
    pub fn take_rest(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let line = String::from_utf8_lossy(&rest).trim().to_string();
        (!line.is_empty()).then_some(line)
    }
}

struct NdjsonState<S> {
    body: Pin<Box<S>>,
    lines: LineBuffer,
    finished: bool,
}

/// Turn an NDJSON byte stream into text fragments, stopping at `done: true`
pub fn decode_ndjson<S, B, E>(body: S) -> TokenStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = NdjsonState {
        body: Box::pin(body),
        lines: LineBuffer::default(),
        finished: false,
    };

    let stream = futures::stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }

            let line = match state.lines.next_line() {
                Some(line) => line,
                None => match state.body.next().await {
                    Some(Ok(bytes)) => {
                        state.lines.push(bytes.as_ref());
                        continue;
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        let error = CompletionError::Failed(format!("Stream error: {}", e));
                        return Some((Err(error), state));
                    }
                    None => {
                        state.finished = true;
                        match state.lines.take_rest() {
                            Some(rest) => rest,
                            None => return None,
                        }
                    }
                },
            };

            if line.is_empty() {
                continue;
            }

            match parse_generate_line(&line) {
                Ok(chunk) => {
                    if chunk.done {
                        state.finished = true;
                    }
                    if chunk.response.is_empty() {
                        continue;
                    }
                    return Some((Ok(chunk.response), state));
                }
                Err(e) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
            }
        }
    });

    Box::pin(stream)
}
