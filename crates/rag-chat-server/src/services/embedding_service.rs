use crate::config::EmbeddingConfig;
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
// Import trait from conversation manager
use crate::services::conversation::manager::EmbeddingProvider;

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

/// Ollama embeddings client
#[derive(Clone)]
pub struct EmbeddingService {
    client: Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl EmbeddingService {
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: config.base_url,
            model: config.model,
            dimension: config.dimension,
        })
    }

    async fn embed_internal(&self, text: &str) -> Result<Vec<f32>> {
        debug!("Generating embedding for {} chars", text.len());

        let request = EmbeddingRequest {
            model: &self.model,
            prompt: text,
        };

        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .json(&request)
            .send()
            .await
            .context("Failed to connect to embedding server")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Embedding API error ({}): {}", status, body);
        }

        let json_value: Value = response
            .json()
            .await
            .context("Failed to parse embedding response as JSON")?;

        let embedding = parse_embedding(&json_value)?;

        if embedding.len() != self.dimension {
            anyhow::bail!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.dimension,
                embedding.len()
            );
        }

        Ok(embedding)
    }
}

#[async_trait::async_trait]
impl EmbeddingProvider for EmbeddingService {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_internal(text).await
    }
}

/// Accepts Ollama/llama.cpp `{"embedding": [...]}`, OpenAI
/// `{"data": [{"embedding": [...]}]}`, `[{"embedding": [...]}]` and a bare array
pub fn parse_embedding(value: &Value) -> Result<Vec<f32>> {
    let vector = match value {
        Value::Array(items) => match items.first() {
            None => anyhow::bail!("Empty array returned from embedding server"),
            Some(Value::Object(first)) => first.get("embedding"),
            Some(_) => Some(value),
        },
        Value::Object(map) => match (map.get("embedding"), map.get("data")) {
            (Some(embedding), _) => Some(embedding),
            (None, Some(Value::Array(data))) => data.first().and_then(|d| d.get("embedding")),
            _ => None,
        },
        _ => None,
    };

    let floats: Vec<f32> = vector
        .and_then(Value::as_array)
        .with_context(|| format!("Unrecognized embedding response format: {}", value))?
        .iter()
        .filter_map(|v| v.as_f64().map(|f| f as f32))
        .collect();

    if floats.is_empty() {
        anyhow::bail!("Generated embedding is empty");
    }

    Ok(floats)
}
