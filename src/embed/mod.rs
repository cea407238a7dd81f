mod ollama;
mod openai;

use async_trait::async_trait;
use std::time::Duration;

pub use ollama::OllamaEmbedder;
pub use openai::OpenAiEmbedder;

/// Result type for embedding operations
pub type EmbedResult<T> = Result<T, EmbedError>;

/// Errors that can occur while fetching embeddings
#[derive(Debug, thiserror::Error)]
pub enum EmbedError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("Response parsing failed: {0}")]
    ParseError(String),
}

/// Batch size for a single provider call; larger inputs are chunked and
/// the chunks requested concurrently.
const EMBED_BATCH_SIZE: usize = 64;

/// Trait that all embedding providers must implement.
/// The returned vectors are in the same order as the input texts.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>>;

    /// Get the name of this provider
    fn name(&self) -> &str;
}

/// Embed an arbitrary number of texts through `provider`, chunked into
/// batches that run concurrently. Order is preserved.
pub async fn embed_batched(
    provider: &dyn EmbeddingProvider,
    texts: &[String],
) -> EmbedResult<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let tasks = texts
        .chunks(EMBED_BATCH_SIZE)
        .map(|chunk| provider.embed(chunk));

    let mut vectors = Vec::with_capacity(texts.len());
    for result in futures::future::join_all(tasks).await {
        vectors.extend(result?);
    }
    Ok(vectors)
}

/// Configuration for embedding providers
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    /// OpenAI API key
    pub openai_api_key: Option<String>,
    /// OpenAI embedding model
    pub openai_model: String,
    /// Ollama base URL
    pub ollama_base_url: Option<String>,
    /// Ollama embedding model
    pub ollama_model: String,
    /// Timeout for a single embedding request
    pub timeout: Duration,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_model: "text-embedding-3-small".to_string(),
            ollama_base_url: Some("http://localhost:11434".to_string()),
            ollama_model: "nomic-embed-text".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

impl EmbeddingConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let openai_api_key = std::env::var("OPENAI_API_KEY").ok().and_then(|key| {
            let trimmed = key.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        });

        let openai_model = std::env::var("OPENAI_EMBEDDING_MODEL")
            .ok()
            .and_then(|model| {
                let trimmed = model.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| "text-embedding-3-small".to_string());

        let ollama_base_url = match std::env::var("OLLAMA_BASE_URL") {
            Ok(url) => {
                let trimmed = url.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Err(_) => Some("http://localhost:11434".to_string()),
        };

        let ollama_model = std::env::var("OLLAMA_EMBEDDING_MODEL")
            .ok()
            .and_then(|model| {
                let trimmed = model.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .unwrap_or_else(|| "nomic-embed-text".to_string());

        Self {
            openai_api_key,
            openai_model,
            ollama_base_url,
            ollama_model,
            timeout: std::env::var("EMBED_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(10)),
        }
    }

    /// Build the configured provider. OpenAI wins when both are available;
    /// no provider at all is an error the caller may treat as "run without
    /// duplicate detection".
    pub fn build_provider(&self) -> EmbedResult<Box<dyn EmbeddingProvider>> {
        if let Some(api_key) = &self.openai_api_key {
            return Ok(Box::new(OpenAiEmbedder::new(
                api_key.clone(),
                self.openai_model.clone(),
                self.timeout,
            )));
        }

        if let Some(base_url) = &self.ollama_base_url {
            return Ok(Box::new(OllamaEmbedder::new(
                base_url.clone(),
                self.ollama_model.clone(),
                self.timeout,
            )));
        }

        Err(EmbedError::ConfigError(
            "No embedding provider configured. Set OPENAI_API_KEY or OLLAMA_BASE_URL".to_string(),
        ))
    }
}
