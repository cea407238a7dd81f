use super::*;
use serde::{Deserialize, Serialize};

/// Ollama embedding provider
pub struct OllamaEmbedder {
    base_url: String,
    model: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl OllamaEmbedder {
    /// Create a new Ollama embedder with the given base URL and model
    pub fn new(base_url: String, model: String, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            base_url,
            model,
            client,
            timeout,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed(&self, texts: &[String]) -> EmbedResult<Vec<Vec<f32>>> {
        let request = OllamaEmbedRequest {
            model: self.model.clone(),
            input: texts.to_vec(),
        };

        let url = format!("{}/api/embed", self.base_url);

        let response = tokio::time::timeout(
            self.timeout,
            self.client.post(&url).json(&request).send(),
        )
        .await
        .map_err(|_| EmbedError::Timeout(self.timeout))?
        .map_err(|e| EmbedError::ApiError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EmbedError::ApiError(format!(
                "Ollama API returned status: {}",
                response.status()
            )));
        }

        let body: OllamaEmbedResponse = response
            .json()
            .await
            .map_err(|e| EmbedError::ParseError(e.to_string()))?;

        if body.embeddings.len() != texts.len() {
            return Err(EmbedError::ParseError(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                body.embeddings.len()
            )));
        }

        Ok(body.embeddings)
    }

    fn name(&self) -> &str {
        "ollama"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // Only run with Ollama running locally
    async fn test_ollama_embed() {
        let embedder = OllamaEmbedder::new(
            "http://localhost:11434".to_string(),
            "nomic-embed-text".to_string(),
            Duration::from_secs(30),
        );

        let vectors = embedder
            .embed(&["hello world".to_string(), "goodbye world".to_string()])
            .await
            .unwrap();

        assert_eq!(vectors.len(), 2);
        assert!(!vectors[0].is_empty());
        assert_eq!(vectors[0].len(), vectors[1].len());
    }
}
