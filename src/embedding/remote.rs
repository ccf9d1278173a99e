//! Network-backed embedders.
//!
//! Both providers share one request loop with exponential backoff:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: base, 2×base, 4×base, … (capped at 2^5 × base)

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

use super::{validate_embeddings, Embedder};
use crate::config::EmbeddingConfig;
use crate::error::{IndexError, Result};

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OLLAMA_MODEL: &str = "mxbai-embed-large";
const DEFAULT_OLLAMA_DIMS: usize = 1024;
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(1);

/// Shared HTTP settings of the remote providers.
#[derive(Clone)]
struct HttpSettings {
    client: reqwest::Client,
    max_retries: u32,
    retry_base: Duration,
}

impl HttpSettings {
    fn new(config: &EmbeddingConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            max_retries: config.max_retries,
            retry_base: DEFAULT_RETRY_BASE,
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_base * (1u32 << (attempt - 1).min(5))
    }

    /// POST `body` as JSON, retrying transient failures.
    async fn post_json(
        &self,
        label: &str,
        endpoint: &str,
        bearer: Option<&str>,
        body: &Value,
    ) -> Result<Value> {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = self.backoff(attempt);
                warn!(provider = label, attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let mut request = self.client.post(endpoint).json(body);
            if let Some(key) = bearer {
                request = request.bearer_auth(key);
            }

            match request.send().await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        return response.json::<Value>().await.map_err(|e| {
                            IndexError::Embedding(format!("{} returned invalid JSON: {}", label, e))
                        });
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = IndexError::Embedding(format!(
                        "{} API error {}: {}",
                        label, status, body_text
                    ));

                    // Rate limited or server error: retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }

                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(IndexError::Embedding(format!(
                        "{} connection error (is it reachable at {}?): {}",
                        label, endpoint, e
                    )));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            IndexError::Embedding(format!("{} embedding failed after retries", label))
        }))
    }
}

/// Read a JSON array of numbers as a vector. Non-numeric components are
/// malformed output, never silently zeroed.
fn parse_vector(value: &Value, label: &str) -> Result<Vec<f32>> {
    value
        .as_array()
        .ok_or_else(|| {
            IndexError::Embedding(format!("Invalid {} response: embedding is not an array", label))
        })?
        .iter()
        .map(|v| {
            v.as_f64().map(|x| x as f32).ok_or_else(|| {
                IndexError::Embedding(format!(
                    "Invalid {} response: non-numeric embedding component",
                    label
                ))
            })
        })
        .collect()
}

// ============ Ollama ============

/// Embedder backed by a local Ollama instance.
///
/// Calls `POST {url}/api/embed` with `{model, input: [..]}` and reads the
/// `embeddings` array. Requires Ollama to be running with the model pulled
/// (e.g. `ollama pull mxbai-embed-large`).
pub struct OllamaEmbedder {
    model: String,
    dims: usize,
    url: String,
    http: HttpSettings,
}

impl OllamaEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_MODEL.to_string()),
            dims: config.dims.unwrap_or(DEFAULT_OLLAMA_DIMS),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            http: HttpSettings::new(config)?,
        })
    }

    /// Override the first retry delay.
    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.http.retry_base = base;
        self
    }
}

fn parse_ollama_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    json.get("embeddings")
        .and_then(|e| e.as_array())
        .ok_or_else(|| {
            IndexError::Embedding("Invalid Ollama response: missing embeddings array".to_string())
        })?
        .iter()
        .map(|e| parse_vector(e, "Ollama"))
        .collect()
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| IndexError::Embedding("Empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, count = texts.len(), "ollama embed");
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self
            .http
            .post_json("Ollama", &format!("{}/api/embed", self.url), None, &body)
            .await?;
        validate_embeddings(parse_ollama_response(&json)?, texts.len(), self.dims)
    }
}

// ============ OpenAI ============

/// Embedder backed by the OpenAI embeddings API.
///
/// Calls `POST {url}/embeddings`; the key is read from `OPENAI_API_KEY`.
pub struct OpenAIEmbedder {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    http: HttpSettings,
}

impl OpenAIEmbedder {
    /// Create a provider using the `OPENAI_API_KEY` environment variable.
    pub fn from_env(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            IndexError::Config("OPENAI_API_KEY environment variable not set".to_string())
        })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &EmbeddingConfig, api_key: String) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            IndexError::Config("embedding.model required for OpenAI provider".to_string())
        })?;
        let dims = config.dims.ok_or_else(|| {
            IndexError::Config("embedding.dims required for OpenAI provider".to_string())
        })?;
        Ok(Self {
            model,
            dims,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            http: HttpSettings::new(config)?,
        })
    }

    pub fn with_retry_base(mut self, base: Duration) -> Self {
        self.http.retry_base = base;
        self
    }
}

/// Extract `data[].embedding`, ordered by each item's `index`.
fn parse_openai_response(json: &Value) -> Result<Vec<Vec<f32>>> {
    let data = json.get("data").and_then(|d| d.as_array()).ok_or_else(|| {
        IndexError::Embedding("Invalid OpenAI response: missing data array".to_string())
    })?;

    let mut indexed = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let embedding = item.get("embedding").ok_or_else(|| {
            IndexError::Embedding("Invalid OpenAI response: missing embedding".to_string())
        })?;
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(position);
        indexed.push((index, parse_vector(embedding, "OpenAI")?));
    }
    indexed.sort_by_key(|(i, _)| *i);

    Ok(indexed.into_iter().map(|(_, v)| v).collect())
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| IndexError::Embedding("Empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        debug!(model = %self.model, count = texts.len(), "openai embed");
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });
        let json = self
            .http
            .post_json(
                "OpenAI",
                &format!("{}/embeddings", self.url),
                Some(&self.api_key),
                &body,
            )
            .await?;
        validate_embeddings(parse_openai_response(&json)?, texts.len(), self.dims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ollama_config(url: &str, dims: usize, max_retries: u32) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "ollama".to_string(),
            model: Some("test-model".to_string()),
            dims: Some(dims),
            url: Some(url.to_string()),
            max_retries,
            timeout_secs: 5,
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn test_ollama_batch_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "embeddings": [[0.1, 0.2, 0.3], [0.4, 0.5, 0.6]]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::new(&ollama_config(&server.uri(), 3, 0)).unwrap();
        let vectors = embedder
            .embed_batch(&["a".to_string(), "b".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        assert!((vectors[1][2] - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_ollama_wrong_dimensionality_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "embeddings": [[0.1, 0.2]] })),
            )
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::new(&ollama_config(&server.uri(), 3, 0)).unwrap();
        let err = embedder.embed("a").await.unwrap_err();
        assert!(err.to_string().contains("malformed"));
    }

    #[tokio::test]
    async fn test_ollama_non_numeric_component_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "embeddings": [[0.1, "x", 0.3]] })),
            )
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::new(&ollama_config(&server.uri(), 3, 0)).unwrap();
        assert!(matches!(
            embedder.embed("a").await,
            Err(IndexError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_ollama_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
            .expect(1)
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::new(&ollama_config(&server.uri(), 3, 3))
            .unwrap()
            .with_retry_base(Duration::from_millis(1));
        let err = embedder.embed("a").await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn test_ollama_server_error_retried_then_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let embedder = OllamaEmbedder::new(&ollama_config(&server.uri(), 3, 2))
            .unwrap()
            .with_retry_base(Duration::from_millis(1));
        assert!(matches!(
            embedder.embed("a").await,
            Err(IndexError::Embedding(_))
        ));
    }

    #[tokio::test]
    async fn test_openai_orders_by_index_and_sends_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [
                    { "index": 1, "embedding": [0.0, 1.0] },
                    { "index": 0, "embedding": [1.0, 0.0] }
                ]
            })))
            .mount(&server)
            .await;

        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            model: Some("text-embedding-3-small".to_string()),
            dims: Some(2),
            url: Some(server.uri()),
            max_retries: 0,
            ..EmbeddingConfig::default()
        };
        let embedder = OpenAIEmbedder::new(&config, "sk-test".to_string()).unwrap();
        let vectors = embedder
            .embed_batch(&["first".to_string(), "second".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_openai_requires_model() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            dims: Some(2),
            ..EmbeddingConfig::default()
        };
        assert!(OpenAIEmbedder::new(&config, "k".to_string()).is_err());
    }
}
