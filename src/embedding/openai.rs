//! OpenAI embeddings client.
//!
//! Calls `POST {base_url}/embeddings` with the configured model. Batches
//! are sent as a single request with an array `input`. Responses are
//! reordered by their `index` field before being returned.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{sample_dims, CostModel, EmbeddingBackend};
use crate::config::EmbeddingConfig;
use crate::error::{RadiateError, Result};
use crate::models::Embedding;

const SERVICE: &str = "OpenAI embeddings";

/// Remote embedding backend for the OpenAI API (or any compatible server).
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    dims: usize,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl OpenAiBackend {
    /// Build the client and embed a sample text once to learn the model's dimension.
    ///
    /// # Errors
    ///
    /// Returns [`RadiateError::Config`] when no API key is available, and
    /// the classified backend error when the sample request fails.
    pub async fn connect(config: &EmbeddingConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            RadiateError::Config(
                "OpenAI API key not set (embedding.api_key or OPENAI_API_KEY)".to_string(),
            )
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RadiateError::Config(format!("failed to build HTTP client: {}", e)))?;

        let mut backend = Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model_or_default(),
            dims: 0,
        };

        let sample = backend.request(&["test".to_string()]).await?;
        backend.dims = sample_dims(SERVICE, &backend.model, &sample)?;

        tracing::debug!(
            model = %backend.model,
            dims = backend.dims,
            "connected to OpenAI embeddings"
        );
        Ok(backend)
    }

    async fn request(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let body = EmbeddingRequest {
            model: &self.model,
            input: texts,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| RadiateError::from_transport(SERVICE, e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RadiateError::from_status(SERVICE, status, &body_text));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| RadiateError::from_transport(SERVICE, e))?;
        parsed.data.sort_by_key(|d| d.index);

        if parsed.data.len() != texts.len() {
            return Err(RadiateError::Backend(format!(
                "{} returned {} embeddings for {} inputs",
                SERVICE,
                parsed.data.len(),
                texts.len()
            )));
        }

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn cost_model(&self) -> CostModel {
        CostModel::for_openai_model(&self.model)
    }

    async fn compute_embedding(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RadiateError::Backend(format!("{} returned no embedding", SERVICE)))
    }

    async fn compute_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

    /// Answers with one `[len, 1.0, 0.5]` vector per input, in reverse
    /// order, to exercise index sorting.
    struct EchoEmbeddings;

    impl Respond for EchoEmbeddings {
        fn respond(&self, request: &Request) -> ResponseTemplate {
            let body: Value = request.body_json().unwrap();
            let inputs = body["input"].as_array().cloned().unwrap_or_default();
            let data: Vec<Value> = inputs
                .iter()
                .enumerate()
                .rev()
                .map(|(i, text)| {
                    let len = text.as_str().unwrap_or("").len() as f32;
                    json!({"object": "embedding", "index": i, "embedding": [len, 1.0, 0.5]})
                })
                .collect();
            ResponseTemplate::new(200).set_body_json(json!({"object": "list", "data": data}))
        }
    }

    fn config(server: &MockServer) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "openai".to_string(),
            api_key: Some("sk-test".to_string()),
            base_url: server.uri(),
            ..EmbeddingConfig::default()
        }
    }

    #[tokio::test]
    async fn connect_learns_dimension_and_batches_in_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(EchoEmbeddings)
            .mount(&server)
            .await;

        let backend = OpenAiBackend::connect(&config(&server)).await.unwrap();
        assert_eq!(backend.dims(), 3);
        assert_eq!(backend.model_name(), "text-embedding-3-small");

        let texts = vec!["a".to_string(), "bbb".to_string(), "cc".to_string()];
        let vectors = backend.compute_batch(&texts).await.unwrap();
        let lens: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lens, vec![1.0, 3.0, 2.0]);
    }

    #[tokio::test]
    async fn empty_sample_embedding_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"index": 0, "embedding": []}]
            })))
            .mount(&server)
            .await;

        let err = OpenAiBackend::connect(&config(&server)).await.err();
        assert!(matches!(err, Some(RadiateError::Backend(_))));
    }

    #[tokio::test]
    async fn unauthorized_is_authentication_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let err = OpenAiBackend::connect(&config(&server)).await.err().unwrap();
        assert!(matches!(err, RadiateError::Authentication(_)));
    }

    #[tokio::test]
    async fn quota_and_rate_limits_are_distinguished() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": {"type": "insufficient_quota", "message": "You exceeded your current quota"}
            })))
            .mount(&server)
            .await;

        let err = OpenAiBackend::connect(&config(&server)).await.err().unwrap();
        assert!(matches!(err, RadiateError::QuotaExceeded(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn missing_api_key_is_config_error() {
        let server = MockServer::start().await;
        let mut cfg = config(&server);
        cfg.api_key = None;
        let err = OpenAiBackend::connect(&cfg).await.err().unwrap();
        assert!(matches!(err, RadiateError::Config(_)));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_unavailable() {
        let cfg = EmbeddingConfig {
            provider: "openai".to_string(),
            api_key: Some("sk-test".to_string()),
            base_url: "http://127.0.0.1:1".to_string(),
            ..EmbeddingConfig::default()
        };
        let err = OpenAiBackend::connect(&cfg).await.err().unwrap();
        assert!(matches!(err, RadiateError::BackendUnavailable(_)));
    }
}
