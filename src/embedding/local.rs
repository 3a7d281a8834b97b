//! In-process embeddings via fastembed.
//!
//! Models are downloaded from Hugging Face on first use and cached. After
//! that no network calls are made. Inference is CPU-bound and runs on the
//! blocking pool.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::{sample_dims, CostModel, EmbeddingBackend};
use crate::config::EmbeddingConfig;
use crate::error::{RadiateError, Result};
use crate::models::Embedding;

/// Local embedding backend backed by a fastembed `TextEmbedding` model.
pub struct LocalBackend {
    model: Arc<Mutex<fastembed::TextEmbedding>>,
    model_name: String,
    dims: usize,
}

fn config_to_fastembed_model(name: &str) -> Result<fastembed::EmbeddingModel> {
    match name {
        "all-minilm-l6-v2" => Ok(fastembed::EmbeddingModel::AllMiniLML6V2),
        "bge-small-en-v1.5" => Ok(fastembed::EmbeddingModel::BGESmallENV15),
        "bge-base-en-v1.5" => Ok(fastembed::EmbeddingModel::BGEBaseENV15),
        "bge-large-en-v1.5" => Ok(fastembed::EmbeddingModel::BGELargeENV15),
        "nomic-embed-text-v1.5" => Ok(fastembed::EmbeddingModel::NomicEmbedTextV15),
        "multilingual-e5-small" => Ok(fastembed::EmbeddingModel::MultilingualE5Small),
        other => Err(RadiateError::Config(format!(
            "Unknown local embedding model: '{}'. Supported models: \
             all-minilm-l6-v2, bge-small-en-v1.5, bge-base-en-v1.5, bge-large-en-v1.5, \
             nomic-embed-text-v1.5, multilingual-e5-small",
            other
        ))),
    }
}

fn run_model(
    model: &Mutex<fastembed::TextEmbedding>,
    texts: Vec<String>,
) -> Result<Vec<Embedding>> {
    let mut model = model.lock().unwrap_or_else(|e| e.into_inner());
    model
        .embed(texts, None)
        .map_err(|e| RadiateError::Backend(format!("Local embedding failed: {}", e)))
}

impl LocalBackend {
    /// Load the model named by `config.model` and learn its dimension from a sample text.
    pub async fn connect(config: &EmbeddingConfig) -> Result<Self> {
        let model_name = config.model_or_default();
        let fastembed_model = config_to_fastembed_model(&model_name)?;

        let model = tokio::task::spawn_blocking(move || {
            fastembed::TextEmbedding::try_new(
                fastembed::InitOptions::new(fastembed_model).with_show_download_progress(false),
            )
            .map_err(|e| {
                RadiateError::BackendUnavailable(format!(
                    "Failed to initialize local embedding model: {}",
                    e
                ))
            })
        })
        .await
        .map_err(|e| RadiateError::Backend(format!("model loading task failed: {}", e)))??;

        let model = Arc::new(Mutex::new(model));
        let sample_model = Arc::clone(&model);
        let sample = tokio::task::spawn_blocking(move || {
            run_model(&sample_model, vec!["test".to_string()])
        })
        .await
        .map_err(|e| RadiateError::Backend(format!("sample embedding task failed: {}", e)))??;

        let dims = sample_dims("local model", &model_name, &sample)?;
        tracing::debug!(model = %model_name, dims, "loaded local embedding model");

        Ok(Self {
            model,
            model_name,
            dims,
        })
    }
}

#[async_trait]
impl EmbeddingBackend for LocalBackend {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dims(&self) -> usize {
        self.dims
    }

    fn cost_model(&self) -> CostModel {
        CostModel::Free
    }

    async fn compute_embedding(&self, text: &str) -> Result<Embedding> {
        let mut vectors = self.compute_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RadiateError::Backend("local model returned no embedding".to_string()))
    }

    async fn compute_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let model = Arc::clone(&self.model);
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || run_model(&model, texts))
            .await
            .map_err(|e| RadiateError::Backend(format!("embedding task failed: {}", e)))?
    }
}
