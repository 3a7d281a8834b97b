//! Embedding backends and the caching [`EmbeddingProvider`].
//!
//! An [`EmbeddingBackend`] turns text into vectors. Two implementations
//! ship with the crate:
//! - **[`OpenAiBackend`]** calls the OpenAI `/embeddings` endpoint.
//! - **`LocalBackend`** runs a fastembed model in-process (feature
//!   `local-embeddings-fastembed`); no network calls after model download.
//!
//! Backends are wrapped by [`EmbeddingProvider`], which adds a
//! content-addressed [`ContentCache`], [`UsageStats`] accounting, an
//! optional per-request timeout, and bounded-concurrency batch embedding.
//!
//! # Provider Selection
//!
//! Use [`create_backend`] to build the backend named by the configuration:
//!
//! | Config Value | Backend |
//! |-------------|----------|
//! | `"openai"` | [`OpenAiBackend`] |
//! | `"local"` | `LocalBackend` (requires `local-embeddings-fastembed`) |
//!
//! # Errors
//!
//! Backend failures are classified (authentication, rate limit, quota,
//! availability) and returned as-is. Nothing is retried here.

pub mod cache;
#[cfg(feature = "local-embeddings-fastembed")]
pub mod local;
pub mod openai;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::EmbeddingConfig;
use crate::error::{RadiateError, Result};
use crate::models::Embedding;

pub use cache::ContentCache;
#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalBackend;
pub use openai::OpenAiBackend;

/// A source of embedding vectors.
///
/// Implementations report a fixed dimension, discovered at construction,
/// and must return exactly one vector of that length per input text.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Pricing used for usage accounting.
    fn cost_model(&self) -> CostModel;

    async fn compute_embedding(&self, text: &str) -> Result<Embedding>;

    /// Embed several texts in one round trip when the backend supports it.
    /// The default calls [`compute_embedding`](Self::compute_embedding) in order.
    async fn compute_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.compute_embedding(text).await?);
        }
        Ok(out)
    }
}

/// How a backend charges for embeddings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CostModel {
    Free,
    /// USD per 1,000 tokens.
    PerThousandTokens(f64),
}

impl CostModel {
    /// OpenAI list prices; unknown models are priced like
    /// `text-embedding-3-small`.
    pub fn for_openai_model(model: &str) -> Self {
        let rate = match model {
            "text-embedding-3-small" => 0.00002,
            "text-embedding-3-large" => 0.00013,
            "text-embedding-ada-002" => 0.00010,
            _ => 0.00002,
        };
        CostModel::PerThousandTokens(rate)
    }

    /// Estimated cost of embedding `text`, approximating tokens as
    /// `words * 1.3`.
    pub fn estimate(&self, text: &str) -> f64 {
        match self {
            CostModel::Free => 0.0,
            CostModel::PerThousandTokens(rate) => {
                let tokens = text.split_whitespace().count() as f64 * 1.3;
                tokens / 1000.0 * rate
            }
        }
    }
}

/// Usage counters for one provider instance. All counters only grow.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UsageStats {
    pub embeddings_generated: u64,
    pub cache_hits: u64,
    pub total_cost: f64,
    pub cost_saved: f64,
}

impl UsageStats {
    pub fn cache_hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.embeddings_generated;
        self.cache_hits as f64 / lookups.max(1) as f64
    }
}

/// Options for [`EmbeddingProvider::embed_batch_concurrent`].
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub cancel: Option<CancellationToken>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_concurrent: 5,
            cancel: None,
        }
    }
}

/// Caching, accounting wrapper around an [`EmbeddingBackend`].
pub struct EmbeddingProvider {
    backend: Arc<dyn EmbeddingBackend>,
    cache: ContentCache,
    stats: Mutex<UsageStats>,
    request_timeout: Option<Duration>,
    track_costs: bool,
}

impl EmbeddingProvider {
    pub fn new(backend: Arc<dyn EmbeddingBackend>) -> Self {
        Self {
            backend,
            cache: ContentCache::new(),
            stats: Mutex::new(UsageStats::default()),
            request_timeout: None,
            track_costs: true,
        }
    }

    /// Build a provider with the timeout and cost settings from `config`.
    pub fn from_config(backend: Arc<dyn EmbeddingBackend>, config: &EmbeddingConfig) -> Self {
        Self::new(backend)
            .with_request_timeout(config.request_timeout_secs.map(Duration::from_secs))
            .with_cost_tracking(config.track_costs)
    }

    /// Bound every backend request. `None` waits indefinitely.
    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_cost_tracking(mut self, track_costs: bool) -> Self {
        self.track_costs = track_costs;
        self
    }

    pub fn model_name(&self) -> &str {
        self.backend.model_name()
    }

    pub fn dims(&self) -> usize {
        self.backend.dims()
    }

    pub fn backend(&self) -> &Arc<dyn EmbeddingBackend> {
        &self.backend
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> UsageStats {
        self.lock_stats().clone()
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop cached vectors. Usage counters are unaffected.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// Embed one text, serving repeats from the cache.
    pub async fn embed(&self, text: &str) -> Result<Embedding> {
        if text.trim().is_empty() {
            return Err(RadiateError::EmptyInput { index: None });
        }

        let key = ContentCache::key(text);
        if let Some(hit) = self.cache.get(&key) {
            self.record_hits(std::iter::once(text));
            return Ok(hit);
        }

        let embedding = self.bounded(self.backend.compute_embedding(text)).await?;
        self.check_dims(&embedding)?;

        self.cache.insert(key, embedding.clone());
        self.record_misses(std::iter::once(text));
        Ok(embedding)
    }

    /// Embed texts in order; the output is index-aligned with `texts`.
    ///
    /// Blank entries are rejected with [`RadiateError::EmptyInput`] carrying
    /// their index. Distinct cache misses go to the backend in a single
    /// batch call; repeats of a text within the batch count as cache hits.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        reject_blank(texts)?;

        let mut slots: Vec<Option<Embedding>> = Vec::with_capacity(texts.len());
        // Cache key and input positions of each distinct miss, in first-seen order.
        let mut misses: Vec<(String, Vec<usize>)> = Vec::new();
        let mut miss_by_key: HashMap<String, usize> = HashMap::new();
        let mut hits: Vec<usize> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let key = ContentCache::key(text);
            if let Some(hit) = self.cache.get(&key) {
                slots.push(Some(hit));
                hits.push(i);
                continue;
            }
            slots.push(None);
            match miss_by_key.get(&key) {
                Some(&m) => {
                    misses[m].1.push(i);
                    hits.push(i);
                }
                None => {
                    miss_by_key.insert(key.clone(), misses.len());
                    misses.push((key, vec![i]));
                }
            }
        }

        if !misses.is_empty() {
            let inputs: Vec<String> = misses
                .iter()
                .map(|(_, positions)| texts[positions[0]].clone())
                .collect();
            let computed = self.bounded(self.backend.compute_batch(&inputs)).await?;

            if computed.len() != misses.len() {
                return Err(RadiateError::Backend(format!(
                    "{} returned {} embeddings for {} inputs",
                    self.backend.model_name(),
                    computed.len(),
                    misses.len()
                )));
            }

            for ((key, positions), embedding) in misses.iter().zip(computed) {
                self.check_dims(&embedding)?;
                self.cache.insert(key.clone(), embedding.clone());
                for &i in positions {
                    slots[i] = Some(embedding.clone());
                }
            }
            self.record_misses(inputs.iter().map(String::as_str));
        }

        self.record_hits(hits.iter().map(|&i| texts[i].as_str()));

        slots
            .into_iter()
            .map(|slot| {
                slot.ok_or_else(|| RadiateError::Backend("missing embedding in batch".to_string()))
            })
            .collect()
    }

    /// Embed texts in batches of `batch_size`, running at most
    /// `max_concurrent` batches at once.
    ///
    /// The output is index-aligned with `texts` regardless of completion
    /// order. The first failing batch aborts the rest and its error is
    /// returned. Cancelling the token drops in-flight batches and returns
    /// [`RadiateError::Cancelled`].
    pub async fn embed_batch_concurrent(
        &self,
        texts: &[String],
        options: &BatchOptions,
    ) -> Result<Vec<Embedding>> {
        if options.batch_size == 0 || options.max_concurrent == 0 {
            return Err(RadiateError::Config(
                "batch_size and max_concurrent must be at least 1".to_string(),
            ));
        }
        reject_blank(texts)?;

        let work = self.run_batches(texts, options.batch_size, options.max_concurrent);
        match &options.cancel {
            Some(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(RadiateError::Cancelled),
                    result = work => result,
                }
            }
            None => work.await,
        }
    }

    async fn run_batches(
        &self,
        texts: &[String],
        batch_size: usize,
        max_concurrent: usize,
    ) -> Result<Vec<Embedding>> {
        let batch_count = texts.len().div_ceil(batch_size);
        let mut results: Vec<Option<Vec<Embedding>>> = vec![None; batch_count];

        let batches: Vec<(usize, Vec<String>)> = texts
            .chunks(batch_size)
            .map(<[String]>::to_vec)
            .enumerate()
            .collect();

        let mut stream = futures::stream::iter(batches)
            .map(|(batch_index, batch)| async move {
                tracing::debug!(batch_index, size = batch.len(), "embedding batch");
                self.embed_batch(&batch)
                    .await
                    .map(|vectors| (batch_index, vectors))
            })
            .buffer_unordered(max_concurrent);

        while let Some(result) = stream.next().await {
            let (batch_index, vectors) = result?;
            results[batch_index] = Some(vectors);
        }

        Ok(results.into_iter().flatten().flatten().collect())
    }

    async fn bounded<T>(&self, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        match self.request_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .map_err(|_| RadiateError::Timeout(limit))?,
            None => fut.await,
        }
    }

    fn check_dims(&self, embedding: &Embedding) -> Result<()> {
        let expected = self.backend.dims();
        if embedding.len() != expected {
            return Err(RadiateError::Backend(format!(
                "{} returned a {}-dimensional vector, expected {}",
                self.backend.model_name(),
                embedding.len(),
                expected
            )));
        }
        Ok(())
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, UsageStats> {
        self.stats.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record_hits<'a>(&self, texts: impl Iterator<Item = &'a str>) {
        let cost = self.backend.cost_model();
        let mut stats = self.lock_stats();
        for text in texts {
            stats.cache_hits += 1;
            if self.track_costs {
                stats.cost_saved += cost.estimate(text);
            }
        }
    }

    fn record_misses<'a>(&self, texts: impl Iterator<Item = &'a str>) {
        let cost = self.backend.cost_model();
        let mut stats = self.lock_stats();
        for text in texts {
            stats.embeddings_generated += 1;
            if self.track_costs {
                stats.total_cost += cost.estimate(text);
            }
        }
    }
}

fn reject_blank(texts: &[String]) -> Result<()> {
    match texts.iter().position(|t| t.trim().is_empty()) {
        Some(i) => Err(RadiateError::EmptyInput { index: Some(i) }),
        None => Ok(()),
    }
}

/// Dimension of the vector a backend returned for its sample text.
pub(crate) fn sample_dims(service: &str, model: &str, sample: &[Embedding]) -> Result<usize> {
    match sample.first().map(Vec::len) {
        Some(dims) if dims > 0 => Ok(dims),
        _ => Err(RadiateError::Backend(format!(
            "{} returned an empty embedding for model {}",
            service, model
        ))),
    }
}

/// Build the backend named by `config.provider`.
///
/// Backends embed a sample text once to learn the model's dimension,
/// so this fails early on bad credentials or an unreachable endpoint.
pub async fn create_backend(config: &EmbeddingConfig) -> Result<Arc<dyn EmbeddingBackend>> {
    match config.provider.as_str() {
        "openai" => Ok(Arc::new(OpenAiBackend::connect(config).await?)),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Arc::new(LocalBackend::connect(config).await?)),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => Err(RadiateError::Config(
            "Local embedding provider requires --features local-embeddings-fastembed".to_string(),
        )),
        other => Err(RadiateError::Config(format!(
            "Unknown embedding provider: {}",
            other
        ))),
    }
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns `0.0` for empty vectors, vectors of different lengths, or a
/// zero-norm operand.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}
