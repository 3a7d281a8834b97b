//! TOML configuration.
//!
//! Every section is optional and falls back to the defaults below, so an
//! empty file is a valid configuration. Credentials are normally supplied
//! through the environment and applied with [`Config::apply_env_overrides`].
//!
//! ```toml
//! [embedding]
//! provider = "openai"
//! model = "text-embedding-3-small"
//!
//! [vector_index]
//! url = "https://my-cluster.qdrant.io:6333"
//! collection = "radiate_docs"
//!
//! [chunking]
//! chunk_size = 512
//! overlap = 50
//! strategy = "smart"
//!
//! [retrieval]
//! mode = "hybrid"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::chunk::ChunkStrategy;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub vector_index: VectorIndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub llm: Option<LlmConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// `"local"` or `"openai"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// HTTP client timeout for remote backends.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Upper bound on a single embedding request, enforced by the provider
    /// for every backend. Unset means no bound.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub track_costs: bool,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            api_key: None,
            base_url: default_openai_base_url(),
            batch_size: default_batch_size(),
            max_concurrent: default_max_concurrent(),
            timeout_secs: default_timeout_secs(),
            request_timeout_secs: None,
            track_costs: true,
        }
    }
}

fn default_provider() -> String {
    "local".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_batch_size() -> usize {
    32
}
fn default_max_concurrent() -> usize {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_true() -> bool {
    true
}

impl EmbeddingConfig {
    /// Model name, falling back to the provider's default model.
    pub fn model_or_default(&self) -> String {
        match (&self.model, self.provider.as_str()) {
            (Some(model), _) => model.clone(),
            (None, "openai") => "text-embedding-3-small".to_string(),
            (None, _) => "all-minilm-l6-v2".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct VectorIndexConfig {
    /// `"qdrant"` or `"memory"`.
    #[serde(default = "default_index_provider")]
    pub provider: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default = "default_distance")]
    pub distance: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for VectorIndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            url: None,
            api_key: None,
            collection: default_collection(),
            distance: default_distance(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_index_provider() -> String {
    "qdrant".to_string()
}
fn default_collection() -> String {
    "radiate_docs".to_string()
}
fn default_distance() -> String {
    "cosine".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    /// `"fixed"` or `"smart"`.
    #[serde(default = "default_strategy")]
    pub strategy: String,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            overlap: default_overlap(),
            strategy: default_strategy(),
        }
    }
}

fn default_chunk_size() -> usize {
    512
}
fn default_overlap() -> usize {
    50
}
fn default_strategy() -> String {
    "smart".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_initial_k")]
    pub initial_k: usize,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,
    #[serde(default = "default_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_b")]
    pub bm25_b: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: default_mode(),
            top_k: default_top_k(),
            initial_k: default_initial_k(),
            rrf_k: default_rrf_k(),
            bm25_k1: default_k1(),
            bm25_b: default_b(),
        }
    }
}

fn default_mode() -> String {
    "hybrid".to_string()
}
fn default_top_k() -> usize {
    5
}
fn default_initial_k() -> usize {
    100
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_k1() -> f64 {
    1.5
}
fn default_b() -> f64 {
    0.75
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_max_concurrent_files")]
    pub max_concurrent_files: usize,
    #[serde(default)]
    pub recursive: bool,
    /// Progress output on stderr: `"none"`, `"human"` or `"json"`.
    #[serde(default = "default_progress")]
    pub progress: String,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_concurrent_files: default_max_concurrent_files(),
            recursive: false,
            progress: default_progress(),
        }
    }
}

fn default_max_concurrent_files() -> usize {
    3
}
fn default_progress() -> String {
    "none".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    /// `"openai"` or `"openrouter"`; selects the default base URL.
    #[serde(default = "default_llm_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            model: default_llm_model(),
            base_url: None,
            api_key: None,
            max_tokens: default_max_tokens(),
            system_prompt: None,
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

fn default_llm_provider() -> String {
    "openai".to_string()
}
fn default_llm_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_llm_timeout_secs() -> u64 {
    60
}

impl LlmConfig {
    pub fn base_url_or_default(&self) -> String {
        match (&self.base_url, self.provider.as_str()) {
            (Some(url), _) => url.trim_end_matches('/').to_string(),
            (None, "openrouter") => "https://openrouter.ai/api/v1".to_string(),
            (None, _) => "https://api.openai.com/v1".to_string(),
        }
    }
}

impl Config {
    /// Fill credentials and endpoints that were not set in the file from
    /// the environment: `OPENAI_API_KEY`, `QDRANT_URL`, `QDRANT_API_KEY`,
    /// and `LLM_API_KEY` (falling back to `OPENAI_API_KEY`).
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    fn apply_overrides_from(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if self.embedding.api_key.is_none() {
            self.embedding.api_key = lookup("OPENAI_API_KEY");
        }
        if self.vector_index.url.is_none() {
            self.vector_index.url = lookup("QDRANT_URL");
        }
        if self.vector_index.api_key.is_none() {
            self.vector_index.api_key = lookup("QDRANT_API_KEY");
        }
        if let Some(llm) = self.llm.as_mut() {
            if llm.api_key.is_none() {
                llm.api_key = lookup("LLM_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
            }
        }
    }

    /// Check cross-field constraints that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            bail!("chunking.chunk_size must be > 0");
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            bail!(
                "chunking.overlap ({}) must be smaller than chunking.chunk_size ({})",
                self.chunking.overlap,
                self.chunking.chunk_size
            );
        }
        if ChunkStrategy::parse(&self.chunking.strategy).is_none() {
            bail!(
                "Unknown chunking strategy: '{}'. Must be fixed (or token) or smart.",
                self.chunking.strategy
            );
        }

        if self.retrieval.top_k == 0 {
            bail!("retrieval.top_k must be >= 1");
        }
        if self.retrieval.initial_k == 0 {
            bail!("retrieval.initial_k must be >= 1");
        }
        if self.retrieval.rrf_k < 0.0 {
            bail!("retrieval.rrf_k must be >= 0");
        }
        match self.retrieval.mode.as_str() {
            "dense" | "sparse" | "hybrid" => {}
            other => bail!(
                "Unknown retrieval mode: '{}'. Must be dense, sparse, or hybrid.",
                other
            ),
        }

        if self.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be >= 1");
        }
        if self.embedding.max_concurrent == 0 {
            bail!("embedding.max_concurrent must be >= 1");
        }
        match self.embedding.provider.as_str() {
            "local" | "openai" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be local or openai.",
                other
            ),
        }

        match self.vector_index.provider.as_str() {
            "qdrant" | "memory" => {}
            other => bail!(
                "Unknown vector index provider: '{}'. Must be qdrant or memory.",
                other
            ),
        }
        if crate::models::Distance::parse(&self.vector_index.distance).is_none() {
            bail!(
                "Unknown vector_index.distance: '{}'. Must be cosine, dot, or euclid.",
                self.vector_index.distance
            );
        }

        if self.ingest.max_concurrent_files == 0 {
            bail!("ingest.max_concurrent_files must be >= 1");
        }
        match self.ingest.progress.as_str() {
            "none" | "human" | "json" => {}
            other => bail!("Unknown ingest.progress: '{}'. Must be none, human, or json.", other),
        }

        Ok(())
    }
}

/// Read, parse, apply environment overrides, and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    config.apply_env_overrides();
    config.validate()?;

    Ok(config)
}
