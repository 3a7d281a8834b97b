//! The [`Radiate`] facade.
//!
//! Wires a [`Config`] into the embedding provider, vector index, chunker,
//! ingestion pipeline, retriever and optional completion client, and
//! exposes the everyday operations on one collection.
//!
//! ```rust,no_run
//! # async fn run() -> radiate::Result<()> {
//! use radiate::{config::Config, IngestOptions, Radiate, SearchMode};
//!
//! let mut config = Config::default();
//! config.apply_env_overrides();
//! let radiate = Radiate::connect(config).await?;
//!
//! radiate.ingest("./docs", &IngestOptions::default()).await?;
//! let context = radiate.query("How do I authenticate?", Some(3), Some(SearchMode::Hybrid)).await?;
//! println!("{}", context);
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::bm25::Bm25Params;
use crate::chunk::{ChunkConfig, ChunkStrategy, Chunker};
use crate::config::{load_config, Config};
use crate::embedding::{create_backend, EmbeddingBackend, EmbeddingProvider, UsageStats};
use crate::error::{RadiateError, Result};
use crate::index::{Distance, InMemoryIndex, QdrantIndex, VectorIndex};
use crate::ingest::{IngestOptions, IngestionPipeline, PipelineOptions};
use crate::llm::{build_prompt, Answer, Completion, OpenAiCompletion};
use crate::metrics::MetricRecorder;
use crate::models::{CollectionInfo, IngestReport, SearchHit};
use crate::progress::ProgressMode;
use crate::retrieval::{format_context, HybridRetriever, RetrievalParams, SearchMode};

pub struct Radiate {
    config: Config,
    collection: String,
    metric: Distance,
    default_mode: SearchMode,
    provider: Arc<EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    completion: Option<Arc<dyn Completion>>,
    pipeline: IngestionPipeline,
    retriever: HybridRetriever,
    metrics: Arc<MetricRecorder>,
}

fn config_error(err: anyhow::Error) -> RadiateError {
    RadiateError::Config(format!("{:#}", err))
}

impl Radiate {
    /// Build every component from `config` and make sure the collection
    /// exists.
    ///
    /// # Errors
    ///
    /// Fails on invalid configuration, an unreachable or unauthorised
    /// backend, or [`RadiateError::CollectionDimensionMismatch`] when the
    /// collection already holds vectors of another dimension.
    pub async fn connect(config: Config) -> Result<Self> {
        config.validate().map_err(config_error)?;

        let backend = create_backend(&config.embedding).await?;
        let index: Arc<dyn VectorIndex> = match config.vector_index.provider.as_str() {
            "memory" => Arc::new(InMemoryIndex::new()),
            _ => Arc::new(QdrantIndex::from_config(&config.vector_index)?),
        };
        let completion = match &config.llm {
            Some(llm) => Some(Arc::new(OpenAiCompletion::from_config(llm)?) as Arc<dyn Completion>),
            None => None,
        };

        Self::with_components(config, backend, index, completion).await
    }

    /// Load a TOML config file (with environment overrides) and connect.
    pub async fn from_config_file(path: &Path) -> Result<Self> {
        let config = load_config(path).map_err(config_error)?;
        Self::connect(config).await
    }

    /// Assemble an instance from already-built collaborators.
    pub async fn with_components(
        config: Config,
        backend: Arc<dyn EmbeddingBackend>,
        index: Arc<dyn VectorIndex>,
        completion: Option<Arc<dyn Completion>>,
    ) -> Result<Self> {
        config.validate().map_err(config_error)?;

        let strategy = ChunkStrategy::parse(&config.chunking.strategy).unwrap_or_default();
        let chunker = Chunker::with_default_codec(ChunkConfig {
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.overlap,
            strategy,
        })?;

        let provider = Arc::new(EmbeddingProvider::from_config(backend, &config.embedding));
        let collection = config.vector_index.collection.clone();
        let metric = Distance::parse(&config.vector_index.distance).unwrap_or_default();
        let default_mode = config.retrieval.mode.parse::<SearchMode>()?;

        index
            .ensure_collection(&collection, provider.dims(), metric)
            .await?;

        let metrics = Arc::new(MetricRecorder::new());
        let progress = ProgressMode::parse(&config.ingest.progress).unwrap_or_default();
        let pipeline = IngestionPipeline::new(
            chunker,
            Arc::clone(&provider),
            Arc::clone(&index),
            &collection,
            PipelineOptions {
                batch_size: config.embedding.batch_size,
                max_concurrent_batches: config.embedding.max_concurrent,
                max_concurrent_files: config.ingest.max_concurrent_files,
                cancel: None,
            },
        )
        .with_progress(progress.reporter())
        .with_metrics(Arc::clone(&metrics));

        let retriever = HybridRetriever::new(
            Arc::clone(&provider),
            Arc::clone(&index),
            collection.clone(),
            RetrievalParams {
                initial_k: config.retrieval.initial_k,
                rrf_k: config.retrieval.rrf_k,
                bm25: Bm25Params {
                    k1: config.retrieval.bm25_k1,
                    b: config.retrieval.bm25_b,
                },
            },
        );

        tracing::info!(
            collection = %collection,
            model = provider.model_name(),
            dims = provider.dims(),
            "radiate initialized"
        );

        Ok(Self {
            config,
            collection,
            metric,
            default_mode,
            provider,
            index,
            completion,
            pipeline,
            retriever,
            metrics,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn provider(&self) -> &Arc<EmbeddingProvider> {
        &self.provider
    }

    pub fn pipeline(&self) -> &IngestionPipeline {
        &self.pipeline
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn metrics(&self) -> &MetricRecorder {
        &self.metrics
    }

    /// Ingest a file or, for a directory, every matching file in it with
    /// bounded concurrency.
    pub async fn ingest(
        &self,
        path: impl AsRef<Path>,
        options: &IngestOptions,
    ) -> Result<IngestReport> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(RadiateError::NotFound(path.to_path_buf()));
        }

        if path.is_dir() {
            let summary = self
                .metrics
                .time("ingest_directory", self.pipeline.ingest_directory_concurrent(path, options))
                .await?;
            Ok(IngestReport::Directory(summary))
        } else {
            let outcome = self
                .metrics
                .time("ingest_file", self.pipeline.ingest_file(path, &options.metadata))
                .await;
            Ok(IngestReport::File(outcome))
        }
    }

    /// Search the collection. `top_k` defaults to `retrieval.top_k`, `mode`
    /// to `retrieval.mode`.
    pub async fn search(
        &self,
        query: &str,
        top_k: Option<usize>,
        mode: Option<SearchMode>,
    ) -> Result<Vec<SearchHit>> {
        let top_k = top_k.unwrap_or(self.config.retrieval.top_k);
        let mode = mode.unwrap_or(self.default_mode);

        let started = Instant::now();
        let hits = self.retriever.search(query, top_k, mode).await?;
        let reranked = match mode {
            SearchMode::Dense => None,
            SearchMode::Sparse | SearchMode::Hybrid => Some(self.retriever.params().initial_k),
        };
        self.metrics
            .log_search_stats(query, started.elapsed(), hits.len(), reranked);
        Ok(hits)
    }

    /// Search and render the hits as a context block.
    pub async fn query(
        &self,
        question: &str,
        top_k: Option<usize>,
        mode: Option<SearchMode>,
    ) -> Result<String> {
        let hits = self.search(question, top_k, mode).await?;
        Ok(format_context(&hits))
    }

    /// Retrieve context for `question` and ask the configured chat model.
    ///
    /// # Errors
    ///
    /// [`RadiateError::Config`] when no `[llm]` section was configured.
    pub async fn answer(
        &self,
        question: &str,
        top_k: Option<usize>,
        mode: Option<SearchMode>,
    ) -> Result<Answer> {
        let completion = self.completion.as_ref().ok_or_else(|| {
            RadiateError::Config("no LLM configured; add an [llm] section".to_string())
        })?;

        let hits = self.search(question, top_k, mode).await?;
        let prompt = build_prompt(question, &hits);

        let started = Instant::now();
        let answer = completion.generate_answer(&prompt).await?;
        let answer_tokens = answer
            .token_usage
            .map(|u| u.completion_tokens)
            .unwrap_or_else(|| answer.text.split_whitespace().count() as u64);
        self.metrics
            .log_llm_stats(&prompt, started.elapsed(), answer_tokens);
        Ok(answer)
    }

    /// Embedding usage counters.
    pub fn stats(&self) -> UsageStats {
        self.provider.stats()
    }

    pub async fn collection_info(&self) -> Result<Option<CollectionInfo>> {
        self.index.collection_info(&self.collection).await
    }

    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.index.list_collections().await
    }

    /// Recreate the collection after [`delete_collection`](Self::delete_collection).
    pub async fn ensure_collection(&self) -> Result<()> {
        self.index
            .ensure_collection(&self.collection, self.provider.dims(), self.metric)
            .await
    }

    /// Delete the collection and every point in it. Requires
    /// `confirm = true`.
    pub async fn delete_collection(&self, confirm: bool) -> Result<bool> {
        if !confirm {
            return Err(RadiateError::ConfirmationRequired {
                operation: format!("deleting collection '{}'", self.collection),
            });
        }
        let deleted = self.index.delete_collection(&self.collection).await?;
        tracing::warn!(collection = %self.collection, deleted, "collection deleted");
        Ok(deleted)
    }

    /// Up to `limit` stored chunks, in index order. Scores are `0.0`.
    pub async fn get_all_chunks(&self, limit: usize) -> Result<Vec<SearchHit>> {
        let points = self.index.scroll(&self.collection, limit).await?;
        Ok(points.into_iter().map(SearchHit::from_point).collect())
    }
}
