//! Ingestion pipeline orchestration.
//!
//! Coordinates the write path for files and directories:
//! extraction → chunking → embedding → upsert into the vector index.
//!
//! Per-file failures never abort a directory run. Each file ends up as an
//! [`IngestionOutcome`] (`success`, `skipped`, or `failed`) and a
//! [`DirectorySummary`] aggregates them. Only problems that prevent the run
//! from starting (missing directory, no matching files) are returned as
//! errors.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunk::{Chunker, SourceFormat};
use crate::embedding::{BatchOptions, EmbeddingProvider};
use crate::error::{RadiateError, Result};
use crate::extract;
use crate::index::VectorIndex;
use crate::metrics::MetricRecorder;
use crate::models::{
    DirectorySummary, IngestionOutcome, Payload, Point, PAYLOAD_CHUNK_INDEX, PAYLOAD_SOURCE,
    PAYLOAD_TEXT, PAYLOAD_TOTAL_CHUNKS,
};
use crate::progress::{IngestProgressEvent, IngestProgressReporter, NoProgress};

/// Patterns used when none is given, or when the pattern is `*`.
pub const DEFAULT_PATTERNS: &[&str] = &["*.txt", "*.md", "*.pdf"];

/// Per-call ingestion options.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Copied into every point's payload. Reserved keys (`text`, `source`,
    /// `chunk_index`, `total_chunks`, `section`) are overwritten.
    pub metadata: Payload,
    /// Descend into subdirectories.
    pub recursive: bool,
    /// Glob matched against paths relative to the directory.
    pub pattern: Option<String>,
}

/// Concurrency limits for a pipeline.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub batch_size: usize,
    pub max_concurrent_batches: usize,
    pub max_concurrent_files: usize,
    /// Cancels in-flight embedding work. Files hit by cancellation are
    /// reported as failed.
    pub cancel: Option<CancellationToken>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            batch_size: 32,
            max_concurrent_batches: 5,
            max_concurrent_files: 3,
            cancel: None,
        }
    }
}

/// Writes documents into one collection. Cheap to clone.
#[derive(Clone)]
pub struct IngestionPipeline {
    chunker: Chunker,
    provider: Arc<EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    collection: Arc<str>,
    options: PipelineOptions,
    progress: Arc<dyn IngestProgressReporter>,
    metrics: Option<Arc<MetricRecorder>>,
}

impl IngestionPipeline {
    pub fn new(
        chunker: Chunker,
        provider: Arc<EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        collection: &str,
        options: PipelineOptions,
    ) -> Self {
        Self {
            chunker,
            provider,
            index,
            collection: Arc::from(collection),
            options,
            progress: Arc::new(NoProgress),
            metrics: None,
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn IngestProgressReporter>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.options.cancel = Some(token);
        self
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Ingest one file. Never returns an error: failures are reported in
    /// the outcome.
    pub async fn ingest_file(&self, path: &Path, metadata: &Payload) -> IngestionOutcome {
        match self.try_ingest_file(path, metadata).await {
            Ok(0) => {
                tracing::debug!(path = %path.display(), "no content to ingest");
                IngestionOutcome::skipped(path.to_path_buf(), "no content to ingest")
            }
            Ok(chunks) => {
                tracing::info!(path = %path.display(), chunks, "ingested file");
                IngestionOutcome::success(path.to_path_buf(), chunks)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "failed to ingest file");
                if let Some(metrics) = &self.metrics {
                    metrics.log_ingest_stats(path, 0, 0.0, 1);
                }
                IngestionOutcome::failed(path.to_path_buf(), e.to_string())
            }
        }
    }

    async fn try_ingest_file(&self, path: &Path, metadata: &Payload) -> Result<usize> {
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extract::read_text(&owned))
            .await
            .map_err(|e| RadiateError::Extraction(format!("extraction task failed: {}", e)))??;

        let source = path.display().to_string();
        let chunks = self
            .chunker
            .chunk(&source, &text, SourceFormat::from_path(path), metadata)?;
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let batch = BatchOptions {
            batch_size: self.options.batch_size,
            max_concurrent: self.options.max_concurrent_batches,
            cancel: self.options.cancel.clone(),
        };
        let vectors = self.provider.embed_batch_concurrent(&texts, &batch).await?;

        let total_tokens: usize = texts
            .iter()
            .map(|t| self.chunker.codec().encode(t).len())
            .sum();

        let points: Vec<Point> = chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let mut payload = chunk.metadata;
                payload.insert(PAYLOAD_TEXT.to_string(), Value::String(chunk.text));
                payload.insert(PAYLOAD_SOURCE.to_string(), Value::String(chunk.source_id));
                payload.insert(PAYLOAD_CHUNK_INDEX.to_string(), Value::from(chunk.chunk_index));
                payload.insert(PAYLOAD_TOTAL_CHUNKS.to_string(), Value::from(chunk.total_chunks));
                Point {
                    id: point_id(),
                    vector,
                    payload,
                }
            })
            .collect();

        let count = points.len();
        self.index.upsert(&self.collection, points).await?;

        if let Some(metrics) = &self.metrics {
            metrics.log_ingest_stats(path, count, total_tokens as f64 / count as f64, 0);
        }
        Ok(count)
    }

    /// Ingest matching files one at a time.
    pub async fn ingest_directory(
        &self,
        dir: &Path,
        options: &IngestOptions,
    ) -> Result<DirectorySummary> {
        let files = self.discover(dir, options)?;
        let total = files.len() as u64;

        let mut outcomes = Vec::with_capacity(files.len());
        for (i, path) in files.iter().enumerate() {
            outcomes.push(self.ingest_file(path, &options.metadata).await);
            self.progress.report(IngestProgressEvent::Ingesting {
                n: i as u64 + 1,
                total,
            });
        }

        Ok(self.finish(dir, outcomes))
    }

    /// Ingest matching files with at most `max_concurrent_files` in flight.
    ///
    /// Each file runs in its own task, spawned once a semaphore permit is
    /// held. A task that panics is reported as a failed outcome for its
    /// file.
    pub async fn ingest_directory_concurrent(
        &self,
        dir: &Path,
        options: &IngestOptions,
    ) -> Result<DirectorySummary> {
        let files = self.discover(dir, options)?;
        let total = files.len() as u64;

        let semaphore = Arc::new(Semaphore::new(self.options.max_concurrent_files.max(1)));
        let metadata = Arc::new(options.metadata.clone());
        let done = Arc::new(AtomicU64::new(0));

        let mut tasks = Vec::with_capacity(files.len());
        for path in files {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| RadiateError::Backend(format!("Semaphore error: {}", e)))?;

            let pipeline = self.clone();
            let metadata = Arc::clone(&metadata);
            let done = Arc::clone(&done);
            let task_path = path.clone();

            let task = tokio::spawn(async move {
                let outcome = pipeline.ingest_file(&task_path, &metadata).await;
                drop(permit);

                let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                pipeline
                    .progress
                    .report(IngestProgressEvent::Ingesting { n, total });
                outcome
            });
            tasks.push((path, task));
        }

        let mut outcomes = Vec::with_capacity(tasks.len());
        for (path, task) in tasks {
            match task.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "ingestion task failed");
                    outcomes.push(IngestionOutcome::failed(
                        path,
                        format!("ingestion task failed: {}", e),
                    ));
                }
            }
        }

        Ok(self.finish(dir, outcomes))
    }

    fn discover(&self, dir: &Path, options: &IngestOptions) -> Result<Vec<PathBuf>> {
        self.progress.report(IngestProgressEvent::Discovering {
            dir: dir.to_path_buf(),
        });
        let files = discover_files(dir, options.pattern.as_deref(), options.recursive)?;
        tracing::info!(dir = %dir.display(), files = files.len(), "discovered files");
        Ok(files)
    }

    fn finish(&self, dir: &Path, outcomes: Vec<IngestionOutcome>) -> DirectorySummary {
        let summary = DirectorySummary::from_outcomes(outcomes);
        self.progress.report(IngestProgressEvent::Finished {
            successful: summary.successful as u64,
            failed: summary.failed as u64,
            skipped: summary.skipped as u64,
            total_chunks: summary.total_chunks as u64,
        });
        tracing::info!(
            dir = %dir.display(),
            total_files = summary.total_files,
            successful = summary.successful,
            failed = summary.failed,
            skipped = summary.skipped,
            total_chunks = summary.total_chunks,
            "directory ingestion complete"
        );
        summary
    }
}

/// Random positive 63-bit point id.
fn point_id() -> u64 {
    (Uuid::new_v4().as_u128() as u64) & (i64::MAX as u64)
}

fn build_globset(patterns: &[String], recursive: bool) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let pattern = if recursive && !pattern.starts_with("**/") {
            format!("**/{}", pattern)
        } else {
            pattern.clone()
        };
        let glob = GlobBuilder::new(&pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| {
                RadiateError::Config(format!("invalid glob pattern '{}': {}", pattern, e))
            })?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| RadiateError::Config(format!("invalid glob set: {}", e)))
}

/// List files under `dir` matching `pattern` (or the default patterns),
/// de-duplicated and sorted.
///
/// Patterns are matched against the path relative to `dir`. Without
/// `recursive` only direct children are considered; with it, each pattern
/// also matches at any depth.
pub fn discover_files(dir: &Path, pattern: Option<&str>, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(RadiateError::NotFound(dir.to_path_buf()));
    }

    let patterns: Vec<String> = match pattern {
        Some(p) if p != "*" => vec![p.to_string()],
        _ => DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect(),
    };
    let globs = build_globset(&patterns, recursive)?;

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files = BTreeSet::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(max_depth) {
        let entry = entry.map_err(|e| RadiateError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        if globs.is_match(relative) {
            files.insert(path.to_path_buf());
        }
    }

    if files.is_empty() {
        return Err(RadiateError::NoFilesMatched {
            dir: dir.to_path_buf(),
            patterns,
        });
    }
    Ok(files.into_iter().collect())
}
