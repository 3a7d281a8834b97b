//! Core data models used throughout Radiate.
//!
//! These types represent the chunks, stored points, search hits, and
//! ingestion outcomes that flow through the ingestion and retrieval pipeline.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// An embedding vector. Its length is the producing model's dimension.
pub type Embedding = Vec<f32>;

/// Ordered JSON map used for chunk metadata and point payloads.
pub type Payload = Map<String, Value>;

/// Payload keys written by the ingestion pipeline. Caller metadata never
/// overrides these.
pub const PAYLOAD_TEXT: &str = "text";
pub const PAYLOAD_SOURCE: &str = "source";
pub const PAYLOAD_CHUNK_INDEX: &str = "chunk_index";
pub const PAYLOAD_TOTAL_CHUNKS: &str = "total_chunks";
pub const PAYLOAD_SECTION: &str = "section";

/// A bounded slice of a source document, the unit of embedding and storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Chunk {
    pub text: String,
    /// Identifier of the source document (the file path for ingested files).
    pub source_id: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
    pub metadata: Payload,
}

/// A point written to a [`VectorIndex`](crate::index::VectorIndex).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: u64,
    pub vector: Embedding,
    pub payload: Payload,
}

/// A point returned from a similarity search or a scroll.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: u64,
    pub score: f32,
    #[serde(default)]
    pub payload: Payload,
}

/// A retrieval result.
///
/// Dense hits carry the similarity score, sparse hits the BM25 score.
/// Hybrid hits additionally carry the reciprocal-rank-fusion score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: u64,
    pub text: String,
    pub score: f64,
    pub source: String,
    pub chunk_index: usize,
    /// Payload entries other than `text`, `source` and `chunk_index`.
    pub metadata: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rrf_score: Option<f64>,
}

impl SearchHit {
    /// Build a hit from a stored point, splitting the well-known payload
    /// keys out of the metadata.
    pub fn from_point(point: ScoredPoint) -> Self {
        let mut payload = point.payload;
        let text = match payload.remove(PAYLOAD_TEXT) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let source = match payload.remove(PAYLOAD_SOURCE) {
            Some(Value::String(s)) => s,
            _ => String::new(),
        };
        let chunk_index = payload
            .remove(PAYLOAD_CHUNK_INDEX)
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as usize;

        Self {
            id: point.id,
            text,
            score: f64::from(point.score),
            source,
            chunk_index,
            metadata: payload,
            rrf_score: None,
        }
    }
}

/// Vector similarity metric configured on a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Distance {
    #[default]
    Cosine,
    Dot,
    Euclid,
}

impl Distance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Distance::Cosine => "Cosine",
            Distance::Dot => "Dot",
            Distance::Euclid => "Euclid",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "cosine" => Some(Distance::Cosine),
            "dot" => Some(Distance::Dot),
            "euclid" | "euclidean" => Some(Distance::Euclid),
            _ => None,
        }
    }
}

/// Summary of a collection's configuration and contents.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub dimension: usize,
    pub metric: Distance,
    pub point_count: u64,
    pub status: String,
}

/// Result status for a single ingested file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    Success,
    Skipped,
    Failed,
}

/// Per-file ingestion result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestionOutcome {
    pub path: PathBuf,
    pub chunks_ingested: usize,
    pub status: IngestStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl IngestionOutcome {
    pub fn success(path: PathBuf, chunks_ingested: usize) -> Self {
        Self {
            path,
            chunks_ingested,
            status: IngestStatus::Success,
            error: None,
            reason: None,
        }
    }

    pub fn skipped(path: PathBuf, reason: impl Into<String>) -> Self {
        Self {
            path,
            chunks_ingested: 0,
            status: IngestStatus::Skipped,
            error: None,
            reason: Some(reason.into()),
        }
    }

    pub fn failed(path: PathBuf, error: impl Into<String>) -> Self {
        Self {
            path,
            chunks_ingested: 0,
            status: IngestStatus::Failed,
            error: Some(error.into()),
            reason: None,
        }
    }
}

/// Aggregate result of ingesting a directory.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DirectorySummary {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_chunks: usize,
    /// One entry per discovered file, sorted by path.
    pub details: Vec<IngestionOutcome>,
}

impl DirectorySummary {
    /// Aggregate outcomes collected in any order.
    pub fn from_outcomes(mut details: Vec<IngestionOutcome>) -> Self {
        details.sort_by(|a, b| a.path.cmp(&b.path));

        let mut summary = Self {
            total_files: details.len(),
            successful: 0,
            failed: 0,
            skipped: 0,
            total_chunks: 0,
            details: Vec::new(),
        };
        for outcome in &details {
            match outcome.status {
                IngestStatus::Success => {
                    summary.successful += 1;
                    summary.total_chunks += outcome.chunks_ingested;
                }
                IngestStatus::Skipped => summary.skipped += 1,
                IngestStatus::Failed => summary.failed += 1,
            }
        }
        summary.details = details;
        summary
    }
}

/// What [`Radiate::ingest`](crate::Radiate::ingest) produced: a single
/// file outcome or a directory summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum IngestReport {
    File(IngestionOutcome),
    Directory(DirectorySummary),
}

impl IngestReport {
    pub fn total_chunks(&self) -> usize {
        match self {
            IngestReport::File(outcome) => outcome.chunks_ingested,
            IngestReport::Directory(summary) => summary.total_chunks,
        }
    }
}
