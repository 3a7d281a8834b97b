//! # Radiate
//!
//! Retrieval building blocks for RAG applications.
//!
//! Radiate splits documents into overlapping token chunks, embeds them
//! through a caching provider with usage accounting, stores them in a
//! vector index, and retrieves them with dense similarity, BM25 re-ranking,
//! or a reciprocal-rank-fused hybrid of the two.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌─────────┐   ┌───────────────────┐   ┌─────────────┐
//! │ extract  │──▶│ Chunker │──▶│ EmbeddingProvider │──▶│ VectorIndex │
//! │ txt/md/  │   │ fixed / │   │ cache + stats     │   │ Qdrant /    │
//! │ pdf      │   │ smart   │   └─────────┬─────────┘   │ in-memory   │
//! └──────────┘   └─────────┘             │             └──────┬──────┘
//!                                        ▼                    │
//!                               ┌─────────────────┐           │
//!                               │ HybridRetriever │◀──────────┘
//!                               │ dense+BM25+RRF  │
//!                               └────────┬────────┘
//!                                        ▼
//!                                 ┌────────────┐
//!                                 │ Completion │
//!                                 └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`error`] | Error taxonomy and `Result` alias |
//! | [`config`] | TOML configuration parsing |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`models`] | Core data types |
//! | [`extract`] | Text extraction for `.txt`, `.md`, `.pdf` |
//! | [`chunk`] | Token-window and structure-aware chunking |
//! | [`embedding`] | Embedding backends, cache, and provider |
//! | [`bm25`] | BM25 lexical scoring |
//! | [`index`] | Vector index trait, Qdrant and in-memory indexes |
//! | [`retrieval`] | Dense, sparse, and hybrid search |
//! | [`llm`] | Answer generation |
//! | [`metrics`] | Metric events |
//! | [`progress`] | Ingestion progress reporting |
//! | [`ingest`] | Ingestion pipeline |

pub mod bm25;
pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod index;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod progress;
mod radiate;
pub mod retrieval;

pub use error::{RadiateError, Result};
pub use ingest::{IngestOptions, IngestionPipeline, PipelineOptions};
pub use radiate::Radiate;
pub use retrieval::{HybridRetriever, SearchMode};
