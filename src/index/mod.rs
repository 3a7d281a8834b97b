//! Vector index abstraction.
//!
//! The [`VectorIndex`] trait covers the collection and point operations the
//! ingestion and retrieval pipeline needs, so the Qdrant client and the
//! in-memory index are interchangeable.
//!
//! Implementations must be `Send + Sync` to be shared across ingestion
//! tasks.
//!
//! # Operations
//!
//! | Method | Purpose |
//! |--------|---------|
//! | [`create_collection`](VectorIndex::create_collection) | Create a collection with a fixed dimension and metric |
//! | [`ensure_collection`](VectorIndex::ensure_collection) | Create if absent, verify the dimension if present |
//! | [`upsert`](VectorIndex::upsert) | Insert or replace points |
//! | [`search`](VectorIndex::search) | Nearest neighbours of a query vector |
//! | [`collection_info`](VectorIndex::collection_info) | Dimension, metric and point count |
//! | [`delete_collection`](VectorIndex::delete_collection) | Drop a collection and its points |
//! | [`list_collections`](VectorIndex::list_collections) | Collection names |
//! | [`scroll`](VectorIndex::scroll) | Stored points without a query |

pub mod memory;
pub mod qdrant;

use async_trait::async_trait;

use crate::error::{RadiateError, Result};
use crate::models::{CollectionInfo, Point, ScoredPoint};

pub use crate::models::Distance;
pub use memory::InMemoryIndex;
pub use qdrant::QdrantIndex;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn create_collection(&self, name: &str, dimension: usize, metric: Distance)
        -> Result<()>;

    /// Insert points, replacing any with the same id. Every vector must
    /// match the collection's dimension.
    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()>;

    /// Up to `limit` points ordered best match first.
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    /// `None` when the collection does not exist.
    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>>;

    /// Returns `false` when there was nothing to delete.
    async fn delete_collection(&self, name: &str) -> Result<bool>;

    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Up to `limit` stored points in index order. Scores are `0.0`.
    async fn scroll(&self, collection: &str, limit: usize) -> Result<Vec<ScoredPoint>>;

    /// Create the collection if it is missing; otherwise require that its
    /// dimension equals `dimension`.
    async fn ensure_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: Distance,
    ) -> Result<()> {
        match self.collection_info(name).await? {
            Some(info) if info.dimension != dimension => {
                Err(RadiateError::CollectionDimensionMismatch {
                    collection: name.to_string(),
                    existing: info.dimension,
                    expected: dimension,
                })
            }
            Some(_) => Ok(()),
            None => {
                tracing::info!(
                    collection = name,
                    dimension,
                    metric = metric.as_str(),
                    "creating collection"
                );
                self.create_collection(name, dimension, metric).await
            }
        }
    }
}
