//! In-memory [`VectorIndex`] for tests and offline use.
//!
//! Collections live in a `HashMap` behind `std::sync::RwLock`. Search is
//! brute force over every stored vector. Nothing is persisted.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{Distance, VectorIndex};
use crate::embedding::cosine_similarity;
use crate::error::{RadiateError, Result};
use crate::models::{CollectionInfo, Payload, Point, ScoredPoint};

struct StoredCollection {
    dimension: usize,
    metric: Distance,
    /// Keyed by point id so scrolls are ordered.
    points: BTreeMap<u64, (Vec<f32>, Payload)>,
}

#[derive(Default)]
pub struct InMemoryIndex {
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

fn score(metric: Distance, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        Distance::Cosine => cosine_similarity(a, b),
        Distance::Dot => a.iter().zip(b).map(|(x, y)| x * y).sum(),
        Distance::Euclid => a
            .iter()
            .zip(b)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f32>()
            .sqrt(),
    }
}

fn missing(name: &str) -> RadiateError {
    RadiateError::Index(format!("collection '{}' does not exist", name))
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn create_collection(
        &self,
        name: &str,
        dimension: usize,
        metric: Distance,
    ) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        collections.insert(
            name.to_string(),
            StoredCollection {
                dimension,
                metric,
                points: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<Point>) -> Result<()> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        let stored = collections
            .get_mut(collection)
            .ok_or_else(|| missing(collection))?;

        if let Some(bad) = points.iter().find(|p| p.vector.len() != stored.dimension) {
            return Err(RadiateError::Index(format!(
                "point {} has dimension {}, collection '{}' expects {}",
                bad.id,
                bad.vector.len(),
                collection,
                stored.dimension
            )));
        }

        for point in points {
            stored.points.insert(point.id, (point.vector, point.payload));
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let stored = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut scored: Vec<ScoredPoint> = stored
            .points
            .iter()
            .map(|(&id, (v, payload))| ScoredPoint {
                id,
                score: score(stored.metric, vector, v),
                payload: payload.clone(),
            })
            .collect();

        // Euclid is a distance: smaller is better.
        match stored.metric {
            Distance::Euclid => scored.sort_by(|a, b| a.score.total_cmp(&b.score)),
            Distance::Cosine | Distance::Dot => scored.sort_by(|a, b| b.score.total_cmp(&a.score)),
        }
        scored.truncate(limit);
        Ok(scored)
    }

    async fn collection_info(&self, name: &str) -> Result<Option<CollectionInfo>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        Ok(collections.get(name).map(|c| CollectionInfo {
            name: name.to_string(),
            dimension: c.dimension,
            metric: c.metric,
            point_count: c.points.len() as u64,
            status: "green".to_string(),
        }))
    }

    async fn delete_collection(&self, name: &str) -> Result<bool> {
        let mut collections = self.collections.write().unwrap_or_else(|e| e.into_inner());
        Ok(collections.remove(name).is_some())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn scroll(&self, collection: &str, limit: usize) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().unwrap_or_else(|e| e.into_inner());
        let stored = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(stored
            .points
            .iter()
            .take(limit)
            .map(|(&id, (_, payload))| ScoredPoint {
                id,
                score: 0.0,
                payload: payload.clone(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn point(id: u64, vector: Vec<f32>, text: &str) -> Point {
        Point {
            id,
            vector,
            payload: json!({"text": text}).as_object().cloned().unwrap(),
        }
    }

    #[tokio::test]
    async fn search_orders_by_cosine_similarity() {
        let index = InMemoryIndex::new();
        index.create_collection("docs", 2, Distance::Cosine).await.unwrap();
        index
            .upsert(
                "docs",
                vec![
                    point(1, vec![1.0, 0.0], "east"),
                    point(2, vec![0.0, 1.0], "north"),
                    point(3, vec![0.7, 0.7], "north-east"),
                ],
            )
            .await
            .unwrap();

        let hits = index.search("docs", &[1.0, 0.1], 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 1);
        assert_eq!(hits[1].id, 3);
        assert!(hits[0].score >= hits[1].score);
    }

    #[tokio::test]
    async fn upsert_replaces_and_checks_dimension() {
        let index = InMemoryIndex::new();
        index.create_collection("docs", 2, Distance::Cosine).await.unwrap();
        index.upsert("docs", vec![point(1, vec![1.0, 0.0], "a")]).await.unwrap();
        index.upsert("docs", vec![point(1, vec![0.0, 1.0], "b")]).await.unwrap();

        let info = index.collection_info("docs").await.unwrap().unwrap();
        assert_eq!(info.point_count, 1);
        let all = index.scroll("docs", 10).await.unwrap();
        assert_eq!(all[0].payload["text"], "b");

        let err = index
            .upsert("docs", vec![point(2, vec![1.0, 0.0, 0.0], "c")])
            .await
            .unwrap_err();
        assert!(matches!(err, RadiateError::Index(_)));
    }

    #[tokio::test]
    async fn ensure_collection_detects_dimension_mismatch() {
        let index = InMemoryIndex::new();
        index.ensure_collection("docs", 384, Distance::Cosine).await.unwrap();
        index.ensure_collection("docs", 384, Distance::Cosine).await.unwrap();
        let err = index
            .ensure_collection("docs", 1536, Distance::Cosine)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RadiateError::CollectionDimensionMismatch {
                existing: 384,
                expected: 1536,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn list_and_delete_collections() {
        let index = InMemoryIndex::new();
        index.create_collection("b", 2, Distance::Dot).await.unwrap();
        index.create_collection("a", 2, Distance::Cosine).await.unwrap();
        assert_eq!(index.list_collections().await.unwrap(), vec!["a", "b"]);
        assert!(index.delete_collection("a").await.unwrap());
        assert!(!index.delete_collection("a").await.unwrap());
        assert!(index.collection_info("a").await.unwrap().is_none());
        assert!(index.search("a", &[1.0, 0.0], 1).await.is_err());
    }

    #[tokio::test]
    async fn euclid_prefers_smaller_distance() {
        let index = InMemoryIndex::new();
        index.create_collection("e", 1, Distance::Euclid).await.unwrap();
        index
            .upsert("e", vec![point(1, vec![10.0], "far"), point(2, vec![1.0], "near")])
            .await
            .unwrap();
        let hits = index.search("e", &[0.0], 1).await.unwrap();
        assert_eq!(hits[0].id, 2);
    }
}
