//! Dense, sparse and hybrid retrieval.
//!
//! All three modes start from the vector index:
//!
//! - **dense**: nearest neighbours of the embedded query.
//! - **sparse**: the `initial_k` dense candidates re-ranked by BM25 over
//!   their own texts. Documents that never reach the dense candidate set
//!   cannot be found lexically.
//! - **hybrid**: the dense and sparse candidate lists fused with
//!   reciprocal-rank fusion ([`rrf_fuse`]).
//!
//! Errors from the embedding provider or the index are returned unchanged.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::bm25::{Bm25Model, Bm25Params};
use crate::embedding::EmbeddingProvider;
use crate::error::{RadiateError, Result};
use crate::index::VectorIndex;
use crate::models::SearchHit;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Dense,
    Sparse,
    #[default]
    Hybrid,
}

impl SearchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchMode::Dense => "dense",
            SearchMode::Sparse => "sparse",
            SearchMode::Hybrid => "hybrid",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = RadiateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dense" => Ok(SearchMode::Dense),
            "sparse" => Ok(SearchMode::Sparse),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(RadiateError::InvalidMode {
                mode: other.to_string(),
                valid: "dense, sparse, hybrid",
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    /// Dense candidates fetched for sparse and hybrid ranking.
    pub initial_k: usize,
    /// RRF smoothing constant.
    pub rrf_k: f64,
    pub bm25: Bm25Params,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            initial_k: 100,
            rrf_k: 60.0,
            bm25: Bm25Params::default(),
        }
    }
}

pub struct HybridRetriever {
    provider: Arc<EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    collection: String,
    params: RetrievalParams,
}

impl HybridRetriever {
    pub fn new(
        provider: Arc<EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        collection: impl Into<String>,
        params: RetrievalParams,
    ) -> Self {
        Self {
            provider,
            index,
            collection: collection.into(),
            params,
        }
    }

    pub fn params(&self) -> &RetrievalParams {
        &self.params
    }

    /// Return up to `top_k` hits for `query`, best first.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        mode: SearchMode,
    ) -> Result<Vec<SearchHit>> {
        let started = Instant::now();
        let hits = match mode {
            SearchMode::Dense => self.dense(query, top_k).await?,
            SearchMode::Sparse => {
                let candidates = self.dense(query, self.params.initial_k).await?;
                let mut ranked = self.rerank_bm25(query, candidates);
                ranked.truncate(top_k);
                ranked
            }
            SearchMode::Hybrid => {
                let dense = self.dense(query, self.params.initial_k).await?;
                let sparse = self.rerank_bm25(query, dense.clone());
                let mut fused = rrf_fuse(&[dense, sparse], self.params.rrf_k);
                fused.truncate(top_k);
                fused
            }
        };

        tracing::info!(
            mode = mode.as_str(),
            top_k,
            results = hits.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        Ok(hits)
    }

    async fn dense(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let vector = self.provider.embed(query).await?;
        let points = self.index.search(&self.collection, &vector, limit).await?;
        Ok(points.into_iter().map(SearchHit::from_point).collect())
    }

    /// Replace each candidate's score with its BM25 score over the
    /// candidate texts and sort descending. Ties keep dense order.
    fn rerank_bm25(&self, query: &str, mut candidates: Vec<SearchHit>) -> Vec<SearchHit> {
        let texts: Vec<&str> = candidates.iter().map(|h| h.text.as_str()).collect();
        let model = Bm25Model::fit(self.params.bm25, &texts);
        for (hit, score) in candidates.iter_mut().zip(model.score(query)) {
            hit.score = score;
        }
        candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
        candidates
    }
}

/// Reciprocal-rank fusion.
///
/// Each hit gains `1 / (rrf_k + rank + 1)` for every list it appears in,
/// with `rank` counted from 0. A fused hit keeps the fields of the first
/// list that contained its id. Equal fused scores keep first-encountered
/// order.
pub fn rrf_fuse(lists: &[Vec<SearchHit>], rrf_k: f64) -> Vec<SearchHit> {
    let mut fused: Vec<SearchHit> = Vec::new();
    let mut positions: HashMap<u64, usize> = HashMap::new();

    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            let contribution = 1.0 / (rrf_k + rank as f64 + 1.0);
            let pos = *positions.entry(hit.id).or_insert_with(|| {
                let mut first = hit.clone();
                first.rrf_score = Some(0.0);
                fused.push(first);
                fused.len() - 1
            });
            if let Some(score) = fused[pos].rrf_score.as_mut() {
                *score += contribution;
            }
        }
    }

    fused.sort_by(|a, b| {
        let a = a.rrf_score.unwrap_or(0.0);
        let b = b.rrf_score.unwrap_or(0.0);
        b.total_cmp(&a)
    });
    fused
}

/// Render hits as a context block for prompting or display.
pub fn format_context(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No relevant information found.".to_string();
    }
    hits.iter()
        .map(|hit| {
            format!(
                "[Source: {}, Chunk {}, Score: {:.2}]\n{}",
                hit.source, hit.chunk_index, hit.score, hit.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
