//! Shared test doubles for integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use radiate::config::Config;
use radiate::embedding::{CostModel, EmbeddingBackend};
use radiate::llm::{Answer, Completion};
use radiate::models::Embedding;
use radiate::progress::{IngestProgressEvent, IngestProgressReporter};
use radiate::Result;

pub const DIMS: usize = 8;

/// Deterministic bag-of-words embedding: each lowercase word is hashed
/// into one of [`DIMS`] buckets, and the vector is L2-normalized.
pub fn hash_embedding(text: &str) -> Embedding {
    let mut v = vec![0.0f32; DIMS];
    v[0] = 0.01;
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut h: u64 = 0xcbf29ce484222325;
        for b in word.to_lowercase().bytes() {
            h ^= u64::from(b);
            h = h.wrapping_mul(0x100000001b3);
        }
        v[(h % DIMS as u64) as usize] += 1.0;
    }
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    v.iter().map(|x| x / norm).collect()
}

/// Hashing backend that counts backend calls.
#[derive(Default)]
pub struct HashBackend {
    pub calls: AtomicUsize,
}

impl HashBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingBackend for HashBackend {
    fn model_name(&self) -> &str {
        "hash-test"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    fn cost_model(&self) -> CostModel {
        CostModel::PerThousandTokens(0.02)
    }

    async fn compute_embedding(&self, text: &str) -> Result<Embedding> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(hash_embedding(text))
    }
}

/// Backend that sleeps per call and remembers the peak number of calls
/// in flight at once.
pub struct SlowBackend {
    delay: Duration,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl SlowBackend {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn peak(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingBackend for SlowBackend {
    fn model_name(&self) -> &str {
        "slow-test"
    }

    fn dims(&self) -> usize {
        DIMS
    }

    fn cost_model(&self) -> CostModel {
        CostModel::Free
    }

    async fn compute_embedding(&self, text: &str) -> Result<Embedding> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(hash_embedding(text))
    }
}

/// Completion that echoes how many chunks the prompt contained.
#[derive(Default)]
pub struct EchoCompletion {
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl Completion for EchoCompletion {
    fn model_name(&self) -> &str {
        "echo"
    }

    async fn generate_answer(&self, prompt: &str) -> Result<Answer> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let chunks = prompt.matches("Chunk ").count();
        Ok(Answer {
            text: format!("saw {} chunks", chunks),
            latency_ms: 1,
            token_usage: None,
            prompt: prompt.to_string(),
        })
    }
}

/// Records every progress event.
#[derive(Default)]
pub struct RecordingProgress {
    pub events: Mutex<Vec<IngestProgressEvent>>,
}

impl IngestProgressReporter for RecordingProgress {
    fn report(&self, event: IngestProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// In-memory config with small fixed-size chunks.
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.vector_index.provider = "memory".to_string();
    config.vector_index.collection = "test_docs".to_string();
    config.chunking.strategy = "fixed".to_string();
    config.chunking.chunk_size = 512;
    config.chunking.overlap = 50;
    config
}

pub fn write(dir: &Path, rel: &str, contents: impl AsRef<[u8]>) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, contents).unwrap();
}
