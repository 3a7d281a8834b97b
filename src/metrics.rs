//! In-process metric events for ingestion, search and answer generation.
//!
//! A [`MetricRecorder`] belongs to one [`Radiate`](crate::Radiate)
//! instance. Every recorded event is kept in memory and also emitted as a
//! `tracing` event on the `radiate::metrics` target, so it reaches whatever
//! subscriber the application installed.

use std::future::Future;
use std::path::Path;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricEvent {
    pub metric: String,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    pub extra: Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct MetricRecorder {
    events: Mutex<Vec<MetricEvent>>,
}

fn round4(secs: f64) -> f64 {
    (secs * 10_000.0).round() / 10_000.0
}

fn seconds(d: Duration) -> f64 {
    round4(d.as_secs_f64())
}

impl MetricRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(
        &self,
        name: &str,
        value: impl Into<Value>,
        unit: Option<&str>,
        extra: Map<String, Value>,
    ) {
        let event = MetricEvent {
            metric: name.to_string(),
            value: value.into(),
            unit: unit.map(str::to_string),
            extra,
            timestamp: Utc::now(),
        };
        let extra = Value::Object(event.extra.clone());
        tracing::info!(
            target: "radiate::metrics",
            metric = %event.metric,
            value = %event.value,
            unit = event.unit.as_deref().unwrap_or(""),
            extra = %extra,
            "metric"
        );
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }

    /// Await `fut` and record `{name}_duration` in seconds.
    pub async fn time<F: Future>(&self, name: &str, fut: F) -> F::Output {
        let started = Instant::now();
        let output = fut.await;
        self.record(
            &format!("{}_duration", name),
            seconds(started.elapsed()),
            Some("sec"),
            Map::new(),
        );
        output
    }

    pub fn log_ingest_stats(
        &self,
        path: &Path,
        total_chunks: usize,
        avg_chunk_tokens: f64,
        errors: usize,
    ) {
        self.record(
            "ingest_file",
            path.display().to_string(),
            None,
            object(json!({
                "total_chunks": total_chunks,
                "avg_chunk_tokens": avg_chunk_tokens,
                "errors": errors,
            })),
        );
    }

    pub fn log_search_stats(
        &self,
        query: &str,
        latency: Duration,
        retrieved: usize,
        reranked: Option<usize>,
    ) {
        let mut extra = object(json!({
            "retrieved_chunks": retrieved,
            "latency_sec": seconds(latency),
        }));
        if let Some(reranked) = reranked {
            extra.insert("reranked_chunks".to_string(), json!(reranked));
        }
        self.record("search_query", query, None, extra);
    }

    /// `prompt_tokens` is a whitespace word count of the prompt.
    pub fn log_llm_stats(&self, prompt: &str, latency: Duration, answer_tokens: u64) {
        self.record(
            "llm_call",
            Value::Null,
            None,
            object(json!({
                "prompt_tokens": prompt.split_whitespace().count(),
                "latency_sec": seconds(latency),
                "answer_tokens": answer_tokens,
            })),
        );
    }

    /// Snapshot of every event recorded so far, oldest first.
    pub fn events(&self) -> Vec<MetricEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Write all events as a pretty-printed JSON array.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        let events = self.events();
        let json = serde_json::to_string_pretty(&events)?;
        std::fs::write(path, json)?;
        tracing::info!(path = %path.display(), events = events.len(), "saved metrics");
        Ok(())
    }
}

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_with_extra_fields_is_logged_and_kept() {
        let subscriber = tracing_subscriber::fmt().with_test_writer().finish();
        tracing::subscriber::with_default(subscriber, || {
            let recorder = MetricRecorder::new();
            recorder.record("files_scanned", 3, Some("count"), object(json!({"dir": "docs"})));
            let events = recorder.events();
            assert_eq!(events[0].value, 3);
            assert_eq!(events[0].extra["dir"], "docs");
        });
    }

    #[test]
    fn records_search_stats() {
        let recorder = MetricRecorder::new();
        recorder.log_search_stats("what is rust", Duration::from_millis(12), 5, Some(100));
        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].metric, "search_query");
        assert_eq!(events[0].value, "what is rust");
        assert_eq!(events[0].extra["retrieved_chunks"], 5);
        assert_eq!(events[0].extra["reranked_chunks"], 100);
        assert_eq!(events[0].extra["latency_sec"], 0.012);
    }

    #[test]
    fn llm_stats_count_prompt_words() {
        let recorder = MetricRecorder::new();
        recorder.log_llm_stats("one two three", Duration::from_secs(1), 7);
        let event = &recorder.events()[0];
        assert_eq!(event.value, Value::Null);
        assert_eq!(event.extra["prompt_tokens"], 3);
        assert_eq!(event.extra["answer_tokens"], 7);
    }

    #[tokio::test]
    async fn time_records_duration() {
        let recorder = MetricRecorder::new();
        let out = recorder.time("embed", async { 41 + 1 }).await;
        assert_eq!(out, 42);
        let event = &recorder.events()[0];
        assert_eq!(event.metric, "embed_duration");
        assert_eq!(event.unit.as_deref(), Some("sec"));
    }

    #[test]
    fn saves_json_array() {
        let recorder = MetricRecorder::new();
        recorder.log_ingest_stats(Path::new("a.txt"), 3, 120.5, 0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("metrics.json");
        recorder.save_to_file(&path).unwrap();

        let saved: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let arr = saved.as_array().unwrap();
        assert_eq!(arr.len(), 1);
        assert_eq!(arr[0]["metric"], "ingest_file");
        assert_eq!(arr[0]["extra"]["total_chunks"], 3);
        assert!(arr[0]["timestamp"].is_string());
    }
}
