//! Directory ingestion progress reporting.
//!
//! Reports what is being discovered, how many files are done, and the final
//! tally. Progress goes to **stderr** so stdout stays free for the caller.

use std::io::Write;
use std::path::PathBuf;

/// A single progress event for directory ingestion.
#[derive(Clone, Debug, PartialEq)]
pub enum IngestProgressEvent {
    /// Walking the directory. Total unknown.
    Discovering { dir: PathBuf },
    /// `n` files finished out of `total`.
    Ingesting { n: u64, total: u64 },
    Finished {
        successful: u64,
        failed: u64,
        skipped: u64,
        total_chunks: u64,
    },
}

/// Receives progress events from the ingestion pipeline. Called from
/// concurrently running file tasks.
pub trait IngestProgressReporter: Send + Sync {
    fn report(&self, event: IngestProgressEvent);
}

/// Human-friendly progress on stderr: "ingest  1,234 / 5,000 files".
pub struct StderrProgress;

impl IngestProgressReporter for StderrProgress {
    fn report(&self, event: IngestProgressEvent) {
        let line = match &event {
            IngestProgressEvent::Discovering { dir } => {
                format!("ingest {}  discovering...\n", dir.display())
            }
            IngestProgressEvent::Ingesting { n, total } => format!(
                "ingest  {} / {} files\n",
                format_number(*n),
                format_number(*total)
            ),
            IngestProgressEvent::Finished {
                successful,
                failed,
                skipped,
                total_chunks,
            } => format!(
                "ingest  done: {} ok, {} failed, {} skipped, {} chunks\n",
                format_number(*successful),
                format_number(*failed),
                format_number(*skipped),
                format_number(*total_chunks)
            ),
        };
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(line.as_bytes());
        let _ = stderr.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl IngestProgressReporter for JsonProgress {
    fn report(&self, event: IngestProgressEvent) {
        let obj = match &event {
            IngestProgressEvent::Discovering { dir } => serde_json::json!({
                "event": "progress",
                "phase": "discovering",
                "dir": dir.display().to_string()
            }),
            IngestProgressEvent::Ingesting { n, total } => serde_json::json!({
                "event": "progress",
                "phase": "ingesting",
                "n": n,
                "total": total
            }),
            IngestProgressEvent::Finished {
                successful,
                failed,
                skipped,
                total_chunks,
            } => serde_json::json!({
                "event": "finished",
                "successful": successful,
                "failed": failed,
                "skipped": skipped,
                "total_chunks": total_chunks
            }),
        };
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut stderr = std::io::stderr().lock();
            let _ = writeln!(stderr, "{}", line);
            let _ = stderr.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl IngestProgressReporter for NoProgress {
    fn report(&self, _event: IngestProgressEvent) {}
}

fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + (s.len() - 1) / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum ProgressMode {
    #[default]
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Parse the `ingest.progress` config value.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "none" | "off" => Some(ProgressMode::Off),
            "human" => Some(ProgressMode::Human),
            "json" => Some(ProgressMode::Json),
            _ => None,
        }
    }

    pub fn reporter(&self) -> std::sync::Arc<dyn IngestProgressReporter> {
        match self {
            ProgressMode::Off => std::sync::Arc::new(NoProgress),
            ProgressMode::Human => std::sync::Arc::new(StderrProgress),
            ProgressMode::Json => std::sync::Arc::new(JsonProgress),
        }
    }
}
