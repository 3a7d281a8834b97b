//! Token-window and structure-aware text chunking.
//!
//! Text is measured in tokens through a [`TokenCodec`]. The default codec,
//! [`Cl100kCodec`], uses the `cl100k_base` BPE shared by `gpt-3.5-turbo`
//! and the OpenAI embedding models, so chunk sizes line up with what the
//! remote backends count.
//!
//! Two strategies are available:
//!
//! - [`ChunkStrategy::Fixed`] slides a `chunk_size` window over the token
//!   stream, advancing by `chunk_size - overlap` tokens.
//! - [`ChunkStrategy::Smart`] splits markdown at ATX headers, splits every
//!   format at blank lines, and greedily packs paragraphs up to
//!   `chunk_size` tokens. Oversized paragraphs fall back to fixed windows.
//!
//! Both strategies are deterministic and never emit whitespace-only chunks.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{RadiateError, Result};
use crate::models::{Chunk, Payload, PAYLOAD_SECTION};

/// Measures and splits text in model tokens.
pub trait TokenCodec: Send + Sync {
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Byte length of each token of `text`, in encoding order. The lengths
    /// sum to `text.len()`. A multibyte character may be spread over several
    /// tokens.
    fn token_lens(&self, text: &str) -> Vec<usize>;
}

/// `cl100k_base` codec backed by `tiktoken-rs`.
pub struct Cl100kCodec {
    bpe: tiktoken_rs::CoreBPE,
}

impl Cl100kCodec {
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| RadiateError::Tokenizer(e.to_string()))?;
        Ok(Self { bpe })
    }
}

impl TokenCodec for Cl100kCodec {
    fn encode(&self, text: &str) -> Vec<u32> {
        self.bpe.encode_ordinary(text)
    }

    fn token_lens(&self, text: &str) -> Vec<usize> {
        // Ranks from `encode_ordinary` are always present in the decoder.
        self.bpe
            ._decode_native_and_split(self.bpe.encode_ordinary(text))
            .map(|bytes| bytes.len())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkStrategy {
    Fixed,
    #[default]
    Smart,
}

impl ChunkStrategy {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "fixed" | "token" => Some(ChunkStrategy::Fixed),
            "smart" => Some(ChunkStrategy::Smart),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    pub strategy: ChunkStrategy,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            overlap: 50,
            strategy: ChunkStrategy::default(),
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RadiateError::InvalidChunkConfig(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if self.overlap >= self.chunk_size {
            return Err(RadiateError::InvalidChunkConfig(format!(
                "overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }

    pub fn stride(&self) -> usize {
        self.chunk_size - self.overlap
    }
}

/// Source format, used by the smart strategy to pick split points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Markdown,
    PlainText,
    Pdf,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();
        match ext.as_str() {
            "md" | "markdown" => SourceFormat::Markdown,
            "pdf" => SourceFormat::Pdf,
            _ => SourceFormat::PlainText,
        }
    }
}

/// Split `text` into overlapping token windows.
///
/// Windows start at `0, stride, 2 * stride, ...` and stop once a window
/// reaches the end of the token stream, so the final window may be
/// shorter than `chunk_size`. Empty text yields no windows.
///
/// Every window is a substring of `text`. A window edge that falls inside
/// a multibyte character moves forward to the end of that character, so
/// consecutive windows never leave a gap.
pub fn fixed_windows(
    codec: &dyn TokenCodec,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>> {
    let config = ChunkConfig {
        chunk_size,
        overlap,
        strategy: ChunkStrategy::Fixed,
    };
    config.validate()?;

    Ok(window_text(codec, text, chunk_size, config.stride()))
}

fn window_text(
    codec: &dyn TokenCodec,
    text: &str,
    chunk_size: usize,
    stride: usize,
) -> Vec<String> {
    let mut offsets = vec![0usize];
    for len in codec.token_lens(text) {
        let next = offsets[offsets.len() - 1] + len;
        offsets.push(next);
    }
    let tokens = offsets.len() - 1;

    let mut windows = Vec::new();
    let mut start = 0;
    while start < tokens {
        let end = (start + chunk_size).min(tokens);
        let from = char_boundary_at_or_after(text, offsets[start]);
        let to = char_boundary_at_or_after(text, offsets[end]);
        if from < to {
            windows.push(text[from..to].to_string());
        }
        if end == tokens {
            break;
        }
        start += stride;
    }
    windows
}

fn char_boundary_at_or_after(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// A piece of text waiting for a chunk index.
struct Segment {
    text: String,
    section: Option<String>,
}

/// Splits documents into [`Chunk`]s according to a [`ChunkConfig`].
#[derive(Clone)]
pub struct Chunker {
    config: ChunkConfig,
    codec: Arc<dyn TokenCodec>,
}

impl Chunker {
    pub fn new(config: ChunkConfig, codec: Arc<dyn TokenCodec>) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, codec })
    }

    /// Chunker using the `cl100k_base` codec.
    pub fn with_default_codec(config: ChunkConfig) -> Result<Self> {
        Self::new(config, Arc::new(Cl100kCodec::new()?))
    }

    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    pub fn codec(&self) -> &dyn TokenCodec {
        self.codec.as_ref()
    }

    /// Chunk one document.
    ///
    /// Indices are contiguous from 0. Every chunk carries a copy of
    /// `metadata`; markdown chunks produced by the smart strategy also get a
    /// `section` entry with the nearest preceding header.
    pub fn chunk(
        &self,
        source_id: &str,
        text: &str,
        format: SourceFormat,
        metadata: &Payload,
    ) -> Result<Vec<Chunk>> {
        let segments = match self.config.strategy {
            ChunkStrategy::Fixed => self
                .windows(text)
                .into_iter()
                .map(|text| Segment {
                    text,
                    section: None,
                })
                .collect(),
            ChunkStrategy::Smart => self.smart_segments(text, format)?,
        };

        let segments: Vec<Segment> = segments
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .collect();
        let total_chunks = segments.len();

        Ok(segments
            .into_iter()
            .enumerate()
            .map(|(chunk_index, segment)| {
                let mut chunk_metadata = metadata.clone();
                if let Some(section) = segment.section {
                    chunk_metadata.insert(PAYLOAD_SECTION.to_string(), Value::String(section));
                }
                Chunk {
                    text: segment.text,
                    source_id: source_id.to_string(),
                    chunk_index,
                    total_chunks,
                    metadata: chunk_metadata,
                }
            })
            .collect())
    }

    fn windows(&self, text: &str) -> Vec<String> {
        window_text(
            self.codec.as_ref(),
            text,
            self.config.chunk_size,
            self.config.stride(),
        )
    }

    fn token_len(&self, text: &str) -> usize {
        self.codec.encode(text).len()
    }

    fn smart_segments(&self, text: &str, format: SourceFormat) -> Result<Vec<Segment>> {
        let sections = match format {
            SourceFormat::Markdown => markdown_sections(text),
            SourceFormat::PlainText | SourceFormat::Pdf => vec![(None, text.to_string())],
        };

        let mut segments = Vec::new();
        for (header, body) in sections {
            self.pack_section(header, &body, &mut segments)?;
        }
        Ok(segments)
    }

    /// Greedily pack the paragraphs of one section. Chunks never span two
    /// sections.
    fn pack_section(
        &self,
        header: Option<String>,
        body: &str,
        out: &mut Vec<Segment>,
    ) -> Result<()> {
        let limit = self.config.chunk_size;
        let mut current = String::new();

        for para in paragraphs(body) {
            if self.token_len(&para) > limit {
                flush(&mut current, &header, out);
                for window in self.windows(&para) {
                    out.push(Segment {
                        text: window,
                        section: header.clone(),
                    });
                }
                continue;
            }

            if current.is_empty() {
                current = para;
                continue;
            }

            let candidate = format!("{}\n\n{}", current, para);
            if self.token_len(&candidate) > limit {
                flush(&mut current, &header, out);
                current = para;
            } else {
                current = candidate;
            }
        }
        flush(&mut current, &header, out);
        Ok(())
    }
}

fn flush(current: &mut String, header: &Option<String>, out: &mut Vec<Segment>) {
    if !current.is_empty() {
        out.push(Segment {
            text: std::mem::take(current),
            section: header.clone(),
        });
    }
}

/// Header text if `line` is an ATX header (`# Title` .. `###### Title`).
fn atx_header(line: &str) -> Option<&str> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|&c| c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    if rest.is_empty() {
        return Some("");
    }
    if rest.starts_with(' ') || rest.starts_with('\t') {
        Some(rest.trim().trim_end_matches('#').trim_end())
    } else {
        None
    }
}

/// Split markdown into `(header, body)` sections. A header line begins its
/// own section and stays in the body. Headers inside fenced code blocks are
/// ignored.
fn markdown_sections(text: &str) -> Vec<(Option<String>, String)> {
    let mut sections: Vec<(Option<String>, String)> = Vec::new();
    let mut header: Option<String> = None;
    let mut body = String::new();
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim_start();
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_fence = !in_fence;
        }

        if !in_fence {
            if let Some(title) = atx_header(line) {
                if !body.trim().is_empty() {
                    sections.push((header.take(), std::mem::take(&mut body)));
                }
                body.clear();
                header = (!title.is_empty()).then(|| title.to_string());
            }
        }

        body.push_str(line);
        body.push('\n');
    }
    if !body.trim().is_empty() {
        sections.push((header, body));
    }
    sections
}

/// Non-empty paragraphs, split at blank lines and trimmed.
fn paragraphs(text: &str) -> Vec<String> {
    let mut paras = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paras.push(current.join("\n").trim().to_string());
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paras.push(current.join("\n").trim().to_string());
    }
    paras.retain(|p| !p.is_empty());
    paras
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    /// One token per whitespace-separated word. Each token carries the
    /// whitespace before it; the last one also carries trailing whitespace.
    pub(crate) struct WordCodec {
        vocab: std::sync::Mutex<Vec<String>>,
    }

    impl WordCodec {
        pub(crate) fn new() -> Self {
            Self {
                vocab: std::sync::Mutex::new(Vec::new()),
            }
        }
    }

    impl TokenCodec for WordCodec {
        fn encode(&self, text: &str) -> Vec<u32> {
            let mut vocab = self.vocab.lock().unwrap();
            text.split_whitespace()
                .map(|w| match vocab.iter().position(|v| v == w) {
                    Some(i) => i as u32,
                    None => {
                        vocab.push(w.to_string());
                        (vocab.len() - 1) as u32
                    }
                })
                .collect()
        }

        fn token_lens(&self, text: &str) -> Vec<usize> {
            let mut ends = Vec::new();
            let mut in_word = false;
            for (i, c) in text.char_indices() {
                if c.is_whitespace() {
                    if in_word {
                        ends.push(i);
                    }
                    in_word = false;
                } else {
                    in_word = true;
                }
            }
            if in_word {
                ends.push(text.len());
            }
            if let Some(last) = ends.last_mut() {
                *last = text.len();
            }

            let mut prev = 0;
            ends.into_iter()
                .map(|end| {
                    let len = end - prev;
                    prev = end;
                    len
                })
                .collect()
        }
    }

    fn words(n: usize) -> String {
        (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
    }

    fn chunker(chunk_size: usize, overlap: usize, strategy: ChunkStrategy) -> Chunker {
        Chunker::new(
            ChunkConfig {
                chunk_size,
                overlap,
                strategy,
            },
            Arc::new(WordCodec::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let codec = WordCodec::new();
        assert!(matches!(
            fixed_windows(&codec, "a b c", 0, 0),
            Err(RadiateError::InvalidChunkConfig(_))
        ));
        assert!(matches!(
            fixed_windows(&codec, "a b c", 10, 10),
            Err(RadiateError::InvalidChunkConfig(_))
        ));
        assert!(Chunker::new(
            ChunkConfig {
                chunk_size: 5,
                overlap: 7,
                strategy: ChunkStrategy::Fixed
            },
            Arc::new(WordCodec::new())
        )
        .is_err());
    }

    #[test]
    fn test_window_count_formula() {
        let codec = WordCodec::new();
        for (n, size, overlap) in [(1200, 512, 50), (100, 10, 3), (11, 10, 0), (25, 10, 5)] {
            let windows = fixed_windows(&codec, &words(n), size, overlap).unwrap();
            let stride = size - overlap;
            let expected = (n - overlap).div_ceil(stride);
            assert_eq!(windows.len(), expected, "n={} size={} overlap={}", n, size, overlap);
        }
    }

    #[test]
    fn test_short_and_empty_text() {
        let codec = WordCodec::new();
        assert_eq!(fixed_windows(&codec, &words(10), 10, 2).unwrap().len(), 1);
        assert_eq!(fixed_windows(&codec, &words(3), 10, 2).unwrap(), vec!["w0 w1 w2"]);
        assert!(fixed_windows(&codec, "", 10, 2).unwrap().is_empty());
    }

    #[test]
    fn test_windows_overlap_by_configured_amount() {
        let codec = WordCodec::new();
        let windows = fixed_windows(&codec, &words(12), 5, 2).unwrap();
        assert_eq!(windows[0], "w0 w1 w2 w3 w4");
        assert_eq!(windows[1], " w3 w4 w5 w6 w7");
        assert_eq!(windows.last().unwrap(), " w9 w10 w11");
    }

    #[test]
    fn test_chunk_indices_and_metadata() {
        let c = chunker(10, 2, ChunkStrategy::Fixed);
        let meta = json!({"project": "radiate"}).as_object().cloned().unwrap();
        let chunks = c.chunk("doc.txt", &words(40), SourceFormat::PlainText, &meta).unwrap();
        assert_eq!(chunks.len(), 5);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i);
            assert_eq!(chunk.total_chunks, 5);
            assert_eq!(chunk.source_id, "doc.txt");
            assert_eq!(chunk.metadata["project"], "radiate");
        }
    }

    #[test]
    fn test_whitespace_only_text_yields_no_chunks() {
        for strategy in [ChunkStrategy::Fixed, ChunkStrategy::Smart] {
            let c = chunker(10, 2, strategy);
            let chunks = c
                .chunk("blank.txt", "  \n\n\t \n", SourceFormat::PlainText, &Payload::new())
                .unwrap();
            assert!(chunks.is_empty());
        }
    }

    #[test]
    fn test_smart_packs_paragraphs() {
        let c = chunker(6, 1, ChunkStrategy::Smart);
        let text = "one two\n\nthree four\n\nfive six seven\n\neight";
        let chunks = c.chunk("p.txt", text, SourceFormat::PlainText, &Payload::new()).unwrap();
        let texts: Vec<_> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["one two\n\nthree four", "five six seven\n\neight"]);
    }

    #[test]
    fn test_smart_splits_oversized_paragraph() {
        let c = chunker(5, 1, ChunkStrategy::Smart);
        let text = format!("intro\n\n{}\n\noutro", words(12));
        let chunks = c.chunk("p.txt", &text, SourceFormat::PlainText, &Payload::new()).unwrap();
        assert_eq!(chunks.first().unwrap().text, "intro");
        assert_eq!(chunks.last().unwrap().text, "outro");
        // 12 tokens, window 5, stride 4 -> 3 windows
        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[1].text, "w0 w1 w2 w3 w4");
    }

    #[test]
    fn test_markdown_sections_are_boundaries() {
        let c = chunker(50, 5, ChunkStrategy::Smart);
        let text = "# Intro\n\nHello there.\n\n## Usage\n\nRun it.\n\n```\n# not a header\n```\n";
        let chunks = c.chunk("README.md", text, SourceFormat::Markdown, &Payload::new()).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].metadata["section"], "Intro");
        assert!(chunks[0].text.starts_with("# Intro"));
        assert_eq!(chunks[1].metadata["section"], "Usage");
        assert!(chunks[1].text.contains("# not a header"));
    }

    #[test]
    fn test_chunking_is_deterministic() {
        let text = format!("# A\n\n{}\n\n# B\n\n{}", words(30), words(7));
        let a = chunker(8, 2, ChunkStrategy::Smart)
            .chunk("x.md", &text, SourceFormat::Markdown, &Payload::new())
            .unwrap();
        let b = chunker(8, 2, ChunkStrategy::Smart)
            .chunk("x.md", &text, SourceFormat::Markdown, &Payload::new())
            .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_source_format_from_path() {
        assert_eq!(SourceFormat::from_path(Path::new("a/B.MD")), SourceFormat::Markdown);
        assert_eq!(SourceFormat::from_path(Path::new("x.pdf")), SourceFormat::Pdf);
        assert_eq!(SourceFormat::from_path(Path::new("notes")), SourceFormat::PlainText);
    }

    #[test]
    fn test_cl100k_windows_for_1200_tokens() {
        let codec = Cl100kCodec::new().unwrap();
        let text = format!("a{}", " a".repeat(1199));
        assert_eq!(codec.encode(&text).len(), 1200);
        let windows = fixed_windows(&codec, &text, 512, 50).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(codec.encode(windows[0].trim_start()).len(), 512);
    }

    fn assert_substrings(text: &str, windows: &[String]) {
        assert!(!windows.is_empty());
        for window in windows {
            assert!(!window.contains('\u{FFFD}'));
            assert!(text.contains(window.as_str()), "window {:?} is not part of the text", window);
        }
        assert!(text.starts_with(windows[0].as_str()));
        assert!(text.ends_with(windows[windows.len() - 1].as_str()));
    }

    #[test]
    fn test_cl100k_small_windows_over_multibyte_text() {
        let codec = Cl100kCodec::new().unwrap();
        let text = "日本語のテキストを分割します。🦀 Rust は安全です。".repeat(20);
        let windows = fixed_windows(&codec, &text, 7, 2).unwrap();
        assert_substrings(&text, &windows);
        assert!(windows.concat().matches('🦀').count() >= 20);
    }

    #[test]
    fn test_cl100k_default_windows_over_multibyte_text() {
        let c = Chunker::with_default_codec(ChunkConfig {
            chunk_size: 512,
            overlap: 50,
            strategy: ChunkStrategy::Fixed,
        })
        .unwrap();
        let text = "Café naïve résumé — 东京 🦀 ".repeat(400);
        let chunks = c.chunk("intl.txt", &text, SourceFormat::PlainText, &Payload::new()).unwrap();
        assert!(chunks.len() > 1);
        let windows: Vec<String> = chunks.into_iter().map(|c| c.text).collect();
        assert_substrings(&text, &windows);
    }

    #[test]
    fn test_smart_fallback_over_multibyte_paragraph() {
        let c = Chunker::with_default_codec(ChunkConfig {
            chunk_size: 16,
            overlap: 1,
            strategy: ChunkStrategy::Smart,
        })
        .unwrap();
        let text = format!("短い段落。\n\n{}", "東京タワーと🦀の物語。".repeat(30));
        let chunks = c.chunk("story.md", &text, SourceFormat::Markdown, &Payload::new()).unwrap();
        assert_eq!(chunks[0].text, "短い段落。");
        assert!(chunks.len() > 2);
        for chunk in &chunks {
            assert!(text.contains(chunk.text.as_str()));
            assert!(!chunk.text.contains('\u{FFFD}'));
        }
    }

    #[test]
    fn test_word_codec_lens_cover_text() {
        let codec = WordCodec::new();
        let text = "  alpha beta\tgamma  ";
        let lens = codec.token_lens(text);
        assert_eq!(lens.len(), codec.encode(text).len());
        assert_eq!(lens.iter().sum::<usize>(), text.len());
    }
}
