//! Okapi BM25 lexical scoring.
//!
//! A [`Bm25Model`] is fitted to a small corpus (typically the dense
//! candidates of one query) and then scores queries against every fitted
//! document. Tokenisation is lowercase whitespace splitting.
//!
//! ```text
//! idf(t)      = ln((N - df(t) + 0.5) / (df(t) + 0.5) + 1)
//! score(d, q) = Σ_t idf(t) · tf · (k1 + 1) / (tf + k1 · (1 - b + b · |d| / avgdl))
//! ```

use std::collections::HashMap;

use crate::error::{RadiateError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalisation strength, in `[0, 1]`.
    pub b: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75 }
    }
}

/// Corpus statistics for BM25.
#[derive(Debug, Clone)]
pub struct Bm25Model {
    params: Bm25Params,
    corpus_size: usize,
    avg_doc_length: f64,
    doc_lengths: Vec<usize>,
    document_frequency: HashMap<String, usize>,
    inverse_document_frequency: HashMap<String, f64>,
    doc_term_freqs: Vec<HashMap<String, usize>>,
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().map(|t| t.to_lowercase())
}

impl Bm25Model {
    pub fn fit<S: AsRef<str>>(params: Bm25Params, corpus: &[S]) -> Self {
        let corpus_size = corpus.len();
        let mut doc_lengths = Vec::with_capacity(corpus_size);
        let mut doc_term_freqs = Vec::with_capacity(corpus_size);
        let mut document_frequency: HashMap<String, usize> = HashMap::new();

        for doc in corpus {
            let mut tf: HashMap<String, usize> = HashMap::new();
            let mut len = 0;
            for token in tokenize(doc.as_ref()) {
                *tf.entry(token).or_insert(0) += 1;
                len += 1;
            }
            for term in tf.keys() {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lengths.push(len);
            doc_term_freqs.push(tf);
        }

        let avg_doc_length = if corpus_size == 0 {
            0.0
        } else {
            doc_lengths.iter().sum::<usize>() as f64 / corpus_size as f64
        };

        let n = corpus_size as f64;
        let inverse_document_frequency = document_frequency
            .iter()
            .map(|(term, &df)| {
                let df = df as f64;
                (term.clone(), ((n - df + 0.5) / (df + 0.5) + 1.0).ln())
            })
            .collect();

        Self {
            params,
            corpus_size,
            avg_doc_length,
            doc_lengths,
            document_frequency,
            inverse_document_frequency,
            doc_term_freqs,
        }
    }

    pub fn corpus_size(&self) -> usize {
        self.corpus_size
    }

    pub fn avg_doc_length(&self) -> f64 {
        self.avg_doc_length
    }

    /// Number of fitted documents containing `term` (lowercased).
    pub fn document_frequency(&self, term: &str) -> usize {
        self.document_frequency
            .get(&term.to_lowercase())
            .copied()
            .unwrap_or(0)
    }

    pub fn idf(&self, term: &str) -> f64 {
        self.inverse_document_frequency
            .get(&term.to_lowercase())
            .copied()
            .unwrap_or(0.0)
    }

    /// Score `query` against every fitted document, in corpus order.
    pub fn score(&self, query: &str) -> Vec<f64> {
        let mut scores = vec![0.0; self.corpus_size];
        if self.avg_doc_length == 0.0 {
            return scores;
        }

        let Bm25Params { k1, b } = self.params;
        for term in tokenize(query) {
            let Some(&idf) = self.inverse_document_frequency.get(&term) else {
                continue;
            };
            for (i, tf_map) in self.doc_term_freqs.iter().enumerate() {
                let Some(&tf) = tf_map.get(&term) else {
                    continue;
                };
                let tf = tf as f64;
                let norm = 1.0 - b + b * self.doc_lengths[i] as f64 / self.avg_doc_length;
                scores[i] += idf * tf * (k1 + 1.0) / (tf + k1 * norm);
            }
        }
        scores
    }

    /// Score against an explicitly passed corpus, which must be the one
    /// this model was fitted on.
    pub fn score_corpus<S: AsRef<str>>(&self, query: &str, corpus: &[S]) -> Result<Vec<f64>> {
        if corpus.len() != self.corpus_size {
            return Err(RadiateError::Bm25CorpusMismatch {
                fitted: self.corpus_size,
                given: corpus.len(),
            });
        }
        Ok(self.score(query))
    }
}
