//! Rerankers that reorder a merged candidate pool.
//!
//! The retriever finds candidates by embedding similarity; the reranker
//! re-scores them with an independent lexical signal before the final
//! top-k cut.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;
use crate::passage::Passage;
use crate::query::Query;

/// A reranker that re-scores and reorders candidate passages.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Return at most `k` passages from `passages`, most relevant to `query` first.
    async fn rerank(&self, query: &Query, passages: &[Passage], k: usize)
    -> Result<Vec<Passage>>;
}

/// A reranker that keeps the first `k` candidates in pool order.
///
/// Useful for deterministic tests and as the disabled mode.
///
/// # Example
///
/// ```rust,ignore
/// use litrag::PassthroughReranker;
///
/// let top = PassthroughReranker.rerank(&query, &pool, 3).await?;
/// // top == pool[..3]
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughReranker;

#[async_trait]
impl Reranker for PassthroughReranker {
    async fn rerank(&self, _query: &Query, passages: &[Passage], k: usize) -> Result<Vec<Passage>> {
        Ok(passages.iter().take(k).cloned().collect())
    }
}

/// Lower-cased whitespace tokenization shared by queries and passages.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

/// Okapi BM25 parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    pub k1: f64,
    /// Length normalization strength.
    pub b: f64,
    /// Floor for negative idf values, as a fraction of the mean idf.
    pub epsilon: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self { k1: 1.5, b: 0.75, epsilon: 0.25 }
    }
}

/// A BM25 model fitted to one small corpus.
///
/// Built per call from the candidate pool; never persisted.
#[derive(Debug, Clone)]
pub struct Bm25Model {
    params: Bm25Params,
    avg_doc_len: f64,
    doc_lens: Vec<usize>,
    term_freqs: Vec<HashMap<String, usize>>,
    idf: HashMap<String, f64>,
}

impl Bm25Model {
    /// Fit the model to tokenized documents.
    pub fn fit(corpus: &[Vec<String>], params: Bm25Params) -> Self {
        let doc_count = corpus.len();
        let doc_lens: Vec<usize> = corpus.iter().map(Vec::len).collect();
        let total_len: usize = doc_lens.iter().sum();
        let avg_doc_len = if doc_count == 0 { 0.0 } else { total_len as f64 / doc_count as f64 };

        let mut term_freqs = Vec::with_capacity(doc_count);
        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        for doc in corpus {
            let mut freqs: HashMap<String, usize> = HashMap::new();
            for token in doc {
                *freqs.entry(token.clone()).or_default() += 1;
            }
            for term in freqs.keys() {
                *doc_freq.entry(term.clone()).or_default() += 1;
            }
            term_freqs.push(freqs);
        }

        let n = doc_count as f64;
        let mut idf: HashMap<String, f64> = doc_freq
            .into_iter()
            .map(|(term, df)| {
                let df = df as f64;
                (term, ((n - df + 0.5) / (df + 0.5)).ln())
            })
            .collect();

        // Terms present in more than half the pool get a negative idf;
        // replace those with a small positive floor.
        if !idf.is_empty() {
            let mean_idf = idf.values().sum::<f64>() / idf.len() as f64;
            let floor = params.epsilon * mean_idf;
            for value in idf.values_mut() {
                if *value < 0.0 {
                    *value = floor;
                }
            }
        }

        Self { params, avg_doc_len, doc_lens, term_freqs, idf }
    }

    /// Score every fitted document against `query_tokens`.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f64> {
        let Bm25Params { k1, b, .. } = self.params;
        self.term_freqs
            .iter()
            .zip(&self.doc_lens)
            .map(|(freqs, &len)| {
                if self.avg_doc_len == 0.0 {
                    return 0.0;
                }
                let norm = k1 * (1.0 - b + b * len as f64 / self.avg_doc_len);
                query_tokens
                    .iter()
                    .map(|term| {
                        let tf = freqs.get(term).copied().unwrap_or(0) as f64;
                        let idf = self.idf.get(term).copied().unwrap_or(0.0);
                        idf * (tf * (k1 + 1.0)) / (tf + norm)
                    })
                    .sum()
            })
            .collect()
    }
}

/// A [`Reranker`] that orders candidates by Okapi BM25 against the query text.
///
/// A fresh model is fitted to the candidate pool on every call. Ties keep
/// pool order. The returned passages keep their index similarity scores.
#[derive(Debug, Clone, Copy, Default)]
pub struct Bm25Reranker {
    params: Bm25Params,
}

impl Bm25Reranker {
    /// Create a reranker with the standard Okapi parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a reranker with custom parameters.
    pub fn with_params(params: Bm25Params) -> Self {
        Self { params }
    }

    /// BM25 score of each passage text against `query`, in input order.
    pub fn score(&self, query: &str, texts: &[&str]) -> Vec<f64> {
        let corpus: Vec<Vec<String>> = texts.iter().map(|t| tokenize(t)).collect();
        Bm25Model::fit(&corpus, self.params).scores(&tokenize(query))
    }
}

#[async_trait]
impl Reranker for Bm25Reranker {
    async fn rerank(&self, query: &Query, passages: &[Passage], k: usize) -> Result<Vec<Passage>> {
        let texts: Vec<&str> = passages.iter().map(|p| p.text.as_str()).collect();
        let scores = self.score(query.content(), &texts);

        let mut order: Vec<usize> = (0..passages.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b].partial_cmp(&scores[a]).unwrap_or(std::cmp::Ordering::Equal)
        });
        order.truncate(k);

        Ok(order.into_iter().map(|i| passages[i].clone()).collect())
    }
}
