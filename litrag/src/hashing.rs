//! Deterministic feature-hashing embedder.
//!
//! Maps lower-cased whitespace tokens into a fixed number of buckets with
//! FNV-1a and L2-normalizes the counts. It needs no model download or
//! network access, which makes it the offline default for the CLI and the
//! embedder of choice in tests.

use async_trait::async_trait;

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, RetrievalError};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Default number of buckets.
pub const DEFAULT_HASH_DIMENSIONS: usize = 384;

/// An [`EmbeddingProvider`] that hashes tokens into a fixed-size vector.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
    model_name: String,
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::with_dimensions(DEFAULT_HASH_DIMENSIONS)
    }
}

impl HashingEmbeddingProvider {
    /// Create an embedder with [`DEFAULT_HASH_DIMENSIONS`] buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an embedder with `dimensions` buckets (at least one).
    pub fn with_dimensions(dimensions: usize) -> Self {
        let dimensions = dimensions.max(1);
        Self { dimensions, model_name: format!("fnv1a-hash-{dimensions}") }
    }

    fn fnv1a(token: &str) -> u64 {
        token
            .bytes()
            .fold(FNV_OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(FNV_PRIME))
    }

    /// Embed synchronously.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in text.split_whitespace() {
            let token = token.to_lowercase();
            let bucket = (Self::fnv1a(&token) % self.dimensions as u64) as usize;
            vector[bucket] += 1.0;
        }
        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RetrievalError::Embedding {
                provider: self.model_name.clone(),
                message: "cannot embed empty text".to_string(),
            });
        }
        Ok(self.embed_sync(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
