//! Configuration for the context retriever.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};
use crate::generation::GenerationOptions;
use crate::retry::RetryPolicy;

/// Collection searched when none is configured.
pub const DEFAULT_COLLECTION: &str = "article_chunks";

/// Configuration parameters for the [`ContextRetriever`](crate::ContextRetriever).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrieverConfig {
    /// Name of the vector store collection to search.
    pub collection: String,
    /// Number of passages returned by [`search_default`](crate::ContextRetriever::search_default).
    pub top_k: usize,
    /// Number of query variants used by `search_default`.
    pub expand_to_n: usize,
    /// Each variant asks the index for `k * over_fetch_factor` neighbours.
    pub over_fetch_factor: usize,
    /// Payload field matched against an extracted document identifier.
    pub identifier_field: String,
    /// Upper bound on concurrently running variant searches.
    pub max_concurrency: usize,
    /// Time budget for one embedding call, in milliseconds.
    pub embed_timeout_ms: u64,
    /// Time budget for one index search including retries, in milliseconds.
    pub search_timeout_ms: u64,
    /// Retry policy applied to index searches.
    pub retry: RetryPolicy,
    /// Sampling options used when rewriting queries.
    pub expansion: GenerationOptions,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            top_k: 3,
            expand_to_n: 3,
            over_fetch_factor: 3,
            identifier_field: "document_id".to_string(),
            max_concurrency: 8,
            embed_timeout_ms: 10_000,
            search_timeout_ms: 10_000,
            retry: RetryPolicy::default(),
            expansion: GenerationOptions::default(),
        }
    }
}

impl RetrieverConfig {
    /// Create a new builder for constructing a [`RetrieverConfig`].
    pub fn builder() -> RetrieverConfigBuilder {
        RetrieverConfigBuilder::default()
    }

    /// Time budget for one embedding call.
    pub fn embed_timeout(&self) -> Duration {
        Duration::from_millis(self.embed_timeout_ms)
    }

    /// Time budget for one index search, retries included.
    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    /// Check that the parameters are usable.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.collection.trim().is_empty() {
            return Err(RetrievalError::Config("collection must not be empty".to_string()));
        }
        if self.identifier_field.trim().is_empty() {
            return Err(RetrievalError::Config("identifier_field must not be empty".to_string()));
        }
        for (name, value) in [
            ("top_k", self.top_k),
            ("expand_to_n", self.expand_to_n),
            ("over_fetch_factor", self.over_fetch_factor),
            ("max_concurrency", self.max_concurrency),
        ] {
            if value == 0 {
                return Err(RetrievalError::Config(format!("{name} must be greater than zero")));
            }
        }
        if self.retry.max_attempts == 0 {
            return Err(RetrievalError::Config(
                "retry.max_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for constructing a validated [`RetrieverConfig`].
#[derive(Debug, Clone, Default)]
pub struct RetrieverConfigBuilder {
    config: RetrieverConfig,
}

impl RetrieverConfigBuilder {
    /// Set the collection to search.
    pub fn collection(mut self, collection: impl Into<String>) -> Self {
        self.config.collection = collection.into();
        self
    }

    /// Set the default number of passages to return.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the default number of query variants.
    pub fn expand_to_n(mut self, n: usize) -> Self {
        self.config.expand_to_n = n;
        self
    }

    /// Set the index over-fetch multiplier.
    pub fn over_fetch_factor(mut self, factor: usize) -> Self {
        self.config.over_fetch_factor = factor;
        self
    }

    /// Set the payload field used for identifier filtering.
    pub fn identifier_field(mut self, field: impl Into<String>) -> Self {
        self.config.identifier_field = field.into();
        self
    }

    /// Cap the number of concurrently running variant searches.
    pub fn max_concurrency(mut self, max: usize) -> Self {
        self.config.max_concurrency = max;
        self
    }

    /// Set the per-call embedding timeout.
    pub fn embed_timeout(mut self, timeout: Duration) -> Self {
        self.config.embed_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the per-variant index search timeout.
    pub fn search_timeout(mut self, timeout: Duration) -> Self {
        self.config.search_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the retry policy for index searches.
    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set the sampling options for query rewriting.
    pub fn expansion(mut self, options: GenerationOptions) -> Self {
        self.config.expansion = options;
        self
    }

    /// Build the [`RetrieverConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if any count is zero or a name is empty.
    pub fn build(self) -> Result<RetrieverConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
