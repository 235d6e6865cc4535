//! Context retriever: the retrieval orchestrator.
//!
//! The [`ContextRetriever`] turns one question into a ranked set of
//! supporting passages by composing an [`IdentifierExtractor`], a
//! [`QueryExpander`], an [`EmbeddingProvider`], a [`VectorStore`], and a
//! [`Reranker`].
//!
//! One [`search`](ContextRetriever::search) runs these stages in order:
//!
//! 1. parse the text into a [`Query`]
//! 2. extract a document identifier (used as an exact index filter)
//! 3. expand the query into `expand_to_n` variants
//! 4. embed and search every variant concurrently, over-fetching
//!    `k * over_fetch_factor` neighbours
//! 5. wait for all variants, merge, and drop exact-text duplicates
//! 6. rerank the pool against the original query and keep the top `k`
//!
//! A failing variant contributes nothing; only an embedding failure on the
//! original query fails the whole search.
//!
//! # Example
//!
//! ```rust,ignore
//! use litrag::{ContextRetriever, HashingEmbeddingProvider, InMemoryVectorStore};
//!
//! let retriever = ContextRetriever::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::new()))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! let passages = retriever.search("What does PMID 31452104 say about statins?", 3, 3).await?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use crate::config::RetrieverConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{Result, RetrievalError};
use crate::expansion::{GenerativeExpander, IdentityExpander, QueryExpander};
use crate::generation::TextGenerator;
use crate::identifier::{IdentifierExtractor, RegexIdentifierExtractor};
use crate::passage::{ExactFilter, Passage};
use crate::query::Query;
use crate::reranker::{Bm25Reranker, Reranker};
use crate::retry::RetryPolicy;
use crate::vectorstore::VectorStore;

/// Keep the first passage for each distinct text, preserving order.
///
/// Equality is exact string equality on `text`; ids and scores are ignored.
pub fn dedupe_by_text(passages: Vec<Passage>) -> Vec<Passage> {
    let mut seen: HashSet<String> = HashSet::with_capacity(passages.len());
    passages.into_iter().filter(|p| seen.insert(p.text.clone())).collect()
}

/// The retrieval orchestrator.
///
/// Holds only shared, immutable collaborator handles, so one instance can
/// serve any number of concurrent searches. Construct one via
/// [`ContextRetriever::builder()`].
pub struct ContextRetriever {
    config: RetrieverConfig,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    extractor: Arc<dyn IdentifierExtractor>,
    expander: Arc<dyn QueryExpander>,
    reranker: Arc<dyn Reranker>,
}

impl ContextRetriever {
    /// Create a new [`ContextRetrieverBuilder`].
    pub fn builder() -> ContextRetrieverBuilder {
        ContextRetrieverBuilder::default()
    }

    /// Return a reference to the retriever configuration.
    pub fn config(&self) -> &RetrieverConfig {
        &self.config
    }

    /// Return a reference to the embedding provider.
    pub fn embedding_provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedding_provider
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Search with the configured `top_k` and `expand_to_n`.
    ///
    /// # Errors
    ///
    /// See [`search`](ContextRetriever::search).
    pub async fn search_default(&self, query_text: &str) -> Result<Vec<Passage>> {
        self.search(query_text, self.config.top_k, self.config.expand_to_n).await
    }

    /// Retrieve at most `k` passages relevant to `query_text`.
    ///
    /// The result holds no two passages with the same text and is ordered
    /// by descending relevance to the original (unexpanded) query. An empty
    /// result is not an error.
    ///
    /// # Errors
    ///
    /// - [`RetrievalError::Config`] if `expand_to_n` is zero.
    /// - The embedding error (or [`RetrievalError::Timeout`]) if the original
    ///   query cannot be embedded.
    #[instrument(name = "context_retriever.search", skip(self, query_text))]
    pub async fn search(
        &self,
        query_text: &str,
        k: usize,
        expand_to_n: usize,
    ) -> Result<Vec<Passage>> {
        if expand_to_n == 0 {
            return Err(RetrievalError::Config("expand_to_n must be greater than zero".to_string()));
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        // 1-2. Parse and extract an identifier
        let query = self.extractor.extract(Query::parse(query_text));

        // 3. Expand into variants
        let variants = self.expander.expand(&query, expand_to_n).await;

        // 4-5. Fan out, then merge behind the barrier
        let pool = self.fan_out(&query, variants, k).await?;
        let pool_size = pool.len();
        let mut candidates = dedupe_by_text(pool);

        if candidates.is_empty() {
            info!(identifier = query.identifier(), "search found no candidates");
            return Ok(Vec::new());
        }

        // 6. Rerank against the original query
        let unique = candidates.len();
        let ranked = match self.reranker.rerank(&query, &candidates, k).await {
            Ok(ranked) => ranked,
            Err(e) => {
                warn!(error = %e, "reranking failed, keeping merge order");
                candidates.truncate(k);
                candidates
            }
        };

        info!(
            identifier = query.identifier(),
            pool_size,
            unique,
            result_count = ranked.len(),
            "search completed"
        );

        Ok(ranked)
    }

    /// Run one embed-and-search task per variant and merge their results in
    /// variant order once every task has finished.
    async fn fan_out(&self, query: &Query, variants: Vec<Query>, k: usize) -> Result<Vec<Passage>> {
        let filter = query
            .identifier()
            .map(|id| ExactFilter::new(self.config.identifier_field.as_str(), id));
        let limit = k.saturating_mul(self.config.over_fetch_factor);
        let permits =
            Arc::new(Semaphore::new(variants.len().min(self.config.max_concurrency).max(1)));

        let variant_count = variants.len();
        let mut tasks = JoinSet::new();
        for (index, variant) in variants.into_iter().enumerate() {
            let search = VariantSearch {
                text: variant.content().to_string(),
                collection: self.config.collection.clone(),
                limit,
                filter: filter.clone(),
                embedding_provider: Arc::clone(&self.embedding_provider),
                vector_store: Arc::clone(&self.vector_store),
                embed_timeout: self.config.embed_timeout(),
                search_timeout: self.config.search_timeout(),
                retry: self.config.retry,
            };
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                (index, search.run().await)
            });
        }

        debug!(variants = variant_count, limit, filter = ?filter, "dispatched variant searches");

        // Dropping `tasks` (on early return or cancellation) aborts whatever is still running.
        let mut slots: Vec<Vec<Passage>> = vec![Vec::new(); variant_count];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(passages))) => {
                    debug!(variant = index, hits = passages.len(), "variant search finished");
                    slots[index] = passages;
                }
                Ok((0, Err(VariantFailure::Embed(e)))) => {
                    error!(error = %e, "embedding the original query failed");
                    return Err(e);
                }
                Ok((index, Err(failure))) => {
                    warn!(
                        variant = index,
                        error = %failure,
                        "variant search failed, contributing nothing"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "variant task did not complete");
                }
            }
        }

        Ok(slots.into_iter().flatten().collect())
    }
}

/// Which step of a variant search failed.
#[derive(Debug)]
enum VariantFailure {
    Embed(RetrievalError),
    Search(RetrievalError),
}

impl std::fmt::Display for VariantFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Embed(e) => write!(f, "embedding failed: {e}"),
            Self::Search(e) => write!(f, "index search failed: {e}"),
        }
    }
}

/// Everything one variant task needs, owned so the task can be spawned.
struct VariantSearch {
    text: String,
    collection: String,
    limit: usize,
    filter: Option<ExactFilter>,
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    embed_timeout: Duration,
    search_timeout: Duration,
    retry: RetryPolicy,
}

impl VariantSearch {
    async fn run(self) -> std::result::Result<Vec<Passage>, VariantFailure> {
        let embedding =
            tokio::time::timeout(self.embed_timeout, self.embedding_provider.embed(&self.text))
                .await
                .map_err(|_| RetrievalError::Timeout {
                    operation: "embed".to_string(),
                    after: self.embed_timeout,
                })
                .and_then(|r| r)
                .map_err(VariantFailure::Embed)?;

        let store = self.vector_store.as_ref();
        let collection = self.collection.as_str();
        let embedding = embedding.as_slice();
        let filter = self.filter.as_ref();
        let limit = self.limit;

        tokio::time::timeout(
            self.search_timeout,
            self.retry.run("index search", move || {
                store.search(collection, embedding, limit, filter)
            }),
        )
        .await
        .map_err(|_| RetrievalError::Timeout {
            operation: "index search".to_string(),
            after: self.search_timeout,
        })
        .and_then(|r| r)
        .map_err(VariantFailure::Search)
    }
}

/// Builder for constructing a [`ContextRetriever`].
///
/// `embedding_provider` and `vector_store` are required. Without an explicit
/// expander, a configured [`generator`](ContextRetrieverBuilder::generator)
/// enables [`GenerativeExpander`]; otherwise [`IdentityExpander`] is used.
/// The reranker defaults to [`Bm25Reranker`] and the extractor to
/// [`RegexIdentifierExtractor`].
///
/// # Example
///
/// ```rust,ignore
/// let retriever = ContextRetriever::builder()
///     .config(RetrieverConfig::default())
///     .embedding_provider(Arc::new(embedder))
///     .vector_store(Arc::new(store))
///     .generator(Arc::new(chat))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct ContextRetrieverBuilder {
    config: Option<RetrieverConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    extractor: Option<Arc<dyn IdentifierExtractor>>,
    expander: Option<Arc<dyn QueryExpander>>,
    generator: Option<Arc<dyn TextGenerator>>,
    reranker: Option<Arc<dyn Reranker>>,
}

impl ContextRetrieverBuilder {
    /// Set the retriever configuration. Defaults to [`RetrieverConfig::default()`].
    pub fn config(mut self, config: RetrieverConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Replace the identifier extractor.
    pub fn extractor(mut self, extractor: Arc<dyn IdentifierExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    /// Set the query expander explicitly. Takes precedence over `generator`.
    pub fn expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expander = Some(expander);
        self
    }

    /// Enable query rewriting with `generator`.
    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the reranker.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Build the [`ContextRetriever`], validating the configuration and
    /// that all required collaborators are set.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if a required field is missing or
    /// the configuration is invalid.
    pub fn build(self) -> Result<ContextRetriever> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let embedding_provider = self.embedding_provider.ok_or_else(|| {
            RetrievalError::Config("embedding_provider is required".to_string())
        })?;
        let vector_store = self
            .vector_store
            .ok_or_else(|| RetrievalError::Config("vector_store is required".to_string()))?;

        let expander: Arc<dyn QueryExpander> = match (self.expander, self.generator) {
            (Some(expander), _) => expander,
            (None, Some(generator)) => {
                Arc::new(GenerativeExpander::new(generator).with_options(config.expansion.clone()))
            }
            (None, None) => Arc::new(IdentityExpander),
        };

        Ok(ContextRetriever {
            config,
            embedding_provider,
            vector_store,
            extractor: self
                .extractor
                .unwrap_or_else(|| Arc::new(RegexIdentifierExtractor::default())),
            expander,
            reranker: self.reranker.unwrap_or_else(|| Arc::new(Bm25Reranker::new())),
        })
    }
}
