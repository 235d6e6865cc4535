//! Vector store trait for storing and searching passage embeddings.

use async_trait::async_trait;

use crate::error::Result;
use crate::passage::{ExactFilter, IndexRecord, Passage};

/// A storage backend for passage embeddings with similarity search.
///
/// Implementations manage named collections of [`IndexRecord`]s. Retrieval
/// only calls [`search`](VectorStore::search); the other operations are
/// used at ingestion time. Stores are shared across concurrent variant
/// searches and must not require caller-side locking.
///
/// # Example
///
/// ```rust,ignore
/// use litrag::{ExactFilter, InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.create_collection("article_chunks", 384).await?;
/// store.upsert("article_chunks", &records).await?;
/// let filter = ExactFilter::new("document_id", "12345678");
/// let passages = store.search("article_chunks", &query_embedding, 9, Some(&filter)).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create a named collection. No-op if it already exists.
    async fn create_collection(&self, name: &str, dimensions: usize) -> Result<()>;

    /// Delete a named collection and all its data.
    async fn delete_collection(&self, name: &str) -> Result<()>;

    /// Upsert records into a collection, keyed by `passage.id`.
    async fn upsert(&self, collection: &str, records: &[IndexRecord]) -> Result<()>;

    /// Search for the `limit` passages most similar to `embedding`.
    ///
    /// When `filter` is set, only passages whose field equals the filter
    /// value are considered. Returns passages ordered by descending
    /// similarity with `similarity_score` filled in.
    async fn search(
        &self,
        collection: &str,
        embedding: &[f32],
        limit: usize,
        filter: Option<&ExactFilter>,
    ) -> Result<Vec<Passage>>;
}
