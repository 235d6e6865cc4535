//! Ingestion of already-chunked passages: embed → stamp → upsert.
//!
//! Scraping and chunking happen upstream; the [`Ingestor`] only turns
//! passages into [`IndexRecord`]s and writes them to a collection.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, RetrievalError};
use crate::passage::{IndexRecord, Passage};
use crate::retry::RetryPolicy;
use crate::vectorstore::VectorStore;

/// Number of passages embedded and upserted per request.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Writes passages into a vector store collection.
///
/// # Example
///
/// ```rust,ignore
/// use litrag::Ingestor;
///
/// let ingestor = Ingestor::new(embedder.clone(), store.clone());
/// let written = ingestor.ingest("article_chunks", passages).await?;
/// ```
pub struct Ingestor {
    embedding_provider: Arc<dyn EmbeddingProvider>,
    vector_store: Arc<dyn VectorStore>,
    batch_size: usize,
    retry: RetryPolicy,
}

impl Ingestor {
    /// Create an ingestor with the default batch size and retry policy.
    pub fn new(
        embedding_provider: Arc<dyn EmbeddingProvider>,
        vector_store: Arc<dyn VectorStore>,
    ) -> Self {
        Self {
            embedding_provider,
            vector_store,
            batch_size: DEFAULT_BATCH_SIZE,
            retry: RetryPolicy::default(),
        }
    }

    /// Set how many passages are sent per embed/upsert round trip.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the retry policy for upserts.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Embed and store `passages` in `collection`, creating it if needed.
    ///
    /// Passages with blank text are skipped. Each stored passage has its
    /// `embedding_model` set to the provider's model name. Returns the
    /// number of passages written.
    ///
    /// # Errors
    ///
    /// Returns the first embedding or vector store error, naming the batch
    /// that failed. Batches written before the failure stay written.
    pub async fn ingest(&self, collection: &str, passages: Vec<Passage>) -> Result<usize> {
        self.vector_store
            .create_collection(collection, self.embedding_provider.dimensions())
            .await?;

        let total = passages.len();
        let passages: Vec<Passage> = passages
            .into_iter()
            .filter(|p| {
                let keep = !p.text.trim().is_empty();
                if !keep {
                    warn!(passage.id = %p.id, "skipping passage with empty text");
                }
                keep
            })
            .collect();

        let model = self.embedding_provider.model_name().to_string();
        let mut written = 0;
        for (batch_index, batch) in passages.chunks(self.batch_size).enumerate() {
            let texts: Vec<&str> = batch.iter().map(|p| p.text.as_str()).collect();
            let embeddings = self.embedding_provider.embed_batch(&texts).await.map_err(|e| {
                error!(
                    collection,
                    batch = batch_index,
                    error = %e,
                    "embedding failed during ingestion"
                );
                e
            })?;
            if embeddings.len() != batch.len() {
                return Err(RetrievalError::Embedding {
                    provider: model.clone(),
                    message: format!(
                        "expected {} embeddings for batch {batch_index}, got {}",
                        batch.len(),
                        embeddings.len()
                    ),
                });
            }

            let records: Vec<IndexRecord> = batch
                .iter()
                .zip(embeddings)
                .map(|(passage, embedding)| {
                    let mut passage = passage.clone();
                    passage.embedding_model = Some(model.clone());
                    passage.similarity_score = 0.0;
                    IndexRecord { passage, embedding }
                })
                .collect();

            let store = self.vector_store.as_ref();
            let records = records.as_slice();
            self.retry.run("upsert", move || store.upsert(collection, records)).await.map_err(
                |e| {
                    error!(
                        collection,
                        batch = batch_index,
                        error = %e,
                        "upsert failed during ingestion"
                    );
                    e
                },
            )?;

            written += batch.len();
            debug!(collection, batch = batch_index, size = batch.len(), "upserted batch");
        }

        info!(collection, total, written, "ingested passages");
        Ok(written)
    }
}
