//! # litrag
//!
//! Retrieval orchestration for grounded question answering over an indexed
//! literature corpus.
//!
//! ## Overview
//!
//! Given a natural-language question, [`ContextRetriever::search`]:
//!
//! 1. extracts an optional document identifier ("PMID 12345678") and
//!    restricts every index search to that document,
//! 2. expands the question into several rephrasings through a
//!    [`TextGenerator`],
//! 3. embeds and searches every variant concurrently, with per-call
//!    timeouts and retries,
//! 4. merges and de-duplicates the candidates by passage text,
//! 5. reranks the pool with Okapi BM25 and returns the top `k`.
//!
//! A failing variant only loses its own candidates; only a failure to embed
//! the original question fails the search.
//!
//! Around the retriever sit an [`Ingestor`] that embeds and writes
//! passages, and an [`AnswerPipeline`] that builds a grounded prompt from
//! the retrieved passages and asks a generator to answer it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use litrag::{ContextRetriever, HashingEmbeddingProvider, InMemoryVectorStore};
//!
//! # async fn run() -> litrag::Result<()> {
//! let retriever = ContextRetriever::builder()
//!     .embedding_provider(Arc::new(HashingEmbeddingProvider::new()))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//! let passages = retriever.search("What is the dosage in PMID 12345678?", 3, 3).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - `openai` - OpenAI-compatible embeddings and chat completions
//! - `qdrant` - Qdrant vector store over gRPC
//! - `full` - everything above

pub mod answer;
pub mod config;
pub mod embedding;
pub mod error;
pub mod expansion;
pub mod generation;
pub mod hashing;
pub mod identifier;
pub mod ingest;
pub mod inmemory;
pub mod passage;
pub mod query;
pub mod reranker;
pub mod retriever;
pub mod retry;
pub mod vectorstore;

#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "qdrant")]
pub mod qdrant;

pub use answer::{Answer, AnswerPipeline, build_grounded_prompt};
pub use config::{DEFAULT_COLLECTION, RetrieverConfig, RetrieverConfigBuilder};
pub use embedding::EmbeddingProvider;
pub use error::{Result, RetrievalError};
pub use expansion::{GenerativeExpander, IdentityExpander, QueryExpander};
pub use generation::{GenerationOptions, TextGenerator};
pub use hashing::HashingEmbeddingProvider;
pub use identifier::{IdentifierExtractor, IdentifierPattern, RegexIdentifierExtractor};
pub use ingest::Ingestor;
pub use inmemory::InMemoryVectorStore;
pub use passage::{ExactFilter, IndexRecord, Passage};
pub use query::Query;
pub use reranker::{Bm25Reranker, PassthroughReranker, Reranker};
pub use retriever::{ContextRetriever, ContextRetrieverBuilder, dedupe_by_text};
pub use retry::RetryPolicy;
pub use vectorstore::VectorStore;

#[cfg(feature = "openai")]
pub use openai::{OpenAIChatGenerator, OpenAIEmbeddingProvider};
#[cfg(feature = "qdrant")]
pub use qdrant::QdrantVectorStore;
