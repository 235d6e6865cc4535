//! Error types for the `litrag` crate.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during retrieval, ingestion, and answering.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred in the vector store backend.
    #[error("Vector store error ({backend}): {message}")]
    VectorStore {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// The text-generation collaborator failed or returned an unusable response.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during result reranking.
    #[error("Reranker error ({reranker}): {message}")]
    Reranker {
        /// The reranker that produced the error.
        reranker: String,
        /// A description of the failure.
        message: String,
    },

    /// A collaborator call did not finish within its time budget.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// The operation that timed out (e.g. `"embed"`, `"index search"`).
        operation: String,
        /// The budget that was exceeded.
        after: Duration,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An error in the retrieval orchestration itself.
    #[error("Retrieval error: {0}")]
    Retrieval(String),
}

impl RetrievalError {
    /// Whether retrying the same call could plausibly succeed.
    ///
    /// Collaborator failures and timeouts are transient; configuration and
    /// orchestration errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Embedding { .. }
                | Self::VectorStore { .. }
                | Self::Generation { .. }
                | Self::Timeout { .. }
        )
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;
