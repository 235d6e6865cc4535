//! Data types for retrieved passages and the records they are indexed from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A chunk of indexed document text plus its provenance.
///
/// Passages are produced by the vector store and are read-only to the
/// retriever: it filters, merges, and reorders copies but never writes
/// them back.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Passage {
    /// Identifier of the stored unit in the index.
    pub id: String,
    /// Identifier of the source document this passage belongs to.
    pub document_id: String,
    /// Title of the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// URL of the source document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Authors of the source document, as stored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<String>,
    /// The passage text used for lexical and semantic matching.
    pub text: String,
    /// Name of the embedding model that produced the indexed vector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,
    /// Free-form chunk metadata.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    /// Score returned by the index for the query that found this passage.
    ///
    /// Only comparable with other scores from the same search call.
    #[serde(default)]
    pub similarity_score: f32,
}

impl Passage {
    /// Create a passage with only the required fields set.
    pub fn new(
        id: impl Into<String>,
        document_id: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            document_id: document_id.into(),
            title: None,
            source_url: None,
            authors: None,
            text: text.into(),
            embedding_model: None,
            metadata: HashMap::new(),
            similarity_score: 0.0,
        }
    }

    /// Set the document title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Set the source URL.
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Set the authors string.
    pub fn with_authors(mut self, authors: impl Into<String>) -> Self {
        self.authors = Some(authors.into());
        self
    }

    /// Set the similarity score.
    pub fn with_score(mut self, score: f32) -> Self {
        self.similarity_score = score;
        self
    }

    /// Look up a field by its payload name.
    ///
    /// Named provenance fields take precedence over `metadata` entries. Used
    /// by stores that evaluate exact-match filters in process.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "id" => Some(self.id.as_str()),
            "document_id" => Some(self.document_id.as_str()),
            "title" => self.title.as_deref(),
            "source_url" => self.source_url.as_deref(),
            "authors" => self.authors.as_deref(),
            "embedding_model" => self.embedding_model.as_deref(),
            other => self.metadata.get(other).map(String::as_str),
        }
    }
}

/// A [`Passage`] paired with its embedding, as written at ingestion time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IndexRecord {
    /// The stored passage. Its `similarity_score` is ignored by stores.
    pub passage: Passage,
    /// The vector embedding of `passage.text`.
    pub embedding: Vec<f32>,
}

/// Restricts a search to passages whose `field` equals `value` exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExactFilter {
    /// Payload field name, e.g. `"document_id"`.
    pub field: String,
    /// The value the field must equal.
    pub value: String,
}

impl ExactFilter {
    /// Create a filter matching `field == value`.
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self { field: field.into(), value: value.into() }
    }

    /// Whether `passage` satisfies this filter.
    pub fn matches(&self, passage: &Passage) -> bool {
        passage.field(&self.field) == Some(self.value.as_str())
    }
}
