//! The query value passed through the retrieval stages.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A user question plus what has been extracted from it.
///
/// `Query` is immutable once built: rewriting produces a new value with the
/// same lineage `id`, and identifier extraction consumes one query and
/// returns another.
///
/// # Example
///
/// ```rust
/// use litrag::Query;
///
/// let query = Query::parse("  what causes scurvy?  ");
/// assert_eq!(query.content(), "what causes scurvy?");
///
/// let rewrite = query.with_content("which deficiency leads to scurvy?");
/// assert_eq!(rewrite.id(), query.id());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Query {
    id: Uuid,
    content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identifier: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    created_at: DateTime<Utc>,
}

impl Query {
    /// Build a query from raw user text, trimming surrounding whitespace.
    pub fn parse(text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            content: text.trim().to_string(),
            identifier: None,
            metadata: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// Return a rewrite of this query carrying `content`.
    ///
    /// The identifier and metadata are copied as they are; extraction is not
    /// re-run on the new text.
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            id: self.id,
            content: content.into(),
            identifier: self.identifier.clone(),
            metadata: self.metadata.clone(),
            created_at: self.created_at,
        }
    }

    /// Return this query with `identifier` attached and `provenance` merged
    /// into its metadata.
    pub fn with_identifier<I, K, V>(mut self, identifier: impl Into<String>, provenance: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.identifier = Some(identifier.into());
        self.metadata.extend(provenance.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Lineage identifier shared by a query and its rewrites.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The question text.
    pub fn content(&self) -> &str {
        &self.content
    }

    /// The extracted document identifier, if any.
    pub fn identifier(&self) -> Option<&str> {
        self.identifier.as_deref()
    }

    /// Extraction provenance and other annotations.
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }

    /// When the original query was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
