//! Detection of document identifiers referenced in free text.
//!
//! Extraction is pure pattern matching: it never consults a language model,
//! so it runs the same way whether or not a [`TextGenerator`](crate::TextGenerator)
//! is configured.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::error::{Result, RetrievalError};
use crate::query::Query;

/// Metadata key recording which mechanism found the identifier.
pub const IDENTIFIER_SOURCE_KEY: &str = "identifier_source";

/// Metadata key recording which pattern matched.
pub const IDENTIFIER_PATTERN_KEY: &str = "identifier_pattern";

/// Finds a document identifier in a query and attaches it.
pub trait IdentifierExtractor: Send + Sync {
    /// Return `query` with its identifier set if one is found, unchanged otherwise.
    fn extract(&self, query: Query) -> Query;
}

/// A labelled, case-insensitive identifier pattern.
///
/// Capture group 1 is the identifier; a pattern without groups yields the
/// whole match.
#[derive(Debug, Clone)]
pub struct IdentifierPattern {
    label: String,
    regex: Regex,
}

impl IdentifierPattern {
    /// Compile `pattern` case-insensitively under `label`.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Config`] if the pattern does not compile.
    pub fn new(label: impl Into<String>, pattern: &str) -> Result<Self> {
        let label = label.into();
        let regex = RegexBuilder::new(pattern).case_insensitive(true).build().map_err(|e| {
            RetrievalError::Config(format!("invalid identifier pattern '{label}': {e}"))
        })?;
        Ok(Self { label, regex })
    }

    /// The pattern's label, recorded as provenance on match.
    pub fn label(&self) -> &str {
        &self.label
    }

    fn find(&self, text: &str) -> Option<String> {
        let captures = self.regex.captures(text)?;
        let matched = captures.get(1).or_else(|| captures.get(0))?;
        Some(matched.as_str().trim().to_string())
    }
}

/// Keyword-prefixed codes first, then any standalone 7–8 digit numeral.
static DEFAULT_PATTERNS: LazyLock<Vec<IdentifierPattern>> = LazyLock::new(|| {
    [
        ("identifier", r"\bidentifier[:\s]*(\d+)"),
        ("pmid", r"\bpmid[:\s]*(\d+)"),
        ("pubmed", r"\bpubmed[:\s]*(\d+)"),
        ("source id", r"\bsource[\s_-]*id[:\s]*(\d+)"),
        ("article", r"\barticle[:\s]*(\d+)"),
        ("reference", r"\breference[:\s]*(\d+)"),
        ("standalone", r"\b(\d{7,8})\b"),
    ]
    .into_iter()
    .map(|(label, pattern)| {
        IdentifierPattern::new(label, pattern)
            .expect("unreachable error: built-in identifier pattern failed to compile")
    })
    .collect()
});

/// An [`IdentifierExtractor`] that tries an ordered list of regular expressions.
///
/// The first *pattern* that matches anywhere in the text wins, so a
/// keyword-prefixed code later in the sentence beats a bare numeral earlier
/// in it.
///
/// # Example
///
/// ```rust
/// use litrag::{IdentifierExtractor, Query, RegexIdentifierExtractor};
///
/// let extractor = RegexIdentifierExtractor::default();
/// let query = extractor.extract(Query::parse("What does PMID: 31452104 report?"));
/// assert_eq!(query.identifier(), Some("31452104"));
/// ```
#[derive(Debug, Clone)]
pub struct RegexIdentifierExtractor {
    patterns: Vec<IdentifierPattern>,
}

impl Default for RegexIdentifierExtractor {
    fn default() -> Self {
        Self { patterns: DEFAULT_PATTERNS.clone() }
    }
}

impl RegexIdentifierExtractor {
    /// Create an extractor with the built-in patterns.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an extractor that tries `patterns` in the given order.
    pub fn with_patterns(patterns: Vec<IdentifierPattern>) -> Self {
        Self { patterns }
    }

    /// Return the first pattern in priority order that matches, with its identifier.
    pub fn find<'a>(&'a self, text: &str) -> Option<(&'a str, String)> {
        self.patterns
            .iter()
            .find_map(|pattern| pattern.find(text).map(|id| (pattern.label(), id)))
    }
}

impl IdentifierExtractor for RegexIdentifierExtractor {
    fn extract(&self, query: Query) -> Query {
        match self.find(query.content()) {
            Some((label, identifier)) => {
                debug!(identifier = %identifier, pattern = label, "extracted document identifier");
                query.with_identifier(
                    identifier,
                    [(IDENTIFIER_SOURCE_KEY, "regex"), (IDENTIFIER_PATTERN_KEY, label)],
                )
            }
            None => query,
        }
    }
}
