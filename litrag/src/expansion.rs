//! Query expansion: rephrasing one question several ways to widen recall
//! against an embedding index that is sensitive to exact wording.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::generation::{GenerationOptions, TextGenerator};
use crate::query::Query;

/// Literal token the generator is asked to put between alternatives.
pub const EXPANSION_SEPARATOR: &str = "#next-query#";

/// Produces exactly `n` variants of a query, the original first.
#[async_trait]
pub trait QueryExpander: Send + Sync {
    /// Expand `query` into exactly `n` variants. Element 0 is `query` itself.
    ///
    /// Never fails: problems producing rewrites degrade to copies of the
    /// original.
    async fn expand(&self, query: &Query, n: usize) -> Vec<Query>;
}

/// The expander used when no generator is configured: `n` copies of the original.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityExpander;

#[async_trait]
impl QueryExpander for IdentityExpander {
    async fn expand(&self, query: &Query, n: usize) -> Vec<Query> {
        vec![query.clone(); n]
    }
}

/// Build the rewrite instruction for `question`.
pub fn expansion_prompt(question: &str, n: usize) -> String {
    format!(
        "You are an AI language model assistant. \
         Your task is to generate {n} different rephrasings of the user question below \
         so that relevant documents can be retrieved from a vector database. \
         Keep the meaning of the question but vary the wording, terminology or focus. \
         Separate the alternative questions with '{EXPANSION_SEPARATOR}'. \
         Original question: {question}"
    )
}

/// Assemble exactly `n` variants from the original and raw generator output.
///
/// `response` is split on [`EXPANSION_SEPARATOR`]; candidates are trimmed,
/// empty ones skipped, and case-insensitive duplicates of anything already
/// accepted (the original included) dropped. The list is then padded with
/// copies of the original or truncated to `n`.
pub fn merge_rewrites(query: &Query, response: &str, n: usize) -> Vec<Query> {
    if n == 0 {
        return Vec::new();
    }

    let mut variants = vec![query.clone()];
    let mut seen: HashSet<String> = HashSet::from([query.content().to_lowercase()]);

    for candidate in response.split(EXPANSION_SEPARATOR).map(str::trim) {
        if variants.len() >= n {
            break;
        }
        if candidate.is_empty() {
            continue;
        }
        if seen.insert(candidate.to_lowercase()) {
            variants.push(query.with_content(candidate));
        }
    }

    while variants.len() < n {
        variants.push(query.clone());
    }
    variants.truncate(n);
    variants
}

/// An expander that asks a [`TextGenerator`] for rephrasings.
///
/// # Example
///
/// ```rust,ignore
/// use litrag::{GenerativeExpander, QueryExpander, Query};
///
/// let expander = GenerativeExpander::new(generator);
/// let variants = expander.expand(&Query::parse("statins and memory"), 3).await;
/// assert_eq!(variants.len(), 3);
/// ```
pub struct GenerativeExpander {
    generator: Arc<dyn TextGenerator>,
    options: GenerationOptions,
}

impl GenerativeExpander {
    /// Create an expander using the default rewrite options.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self { generator, options: GenerationOptions::default() }
    }

    /// Override the sampling options sent with each rewrite request.
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl QueryExpander for GenerativeExpander {
    async fn expand(&self, query: &Query, n: usize) -> Vec<Query> {
        if n <= 1 {
            return merge_rewrites(query, "", n);
        }

        let prompt = expansion_prompt(query.content(), n);
        let response = match self.generator.complete(&prompt, &self.options).await {
            Ok(response) => response,
            Err(e) => {
                warn!(
                    generator = self.generator.name(),
                    error = %e,
                    "query rewriting failed, using original query only"
                );
                String::new()
            }
        };

        let variants = merge_rewrites(query, response.trim(), n);
        debug!(
            generator = self.generator.name(),
            requested = n,
            distinct = variants.iter().skip(1).filter(|v| v.content() != query.content()).count(),
            "expanded query"
        );
        variants
    }
}
