//! Grounded answering: retrieved passages in, prompt and answer out.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info};

use crate::error::Result;
use crate::generation::{GenerationOptions, TextGenerator};
use crate::passage::Passage;
use crate::retriever::ContextRetriever;

/// Build the prompt that grounds a generator in `passages`.
///
/// With no passages the prompt is just the question.
pub fn build_grounded_prompt(question: &str, passages: &[Passage]) -> String {
    if passages.is_empty() {
        return format!("Question: {question}\nAnswer:");
    }

    let context = passages
        .iter()
        .map(|passage| {
            let title = passage.title.as_deref().unwrap_or("Unknown");
            format!("Source: {title} - ID: {}\nContent: {}\n", passage.document_id, passage.text)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Answer the user's question using the context below, taken from indexed articles.\n\n\
         Context:\n{context}\n\
         Question: {question}\n\n\
         Answer:"
    )
}

/// The outcome of [`AnswerPipeline::answer`].
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    /// The question as asked.
    pub question: String,
    /// The prompt sent (or that would be sent) to the generator.
    pub prompt: String,
    /// Passages the answer is grounded in, most relevant first.
    pub passages: Vec<Passage>,
    /// Generated text; `None` when no generator is configured.
    pub text: Option<String>,
}

/// Retrieval followed by generation.
///
/// # Example
///
/// ```rust,ignore
/// let pipeline = AnswerPipeline::new(retriever).with_generator(chat);
/// let answer = pipeline.answer("Do statins affect memory?").await?;
/// println!("{}", answer.text.unwrap_or_default());
/// ```
pub struct AnswerPipeline {
    retriever: Arc<ContextRetriever>,
    generator: Option<Arc<dyn TextGenerator>>,
    options: GenerationOptions,
}

impl AnswerPipeline {
    /// Create a pipeline that only retrieves and builds prompts.
    pub fn new(retriever: Arc<ContextRetriever>) -> Self {
        Self { retriever, generator: None, options: GenerationOptions::answering() }
    }

    /// Generate answers with `generator`.
    pub fn with_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Override the sampling options used for answers.
    pub fn with_options(mut self, options: GenerationOptions) -> Self {
        self.options = options;
        self
    }

    /// Retrieve context for `question` with the retriever's defaults and
    /// answer it.
    ///
    /// # Errors
    ///
    /// Propagates retrieval errors and, when a generator is configured,
    /// its [`RetrievalError::Generation`](crate::RetrievalError::Generation).
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        let passages = self.retriever.search_default(question).await?;
        let prompt = build_grounded_prompt(question.trim(), &passages);

        let text = match &self.generator {
            Some(generator) => {
                let text = generator.complete(&prompt, &self.options).await.map_err(|e| {
                    error!(generator = generator.name(), error = %e, "answer generation failed");
                    e
                })?;
                Some(text.trim().to_string())
            }
            None => None,
        };

        info!(passages = passages.len(), generated = text.is_some(), "answered question");
        Ok(Answer { question: question.trim().to_string(), prompt, passages, text })
    }
}
