//! OpenAI-compatible embedding and chat-completion clients.
//!
//! Both talk to any server that speaks the OpenAI REST API (OpenAI itself,
//! vLLM, Ollama, LiteLLM proxies). This module is only available when the
//! `openai` feature is enabled.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{Result, RetrievalError};
use crate::generation::{GenerationOptions, TextGenerator};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for embeddings.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// The default chat model.
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

const PROVIDER: &str = "OpenAI";

/// Connection settings shared by the embedding and chat clients.
#[derive(Clone)]
struct Endpoint {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl Endpoint {
    fn new(api_key: String) -> std::result::Result<Self, String> {
        if api_key.is_empty() {
            return Err("API key must not be empty".into());
        }
        Ok(Self { client: reqwest::Client::new(), api_key, base_url: DEFAULT_BASE_URL.into() })
    }

    /// Read `OPENAI_API_KEY` and, when set, `OPENAI_BASE_URL`.
    fn from_env() -> std::result::Result<Self, String> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| "OPENAI_API_KEY environment variable not set".to_string())?;
        let mut endpoint = Self::new(api_key)?;
        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            endpoint.set_base_url(&base_url);
        }
        Ok(endpoint)
    }

    fn set_base_url(&mut self, base_url: &str) {
        self.base_url = base_url.trim_end_matches('/').to_string();
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// POST `body` to `path` and decode the JSON reply, mapping every failure
    /// through `wrap`.
    async fn post<B, R>(
        &self,
        path: &str,
        body: &B,
        wrap: fn(String) -> RetrievalError,
    ) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, path, error = %e, "request failed");
                wrap(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, path, %status, "API error");
            return Err(wrap(format!("API returned {status}: {detail}")));
        }

        response.json().await.map_err(|e| {
            error!(provider = PROVIDER, path, error = %e, "failed to parse response");
            wrap(format!("failed to parse response: {e}"))
        })
    }
}

fn embedding_error(message: String) -> RetrievalError {
    RetrievalError::Embedding { provider: PROVIDER.into(), message }
}

fn generation_error(message: String) -> RetrievalError {
    RetrievalError::Generation { provider: PROVIDER.into(), message }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

/// An [`EmbeddingProvider`] backed by an OpenAI-compatible `/embeddings` endpoint.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
/// - `base_url` – defaults to the OpenAI API, or `OPENAI_BASE_URL` with
///   [`from_env`](Self::from_env).
///
/// # Example
///
/// ```rust,ignore
/// use litrag::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    endpoint: Endpoint,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Ok(Self::with_endpoint(Endpoint::new(api_key.into()).map_err(embedding_error)?))
    }

    /// Create a new provider from `OPENAI_API_KEY` and `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        Ok(Self::with_endpoint(Endpoint::from_env().map_err(embedding_error)?))
    }

    fn with_endpoint(endpoint: Endpoint) -> Self {
        Self {
            endpoint,
            model: DEFAULT_EMBEDDING_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        }
    }

    /// Point the client at another OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.endpoint.set_base_url(base_url.as_ref());
        self
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| embedding_error("API returned empty response".into()))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(embedding_error("cannot embed empty text".into()));
        }

        debug!(
            provider = PROVIDER,
            batch_size = texts.len(),
            model = %self.model,
            "embedding batch"
        );

        let request = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.request_dimensions,
        };
        let mut response: EmbeddingResponse =
            self.endpoint.post("embeddings", &request, embedding_error).await?;

        if response.data.len() != texts.len() {
            return Err(embedding_error(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }
        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// A [`TextGenerator`] backed by an OpenAI-compatible `/chat/completions` endpoint.
///
/// The prompt is sent as a single user message.
///
/// # Example
///
/// ```rust,ignore
/// use litrag::openai::OpenAIChatGenerator;
///
/// let chat = OpenAIChatGenerator::from_env()?.with_model("gpt-4o");
/// let text = chat.complete("Say hi", &GenerationOptions::default()).await?;
/// ```
pub struct OpenAIChatGenerator {
    endpoint: Endpoint,
    model: String,
}

impl OpenAIChatGenerator {
    /// Create a generator with the given API key and the default model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let endpoint = Endpoint::new(api_key.into()).map_err(generation_error)?;
        Ok(Self { endpoint, model: DEFAULT_CHAT_MODEL.into() })
    }

    /// Create a generator from `OPENAI_API_KEY` and `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self> {
        let endpoint = Endpoint::from_env().map_err(generation_error)?;
        Ok(Self { endpoint, model: DEFAULT_CHAT_MODEL.into() })
    }

    /// Point the client at another OpenAI-compatible server.
    pub fn with_base_url(mut self, base_url: impl AsRef<str>) -> Self {
        self.endpoint.set_base_url(base_url.as_ref());
        self
    }

    /// Set the chat model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop: Option<&'a [String]>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl TextGenerator for OpenAIChatGenerator {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str, options: &GenerationOptions) -> Result<String> {
        debug!(
            provider = PROVIDER,
            model = %self.model,
            prompt_len = prompt.len(),
            "chat completion"
        );

        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage { role: "user", content: prompt }],
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            top_p: options.top_p,
            stop: (!options.stop.is_empty()).then_some(options.stop.as_slice()),
        };
        let response: ChatResponse =
            self.endpoint.post("chat/completions", &request, generation_error).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| generation_error("API returned no completion".into()))
    }
}
