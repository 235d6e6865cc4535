//! Collaborator selection from flags and the environment.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use litrag::openai::{OpenAIChatGenerator, OpenAIEmbeddingProvider};
use litrag::{
    EmbeddingProvider, HashingEmbeddingProvider, InMemoryVectorStore, Ingestor, Passage,
    QdrantVectorStore, RetrieverConfig, TextGenerator, VectorStore,
};
use tracing::{info, warn};

use crate::cli::Cli;

/// Everything a command needs, resolved once at start-up.
pub struct Backends {
    pub config: RetrieverConfig,
    pub embedder: Arc<dyn EmbeddingProvider>,
    pub store: Arc<dyn VectorStore>,
    pub generator: Option<Arc<dyn TextGenerator>>,
    pub persistent: bool,
}

fn openai_configured() -> bool {
    std::env::var("OPENAI_API_KEY").is_ok_and(|key| !key.is_empty())
}

/// Read the optional config file and apply flag overrides.
pub fn load_config(cli: &Cli) -> Result<RetrieverConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            serde_json::from_str::<RetrieverConfig>(&raw)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => RetrieverConfig::default(),
    };
    if let Some(collection) = &cli.collection {
        config.collection = collection.clone();
    }
    config.validate()?;
    Ok(config)
}

/// Parse one passage per non-blank line.
pub fn read_passages(path: &Path) -> Result<Vec<Passage>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read passages {}", path.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            serde_json::from_str::<Passage>(line)
                .with_context(|| format!("{}:{}: invalid passage", path.display(), index + 1))
        })
        .collect()
}

impl Backends {
    pub async fn resolve(cli: &Cli) -> Result<Self> {
        let config = load_config(cli)?;

        let (embedder, generator): (Arc<dyn EmbeddingProvider>, Option<Arc<dyn TextGenerator>>) =
            if openai_configured() {
                let mut chat = OpenAIChatGenerator::from_env()?;
                if let Some(model) = &cli.chat_model {
                    chat = chat.with_model(model);
                }
                info!(generator = chat.name(), "using OpenAI-compatible embeddings and chat");
                let embedder: Arc<dyn EmbeddingProvider> =
                    Arc::new(OpenAIEmbeddingProvider::from_env()?);
                let generator: Arc<dyn TextGenerator> = Arc::new(chat);
                (embedder, Some(generator))
            } else {
                info!("OPENAI_API_KEY not set, using hashing embeddings without generation");
                (Arc::new(HashingEmbeddingProvider::new()) as Arc<dyn EmbeddingProvider>, None)
            };

        let (store, persistent): (Arc<dyn VectorStore>, bool) = match &cli.qdrant_url {
            Some(url) => {
                if cli.corpus.is_some() {
                    warn!("--corpus is ignored when a Qdrant URL is set");
                }
                info!(url = %url, "using qdrant vector store");
                (Arc::new(QdrantVectorStore::new(url)?) as Arc<dyn VectorStore>, true)
            }
            None => {
                let store = Arc::new(InMemoryVectorStore::new());
                if let Some(corpus) = &cli.corpus {
                    let passages = read_passages(corpus)?;
                    let written = Ingestor::new(embedder.clone(), store.clone())
                        .with_retry(config.retry)
                        .ingest(&config.collection, passages)
                        .await?;
                    info!(corpus = %corpus.display(), written, "loaded corpus into memory");
                }
                (store as Arc<dyn VectorStore>, false)
            }
        };

        if !persistent && cli.corpus.is_none() {
            warn!("no Qdrant URL or --corpus given, the in-memory store starts empty");
        }

        Ok(Self { config, embedder, store, generator, persistent })
    }
}
