mod backend;
mod cli;

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use litrag::{AnswerPipeline, ContextRetriever, Ingestor};
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::backend::{Backends, read_passages};
use crate::cli::{Cli, Command};

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    let backends = Backends::resolve(&cli).await?;

    match &cli.command {
        Command::Ingest { passages } => {
            if !backends.persistent {
                warn!("ingesting into the in-memory store; passages are dropped on exit");
            }
            let passages = read_passages(passages)?;
            let written = Ingestor::new(backends.embedder, backends.store)
                .with_retry(backends.config.retry)
                .ingest(&backends.config.collection, passages)
                .await?;
            print_json(&serde_json::json!({
                "collection": backends.config.collection,
                "written": written,
            }))?;
        }
        Command::Search { query, k, expand } => {
            let retriever = build_retriever(backends)?;
            let config = retriever.config();
            let k = k.unwrap_or(config.top_k);
            let expand = expand.unwrap_or(config.expand_to_n);
            let passages = retriever.search(query, k, expand).await?;
            info!(results = passages.len(), "search finished");
            print_json(&passages)?;
        }
        Command::Answer { question } => {
            let generator = backends.generator.clone();
            let mut pipeline = AnswerPipeline::new(Arc::new(build_retriever(backends)?));
            match generator {
                Some(generator) => pipeline = pipeline.with_generator(generator),
                None => warn!("no generator configured, printing the grounded prompt only"),
            }
            print_json(&pipeline.answer(question).await?)?;
        }
    }

    Ok(())
}

fn build_retriever(backends: Backends) -> Result<ContextRetriever> {
    let mut builder = ContextRetriever::builder()
        .config(backends.config)
        .embedding_provider(backends.embedder)
        .vector_store(backends.store);
    if let Some(generator) = backends.generator {
        builder = builder.generator(generator);
    }
    Ok(builder.build()?)
}
