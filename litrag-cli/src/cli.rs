use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Retrieve grounded context from an indexed literature corpus.
#[derive(Parser, Debug)]
#[command(name = "litrag", version, about)]
pub struct Cli {
    /// JSON file with retriever settings; unset fields keep their defaults
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Collection to read from and write to (overrides the config file)
    #[arg(long, global = true)]
    pub collection: Option<String>,

    /// Qdrant gRPC endpoint; without it an in-memory store is used
    #[arg(long, global = true, env = "LITRAG_QDRANT_URL")]
    pub qdrant_url: Option<String>,

    /// JSON Lines passages loaded into the in-memory store at start
    #[arg(long, global = true)]
    pub corpus: Option<PathBuf>,

    /// Chat model used for query rewriting and answers
    #[arg(long, global = true, env = "LITRAG_CHAT_MODEL")]
    pub chat_model: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Embed passages from a JSON Lines file and store them
    Ingest {
        /// One passage object per line: `id`, `document_id`, `text`, optional provenance
        passages: PathBuf,
    },
    /// Print the passages retrieved for a question
    Search {
        query: String,

        /// Number of passages to return
        #[arg(short, long)]
        k: Option<usize>,

        /// Number of query variants to search with
        #[arg(long)]
        expand: Option<usize>,
    },
    /// Retrieve context and answer a question
    Answer { question: String },
}
