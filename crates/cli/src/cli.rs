use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

pub const DEFAULT_CONFIG: &str = "manual-rag.toml";

#[derive(Parser, Debug)]
#[command(
    name = "manual-rag",
    version,
    about = "Chapter-aware chunking and retrieval for technical manuals"
)]
pub struct Cli {
    #[arg(long, global = true, action = ArgAction::SetTrue)]
    pub verbose: bool,
    #[arg(long, global = true, default_value = DEFAULT_CONFIG)]
    pub config: PathBuf,
    #[arg(long, global = true, default_value = "manual_rag.sqlite")]
    pub db: PathBuf,
    #[arg(long, global = true, default_value = "manual_chunks")]
    pub collection: String,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Chunk a manual and store it, replacing the collection.
    Ingest {
        input: PathBuf,
        #[command(flatten)]
        chunking: ChunkArgs,
        /// Value stored as each chunk's `source`; defaults to the file name.
        #[arg(long)]
        source: Option<String>,
        #[arg(long = "batch-size")]
        batch_size: Option<usize>,
        /// Keep existing chunks instead of recreating the collection.
        #[arg(long, action = ArgAction::SetTrue)]
        append: bool,
    },
    /// Print the chunks a manual would produce as JSON Lines.
    Chunks {
        input: PathBuf,
        #[command(flatten)]
        chunking: ChunkArgs,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Retrieve the chunks most relevant to a question.
    Query {
        question: String,
        #[arg(short, long, default_value_t = 5)]
        k: usize,
        #[arg(long, action = ArgAction::SetTrue)]
        json: bool,
    },
    /// List the chapter labels currently stored.
    Chapters,
}

#[derive(Args, Debug, Clone, Default)]
pub struct ChunkArgs {
    #[arg(long = "chunk-size")]
    pub chunk_size: Option<usize>,
    #[arg(long = "chunk-overlap")]
    pub chunk_overlap: Option<usize>,
}
