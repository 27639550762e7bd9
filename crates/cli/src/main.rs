mod cli;
mod commands;
mod config;
mod logging;

use std::io::{self, Write};

use anyhow::Result;
use clap::Parser;
use tracing::info;

use manual_rag_core::{IngestOptions, RagContext};
use manual_rag_store::{EmbeddingClient, SqliteIndex};

use crate::cli::{ChunkArgs, Cli, Command};
use crate::config::{load_config, AppConfig};

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose || logging::env_flag());
    let config = load_config(&cli.config)?;

    match &cli.command {
        Command::Ingest {
            input,
            chunking,
            source,
            batch_size,
            append,
        } => {
            let mut ctx = open_context(&cli, &config, chunking)?;
            let defaults = IngestOptions::default();
            let opts = IngestOptions {
                source: commands::source_label(
                    source.as_deref().or(config.ingest.source.as_deref()),
                    input,
                ),
                batch_size: batch_size
                    .or(config.ingest.batch_size)
                    .unwrap_or(defaults.batch_size),
                recreate: !append,
            };
            let report = commands::ingest(&mut ctx, input, &opts)?;
            info!(
                collection = %cli.collection,
                embedder = ctx.embedder().backend_name(),
                "ingest finished"
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Chunks {
            input,
            chunking,
            out,
        } => {
            let sink = commands::chunk_output(out.as_deref())?;
            let written = commands::write_chunks(config.settings(chunking), input, sink)?;
            info!(chunks = written, "wrote chunks");
        }
        Command::Query { question, k, json } => {
            let ctx = open_context(&cli, &config, &ChunkArgs::default())?;
            let result = ctx.retrieve(question, *k)?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            commands::print_retrieval(&result, *json, &mut out)?;
            out.flush()?;
        }
        Command::Chapters => {
            let ctx = open_context(&cli, &config, &ChunkArgs::default())?;
            let stdout = io::stdout();
            let mut out = stdout.lock();
            let count = commands::print_chapters(&ctx, &mut out)?;
            out.flush()?;
            info!(chapters = count, collection = %cli.collection, "listed chapters");
        }
    }
    Ok(())
}

fn open_context(
    cli: &Cli,
    config: &AppConfig,
    chunking: &ChunkArgs,
) -> Result<RagContext<EmbeddingClient, SqliteIndex>> {
    let embedder = EmbeddingClient::from_env()?;
    let index = SqliteIndex::open(&cli.db, &cli.collection)?;
    Ok(RagContext::new(embedder, index, config.settings(chunking)))
}
