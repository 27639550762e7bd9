use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use manual_rag_core::{
    load_pages, ChunkAssembler, Embedder, IngestOptions, IngestReport, LineClassifier,
    RagContext, RagSettings, RetrievalResult, VectorIndex, DEFAULT_SOURCE,
};

pub struct JsonlWriter<W> {
    writer: W,
}

impl<W: Write> JsonlWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn write_record<T: Serialize>(&mut self, record: &T) -> Result<()> {
        let mut buf = serde_json::to_vec(record)?;
        buf.push(b'\n');
        self.writer.write_all(&buf)?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Source label for an input: explicit value, then the file name, then the default.
pub fn source_label(explicit: Option<&str>, input: &Path) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| {
            input
                .file_name()
                .and_then(|name| name.to_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_SOURCE.to_string())
}

pub fn ingest<E: Embedder, I: VectorIndex>(
    ctx: &mut RagContext<E, I>,
    input: &Path,
    opts: &IngestOptions,
) -> Result<IngestReport> {
    let pages = load_pages(input).with_context(|| format!("failed to load {}", input.display()))?;
    let report = ctx.ingest(&pages, opts)?;
    Ok(report)
}

pub fn write_chunks<W: Write>(settings: RagSettings, input: &Path, out: W) -> Result<usize> {
    let pages = load_pages(input).with_context(|| format!("failed to load {}", input.display()))?;
    let assembler = ChunkAssembler::new(settings.chunking, LineClassifier::new(settings.classifier));
    let chunks = assembler.assemble(&pages);
    let mut writer = JsonlWriter::new(out);
    for chunk in &chunks {
        writer.write_record(chunk)?;
    }
    writer.into_inner().flush()?;
    Ok(chunks.len())
}

pub fn chunk_output(out: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match out {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    })
}

pub fn print_retrieval<W: Write>(result: &RetrievalResult, json: bool, out: &mut W) -> Result<()> {
    if json {
        serde_json::to_writer_pretty(&mut *out, result)?;
        writeln!(out)?;
        return Ok(());
    }
    if let Some(filter) = &result.used_filter {
        writeln!(out, "filter: {filter}")?;
    }
    if result.is_empty() {
        writeln!(out, "no matching chunks")?;
    }
    for (rank, chunk) in result.results.iter().enumerate() {
        writeln!(
            out,
            "#{} [{} p.{}] score={:.4}",
            rank + 1,
            chunk.metadata.chapter,
            chunk.metadata.page,
            chunk.score
        )?;
        writeln!(out, "{}", chunk.text)?;
        writeln!(out)?;
    }
    writeln!(out, "search latency: {:.3}s", result.latency.as_secs_f64())?;
    Ok(())
}

pub fn print_chapters<E: Embedder, I: VectorIndex, W: Write>(
    ctx: &RagContext<E, I>,
    out: &mut W,
) -> Result<usize> {
    let chapters = ctx.chapters()?;
    for label in chapters.labels() {
        writeln!(out, "{label}")?;
    }
    Ok(chapters.len())
}
