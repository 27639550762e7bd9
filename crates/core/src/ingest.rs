use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info};

use crate::chunk::{Chunk, ChunkAssembler};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::{ChunkMetadata, IndexRecord, VectorIndex, DEFAULT_SOURCE};
use crate::page::Page;

#[derive(Debug, Clone)]
pub struct IngestOptions {
    /// Stored as the `source` metadata of every chunk.
    pub source: String,
    pub batch_size: usize,
    pub recreate: bool,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            source: DEFAULT_SOURCE.to_string(),
            batch_size: 64,
            recreate: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub pages: usize,
    pub toc_pages_skipped: usize,
    pub chunks: usize,
    #[serde(rename = "elapsed_secs", serialize_with = "duration_secs")]
    pub elapsed: Duration,
}

fn duration_secs<S: serde::Serializer>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

// Batches already written stay in the index if a later batch fails.
pub fn ingest_pages<E, I>(
    assembler: &ChunkAssembler,
    embedder: &E,
    index: &mut I,
    pages: &[Page],
    opts: &IngestOptions,
) -> Result<IngestReport>
where
    E: Embedder + ?Sized,
    I: VectorIndex + ?Sized,
{
    let start = Instant::now();
    let toc_pages_skipped = pages
        .iter()
        .filter(|p| {
            assembler
                .classifier()
                .is_table_of_contents_page(&p.text, p.page_number)
        })
        .count();
    let chunks = assembler.assemble(pages);
    info!(
        pages = pages.len(),
        toc_pages_skipped,
        chunks = chunks.len(),
        "split manual into chapter-aware chunks"
    );

    if opts.recreate {
        index.recreate()?;
    }
    store_chunks(embedder, index, &chunks, opts)?;

    let report = IngestReport {
        pages: pages.len(),
        toc_pages_skipped,
        chunks: chunks.len(),
        elapsed: start.elapsed(),
    };
    info!(
        chunks = report.chunks,
        elapsed_secs = report.elapsed.as_secs_f64(),
        "stored chunks"
    );
    Ok(report)
}

pub fn store_chunks<E, I>(
    embedder: &E,
    index: &mut I,
    chunks: &[Chunk],
    opts: &IngestOptions,
) -> Result<()>
where
    E: Embedder + ?Sized,
    I: VectorIndex + ?Sized,
{
    for batch in chunks.chunks(opts.batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed_batch(&texts)?;
        if embeddings.len() != batch.len() {
            return Err(RagError::Embedding(format!(
                "expected {} vectors, embedder returned {}",
                batch.len(),
                embeddings.len()
            )));
        }
        let records: Vec<IndexRecord> = batch
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexRecord {
                id: chunk.id.clone(),
                text: chunk.text.clone(),
                metadata: ChunkMetadata::for_chunk(chunk, &opts.source),
                embedding,
            })
            .collect();
        index.upsert(&records)?;
        debug!(batch = records.len(), "upserted batch");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::LineClassifier;
    use crate::chunk::ChunkConfig;
    use crate::embedding::HashEmbedder;
    use crate::index::{InMemoryIndex, MetadataField};
    use std::cell::Cell;

    fn assembler() -> ChunkAssembler {
        ChunkAssembler::new(
            ChunkConfig {
                chunk_size: 4,
                chunk_overlap: 1,
            },
            LineClassifier::default(),
        )
    }

    fn pages() -> Vec<Page> {
        vec![
            Page::new(
                1,
                "Contents\nSetup ..... 12\nGuide Mode ..... 20\nMenus ..... 30\nMovie ..... 40\nIndex 99",
            ),
            Page::new(12, "Setup\nSet the clock before first use.\nThen pick a language."),
            Page::new(20, "Guide Mode 20\nTurn the dial to the help position."),
        ]
    }

    struct CountingEmbedder {
        inner: HashEmbedder,
        calls: Cell<usize>,
        fail_on: Option<usize>,
    }

    impl Embedder for CountingEmbedder {
        fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            if self.fail_on == Some(call) {
                return Err(RagError::Embedding("quota exceeded".to_string()));
            }
            self.inner.embed_batch(inputs)
        }
    }

    #[test]
    fn ingest_reports_and_stores_every_chunk() {
        let mut index = InMemoryIndex::new();
        let embedder = HashEmbedder::default();
        let report = ingest_pages(
            &assembler(),
            &embedder,
            &mut index,
            &pages(),
            &IngestOptions::default(),
        )
        .unwrap();
        assert_eq!(report.pages, 3);
        assert_eq!(report.toc_pages_skipped, 1);
        assert_eq!(report.chunks, index.count().unwrap());
        let chapters = index.distinct_values(MetadataField::Chapter).unwrap();
        assert_eq!(
            chapters.into_iter().collect::<Vec<_>>(),
            vec!["Guide Mode".to_string(), "Setup".to_string()]
        );
        let sources = index.distinct_values(MetadataField::Source).unwrap();
        assert!(sources.contains(DEFAULT_SOURCE));
    }

    #[test]
    fn batches_follow_batch_size() {
        let mut index = InMemoryIndex::new();
        let embedder = CountingEmbedder {
            inner: HashEmbedder::default(),
            calls: Cell::new(0),
            fail_on: None,
        };
        let opts = IngestOptions {
            batch_size: 2,
            ..IngestOptions::default()
        };
        let report = ingest_pages(&assembler(), &embedder, &mut index, &pages(), &opts).unwrap();
        assert_eq!(embedder.calls.get(), (report.chunks + 1) / 2);
    }

    #[test]
    fn failed_batch_keeps_earlier_batches() {
        let mut index = InMemoryIndex::new();
        let embedder = CountingEmbedder {
            inner: HashEmbedder::default(),
            calls: Cell::new(0),
            fail_on: Some(2),
        };
        let opts = IngestOptions {
            batch_size: 1,
            ..IngestOptions::default()
        };
        let err = ingest_pages(&assembler(), &embedder, &mut index, &pages(), &opts).unwrap_err();
        assert!(matches!(err, RagError::Embedding(_)));
        assert_eq!(index.count().unwrap(), 1);
    }

    #[test]
    fn recreate_clears_previous_run() {
        let mut index = InMemoryIndex::new();
        let embedder = HashEmbedder::default();
        let opts = IngestOptions::default();
        let first = ingest_pages(&assembler(), &embedder, &mut index, &pages(), &opts).unwrap();
        let second = ingest_pages(&assembler(), &embedder, &mut index, &pages()[..2], &opts).unwrap();
        assert!(second.chunks < first.chunks);
        assert_eq!(index.count().unwrap(), second.chunks);
    }
}
