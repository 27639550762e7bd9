use serde::{Deserialize, Serialize};

use crate::chapter::{ChapterDetector, ChapterIndex, DetectorConfig};
use crate::chunk::{ChunkAssembler, ChunkConfig};
use crate::classify::{ClassifierConfig, LineClassifier};
use crate::embedding::Embedder;
use crate::error::Result;
use crate::index::VectorIndex;
use crate::ingest::{ingest_pages, IngestOptions, IngestReport};
use crate::page::Page;
use crate::retrieve::{RetrievalResult, Retriever};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub chunking: ChunkConfig,
    pub classifier: ClassifierConfig,
    pub detector: DetectorConfig,
}

/// Collaborators and policies shared by ingestion and retrieval.
pub struct RagContext<E, I> {
    embedder: E,
    index: I,
    assembler: ChunkAssembler,
    detector: ChapterDetector,
}

impl<E: Embedder, I: VectorIndex> RagContext<E, I> {
    pub fn new(embedder: E, index: I, settings: RagSettings) -> Self {
        let classifier = LineClassifier::new(settings.classifier);
        Self {
            embedder,
            index,
            assembler: ChunkAssembler::new(settings.chunking, classifier),
            detector: ChapterDetector::new(settings.detector),
        }
    }

    pub fn embedder(&self) -> &E {
        &self.embedder
    }

    pub fn index(&self) -> &I {
        &self.index
    }

    pub fn assembler(&self) -> &ChunkAssembler {
        &self.assembler
    }

    pub fn detector(&self) -> &ChapterDetector {
        &self.detector
    }

    pub fn ingest(&mut self, pages: &[Page], opts: &IngestOptions) -> Result<IngestReport> {
        ingest_pages(
            &self.assembler,
            &self.embedder,
            &mut self.index,
            pages,
            opts,
        )
    }

    pub fn retriever(&self) -> Retriever<'_, E, I> {
        Retriever::new(&self.embedder, &self.index, &self.detector)
    }

    pub fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        self.retriever().retrieve(query, k)
    }

    pub fn chapters(&self) -> Result<ChapterIndex> {
        ChapterIndex::load(&self.index)
    }

    pub fn into_parts(self) -> (E, I) {
        (self.embedder, self.index)
    }
}
