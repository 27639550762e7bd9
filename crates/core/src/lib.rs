mod chapter;
mod chunk;
mod classify;
mod context;
mod embedding;
mod error;
mod index;
mod ingest;
mod page;
mod retrieve;

pub use chapter::{
    ChapterDetector, ChapterIndex, ChapterMatch, DetectorConfig, MatchKind, Similarity, TieBreak,
};
pub use chunk::{Chunk, ChunkAssembler, ChunkConfig, UNKNOWN_CHAPTER};
pub use classify::{chapter_label, split_lines, ClassifierConfig, LineClass, LineClassifier};
pub use context::{RagContext, RagSettings};
pub use embedding::{Embedder, HashEmbedder, HashEmbedderConfig};
pub use error::{RagError, Result};
pub use index::{
    cosine_similarity, sort_hits, ChunkMetadata, IndexRecord, InMemoryIndex, MetadataField,
    MetadataFilter, SearchHit, VectorIndex, DEFAULT_SOURCE,
};
pub use ingest::{ingest_pages, store_chunks, IngestOptions, IngestReport};
pub use page::{load_pages, pages_from_text, Page};
pub use retrieve::{RetrievalResult, RetrievedChunk, Retriever};
