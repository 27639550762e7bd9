use std::time::{Duration, Instant};

use serde::{Serialize, Serializer};
use tracing::info;

use crate::chapter::{ChapterDetector, ChapterIndex};
use crate::embedding::Embedder;
use crate::error::{RagError, Result};
use crate::index::{ChunkMetadata, MetadataFilter, SearchHit, VectorIndex};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedChunk {
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

impl From<SearchHit> for RetrievedChunk {
    fn from(hit: SearchHit) -> Self {
        Self {
            text: hit.text,
            metadata: hit.metadata,
            score: hit.score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub results: Vec<RetrievedChunk>,
    /// Time spent in the similarity search only.
    #[serde(serialize_with = "duration_secs")]
    pub latency: Duration,
    pub used_filter: Option<MetadataFilter>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

fn duration_secs<S: Serializer>(
    value: &Duration,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

pub struct Retriever<'a, E: ?Sized, I: ?Sized> {
    embedder: &'a E,
    index: &'a I,
    detector: &'a ChapterDetector,
}

impl<'a, E, I> Retriever<'a, E, I>
where
    E: Embedder + ?Sized,
    I: VectorIndex + ?Sized,
{
    pub fn new(embedder: &'a E, index: &'a I, detector: &'a ChapterDetector) -> Self {
        Self {
            embedder,
            index,
            detector,
        }
    }

    pub fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(RagError::InvalidArgument(
                "k must be at least 1".to_string(),
            ));
        }
        let query_embedding = self.embedder.embed(query)?;
        let chapters = ChapterIndex::load(self.index)?;
        let used_filter = self
            .detector
            .detect_label(query, &chapters)
            .map(MetadataFilter::chapter);

        let start = Instant::now();
        let hits = self
            .index
            .search(&query_embedding, k, used_filter.as_ref())?;
        let latency = start.elapsed();

        info!(
            results = hits.len(),
            latency_ms = latency.as_secs_f64() * 1000.0,
            filter = ?used_filter.as_ref().map(|f| f.to_string()),
            "retrieval finished"
        );
        Ok(RetrievalResult {
            results: hits.into_iter().map(RetrievedChunk::from).collect(),
            latency,
            used_filter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedder;
    use crate::index::{IndexRecord, InMemoryIndex, MetadataField, DEFAULT_SOURCE};
    use std::cell::RefCell;
    use std::collections::BTreeSet;

    struct RecordingIndex {
        inner: InMemoryIndex,
        filters: RefCell<Vec<Option<MetadataFilter>>>,
    }

    impl VectorIndex for RecordingIndex {
        fn upsert(&mut self, records: &[IndexRecord]) -> Result<()> {
            self.inner.upsert(records)
        }

        fn search(
            &self,
            query: &[f32],
            k: usize,
            filter: Option<&MetadataFilter>,
        ) -> Result<Vec<SearchHit>> {
            self.filters.borrow_mut().push(filter.cloned());
            self.inner.search(query, k, filter)
        }

        fn distinct_values(&self, field: MetadataField) -> Result<BTreeSet<String>> {
            self.inner.distinct_values(field)
        }

        fn count(&self) -> Result<usize> {
            self.inner.count()
        }

        fn delete_all(&mut self) -> Result<()> {
            self.inner.delete_all()
        }

        fn recreate(&mut self) -> Result<()> {
            self.inner.recreate()
        }
    }

    struct BrokenEmbedder;

    impl Embedder for BrokenEmbedder {
        fn embed_batch(&self, _inputs: &[String]) -> Result<Vec<Vec<f32>>> {
            Err(RagError::Embedding("model offline".to_string()))
        }
    }

    fn corpus(embedder: &HashEmbedder) -> RecordingIndex {
        let rows = [
            ("chunk_0", "Guide Mode", "Use the guide mode dial for help."),
            ("chunk_1", "Guide Mode", "Guide mode shows simple menus."),
            ("chunk_2", "Playback Menu", "Delete pictures from the playback menu."),
            ("chunk_3", "Playback Menu", "Rotate tall pictures during playback."),
            ("chunk_4", "Setup", "Set the clock and language."),
            ("chunk_5", "Setup", "Format the memory card."),
        ];
        let records: Vec<IndexRecord> = rows
            .iter()
            .enumerate()
            .map(|(page, (id, chapter, text))| IndexRecord {
                id: id.to_string(),
                text: text.to_string(),
                metadata: ChunkMetadata {
                    source: DEFAULT_SOURCE.to_string(),
                    chapter: chapter.to_string(),
                    page: page as u32 + 11,
                },
                embedding: embedder.embed_text(text),
            })
            .collect();
        let mut index = RecordingIndex {
            inner: InMemoryIndex::new(),
            filters: RefCell::new(Vec::new()),
        };
        index.upsert(&records).unwrap();
        index
    }

    #[test]
    fn detected_chapter_becomes_filter_without_padding() {
        let embedder = HashEmbedder::default();
        let index = corpus(&embedder);
        let detector = ChapterDetector::default();
        let retriever = Retriever::new(&embedder, &index, &detector);
        let result = retriever.retrieve("how do I use guide mode", 5).unwrap();
        assert_eq!(result.results.len(), 2);
        assert!(result
            .results
            .iter()
            .all(|r| r.metadata.chapter == "Guide Mode"));
        assert_eq!(result.used_filter, Some(MetadataFilter::chapter("Guide Mode")));
        assert_eq!(
            index.filters.borrow().as_slice(),
            &[Some(MetadataFilter::chapter("Guide Mode"))]
        );
    }

    #[test]
    fn no_detection_searches_unfiltered() {
        let embedder = HashEmbedder::default();
        let index = corpus(&embedder);
        let detector = ChapterDetector::default();
        let retriever = Retriever::new(&embedder, &index, &detector);
        let result = retriever.retrieve("random unrelated text", 4).unwrap();
        assert!(result.used_filter.is_none());
        assert_eq!(result.results.len(), 4);
        assert_eq!(index.filters.borrow().as_slice(), &[None]);
        let scores: Vec<f32> = result.results.iter().map(|r| r.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
    }

    // Chapter list and searchable rows disagree, as after a partial reingest.
    struct StaleIndex {
        searches: RefCell<usize>,
    }

    impl VectorIndex for StaleIndex {
        fn upsert(&mut self, _records: &[IndexRecord]) -> Result<()> {
            Ok(())
        }

        fn search(
            &self,
            _query: &[f32],
            _k: usize,
            filter: Option<&MetadataFilter>,
        ) -> Result<Vec<SearchHit>> {
            *self.searches.borrow_mut() += 1;
            assert_eq!(filter, Some(&MetadataFilter::chapter("Movie Mode")));
            Ok(Vec::new())
        }

        fn distinct_values(&self, _field: MetadataField) -> Result<BTreeSet<String>> {
            Ok(BTreeSet::from(["Movie Mode".to_string()]))
        }

        fn count(&self) -> Result<usize> {
            Ok(0)
        }

        fn delete_all(&mut self) -> Result<()> {
            Ok(())
        }

        fn recreate(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn empty_filtered_search_is_not_retried() {
        let embedder = HashEmbedder::default();
        let index = StaleIndex {
            searches: RefCell::new(0),
        };
        let detector = ChapterDetector::default();
        let result = Retriever::new(&embedder, &index, &detector)
            .retrieve("record in movie mode", 3)
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.used_filter, Some(MetadataFilter::chapter("Movie Mode")));
        assert_eq!(*index.searches.borrow(), 1);
    }

    #[test]
    fn zero_k_is_rejected() {
        let embedder = HashEmbedder::default();
        let index = corpus(&embedder);
        let detector = ChapterDetector::default();
        let err = Retriever::new(&embedder, &index, &detector)
            .retrieve("setup", 0)
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidArgument(_)));
    }

    #[test]
    fn embedding_failure_propagates_unchanged() {
        let index = corpus(&HashEmbedder::default());
        let detector = ChapterDetector::default();
        let err = Retriever::new(&BrokenEmbedder, &index, &detector)
            .retrieve("setup", 3)
            .unwrap_err();
        assert!(matches!(err, RagError::Embedding(ref msg) if msg == "model offline"));
        assert!(index.filters.borrow().is_empty());
    }

    #[test]
    fn result_serializes_latency_in_seconds() {
        let result = RetrievalResult {
            results: Vec::new(),
            latency: Duration::from_millis(250),
            used_filter: Some(MetadataFilter::chapter("Setup")),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["latency"], 0.25);
        assert_eq!(json["used_filter"]["chapter"], "Setup");
    }
}
