use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::chunk::Chunk;
use crate::error::{RagError, Result};

pub const DEFAULT_SOURCE: &str = "manual.pdf";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub source: String,
    pub chapter: String,
    pub page: u32,
}

impl ChunkMetadata {
    pub fn for_chunk(chunk: &Chunk, source: &str) -> Self {
        Self {
            source: source.to_string(),
            chapter: chunk.chapter.clone(),
            page: chunk.page,
        }
    }

    pub fn value(&self, field: MetadataField) -> String {
        match field {
            MetadataField::Source => self.source.clone(),
            MetadataField::Chapter => self.chapter.clone(),
            MetadataField::Page => self.page.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataField {
    Source,
    Chapter,
    Page,
}

impl MetadataField {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataField::Source => "source",
            MetadataField::Chapter => "chapter",
            MetadataField::Page => "page",
        }
    }

    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "source" => Ok(Self::Source),
            "chapter" => Ok(Self::Chapter),
            "page" => Ok(Self::Page),
            other => Err(RagError::Index(format!("unknown metadata field {other}"))),
        }
    }
}

impl fmt::Display for MetadataField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFilter {
    pub field: MetadataField,
    pub value: String,
}

impl MetadataFilter {
    pub fn chapter(label: impl Into<String>) -> Self {
        Self {
            field: MetadataField::Chapter,
            value: label.into(),
        }
    }

    pub fn matches(&self, metadata: &ChunkMetadata) -> bool {
        metadata.value(self.field) == self.value
    }
}

impl fmt::Display for MetadataFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.field, self.value)
    }
}

impl Serialize for MetadataFilter {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.field.as_str(), &self.value)?;
        map.end()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

pub trait VectorIndex {
    fn upsert(&mut self, records: &[IndexRecord]) -> Result<()>;

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>>;

    fn distinct_values(&self, field: MetadataField) -> Result<BTreeSet<String>>;

    fn count(&self) -> Result<usize>;

    fn delete_all(&mut self) -> Result<()>;

    fn recreate(&mut self) -> Result<()>;
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryIndex {
    records: Vec<IndexRecord>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VectorIndex for InMemoryIndex {
    fn upsert(&mut self, records: &[IndexRecord]) -> Result<()> {
        for record in records {
            match self.records.iter_mut().find(|r| r.id == record.id) {
                Some(existing) => *existing = record.clone(),
                None => self.records.push(record.clone()),
            }
        }
        Ok(())
    }

    fn search(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchHit>> {
        let mut hits: Vec<SearchHit> = self
            .records
            .iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.metadata)))
            .map(|r| SearchHit {
                id: r.id.clone(),
                text: r.text.clone(),
                metadata: r.metadata.clone(),
                score: cosine_similarity(query, &r.embedding),
            })
            .collect();
        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    fn distinct_values(&self, field: MetadataField) -> Result<BTreeSet<String>> {
        Ok(self.records.iter().map(|r| r.metadata.value(field)).collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn delete_all(&mut self) -> Result<()> {
        self.records.clear();
        Ok(())
    }

    fn recreate(&mut self) -> Result<()> {
        self.records = Vec::new();
        Ok(())
    }
}

/// Stable descending sort; equal scores keep storage order.
pub fn sort_hits(hits: &mut [SearchHit]) {
    hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut a_norm = 0.0f32;
    let mut b_norm = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        a_norm += x * x;
        b_norm += y * y;
    }
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    dot / (a_norm.sqrt() * b_norm.sqrt())
}
