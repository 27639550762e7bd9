use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::classify::{split_lines, LineClass, LineClassifier};
use crate::page::Page;

pub const UNKNOWN_CHAPTER: &str = "Unknown";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            chunk_overlap: 100,
        }
    }
}

impl ChunkConfig {
    /// Overlap stays below the split size.
    fn effective(&self) -> (usize, usize) {
        let chunk_size = self.chunk_size.max(1);
        let overlap = self.chunk_overlap.min(chunk_size.saturating_sub(1));
        (chunk_size, overlap)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub chapter: String,
    pub page: u32,
}

impl Chunk {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

pub struct ChunkAssembler {
    config: ChunkConfig,
    classifier: LineClassifier,
}

impl ChunkAssembler {
    pub fn new(config: ChunkConfig, classifier: LineClassifier) -> Self {
        Self { config, classifier }
    }

    pub fn classifier(&self) -> &LineClassifier {
        &self.classifier
    }

    pub fn assemble(&self, pages: &[Page]) -> Vec<Chunk> {
        let (chunk_size, overlap) = self.config.effective();
        let mut state = AssemblyState::default();
        for page in pages {
            if self
                .classifier
                .is_table_of_contents_page(&page.text, page.page_number)
            {
                debug!(page = page.page_number, "skipping table of contents page");
                continue;
            }
            for line in split_lines(&page.text) {
                match self.classifier.classify_line(line) {
                    LineClass::Title(label) => {
                        debug!(page = page.page_number, chapter = %label, "chapter title");
                        state.chapter = label;
                    }
                    LineClass::Noise => {}
                    LineClass::Body(text) => {
                        state.append(text);
                        if state.words >= chunk_size {
                            state.emit(page.page_number);
                            state.carry_overlap(overlap);
                        }
                    }
                }
            }
            if !state.buffer.is_empty() {
                state.emit(page.page_number);
                state.clear();
            }
        }
        debug!(chunks = state.chunks.len(), "assembled chunks");
        state.chunks
    }
}

struct AssemblyState {
    chapter: String,
    buffer: String,
    words: usize,
    next_id: usize,
    chunks: Vec<Chunk>,
}

impl Default for AssemblyState {
    fn default() -> Self {
        Self {
            chapter: UNKNOWN_CHAPTER.to_string(),
            buffer: String::new(),
            words: 0,
            next_id: 0,
            chunks: Vec::new(),
        }
    }
}

impl AssemblyState {
    fn append(&mut self, text: &str) {
        if !self.buffer.is_empty() {
            self.buffer.push(' ');
        }
        self.buffer.push_str(text);
        self.words += text.split_whitespace().count();
    }

    fn emit(&mut self, page: u32) {
        self.chunks.push(Chunk {
            id: format!("chunk_{}", self.next_id),
            text: self.buffer.clone(),
            chapter: self.chapter.clone(),
            page,
        });
        self.next_id += 1;
    }

    fn carry_overlap(&mut self, overlap: usize) {
        let words: Vec<&str> = self.buffer.split_whitespace().collect();
        let carried = words[words.len().saturating_sub(overlap)..].join(" ");
        self.words = words.len().min(overlap);
        self.buffer = carried;
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.words = 0;
    }
}
