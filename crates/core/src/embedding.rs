use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::{RagError, Result};

/// Turns texts into fixed-length, unit-normalized vectors, one per input, in order.
pub trait Embedder {
    fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let inputs = vec![text.to_string()];
        self.embed_batch(&inputs)?
            .pop()
            .ok_or_else(|| RagError::Embedding("embedder returned no vector".to_string()))
    }
}

impl<E: Embedder + ?Sized> Embedder for &E {
    fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(inputs)
    }
}

impl<E: Embedder + ?Sized> Embedder for Box<E> {
    fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed_batch(inputs)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct HashEmbedderConfig {
    pub dimensions: usize,
    pub seed: u64,
}

impl Default for HashEmbedderConfig {
    fn default() -> Self {
        Self {
            dimensions: 64,
            seed: 1337,
        }
    }
}

/// Offline bag-of-words embedder based on feature hashing.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    config: HashEmbedderConfig,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(HashEmbedderConfig::default())
    }
}

impl HashEmbedder {
    pub fn new(config: HashEmbedderConfig) -> Self {
        Self { config }
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions.max(1)
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions()];
        for token in text.split_whitespace() {
            let bucket = self.bucket_for(token);
            vector[bucket] += 1.0;
        }
        normalize(&mut vector);
        vector
    }

    fn bucket_for(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        hasher.write_u64(self.config.seed);
        token.to_lowercase().hash(&mut hasher);
        (hasher.finish() as usize) % self.dimensions()
    }
}

impl Embedder for HashEmbedder {
    fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}
