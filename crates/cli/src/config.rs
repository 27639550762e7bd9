use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use manual_rag_core::{ChunkConfig, ClassifierConfig, DetectorConfig, RagSettings};

use crate::cli::ChunkArgs;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chunking: ChunkConfig,
    pub classifier: ClassifierConfig,
    pub detector: DetectorConfig,
    pub ingest: IngestDefaults,
}

#[derive(Debug, Default, Deserialize)]
pub struct IngestDefaults {
    pub batch_size: Option<usize>,
    pub source: Option<String>,
}

impl AppConfig {
    /// File values with command-line overrides applied on top.
    pub fn settings(&self, overrides: &ChunkArgs) -> RagSettings {
        let mut chunking = self.chunking;
        if let Some(size) = overrides.chunk_size {
            chunking.chunk_size = size;
        }
        if let Some(overlap) = overrides.chunk_overlap {
            chunking.chunk_overlap = overlap;
        }
        RagSettings {
            chunking,
            classifier: self.classifier.clone(),
            detector: self.detector,
        }
    }
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    toml::from_str(&contents).map_err(|e| anyhow!("invalid config: {e}"))
}
