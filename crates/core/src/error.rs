use std::fmt::Display;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("pdf extract failed for {path:?}: {message}")]
    Pdf { path: PathBuf, message: String },
    #[error("unsupported input format: {0:?}")]
    UnsupportedInput(PathBuf),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("embedding error: {0}")]
    Embedding(String),
    #[error("index error: {0}")]
    Index(String),
    #[error("other: {0}")]
    Other(String),
}

impl RagError {
    pub fn embedding(err: impl Display) -> Self {
        Self::Embedding(err.to_string())
    }

    pub fn index(err: impl Display) -> Self {
        Self::Index(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RagError>;

impl From<anyhow::Error> for RagError {
    fn from(value: anyhow::Error) -> Self {
        Self::Other(value.to_string())
    }
}
