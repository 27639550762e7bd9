use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RagError, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page_number: u32,
    pub text: String,
}

impl Page {
    pub fn new(page_number: u32, text: impl Into<String>) -> Self {
        Self {
            page_number,
            text: text.into(),
        }
    }
}

/// Loads a manual as an ordered list of pages.
pub fn load_pages(path: &Path) -> Result<Vec<Page>> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    let pages = match ext.as_str() {
        "pdf" => pdf_to_pages(path)?,
        "txt" | "text" | "md" => pages_from_text(&fs::read_to_string(path)?),
        _ => return Err(RagError::UnsupportedInput(path.to_path_buf())),
    };
    info!(path = %path.display(), pages = pages.len(), "loaded manual");
    Ok(pages)
}

pub fn pages_from_text(text: &str) -> Vec<Page> {
    text.split('\u{c}')
        .enumerate()
        .map(|(idx, chunk)| Page::new(idx as u32 + 1, chunk))
        .collect()
}

fn pdf_to_pages(path: &Path) -> Result<Vec<Page>> {
    let pages = pdf_extract::extract_text_by_pages(path).map_err(|e| RagError::Pdf {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(pages
        .into_iter()
        .enumerate()
        .map(|(idx, text)| Page::new(idx as u32 + 1, text))
        .collect())
}
