use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

static PAGE_REFERENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s\d{1,3}$").expect("page reference regex"));
static TITLE_WITH_PAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z\s]+ \d{1,3}$").expect("title regex"));

const LINE_BREAK_CHARS: &[char] = &[
    '\n', '\r', '\x0b', '\x0c', '\x1c', '\x1d', '\x1e', '\u{85}', '\u{2028}', '\u{2029}',
];

static LINE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\r\n|[\n\r\x0b\x0c\x1c-\x1e\x{85}\x{2028}\x{2029}]").expect("line break regex")
});

const TOC_DOT_LEADER: &str = "...";

/// Tunables for the line heuristics. Defaults are tuned for camera manuals.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub toc_page_limit: u32,
    pub toc_line_threshold: usize,
    pub section_keywords: Vec<String>,
    /// Keyword titles must be strictly shorter than this, in chars.
    pub max_section_label_chars: usize,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            toc_page_limit: 10,
            toc_line_threshold: 5,
            section_keywords: ["menu", "mode", "playback", "shooting", "movie", "setup", "guide"]
                .iter()
                .map(|kw| kw.to_string())
                .collect(),
            max_section_label_chars: 45,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineClass<'a> {
    Noise,
    Title(String),
    Body(&'a str),
}

#[derive(Debug, Clone)]
pub struct LineClassifier {
    config: ClassifierConfig,
    keywords: Vec<String>,
}

impl Default for LineClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl LineClassifier {
    pub fn new(config: ClassifierConfig) -> Self {
        let keywords = config
            .section_keywords
            .iter()
            .map(|kw| kw.to_lowercase())
            .filter(|kw| !kw.is_empty())
            .collect();
        Self { config, keywords }
    }

    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    pub fn is_table_of_contents_page(&self, text: &str, page_number: u32) -> bool {
        if page_number > self.config.toc_page_limit {
            return false;
        }
        let listing_lines = split_lines(text)
            .filter(|line| line.contains(TOC_DOT_LEADER) || PAGE_REFERENCE.is_match(line))
            .count();
        listing_lines >= self.config.toc_line_threshold
    }

    pub fn is_chapter_title(&self, line: &str) -> bool {
        let line = line.trim();
        if line.is_empty() {
            return false;
        }
        if TITLE_WITH_PAGE.is_match(line) {
            return true;
        }
        let lower = line.to_lowercase();
        self.keywords.iter().any(|kw| lower.contains(kw.as_str()))
            && line.chars().count() < self.config.max_section_label_chars
    }

    pub fn classify_line<'a>(&self, line: &'a str) -> LineClass<'a> {
        if self.is_chapter_title(line) {
            return LineClass::Title(chapter_label(line));
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            LineClass::Noise
        } else {
            LineClass::Body(trimmed)
        }
    }
}

/// Splits on `\r\n` and every single-char line break; a trailing break adds no empty line.
pub fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    let text = text
        .strip_suffix("\r\n")
        .or_else(|| text.strip_suffix(LINE_BREAK_CHARS))
        .unwrap_or(text);
    LINE_BREAK.split(text)
}

/// Normalizes a heading into a chapter label by dropping a trailing page number.
pub fn chapter_label(line: &str) -> String {
    PAGE_REFERENCE.replace(line.trim(), "").into_owned()
}
