use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::index::{MetadataField, VectorIndex};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChapterIndex {
    labels: BTreeSet<String>,
}

impl ChapterIndex {
    /// Reads the labels fresh from the index; never cached between queries.
    pub fn load<I: VectorIndex + ?Sized>(index: &I) -> Result<Self> {
        Ok(Self {
            labels: index.distinct_values(MetadataField::Chapter)?,
        })
    }

    pub fn labels(&self) -> impl Iterator<Item = &String> {
        self.labels.iter()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ChapterIndex {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self {
            labels: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreak {
    #[default]
    Lexicographic,
    Longest,
    Shortest,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    /// `2 * LCS / (|a| + |b|)` over chars.
    #[default]
    SequenceRatio,
    SorensenDice,
    NormalizedLevenshtein,
    JaroWinkler,
}

impl Similarity {
    pub fn score(&self, a: &str, b: &str) -> f64 {
        let a = a.to_lowercase();
        let b = b.to_lowercase();
        match self {
            Similarity::SequenceRatio => sequence_ratio(&a, &b),
            Similarity::SorensenDice => strsim::sorensen_dice(&a, &b),
            Similarity::NormalizedLevenshtein => strsim::normalized_levenshtein(&a, &b),
            Similarity::JaroWinkler => strsim::jaro_winkler(&a, &b),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Fuzzy scores must be strictly above this.
    pub threshold: f64,
    pub tie_break: TieBreak,
    pub similarity: Similarity,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            threshold: 0.55,
            tie_break: TieBreak::Lexicographic,
            similarity: Similarity::SequenceRatio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MatchKind {
    Substring,
    Fuzzy { score: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChapterMatch {
    pub label: String,
    #[serde(flatten)]
    pub kind: MatchKind,
}

#[derive(Debug, Clone, Default)]
pub struct ChapterDetector {
    config: DetectorConfig,
}

impl ChapterDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    pub fn detect(&self, query: &str, chapters: &ChapterIndex) -> Option<ChapterMatch> {
        if query.trim().is_empty() {
            return None;
        }
        let q = query.to_lowercase();
        let labels = || chapters.labels().filter(|label| !label.trim().is_empty());

        let substring = labels().filter(|label| {
            let label = label.to_lowercase();
            q.contains(&label) || label.contains(&q)
        });
        if let Some(label) = self.pick(substring) {
            debug!(chapter = %label, "chapter detected by substring");
            return Some(ChapterMatch {
                label: label.clone(),
                kind: MatchKind::Substring,
            });
        }

        let scored: Vec<(&String, f64)> = labels()
            .map(|label| (label, self.config.similarity.score(label, &q)))
            .filter(|(_, score)| *score > self.config.threshold)
            .collect();
        let best = scored
            .iter()
            .map(|(_, score)| *score)
            .fold(None, |acc: Option<f64>, s| Some(acc.map_or(s, |a| a.max(s))))?;
        let tied = scored
            .iter()
            .filter(|(_, score)| *score == best)
            .map(|(label, _)| *label);
        let label = self.pick(tied)?;
        debug!(chapter = %label, score = best, "chapter detected by similarity");
        Some(ChapterMatch {
            label: label.clone(),
            kind: MatchKind::Fuzzy { score: best },
        })
    }

    pub fn detect_label(&self, query: &str, chapters: &ChapterIndex) -> Option<String> {
        self.detect(query, chapters).map(|m| m.label)
    }

    /// Candidates arrive in lexicographic order; only a strict improvement replaces the pick.
    fn pick<'a>(&self, candidates: impl Iterator<Item = &'a String>) -> Option<&'a String> {
        let len = |s: &String| s.chars().count();
        candidates.fold(None, |best, candidate| match (best, self.config.tie_break) {
            (None, _) => Some(candidate),
            (Some(b), TieBreak::Longest) if len(candidate) > len(b) => Some(candidate),
            (Some(b), TieBreak::Shortest) if len(candidate) < len(b) => Some(candidate),
            (Some(b), _) => Some(b),
        })
    }
}

fn sequence_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    2.0 * prev[b.len()] as f64 / total as f64
}
