use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use super::SubtitleSet;

static INDEX_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\d+\s*$").unwrap());

static TIMING_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{2}:\d{2}:\d{2},\d{3}\s*-->\s*\d{2}:\d{2}:\d{2},\d{3}").unwrap()
});

static INDEXED_TIMING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d+\s*\d{2}:\d{2}:\d{2},\d{3}\s*-->\s*\d{2}:\d{2}:\d{2},\d{3}").unwrap()
});

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One unit of narration input: a subtitle record (only its text matters) or
/// raw primary-format text.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum NarrationSource {
    Raw(String),
    Record { text: String },
}

impl NarrationSource {
    fn fragment(&self) -> String {
        match self {
            NarrationSource::Raw(raw) => strip_markup(raw),
            NarrationSource::Record { text } => text.clone(),
        }
    }
}

impl From<&SubtitleSet> for Vec<NarrationSource> {
    fn from(set: &SubtitleSet) -> Self {
        set.iter()
            .map(|record| NarrationSource::Record {
                text: record.text.clone(),
            })
            .collect()
    }
}

/// Remove index lines, timing lines and blank lines from primary-format text.
fn strip_markup(raw: &str) -> String {
    let without_index = INDEX_LINE.replace_all(raw, "");
    let without_timing = TIMING_LINE.replace_all(&without_index, "");

    without_timing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Flatten narration sources into plain text for speech synthesis.
///
/// Fragments are joined with single spaces, whitespace runs collapse to one
/// space, and any index-plus-timing residue left by the join is removed.
pub fn clean_narration(sources: &[NarrationSource]) -> String {
    let joined = sources
        .iter()
        .map(NarrationSource::fragment)
        .filter(|fragment| !fragment.trim().is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let collapsed = WHITESPACE.replace_all(&joined, " ");
    let cleaned = INDEXED_TIMING.replace_all(&collapsed, "");
    let cleaned = WHITESPACE.replace_all(&cleaned, " ");

    cleaned.trim().to_string()
}

impl SubtitleSet {
    /// Plain narration text with indices and timestamps stripped.
    pub fn narration_text(&self) -> String {
        clean_narration(&Vec::<NarrationSource>::from(self))
    }
}
