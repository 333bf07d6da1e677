// Subtitle data model and interchange formats
//
// - srt: primary format (comma milliseconds), best-effort parser and writer
// - vtt: secondary cue format (dot milliseconds, mandatory header)
// - narration: flattening timed text into plain narration for speech synthesis

pub mod narration;
pub mod srt;
pub mod vtt;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tokio::fs;
use tracing::{info, warn};

use crate::error::{PipelineError, Result};

pub use narration::*;
pub use srt::*;
pub use vtt::*;

/// Millisecond-precision subtitle timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    millis: u64,
}

impl Timestamp {
    pub fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    pub fn as_millis(&self) -> u64 {
        self.millis
    }

    /// Parse `HH:MM:SS,mmm`. A dot is accepted in place of the comma, and a
    /// fraction shorter than three digits is right-padded (`,5` is 500ms).
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (clock, fraction) = match value.rfind([',', '.']) {
            Some(pos) => (&value[..pos], &value[pos + 1..]),
            None => (value, "0"),
        };

        let mut parts = clock.split(':');
        let hours = parse_digits(parts.next()?)?;
        let minutes = parse_digits(parts.next()?)?;
        let seconds = parse_digits(parts.next()?)?;
        if parts.next().is_some() || minutes > 59 || seconds > 59 {
            return None;
        }

        if fraction.is_empty() || fraction.len() > 3 {
            return None;
        }
        let millis = parse_digits(fraction)? * 10u64.pow(3 - fraction.len() as u32);

        let millis = hours
            .checked_mul(3_600_000)?
            .checked_add(minutes * 60_000 + seconds * 1_000 + millis)?;
        Some(Self { millis })
    }

    /// Format with the given millisecond separator.
    pub fn format_with(&self, separator: char) -> String {
        let hours = self.millis / 3_600_000;
        let minutes = (self.millis % 3_600_000) / 60_000;
        let seconds = (self.millis % 60_000) / 1_000;
        let millis = self.millis % 1_000;

        format!(
            "{:02}:{:02}:{:02}{}{:03}",
            hours, minutes, seconds, separator, millis
        )
    }

    /// Primary format (`HH:MM:SS,mmm`)
    pub fn to_srt(&self) -> String {
        self.format_with(',')
    }

    /// Secondary format (`HH:MM:SS.mmm`)
    pub fn to_vtt(&self) -> String {
        self.format_with('.')
    }
}

fn parse_digits(value: &str) -> Option<u64> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    value.parse().ok()
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_srt())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_srt())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Timestamp::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
    }
}

/// One timed subtitle block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleRecord {
    /// 1-based position as emitted by the transcriber
    pub index: u32,
    pub start: Timestamp,
    pub end: Timestamp,
    /// Text lines joined with `\n`
    pub text: String,
}

/// Ordered subtitle records, serialized as a plain JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubtitleSet {
    records: Vec<SubtitleRecord>,
}

impl SubtitleSet {
    pub fn new(records: Vec<SubtitleRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[SubtitleRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SubtitleRecord> {
        self.records.iter()
    }

    /// True when indices run `1..=N` without gaps, every record has
    /// `end > start`, and start times ascend with the index.
    pub fn is_well_formed(&self) -> bool {
        self.records.iter().enumerate().all(|(i, record)| {
            record.index as usize == i + 1 && record.end > record.start
        }) && self
            .records
            .windows(2)
            .all(|pair| pair[0].start <= pair[1].start)
    }

    /// Read and parse a primary-format file.
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::SubtitleNotFound(path.to_path_buf()),
            _ => PipelineError::Io(e),
        })?;

        let set = parse_srt(&content);
        info!("Parsed {} subtitle blocks from {}", set.len(), path.display());
        if !set.is_well_formed() {
            warn!("Subtitle blocks in {} are not sequential", path.display());
        }
        Ok(set)
    }

    /// Write the set in the secondary format.
    pub async fn save_vtt<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        fs::write(path, to_vtt(self)).await?;
        info!("Generated VTT file: {}", path.display());
        Ok(())
    }
}

impl<'a> IntoIterator for &'a SubtitleSet {
    type Item = &'a SubtitleRecord;
    type IntoIter = std::slice::Iter<'a, SubtitleRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.iter()
    }
}
