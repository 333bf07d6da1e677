//! Artifact addressing.
//!
//! Every output of the pipeline is named from the upload's base filename plus a
//! step-specific suffix, so a step finds its inputs by convention alone:
//!
//! | artifact | location |
//! |---|---|
//! | upload | `uploads/<name>` |
//! | extracted audio | `uploads/<base>.wav` |
//! | subtitles | `outputs/<base>.srt`, `outputs/<base>.vtt`, `outputs/<base>.<lang>.srt` |
//! | burned video | `outputs/<base><suffix>_subtitled.mp4` |
//! | voice sample | `outputs/<base>_voice_prompt.wav` |
//! | synthesized speech | `outputs/<base>_<lang>_tts.wav` |
//! | remuxed video | `outputs/<base>_<lang>_tts_video.mp4` |
//!
//! When sessions are isolated, `uploads` and `outputs` gain a `<session id>`
//! directory level.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use walkdir::WalkDir;

use crate::config::StorageConfig;
use crate::error::{PipelineError, Result};

static LANGUAGE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]{2,3}(-[A-Za-z]{2,4})?$").unwrap());

/// Whisper model selectors accepted by the transcriber.
pub const MODEL_SIZES: &[&str] = &[
    "tiny", "tiny.en", "base", "base.en", "small", "small.en", "medium", "medium.en",
    "large", "large-v1", "large-v2", "large-v3", "turbo",
];

/// Replace every character outside `[A-Za-z0-9._-]` with `_`. Leading dots
/// are replaced too so the result is never hidden or a relative path.
pub fn sanitize_filename(name: &str) -> String {
    let name = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let leading_dots = sanitized.len() - sanitized.trim_start_matches('.').len();
    if leading_dots > 0 {
        sanitized.replace_range(..leading_dots, &"_".repeat(leading_dots));
    }

    if sanitized.is_empty() {
        "upload".to_string()
    } else {
        sanitized
    }
}

/// Filename with its last extension removed.
pub fn base_filename(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(pos) if pos > 0 => &filename[..pos],
        _ => filename,
    }
}

/// A stored video filename: a single path component that sanitization
/// leaves unchanged.
pub fn validate_video_filename(filename: &str) -> Result<&str> {
    if filename.trim().is_empty() {
        return Err(PipelineError::InvalidInput("No video filename provided".to_string()));
    }
    if sanitize_filename(filename) != filename {
        return Err(PipelineError::InvalidInput(format!(
            "Invalid video filename '{}'",
            filename
        )));
    }
    Ok(filename)
}

pub fn validate_language(code: &str) -> Result<&str> {
    if LANGUAGE_CODE.is_match(code) {
        Ok(code)
    } else {
        Err(PipelineError::InvalidInput(format!(
            "Invalid target language '{}'",
            code
        )))
    }
}

pub fn validate_model(model: &str) -> Result<&str> {
    if MODEL_SIZES.contains(&model) {
        Ok(model)
    } else {
        Err(PipelineError::InvalidInput(format!(
            "Unknown model '{}'. Valid models: {}",
            model,
            MODEL_SIZES.join(", ")
        )))
    }
}

/// Output-name suffix for multi-variant burns, sanitized to filename-safe text.
pub fn normalize_suffix(suffix: &str) -> String {
    if suffix.is_empty() {
        return String::new();
    }
    suffix
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// A produced file together with the path clients use to fetch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub url: String,
}

impl Serialize for ArtifactRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.url)
    }
}

/// Upload and output directories for one addressing scope, rooted at the
/// public directory served back to clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    public_dir: PathBuf,
    uploads_dir: PathBuf,
    outputs_dir: PathBuf,
}

impl ArtifactLayout {
    pub fn new(storage: &StorageConfig) -> Self {
        let public_dir = PathBuf::from(&storage.public_dir);
        Self {
            uploads_dir: public_dir.join(&storage.uploads_dir),
            outputs_dir: public_dir.join(&storage.outputs_dir),
            public_dir,
        }
    }

    /// Layout whose directories are prefixed with `namespace`.
    pub fn scoped(&self, namespace: &str) -> Self {
        Self {
            public_dir: self.public_dir.clone(),
            uploads_dir: self.uploads_dir.join(namespace),
            outputs_dir: self.outputs_dir.join(namespace),
        }
    }

    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    pub fn outputs_dir(&self) -> &Path {
        &self.outputs_dir
    }

    pub fn upload_path(&self, video_filename: &str) -> PathBuf {
        self.uploads_dir.join(video_filename)
    }

    pub fn audio_path(&self, video_filename: &str) -> PathBuf {
        self.uploads_dir
            .join(format!("{}.wav", base_filename(video_filename)))
    }

    pub fn srt_path(&self, base: &str) -> PathBuf {
        self.outputs_dir.join(format!("{}.srt", base))
    }

    pub fn vtt_path(&self, base: &str) -> PathBuf {
        self.outputs_dir.join(format!("{}.vtt", base))
    }

    pub fn translated_srt_path(&self, base: &str, language: &str) -> PathBuf {
        self.outputs_dir.join(format!("{}.{}.srt", base, language))
    }

    pub fn burned_video_path(&self, base: &str, suffix: &str) -> PathBuf {
        self.outputs_dir
            .join(format!("{}{}_subtitled.mp4", base, suffix))
    }

    pub fn voice_sample_path(&self, base: &str) -> PathBuf {
        self.outputs_dir.join(format!("{}_voice_prompt.wav", base))
    }

    pub fn speech_path(&self, base: &str, language: &str) -> PathBuf {
        self.outputs_dir
            .join(format!("{}_{}_tts.wav", base, language))
    }

    pub fn speech_video_path(&self, base: &str, language: &str) -> PathBuf {
        self.outputs_dir
            .join(format!("{}_{}_tts_video.mp4", base, language))
    }

    /// `/`-rooted path of `path` relative to the public directory.
    pub fn public_url(&self, path: &Path) -> String {
        let relative = pathdiff::diff_paths(path, &self.public_dir)
            .unwrap_or_else(|| path.to_path_buf());
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        format!("/{}", parts.join("/"))
    }

    pub fn artifact(&self, path: PathBuf) -> ArtifactRef {
        let url = self.public_url(&path);
        ArtifactRef { path, url }
    }

    /// Resolve a client-supplied public path (`/outputs/x.srt`) to a file
    /// under the public directory. Parent or absolute components are refused.
    pub fn resolve_public(&self, public_path: &str) -> Result<PathBuf> {
        let trimmed = public_path.trim().trim_start_matches('/');
        if trimmed.is_empty() {
            return Err(PipelineError::InvalidInput("No path provided".to_string()));
        }

        let relative = Path::new(trimmed);
        if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
            return Err(PipelineError::InvalidInput(format!(
                "Path '{}' escapes the public directory",
                public_path
            )));
        }
        Ok(self.public_dir.join(relative))
    }

    /// Artifacts present for `base`, recognized by naming convention only.
    pub fn discover(&self, base: &str) -> Vec<DiscoveredArtifact> {
        let mut found = Vec::new();

        for dir in [&self.uploads_dir, &self.outputs_dir] {
            for entry in WalkDir::new(dir)
                .min_depth(1)
                .max_depth(1)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().is_file())
            {
                let name = entry.file_name().to_string_lossy();
                if let Some(kind) = classify(base, &name) {
                    found.push(DiscoveredArtifact {
                        kind,
                        artifact: self.artifact(entry.path().to_path_buf()),
                    });
                }
            }
        }

        found.sort_by(|a, b| a.artifact.url.cmp(&b.artifact.url));
        found
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "variant")]
pub enum ArtifactKind {
    Upload,
    Audio,
    Subtitles,
    SubtitlesVtt,
    TranslatedSubtitles(String),
    BurnedVideo(String),
    VoiceSample,
    Speech(String),
    SpeechVideo(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredArtifact {
    #[serde(flatten)]
    pub kind: ArtifactKind,
    #[serde(rename = "path")]
    pub artifact: ArtifactRef,
}

fn is_language(code: &str) -> bool {
    LANGUAGE_CODE.is_match(code)
}

/// Kind of `name` if it belongs to `base`. Variant parts must be language
/// codes, so files of a sibling base such as `<base>_x` are not claimed.
fn classify(base: &str, name: &str) -> Option<ArtifactKind> {
    let rest = name.strip_prefix(base)?;

    if rest == ".wav" {
        return Some(ArtifactKind::Audio);
    }
    if rest == ".srt" {
        return Some(ArtifactKind::Subtitles);
    }
    if rest == ".vtt" {
        return Some(ArtifactKind::SubtitlesVtt);
    }
    if rest == "_voice_prompt.wav" {
        return Some(ArtifactKind::VoiceSample);
    }
    if let Some(suffix) = rest.strip_suffix("_subtitled.mp4") {
        if suffix.is_empty() || suffix.strip_prefix('_').is_some_and(is_language) {
            return Some(ArtifactKind::BurnedVideo(suffix.to_string()));
        }
        return None;
    }
    if let Some(lang) = rest.strip_prefix('_').and_then(|r| r.strip_suffix("_tts_video.mp4")) {
        return is_language(lang).then(|| ArtifactKind::SpeechVideo(lang.to_string()));
    }
    if let Some(lang) = rest.strip_prefix('_').and_then(|r| r.strip_suffix("_tts.wav")) {
        return is_language(lang).then(|| ArtifactKind::Speech(lang.to_string()));
    }
    if let Some(lang) = rest.strip_prefix('.').and_then(|r| r.strip_suffix(".srt")) {
        return is_language(lang).then(|| ArtifactKind::TranslatedSubtitles(lang.to_string()));
    }
    if rest.starts_with('.') && !rest[1..].contains('.') {
        return Some(ArtifactKind::Upload);
    }
    None
}
