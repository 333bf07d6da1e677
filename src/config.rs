use serde::{Deserialize, Serialize};
use std::path::Path;
use crate::error::{Result, PipelineError};
use crate::naming::validate_model;

fn default_max_upload_bytes() -> usize {
    2 * 1024 * 1024 * 1024
}

fn default_session_idle_secs() -> u64 {
    24 * 60 * 60
}

fn default_isolate_sessions() -> bool {
    true
}

fn default_style_scalar() -> f32 {
    0.6
}

fn default_min_text_chars() -> usize {
    10
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transcriber: TranscriberConfig,
    #[serde(default)]
    pub media: MediaConfig,
    #[serde(default)]
    pub synthesizer: SynthesizerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Largest accepted upload body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// Sessions idle this long are dropped from memory; their files stay on disk
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory served to clients; artifact paths are reported relative to it
    pub public_dir: String,
    /// Upload area, relative to `public_dir`
    pub uploads_dir: String,
    /// Output area, relative to `public_dir`
    pub outputs_dir: String,
    /// Prefix every artifact path with the session id
    #[serde(default = "default_isolate_sessions")]
    pub isolate_sessions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriberConfig {
    /// Python interpreter used to run the transcriber module
    pub python: String,
    /// Module invoked with `-m`
    pub module: String,
    /// Model used when a request does not name one
    pub default_model: String,
    /// Model used for translation runs
    pub translation_model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaConfig {
    /// Path to ffmpeg binary
    pub binary_path: String,
    /// `force_style` applied when burning subtitles
    pub burn_style: String,
    /// Length of the voice sample clipped from the source video
    pub voice_sample_seconds: u32,
    /// Additional encoding options for subtitle burning
    /// Common options: ["-preset", "medium", "-crf", "23", "-pix_fmt", "yuv420p"]
    pub subtitle_options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    /// Python interpreter of the synthesizer environment
    pub python: String,
    /// Helper script taking `<text> <voice> <output> <language> <style>`
    pub script: String,
    /// Voice sample used when none can be clipped from the video
    pub default_voice_sample: String,
    /// Where to fetch the default voice sample when it is missing
    #[serde(default)]
    pub default_voice_sample_url: Option<String>,
    #[serde(default = "default_style_scalar")]
    pub style_scalar: f32,
    /// Cleaned narration shorter than this is rejected
    #[serde(default = "default_min_text_chars")]
    pub min_text_chars: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:3000".to_string(),
            max_upload_bytes: default_max_upload_bytes(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_dir: "public".to_string(),
            uploads_dir: "uploads".to_string(),
            outputs_dir: "outputs".to_string(),
            isolate_sessions: default_isolate_sessions(),
        }
    }
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            module: "auto_subtitle.cli".to_string(),
            default_model: "small".to_string(),
            translation_model: "small".to_string(),
        }
    }
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            binary_path: "ffmpeg".to_string(),
            burn_style: "FontSize=24,PrimaryColour=&HFFFFFF,OutlineColour=&H000000,BorderStyle=3"
                .to_string(),
            voice_sample_seconds: 5,
            subtitle_options: vec![
                // Example encoding options users can customize:
                // "-preset".to_string(), "medium".to_string(),
                // "-crf".to_string(), "23".to_string(),
            ],
        }
    }
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            python: "python".to_string(),
            script: "lib/indextts-helper.py".to_string(),
            default_voice_sample: "assets/voice_01.wav".to_string(),
            default_voice_sample_url: None,
            style_scalar: default_style_scalar(),
            min_text_chars: default_min_text_chars(),
        }
    }
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config file: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| PipelineError::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_model(&self.transcriber.default_model)
            .and(validate_model(&self.transcriber.translation_model))
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        if self.server.session_idle_secs == 0 {
            return Err(PipelineError::Config(
                "server.session_idle_secs must be positive".to_string(),
            ));
        }
        if self.media.voice_sample_seconds == 0 {
            return Err(PipelineError::Config(
                "media.voice_sample_seconds must be positive".to_string(),
            ));
        }
        if self.storage.uploads_dir.trim().is_empty() || self.storage.outputs_dir.trim().is_empty() {
            return Err(PipelineError::Config(
                "storage.uploads_dir and storage.outputs_dir must be set".to_string(),
            ));
        }
        if self.storage.uploads_dir == self.storage.outputs_dir {
            return Err(PipelineError::Config(
                "storage.uploads_dir and storage.outputs_dir must differ".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.synthesizer.style_scalar) {
            return Err(PipelineError::Config(
                "synthesizer.style_scalar must be within 0.0..=1.0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.synthesizer.style_scalar, 0.6);
        assert_eq!(config.synthesizer.min_text_chars, 10);
        assert!(config.storage.isolate_sessions);
        assert_eq!(config.server.session_idle_secs, 86_400);
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("subdub.toml");

        let mut config = Config::default();
        config.media.binary_path = "/opt/ffmpeg/bin/ffmpeg".to_string();
        config.save_to_file(&path).unwrap();

        let loaded = Config::from_file(&path).unwrap();
        assert_eq!(loaded.media.binary_path, "/opt/ffmpeg/bin/ffmpeg");
        assert_eq!(loaded.transcriber.default_model, "small");
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            "[storage]\npublic_dir = \"/srv/public\"\nuploads_dir = \"in\"\noutputs_dir = \"out\"\n",
        )
        .unwrap();
        assert_eq!(config.storage.public_dir, "/srv/public");
        assert!(config.storage.isolate_sessions);
        assert_eq!(config.media.binary_path, "ffmpeg");
    }

    #[test]
    fn test_invalid_model_rejected() {
        let mut config = Config::default();
        config.transcriber.default_model = "gigantic".to_string();
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }
}
