// Voice-cloning speech synthesis
//
// The synthesizer is a helper script that receives narration text, a reference
// voice sample, an output path, a language code and a style scalar, and reports
// its outcome as a JSON object on the last line of stdout.

pub mod index_tts;

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

pub use index_tts::*;
use crate::config::SynthesizerConfig;
use crate::error::{PipelineError, Result};
use crate::process::ProcessRunner;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SpeechSynthesizerTrait: Send + Sync {
    /// Speak `text` in the timbre of `voice_sample`, writing a waveform to `output_path`
    async fn synthesize(
        &self,
        text: &str,
        voice_sample: &Path,
        output_path: &Path,
        language: &str,
    ) -> Result<()>;

    /// Check that the synthesizer can be launched
    async fn check_availability(&self) -> Result<()>;
}

/// Final status line written by the synthesizer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SynthesisStatus {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl SynthesisStatus {
    pub fn parse(line: Option<&str>) -> Result<Self> {
        let line = line.ok_or_else(|| {
            PipelineError::Synthesis("synthesizer printed no status line".to_string())
        })?;
        serde_json::from_str(line).map_err(|e| {
            PipelineError::Synthesis(format!("unreadable status line '{}': {}", line, e))
        })
    }

    pub fn into_result(self) -> Result<()> {
        if self.success {
            Ok(())
        } else {
            Err(PipelineError::Synthesis(
                self.message
                    .unwrap_or_else(|| "TTS generation failed".to_string()),
            ))
        }
    }
}

pub struct SpeechSynthesizerFactory;

impl SpeechSynthesizerFactory {
    pub fn create_default(
        config: SynthesizerConfig,
        runner: Arc<dyn ProcessRunner>,
    ) -> Box<dyn SpeechSynthesizerTrait> {
        Box::new(IndexTtsSynthesizer::new(config, runner))
    }
}
