use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use super::{SpeechSynthesizerTrait, SynthesisStatus};
use crate::config::SynthesizerConfig;
use crate::error::{PipelineError, Result};
use crate::process::{tracing_sink, ProcessCommand, ProcessRunner};

/// IndexTTS2 helper script run with the synthesizer's own interpreter.
pub struct IndexTtsSynthesizer {
    config: SynthesizerConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl IndexTtsSynthesizer {
    pub fn new(config: SynthesizerConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    pub fn command(
        &self,
        text: &str,
        voice_sample: &Path,
        output_path: &Path,
        language: &str,
    ) -> ProcessCommand {
        ProcessCommand::new(&self.config.python, "Speech synthesis")
            .arg(&self.config.script)
            .arg(text)
            .arg(voice_sample.to_string_lossy())
            .arg(output_path.to_string_lossy())
            .arg(language)
            .arg(self.config.style_scalar.to_string())
    }
}

#[async_trait]
impl SpeechSynthesizerTrait for IndexTtsSynthesizer {
    async fn synthesize(
        &self,
        text: &str,
        voice_sample: &Path,
        output_path: &Path,
        language: &str,
    ) -> Result<()> {
        info!("Running IndexTTS2 for {} chars in {}", text.chars().count(), language);
        debug!("Voice sample: {}", voice_sample.display());

        let command = self.command(text, voice_sample, output_path, language);
        let output = self.runner.run(&command, &tracing_sink("tts")).await?;

        SynthesisStatus::parse(output.last_stdout_line())?.into_result()?;

        info!("TTS generation complete: {}", output_path.display());
        Ok(())
    }

    async fn check_availability(&self) -> Result<()> {
        if !tokio::fs::try_exists(&self.config.script).await? {
            return Err(PipelineError::Config(format!(
                "Synthesizer script not found: {}",
                self.config.script
            )));
        }

        let command = ProcessCommand::new(&self.config.python, "Synthesizer availability check")
            .arg("--version");
        self.runner.run(&command, &tracing_sink("tts")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::TokioProcessRunner;

    fn synthesizer(config: SynthesizerConfig) -> IndexTtsSynthesizer {
        IndexTtsSynthesizer::new(config, Arc::new(TokioProcessRunner))
    }

    #[test]
    fn test_command_passes_text_as_single_argument() {
        let cmd = synthesizer(SynthesizerConfig::default()).command(
            "Hola \"amigo\" qué tal",
            Path::new("out/clip_voice_prompt.wav"),
            Path::new("out/clip_es_tts.wav"),
            "es",
        );
        assert_eq!(
            cmd.args,
            vec![
                "lib/indextts-helper.py",
                "Hola \"amigo\" qué tal",
                "out/clip_voice_prompt.wav",
                "out/clip_es_tts.wav",
                "es",
                "0.6",
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reported_failure_is_surfaced() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("tts.sh");
        std::fs::write(
            &script,
            "echo loading model\necho '{\"success\": false, \"message\": \"voice too short\"}'\n",
        )
        .unwrap();

        let config = SynthesizerConfig {
            python: "sh".to_string(),
            script: script.to_string_lossy().into_owned(),
            ..SynthesizerConfig::default()
        };
        let err = synthesizer(config)
            .synthesize("hello there", Path::new("v.wav"), &dir.path().join("o.wav"), "en")
            .await
            .unwrap_err();

        match err {
            PipelineError::Synthesis(message) => assert_eq!(message, "voice too short"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_reported_success() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("tts.sh");
        std::fs::write(&script, "touch \"$3\"\necho '{\"success\": true}'\n").unwrap();

        let config = SynthesizerConfig {
            python: "sh".to_string(),
            script: script.to_string_lossy().into_owned(),
            ..SynthesizerConfig::default()
        };
        let output = dir.path().join("o.wav");
        synthesizer(config)
            .synthesize("hello there", Path::new("v.wav"), &output, "en")
            .await
            .unwrap();
        assert!(output.exists());
    }
}
