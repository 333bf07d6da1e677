use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::TranscriberTrait;
use crate::config::TranscriberConfig;
use crate::error::Result;
use crate::process::{tracing_sink, ProcessCommand, ProcessRunner};

/// Whisper-based subtitle CLI run as `python -m <module>`.
pub struct AutoSubtitleTranscriber {
    config: TranscriberConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl AutoSubtitleTranscriber {
    pub fn new(config: TranscriberConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    /// Build the invocation; `language` switches it to a translation run.
    pub fn command(
        &self,
        video_path: &Path,
        output_dir: &Path,
        language: Option<&str>,
        model: &str,
    ) -> ProcessCommand {
        let description = match language {
            Some(_) => "Translation",
            None => "Transcription",
        };

        let mut cmd = ProcessCommand::new(&self.config.python, description)
            .arg("-m")
            .arg(&self.config.module)
            .arg(video_path.to_string_lossy())
            .arg("--output_dir")
            .arg(output_dir.to_string_lossy());

        if let Some(lang) = language {
            cmd = cmd.arg("--target_language").arg(lang);
        }

        cmd.args(["--srt_only", "True", "--output_srt", "True", "--model", model])
    }
}

#[async_trait]
impl TranscriberTrait for AutoSubtitleTranscriber {
    async fn transcribe(&self, video_path: &Path, output_dir: &Path, model: &str) -> Result<()> {
        info!("Running Whisper transcription of {} (model: {})", video_path.display(), model);

        let command = self.command(video_path, output_dir, None, model);
        self.runner.run(&command, &tracing_sink("transcriber")).await?;

        info!("Whisper transcription complete");
        Ok(())
    }

    async fn translate(
        &self,
        video_path: &Path,
        output_dir: &Path,
        language: &str,
        model: &str,
    ) -> Result<()> {
        info!("Running translation of {} to {} (model: {})", video_path.display(), language, model);

        let command = self.command(video_path, output_dir, Some(language), model);
        self.runner.run(&command, &tracing_sink("translator")).await?;

        info!("Translation complete");
        Ok(())
    }

    async fn check_availability(&self) -> Result<()> {
        let probe = format!("import {}", self.config.module);
        let command = ProcessCommand::new(&self.config.python, "Transcriber availability check")
            .arg("-c")
            .arg(probe);

        self.runner.run(&command, &tracing_sink("transcriber")).await?;
        info!("Transcriber module {} is available", self.config.module);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::TokioProcessRunner;

    fn transcriber() -> AutoSubtitleTranscriber {
        AutoSubtitleTranscriber::new(TranscriberConfig::default(), Arc::new(TokioProcessRunner))
    }

    #[test]
    fn test_transcription_command() {
        let cmd = transcriber().command(Path::new("up/clip.mp4"), Path::new("out"), None, "small");
        assert_eq!(cmd.program, "python");
        assert_eq!(cmd.description, "Transcription");
        assert_eq!(
            cmd.args,
            vec![
                "-m", "auto_subtitle.cli", "up/clip.mp4", "--output_dir", "out",
                "--srt_only", "True", "--output_srt", "True", "--model", "small",
            ]
        );
    }

    #[test]
    fn test_translation_command_adds_target_language() {
        let cmd = transcriber().command(Path::new("up/clip.mp4"), Path::new("out"), Some("es"), "base");
        assert_eq!(cmd.description, "Translation");
        assert_eq!(&cmd.args[5..7], &["--target_language", "es"]);
        assert_eq!(cmd.args.last().map(String::as_str), Some("base"));
    }
}
