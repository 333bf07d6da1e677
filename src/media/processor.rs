use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

use super::{MediaCommand, MediaCommandBuilder, MediaProcessorTrait};
use crate::config::MediaConfig;
use crate::error::{PipelineError, Result};
use crate::process::{tracing_sink, ProcessOutput, ProcessRunner};

/// Concrete implementation of media processor (FFmpeg-based)
pub struct MediaProcessorImpl {
    config: MediaConfig,
    command_builder: MediaCommandBuilder,
    runner: Arc<dyn ProcessRunner>,
}

impl MediaProcessorImpl {
    pub fn new(config: MediaConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        let command_builder = MediaCommandBuilder::new(&config.binary_path);

        Self {
            config,
            command_builder,
            runner,
        }
    }

    async fn execute(&self, command: MediaCommand) -> Result<ProcessOutput> {
        let sink = tracing_sink("ffmpeg");
        self.runner.run(&command.into_command(), &sink).await
    }

    /// Run a command that must leave `output_path` behind.
    async fn produce(&self, command: MediaCommand, output_path: &Path) -> Result<()> {
        let description = command.description().to_string();
        self.execute(command).await?;

        if !tokio::fs::try_exists(output_path).await? {
            return Err(PipelineError::MissingOutput {
                description,
                path: output_path.to_path_buf(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl MediaProcessorTrait for MediaProcessorImpl {
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()> {
        info!("Extracting audio from {} to {}", video_path.display(), audio_path.display());

        let command = self.command_builder.extract_audio(video_path, audio_path);
        self.produce(command, audio_path).await?;

        info!("Audio extraction completed");
        Ok(())
    }

    async fn burn_subtitles(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
    ) -> Result<()> {
        info!(
            "Burning subtitles from {} into {} -> {}",
            subtitle_path.display(),
            video_path.display(),
            output_path.display()
        );

        let command = self.command_builder.burn_subtitles(
            video_path,
            subtitle_path,
            output_path,
            &self.config.burn_style,
            &self.config.subtitle_options,
        );
        self.produce(command, output_path).await?;

        info!("Subtitle burning completed successfully");
        Ok(())
    }

    async fn extract_voice_sample(&self, video_path: &Path, sample_path: &Path) -> Result<()> {
        info!("Extracting {}s voice sample from {}", self.config.voice_sample_seconds, video_path.display());

        let command = self.command_builder.extract_voice_sample(
            video_path,
            sample_path,
            self.config.voice_sample_seconds,
        );
        self.produce(command, sample_path).await
    }

    async fn replace_audio(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<()> {
        info!("Replacing audio of {} with {}", video_path.display(), audio_path.display());

        let command = self.command_builder.replace_audio(video_path, audio_path, output_path);
        self.produce(command, output_path).await?;

        info!("Video merged with new audio: {}", output_path.display());
        Ok(())
    }

    async fn check_availability(&self) -> Result<String> {
        let output = self.execute(self.command_builder.version_check()).await?;

        let version = output
            .stdout
            .first()
            .cloned()
            .unwrap_or_else(|| "Unknown version".to_string());
        info!("Media processor is available: {}", version);
        Ok(version)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::TokioProcessRunner;

    fn processor(binary: &str) -> MediaProcessorImpl {
        let config = MediaConfig {
            binary_path: binary.to_string(),
            ..MediaConfig::default()
        };
        MediaProcessorImpl::new(config, Arc::new(TokioProcessRunner))
    }

    #[tokio::test]
    async fn test_clean_exit_without_output_is_postcondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let audio = dir.path().join("clip.wav");

        // `true` ignores its arguments and exits 0 without writing anything
        let err = processor("true")
            .extract_audio(&dir.path().join("clip.mp4"), &audio)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::MissingOutput { .. }));
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_process_failure() {
        let dir = tempfile::tempdir().unwrap();
        let err = processor("false")
            .replace_audio(
                &dir.path().join("v.mp4"),
                &dir.path().join("a.wav"),
                &dir.path().join("o.mp4"),
            )
            .await
            .unwrap_err();

        match err {
            PipelineError::ProcessFailed { description, code, .. } => {
                assert_eq!(description, "Audio remux");
                assert_eq!(code, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
