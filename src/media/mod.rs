// Transcoder access
//
// - commands: ffmpeg argument builders for each pipeline use
// - processor: runs those commands through the process shim and checks outputs

pub mod commands;
pub mod processor;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use commands::*;
pub use processor::*;

use crate::config::MediaConfig;
use crate::error::Result;
use crate::process::ProcessRunner;

/// Transcoder operations used by the pipeline. Each resolves only when the
/// tool exited 0 and the declared output file exists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaProcessorTrait: Send + Sync {
    /// Extract mono 16kHz PCM audio from video
    async fn extract_audio(&self, video_path: &Path, audio_path: &Path) -> Result<()>;

    /// Render subtitles onto the video frames
    async fn burn_subtitles(
        &self,
        video_path: &Path,
        subtitle_path: &Path,
        output_path: &Path,
    ) -> Result<()>;

    /// Clip the opening seconds of audio as a voice reference
    async fn extract_voice_sample(&self, video_path: &Path, sample_path: &Path) -> Result<()>;

    /// Replace the audio track of a video
    async fn replace_audio(
        &self,
        video_path: &Path,
        audio_path: &Path,
        output_path: &Path,
    ) -> Result<()>;

    /// Check if the transcoder can be launched
    async fn check_availability(&self) -> Result<String>;
}

/// Factory for creating media processor instances
pub struct MediaProcessorFactory;

impl MediaProcessorFactory {
    /// Create the default media processor implementation (FFmpeg-based)
    pub fn create_processor(
        config: MediaConfig,
        runner: Arc<dyn ProcessRunner>,
    ) -> Box<dyn MediaProcessorTrait> {
        Box::new(processor::MediaProcessorImpl::new(config, runner))
    }
}
