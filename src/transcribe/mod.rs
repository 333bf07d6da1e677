// Speech-to-text access
//
// The transcriber is an external command-line module that writes subtitle files
// into an output directory, named after the input video's stem:
// - transcription: `<stem>.srt`
// - translation:   `<stem>.<lang>.srt`
//
// Implementations only launch the tool; checking that the expected file
// appeared is left to the caller, which knows the addressing convention.

pub mod auto_subtitle;

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

pub use auto_subtitle::*;
use crate::config::TranscriberConfig;
use crate::error::Result;
use crate::process::ProcessRunner;

/// Main trait for transcription operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TranscriberTrait: Send + Sync {
    /// Transcribe the video's speech into a primary-format subtitle file
    async fn transcribe(&self, video_path: &Path, output_dir: &Path, model: &str) -> Result<()>;

    /// Transcribe and translate into `language` in one run
    async fn translate(
        &self,
        video_path: &Path,
        output_dir: &Path,
        language: &str,
        model: &str,
    ) -> Result<()>;

    /// Check that the transcriber module can be imported
    async fn check_availability(&self) -> Result<()>;
}

/// Factory for creating transcriber instances
pub struct TranscriberFactory;

impl TranscriberFactory {
    pub fn create_default(
        config: TranscriberConfig,
        runner: Arc<dyn ProcessRunner>,
    ) -> Box<dyn TranscriberTrait> {
        Box::new(AutoSubtitleTranscriber::new(config, runner))
    }
}
