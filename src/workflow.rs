use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::media::{MediaProcessorFactory, MediaProcessorTrait};
use crate::naming::{
    base_filename, normalize_suffix, sanitize_filename, validate_language, validate_model,
    validate_video_filename, ArtifactLayout, ArtifactRef,
};
use crate::process::{ProcessRunner, TokioProcessRunner};
use crate::session::{Session, StepCompletion};
use crate::subtitle::{clean_narration, NarrationSource, SubtitleSet};
use crate::synthesize::{SpeechSynthesizerFactory, SpeechSynthesizerTrait};
use crate::transcribe::{TranscriberFactory, TranscriberTrait};

/// A stored upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutput {
    pub video_filename: String,
    pub video_path: ArtifactRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractAudioOutput {
    pub video_filename: String,
    pub video_path: ArtifactRef,
    pub audio_path: ArtifactRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubtitleOutput {
    pub subtitles: SubtitleSet,
    pub srt_path: ArtifactRef,
    pub vtt_path: ArtifactRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationOutput {
    pub language: String,
    pub translated_subtitles: SubtitleSet,
    pub translated_srt_path: ArtifactRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BurnOutput {
    #[serde(skip)]
    pub suffix: String,
    pub burned_video_path: ArtifactRef,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SynthesisOutput {
    pub language: String,
    pub voice_prompt_path: ArtifactRef,
    pub tts_audio_path: ArtifactRef,
    /// Absent when the remux failed after synthesis succeeded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tts_video_path: Option<ArtifactRef>,
    pub message: String,
}

/// Runs the pipeline steps. Each step checks its own inputs and the presence of
/// its upstream artifacts, then launches its tool; nothing here sequences steps
/// except [`Workflow::process_video`].
pub struct Workflow {
    config: Config,
    layout: ArtifactLayout,
    media: Box<dyn MediaProcessorTrait>,
    transcriber: Box<dyn TranscriberTrait>,
    synthesizer: Box<dyn SpeechSynthesizerTrait>,
}

impl Workflow {
    pub fn new(config: Config) -> Self {
        let runner: Arc<dyn ProcessRunner> = Arc::new(TokioProcessRunner);

        let media = MediaProcessorFactory::create_processor(config.media.clone(), runner.clone());
        let transcriber = TranscriberFactory::create_default(config.transcriber.clone(), runner.clone());
        let synthesizer = SpeechSynthesizerFactory::create_default(config.synthesizer.clone(), runner);

        Self::with_components(config, media, transcriber, synthesizer)
    }

    pub fn with_components(
        config: Config,
        media: Box<dyn MediaProcessorTrait>,
        transcriber: Box<dyn TranscriberTrait>,
        synthesizer: Box<dyn SpeechSynthesizerTrait>,
    ) -> Self {
        let layout = ArtifactLayout::new(&config.storage);
        Self {
            config,
            layout,
            media,
            transcriber,
            synthesizer,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Addressing scope for a session; the shared root when sessions are not
    /// isolated or no session is given.
    pub fn layout_for(&self, session_id: Option<&Uuid>) -> ArtifactLayout {
        match session_id {
            Some(id) if self.config.storage.isolate_sessions => self.layout.scoped(&id.to_string()),
            _ => self.layout.clone(),
        }
    }

    /// Addressing scope for a step run against an existing upload. With
    /// isolated sessions the upload lives under its session, so one must be named.
    pub fn step_layout(&self, session_id: Option<&Uuid>) -> Result<ArtifactLayout> {
        if session_id.is_none() && self.config.storage.isolate_sessions {
            return Err(PipelineError::InvalidInput(
                "A session id is required when sessions are isolated".to_string(),
            ));
        }
        Ok(self.layout_for(session_id))
    }

    /// Probe every external tool, logging failures as warnings.
    pub async fn check_tools(&self) -> bool {
        let mut ok = true;

        if let Err(e) = self.media.check_availability().await {
            warn!("Transcoder unavailable: {}", e);
            ok = false;
        }
        if let Err(e) = self.transcriber.check_availability().await {
            warn!("Transcriber unavailable: {}", e);
            ok = false;
        }
        if let Err(e) = self.synthesizer.check_availability().await {
            warn!("Speech synthesizer unavailable: {}", e);
            ok = false;
        }
        ok
    }

    /// Save uploaded bytes under their sanitized name.
    pub async fn store_upload(
        &self,
        layout: &ArtifactLayout,
        original_name: &str,
        bytes: &[u8],
    ) -> Result<UploadOutput> {
        let video_filename = sanitize_filename(original_name);
        info!("Processing video upload: {} ({} bytes)", original_name, bytes.len());

        fs::create_dir_all(layout.uploads_dir()).await?;
        let path = layout.upload_path(&video_filename);
        fs::write(&path, bytes).await?;
        info!("Saved video file: {}", path.display());

        Ok(UploadOutput {
            video_filename,
            video_path: layout.artifact(path),
        })
    }

    /// Step: extract a mono 16kHz PCM sidecar next to the upload.
    pub async fn extract_audio(
        &self,
        layout: &ArtifactLayout,
        video_filename: &str,
    ) -> Result<ExtractAudioOutput> {
        let video_path = self.existing_video(layout, video_filename).await?;
        let audio_path = layout.audio_path(video_filename);

        self.media.extract_audio(&video_path, &audio_path).await?;

        Ok(ExtractAudioOutput {
            video_filename: video_filename.to_string(),
            video_path: layout.artifact(video_path),
            audio_path: layout.artifact(audio_path),
        })
    }

    /// Step: transcribe to `<base>.srt`, derive `<base>.vtt`, parse the set.
    pub async fn generate_subtitles(
        &self,
        layout: &ArtifactLayout,
        video_filename: &str,
        model: Option<&str>,
    ) -> Result<SubtitleOutput> {
        let model = validate_model(model.unwrap_or(&self.config.transcriber.default_model))?;
        let video_path = self.existing_video(layout, video_filename).await?;
        let base = base_filename(video_filename);
        info!("Generating subtitles for {} with model {}", video_filename, model);

        fs::create_dir_all(layout.outputs_dir()).await?;
        self.transcriber
            .transcribe(&video_path, layout.outputs_dir(), model)
            .await?;

        let srt_path = layout.srt_path(base);
        expect_output("Transcription", &srt_path).await?;

        let subtitles = SubtitleSet::load(&srt_path).await?;
        let vtt_path = layout.vtt_path(base);
        subtitles.save_vtt(&vtt_path).await?;

        Ok(SubtitleOutput {
            subtitles,
            srt_path: layout.artifact(srt_path),
            vtt_path: layout.artifact(vtt_path),
        })
    }

    /// Step: run the transcriber in translation mode to `<base>.<lang>.srt`.
    ///
    /// The tool works from the video itself; previously generated subtitles
    /// are not an input.
    pub async fn translate_subtitles(
        &self,
        layout: &ArtifactLayout,
        video_filename: &str,
        language: &str,
        model: Option<&str>,
    ) -> Result<TranslationOutput> {
        let language = validate_language(language)?;
        let model = validate_model(model.unwrap_or(&self.config.transcriber.translation_model))?;
        let video_path = self.existing_video(layout, video_filename).await?;
        let base = base_filename(video_filename);
        info!("Translating subtitles of {} to {}", video_filename, language);

        fs::create_dir_all(layout.outputs_dir()).await?;
        self.transcriber
            .translate(&video_path, layout.outputs_dir(), language, model)
            .await?;

        let srt_path = layout.translated_srt_path(base, language);
        expect_output("Translation", &srt_path).await?;

        let translated_subtitles = SubtitleSet::load(&srt_path).await?;
        Ok(TranslationOutput {
            language: language.to_string(),
            translated_subtitles,
            translated_srt_path: layout.artifact(srt_path),
        })
    }

    /// Step: render a subtitle file onto the video as
    /// `<base><suffix>_subtitled.mp4`.
    pub async fn burn_subtitles(
        &self,
        layout: &ArtifactLayout,
        video_filename: &str,
        subtitle_path: &Path,
        suffix: &str,
    ) -> Result<BurnOutput> {
        let video_path = self.existing_video(layout, video_filename).await?;
        if !fs::try_exists(subtitle_path).await? {
            return Err(PipelineError::SubtitleNotFound(subtitle_path.to_path_buf()));
        }

        let suffix = normalize_suffix(suffix);
        let output_path = layout.burned_video_path(base_filename(video_filename), &suffix);
        fs::create_dir_all(layout.outputs_dir()).await?;

        self.media
            .burn_subtitles(&video_path, subtitle_path, &output_path)
            .await?;

        Ok(BurnOutput {
            suffix,
            burned_video_path: layout.artifact(output_path),
        })
    }

    /// Step: synthesize narration in the source speaker's voice and remux it
    /// onto the video. A remux failure degrades to returning the speech alone.
    pub async fn synthesize_speech(
        &self,
        layout: &ArtifactLayout,
        video_filename: &str,
        sources: &[NarrationSource],
        language: &str,
    ) -> Result<SynthesisOutput> {
        let language = validate_language(language)?;
        let text = clean_narration(sources);
        let minimum = self.config.synthesizer.min_text_chars;
        let chars = text.chars().count();
        if chars < minimum {
            return Err(PipelineError::InsufficientText { chars, minimum });
        }
        let video_path = self.existing_video(layout, video_filename).await?;
        let base = base_filename(video_filename);
        info!("Generating TTS for cleaned text ({} chars)", chars);

        fs::create_dir_all(layout.outputs_dir()).await?;
        let voice_path = layout.voice_sample_path(base);
        self.prepare_voice_sample(&video_path, &voice_path).await?;

        let speech_path = layout.speech_path(base, language);
        self.synthesizer
            .synthesize(&text, &voice_path, &speech_path, language)
            .await?;
        expect_output("Speech synthesis", &speech_path).await?;

        let video_out = layout.speech_video_path(base, language);
        let (tts_video_path, message) = match self
            .media
            .replace_audio(&video_path, &speech_path, &video_out)
            .await
        {
            Ok(()) => (
                Some(layout.artifact(video_out)),
                "TTS generated and merged with video".to_string(),
            ),
            Err(e) => {
                warn!("Video merging failed, returning audio only: {}", e);
                (None, "TTS generated (video merge failed)".to_string())
            }
        };

        Ok(SynthesisOutput {
            language: language.to_string(),
            voice_prompt_path: layout.artifact(voice_path),
            tts_audio_path: layout.artifact(speech_path),
            tts_video_path,
            message,
        })
    }

    /// Run the whole chain for a local video file, recording into `session`.
    ///
    /// Dubbing speaks each translation, so it needs at least one target language.
    pub async fn process_video(
        &self,
        session: &mut Session,
        input: &Path,
        target_languages: &[String],
        model: Option<&str>,
        dub: bool,
    ) -> Result<()> {
        if dub && target_languages.is_empty() {
            return Err(PipelineError::InvalidInput(
                "Dubbing requires at least one target language".to_string(),
            ));
        }
        for language in target_languages {
            validate_language(language)?;
        }

        let layout = self.layout_for(Some(&session.id));
        let original_name = input
            .file_name()
            .ok_or_else(|| PipelineError::InvalidInput(format!("Invalid input path: {}", input.display())))?
            .to_string_lossy()
            .into_owned();
        let bytes = fs::read(input).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PipelineError::VideoNotFound(input.to_path_buf()),
            _ => PipelineError::Io(e),
        })?;

        let upload = self.store_upload(&layout, &original_name, &bytes).await?;
        let video = upload.video_filename.clone();
        session.complete(StepCompletion::Upload(upload));

        let audio = self.extract_audio(&layout, &video).await?;
        session.complete(StepCompletion::Audio(audio));

        let subtitles = self.generate_subtitles(&layout, &video, model).await?;
        let original_srt = subtitles.srt_path.path.clone();
        session.complete(StepCompletion::Subtitles(subtitles));

        let burned = self.burn_subtitles(&layout, &video, &original_srt, "").await?;
        session.complete(StepCompletion::Burn(burned));

        for language in target_languages {
            let translation = self.translate_subtitles(&layout, &video, language, None).await?;
            let translated_srt = translation.translated_srt_path.path.clone();
            let narration: Vec<NarrationSource> = (&translation.translated_subtitles).into();
            session.complete(StepCompletion::Translation(translation));

            let suffix = format!("_{}", language);
            let burned = self.burn_subtitles(&layout, &video, &translated_srt, &suffix).await?;
            session.complete(StepCompletion::Burn(burned));

            if dub {
                let speech = self
                    .synthesize_speech(&layout, &video, &narration, language)
                    .await?;
                session.complete(StepCompletion::Synthesis(speech));
            }
        }

        info!("Completed processing for {}", video);
        Ok(())
    }

    /// Resolve a client-supplied public subtitle path.
    pub fn resolve_subtitle_path(&self, public_path: &str) -> Result<PathBuf> {
        self.layout.resolve_public(public_path)
    }

    async fn existing_video(&self, layout: &ArtifactLayout, video_filename: &str) -> Result<PathBuf> {
        let video_filename = validate_video_filename(video_filename)?;
        let path = layout.upload_path(video_filename);
        if !fs::try_exists(&path).await? {
            return Err(PipelineError::VideoNotFound(path));
        }
        Ok(path)
    }

    /// Clip a voice sample from the video, falling back to the bundled sample.
    async fn prepare_voice_sample(&self, video_path: &Path, voice_path: &Path) -> Result<()> {
        let error = match self.media.extract_voice_sample(video_path, voice_path).await {
            Ok(()) => {
                info!("Voice prompt extracted: {}", voice_path.display());
                return Ok(());
            }
            Err(e) => e,
        };

        warn!("Failed to extract voice prompt, using default: {}", error);
        let default_sample = Path::new(&self.config.synthesizer.default_voice_sample);
        if !fs::try_exists(default_sample).await? {
            return Err(PipelineError::Synthesis(format!(
                "No voice prompt available: {}",
                error
            )));
        }

        fs::copy(default_sample, voice_path).await?;
        info!("Using default voice prompt: {}", default_sample.display());
        Ok(())
    }
}

/// Postcondition: the tool exited cleanly, so its declared output must exist.
async fn expect_output(description: &str, path: &Path) -> Result<()> {
    if fs::try_exists(path).await? {
        Ok(())
    } else {
        Err(PipelineError::MissingOutput {
            description: description.to_string(),
            path: path.to_path_buf(),
        })
    }
}
