//! Per-video session state.
//!
//! A session records what each step produced and which steps are in flight,
//! and derives from that where the video stands in the pipeline. The state is
//! advisory: steps check their own preconditions on disk and are never blocked
//! or cascaded by it.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::naming::{base_filename, ArtifactRef};
use crate::subtitle::SubtitleSet;
use crate::workflow::{
    BurnOutput, ExtractAudioOutput, SubtitleOutput, SynthesisOutput, TranslationOutput,
    UploadOutput,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Upload,
    ExtractAudio,
    GenerateSubtitles,
    Translate,
    Burn,
    Synthesize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Idle,
    Uploaded,
    AudioExtracted,
    SubtitlesGenerated,
    TranslationPending,
    Translated,
    BurningPending,
    Burned,
    SynthesisPending,
    SynthesizedAndRemuxed,
    SynthesizedOnly,
}

/// The output of a successful step, as handed to [`Session::complete`].
#[derive(Debug, Clone)]
pub enum StepCompletion {
    Upload(UploadOutput),
    Audio(ExtractAudioOutput),
    Subtitles(SubtitleOutput),
    Translation(TranslationOutput),
    Burn(BurnOutput),
    Synthesis(SynthesisOutput),
}

impl StepCompletion {
    pub fn step(&self) -> Step {
        match self {
            StepCompletion::Upload(_) => Step::Upload,
            StepCompletion::Audio(_) => Step::ExtractAudio,
            StepCompletion::Subtitles(_) => Step::GenerateSubtitles,
            StepCompletion::Translation(_) => Step::Translate,
            StepCompletion::Burn(_) => Step::Burn,
            StepCompletion::Synthesis(_) => Step::Synthesize,
        }
    }
}

macro_rules! completion_from {
    ($($output:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$output> for StepCompletion {
                fn from(output: $output) -> Self {
                    StepCompletion::$variant(output)
                }
            }
        )*
    };
}

completion_from! {
    UploadOutput => Upload,
    ExtractAudioOutput => Audio,
    SubtitleOutput => Subtitles,
    TranslationOutput => Translation,
    BurnOutput => Burn,
    SynthesisOutput => Synthesis,
}

/// Artifacts produced so far. Multi-variant outputs are keyed by language
/// code, burned videos by output suffix (empty for the original subtitles).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Artifacts {
    pub video: Option<ArtifactRef>,
    pub audio: Option<ArtifactRef>,
    pub srt: Option<ArtifactRef>,
    pub vtt: Option<ArtifactRef>,
    pub translations: BTreeMap<String, ArtifactRef>,
    pub burned_videos: BTreeMap<String, ArtifactRef>,
    pub voice_prompt: Option<ArtifactRef>,
    pub speech: BTreeMap<String, ArtifactRef>,
    pub speech_videos: BTreeMap<String, ArtifactRef>,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Last time a step began, finished or was abandoned
    pub last_active: DateTime<Utc>,
    pub video_filename: Option<String>,
    pub artifacts: Artifacts,
    subtitles: Option<SubtitleSet>,
    translated_subtitles: BTreeMap<String, SubtitleSet>,
    pending: BTreeMap<Step, usize>,
}

impl Default for Session {
    fn default() -> Self {
        Self::with_id(Uuid::new_v4())
    }
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            last_active: now,
            video_filename: None,
            artifacts: Artifacts::default(),
            subtitles: None,
            translated_subtitles: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> Option<&str> {
        self.video_filename.as_deref().map(base_filename)
    }

    /// Mark a step as running. Several runs of one step may overlap.
    pub fn begin(&mut self, step: Step) {
        *self.pending.entry(step).or_insert(0) += 1;
    }

    /// Drop one pending run of `step` without recording anything.
    pub fn abort(&mut self, step: Step) {
        if let Some(count) = self.pending.get_mut(&step) {
            *count -= 1;
            if *count == 0 {
                self.pending.remove(&step);
            }
        }
    }

    /// Record a step's outputs and clear one pending run of it.
    pub fn complete(&mut self, completion: StepCompletion) {
        let step = completion.step();
        self.abort(step);
        debug!("Session {}: {:?} completed", self.id, step);

        match completion {
            StepCompletion::Upload(upload) => {
                if self.video_filename.as_deref() != Some(upload.video_filename.as_str()) {
                    // A different video starts a fresh artifact chain.
                    self.artifacts = Artifacts::default();
                    self.subtitles = None;
                    self.translated_subtitles.clear();
                }
                self.video_filename = Some(upload.video_filename);
                self.artifacts.video = Some(upload.video_path);
            }
            StepCompletion::Audio(audio) => {
                self.artifacts.video = Some(audio.video_path);
                self.artifacts.audio = Some(audio.audio_path);
            }
            StepCompletion::Subtitles(output) => {
                self.artifacts.srt = Some(output.srt_path);
                self.artifacts.vtt = Some(output.vtt_path);
                self.subtitles = Some(output.subtitles);
            }
            StepCompletion::Translation(output) => {
                self.artifacts
                    .translations
                    .insert(output.language.clone(), output.translated_srt_path);
                self.translated_subtitles
                    .insert(output.language, output.translated_subtitles);
            }
            StepCompletion::Burn(output) => {
                self.artifacts
                    .burned_videos
                    .insert(output.suffix, output.burned_video_path);
            }
            StepCompletion::Synthesis(output) => {
                self.artifacts.voice_prompt = Some(output.voice_prompt_path);
                self.artifacts
                    .speech
                    .insert(output.language.clone(), output.tts_audio_path);
                match output.tts_video_path {
                    Some(video) => {
                        self.artifacts.speech_videos.insert(output.language, video);
                    }
                    None => {
                        self.artifacts.speech_videos.remove(&output.language);
                    }
                }
            }
        }
    }

    pub fn is_pending(&self, step: Step) -> bool {
        self.pending.contains_key(&step)
    }

    /// Furthest point reached along the chain, pending steps first.
    pub fn state(&self) -> SessionState {
        let a = &self.artifacts;

        if self.is_pending(Step::Synthesize) {
            SessionState::SynthesisPending
        } else if !a.speech.is_empty() {
            if a.speech.keys().all(|lang| a.speech_videos.contains_key(lang)) {
                SessionState::SynthesizedAndRemuxed
            } else {
                SessionState::SynthesizedOnly
            }
        } else if self.is_pending(Step::Burn) {
            SessionState::BurningPending
        } else if !a.burned_videos.is_empty() {
            SessionState::Burned
        } else if self.is_pending(Step::Translate) {
            SessionState::TranslationPending
        } else if !a.translations.is_empty() {
            SessionState::Translated
        } else if a.srt.is_some() {
            SessionState::SubtitlesGenerated
        } else if a.audio.is_some() {
            SessionState::AudioExtracted
        } else if a.video.is_some() {
            SessionState::Uploaded
        } else {
            SessionState::Idle
        }
    }

    /// Steps whose upstream artifact is recorded.
    pub fn ready_steps(&self) -> Vec<Step> {
        let a = &self.artifacts;
        let mut steps = vec![Step::Upload];

        if a.video.is_some() {
            steps.push(Step::ExtractAudio);
            steps.push(Step::GenerateSubtitles);
        }
        if a.video.is_some() && a.srt.is_some() {
            steps.push(Step::Translate);
        }
        if a.video.is_some() && (a.srt.is_some() || !a.translations.is_empty()) {
            steps.push(Step::Burn);
            steps.push(Step::Synthesize);
        }
        steps
    }

    /// Subtitles to narrate in `language`: its translation when one exists,
    /// else the original transcription.
    pub fn narration_subtitles(&self, language: &str) -> Option<&SubtitleSet> {
        self.translated_subtitles
            .get(language)
            .or(self.subtitles.as_ref())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            created_at: self.created_at,
            last_active: self.last_active,
            video_filename: self.video_filename.clone(),
            base: self.base().map(str::to_string),
            state: self.state(),
            ready_steps: self.ready_steps(),
            pending_steps: self.pending.keys().copied().collect(),
            artifacts: self.artifacts.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub video_filename: Option<String>,
    pub base: Option<String>,
    pub state: SessionState,
    pub ready_steps: Vec<Step>,
    pub pending_steps: Vec<Step>,
    pub artifacts: Artifacts,
}

/// In-memory sessions shared by request handlers. Every method takes the lock
/// briefly; none is held while a step runs.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, Session>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_id(id: &str) -> Result<Uuid> {
        Uuid::parse_str(id.trim())
            .map_err(|_| PipelineError::InvalidInput(format!("Invalid session id '{}'", id)))
    }

    pub async fn create(&self) -> Session {
        let session = Session::new();
        self.sessions
            .write()
            .await
            .insert(session.id, session.clone());
        debug!("Created session {}", session.id);
        session
    }

    pub async fn get(&self, id: &Uuid) -> Result<Session> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| PipelineError::SessionNotFound(id.to_string()))
    }

    pub async fn begin(&self, id: &Uuid, step: Step) -> Result<()> {
        self.update(id, |session| session.begin(step)).await
    }

    pub async fn complete(&self, id: &Uuid, completion: StepCompletion) -> Result<()> {
        self.update(id, |session| session.complete(completion)).await
    }

    pub async fn abort(&self, id: &Uuid, step: Step) -> Result<()> {
        self.update(id, |session| session.abort(step)).await
    }

    async fn update<F>(&self, id: &Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut Session),
    {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(id)
            .ok_or_else(|| PipelineError::SessionNotFound(id.to_string()))?;
        f(session);
        session.last_active = Utc::now();
        Ok(())
    }

    /// Drop sessions with no step in flight that have been idle longer than
    /// `max_idle`. Returns how many were removed.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, session| !session.pending.is_empty() || session.last_active > cutoff);

        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!("Evicted {} idle sessions, {} remain", evicted, sessions.len());
        }
        evicted
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subtitle::parse_srt;
    use std::path::PathBuf;

    fn artifact(url: &str) -> ArtifactRef {
        ArtifactRef {
            path: PathBuf::from(format!("public{}", url)),
            url: url.to_string(),
        }
    }

    fn upload(name: &str) -> StepCompletion {
        StepCompletion::Upload(UploadOutput {
            video_filename: name.to_string(),
            video_path: artifact(&format!("/uploads/{}", name)),
        })
    }

    fn subtitles() -> StepCompletion {
        StepCompletion::Subtitles(SubtitleOutput {
            subtitles: parse_srt("1\n00:00:01,000 --> 00:00:02,000\nHello there\n"),
            srt_path: artifact("/outputs/clip.srt"),
            vtt_path: artifact("/outputs/clip.vtt"),
        })
    }

    fn translation(lang: &str) -> StepCompletion {
        StepCompletion::Translation(TranslationOutput {
            language: lang.to_string(),
            translated_subtitles: parse_srt("1\n00:00:01,000 --> 00:00:02,000\nHola amigo\n"),
            translated_srt_path: artifact(&format!("/outputs/clip.{}.srt", lang)),
        })
    }

    fn synthesis(lang: &str, remuxed: bool) -> StepCompletion {
        StepCompletion::Synthesis(SynthesisOutput {
            language: lang.to_string(),
            voice_prompt_path: artifact("/outputs/clip_voice_prompt.wav"),
            tts_audio_path: artifact(&format!("/outputs/clip_{}_tts.wav", lang)),
            tts_video_path: remuxed.then(|| artifact(&format!("/outputs/clip_{}_tts_video.mp4", lang))),
            message: String::new(),
        })
    }

    #[test]
    fn test_state_follows_recorded_artifacts() {
        let mut session = Session::new();
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.ready_steps(), vec![Step::Upload]);

        session.complete(upload("clip.mp4"));
        assert_eq!(session.state(), SessionState::Uploaded);
        assert_eq!(session.base(), Some("clip"));
        assert!(session.ready_steps().contains(&Step::GenerateSubtitles));
        assert!(!session.ready_steps().contains(&Step::Burn));

        session.complete(subtitles());
        assert_eq!(session.state(), SessionState::SubtitlesGenerated);
        assert!(session.ready_steps().contains(&Step::Translate));
        assert!(session.ready_steps().contains(&Step::Burn));

        session.begin(Step::Translate);
        assert_eq!(session.state(), SessionState::TranslationPending);
        session.complete(translation("es"));
        assert_eq!(session.state(), SessionState::Translated);
        assert!(!session.is_pending(Step::Translate));
    }

    #[test]
    fn test_synthesis_outcome_states() {
        let mut session = Session::new();
        session.complete(upload("clip.mp4"));
        session.complete(subtitles());

        session.begin(Step::Synthesize);
        assert_eq!(session.state(), SessionState::SynthesisPending);

        session.complete(synthesis("es", false));
        assert_eq!(session.state(), SessionState::SynthesizedOnly);

        session.complete(synthesis("es", true));
        assert_eq!(session.state(), SessionState::SynthesizedAndRemuxed);
    }

    #[test]
    fn test_overlapping_runs_and_abort() {
        let mut session = Session::new();
        session.complete(upload("clip.mp4"));
        session.complete(subtitles());

        session.begin(Step::Burn);
        session.begin(Step::Burn);
        session.abort(Step::Burn);
        assert_eq!(session.state(), SessionState::BurningPending);
        session.abort(Step::Burn);
        assert_eq!(session.state(), SessionState::SubtitlesGenerated);

        // aborting a step that never began is a no-op
        session.abort(Step::Synthesize);
        assert!(session.snapshot().pending_steps.is_empty());
    }

    #[test]
    fn test_narration_prefers_translation() {
        let mut session = Session::new();
        session.complete(upload("clip.mp4"));
        assert!(session.narration_subtitles("es").is_none());

        session.complete(subtitles());
        session.complete(translation("es"));

        let es = session.narration_subtitles("es").unwrap();
        assert_eq!(es.records()[0].text, "Hola amigo");
        let fr = session.narration_subtitles("fr").unwrap();
        assert_eq!(fr.records()[0].text, "Hello there");
    }

    #[test]
    fn test_new_upload_resets_chain() {
        let mut session = Session::new();
        session.complete(upload("clip.mp4"));
        session.complete(subtitles());

        session.complete(upload("other.mp4"));
        assert_eq!(session.state(), SessionState::Uploaded);
        assert!(session.artifacts.srt.is_none());
        assert!(session.narration_subtitles("en").is_none());
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let mut session = Session::new();
        session.complete(upload("clip.mp4"));
        let json = serde_json::to_value(session.snapshot()).unwrap();

        assert_eq!(json["videoFilename"], "clip.mp4");
        assert_eq!(json["state"], "Uploaded");
        assert_eq!(json["artifacts"]["video"], "/uploads/clip.mp4");
        assert_eq!(json["readySteps"][1], "extract_audio");
    }

    #[tokio::test]
    async fn test_store_lookup() {
        let store = SessionStore::new();
        let session = store.create().await;

        store.begin(&session.id, Step::Upload).await.unwrap();
        store.complete(&session.id, upload("clip.mp4")).await.unwrap();
        let stored = store.get(&session.id).await.unwrap();
        assert_eq!(stored.video_filename.as_deref(), Some("clip.mp4"));
        assert!(!stored.is_pending(Step::Upload));

        let unknown = Uuid::new_v4();
        assert!(matches!(
            store.get(&unknown).await,
            Err(PipelineError::SessionNotFound(_))
        ));
        assert!(store.abort(&unknown, Step::Burn).await.is_err());
    }

    #[tokio::test]
    async fn test_idle_sessions_are_evicted() {
        let store = SessionStore::new();
        let stale = store.create().await;
        let busy = store.create().await;
        let fresh = store.create().await;

        store.begin(&busy.id, Step::Burn).await.unwrap();
        {
            let mut sessions = store.sessions.write().await;
            let long_ago = Utc::now() - Duration::hours(48);
            sessions.get_mut(&stale.id).unwrap().last_active = long_ago;
            sessions.get_mut(&busy.id).unwrap().last_active = long_ago;
        }

        assert_eq!(store.evict_idle(Duration::hours(24)).await, 1);
        assert_eq!(store.len().await, 2);
        assert!(matches!(
            store.get(&stale.id).await,
            Err(PipelineError::SessionNotFound(_))
        ));
        assert!(store.get(&busy.id).await.is_ok());
        assert!(store.get(&fresh.id).await.is_ok());

        // activity refreshes the idle clock
        store.abort(&busy.id, Step::Burn).await.unwrap();
        assert_eq!(store.evict_idle(Duration::hours(24)).await, 0);
    }

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(SessionStore::parse_id(&id.to_string()).unwrap(), id);
        assert!(matches!(
            SessionStore::parse_id("nope"),
            Err(PipelineError::InvalidInput(_))
        ));
    }
}
