//! HTTP API
//!
//! - `POST /api/extract-audio` - multipart upload (`video`) + audio extraction
//! - `POST /api/generate-subtitles` - transcription
//! - `POST /api/translate-subtitles` - translated transcription
//! - `POST /api/burn-subtitles` - render subtitles onto the video
//! - `POST /api/generate-tts` - narration synthesis + remux
//! - `GET /api/download?path=` - artifact download as attachment
//! - `GET /api/sessions/:id` - session snapshot
//! - `GET /health`
//! - static `/uploads/*` and `/outputs/*`

use std::future::Future;
use std::path::Path as FsPath;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::session::{Session, SessionSnapshot, SessionStore, Step, StepCompletion};
use crate::subtitle::NarrationSource;
use crate::workflow::{
    BurnOutput, ExtractAudioOutput, SubtitleOutput, SynthesisOutput, TranslationOutput, Workflow,
};

const SESSION_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(300);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<Workflow>,
    pub sessions: SessionStore,
}

impl AppState {
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow: Arc::new(workflow),
            sessions: SessionStore::new(),
        }
    }
}

/// Build the HTTP API router
pub fn build_router(state: AppState) -> Router {
    let layout = state.workflow.layout_for(None);
    let uploads_route = layout.public_url(layout.uploads_dir());
    let outputs_route = layout.public_url(layout.outputs_dir());
    let body_limit = state.workflow.config().server.max_upload_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/extract-audio", post(extract_audio_handler))
        .route("/api/generate-subtitles", post(generate_subtitles_handler))
        .route("/api/translate-subtitles", post(translate_subtitles_handler))
        .route("/api/burn-subtitles", post(burn_subtitles_handler))
        .route("/api/generate-tts", post(generate_tts_handler))
        .route("/api/download", get(download_handler))
        .route("/api/sessions/:id", get(session_handler))
        .nest_service(&uploads_route, ServeDir::new(layout.uploads_dir()))
        .nest_service(&outputs_route, ServeDir::new(layout.outputs_dir()))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
        .layer(
            tower::ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
}

/// Bind and serve until the process is stopped.
pub async fn serve(workflow: Workflow, bind_address: &str) -> Result<()> {
    let addr: std::net::SocketAddr = bind_address
        .parse()
        .map_err(|e| PipelineError::Config(format!("Invalid bind address '{}': {}", bind_address, e)))?;

    let idle = chrono::Duration::seconds(workflow.config().server.session_idle_secs as i64);
    let state = AppState::new(workflow);
    spawn_session_sweeper(state.sessions.clone(), idle);

    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Starting HTTP server on {}", addr);

    axum::serve(listener, router).await?;
    Ok(())
}

/// Periodically drop idle sessions from the store.
fn spawn_session_sweeper(sessions: SessionStore, idle: chrono::Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let evicted = sessions.evict_idle(idle).await;
            if evicted > 0 {
                info!("Dropped {} idle sessions", evicted);
            }
        }
    });
}

/// Error body: `{error, errorType}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    error_type: &'static str,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    error_type: &'static str,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
            error_type: "validation",
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
            error_type: "precondition",
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match &e {
            PipelineError::InvalidInput(_) | PipelineError::InsufficientText { .. } => {
                StatusCode::BAD_REQUEST
            }
            PipelineError::VideoNotFound(_)
            | PipelineError::SubtitleNotFound(_)
            | PipelineError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", e);
        } else {
            warn!("Request rejected: {}", e);
        }

        // Server paths stay out of client-facing messages.
        let message = match &e {
            PipelineError::VideoNotFound(_) => "Video file not found".to_string(),
            PipelineError::SubtitleNotFound(_) => "Subtitle file not found".to_string(),
            PipelineError::MissingOutput { description, .. } => {
                format!("{} output file was not generated", description)
            }
            other => other.to_string(),
        };

        Self {
            status,
            message,
            error_type: e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.message,
            error_type: self.error_type,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Success body: `{success: true, sessionId?, ...step output}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<Uuid>,
    #[serde(flatten)]
    output: T,
}

impl<T> StepResponse<T> {
    fn new(session_id: Option<Uuid>, output: T) -> Json<Self> {
        Json(Self {
            success: true,
            session_id,
            output,
        })
    }
}

async fn health_handler() -> StatusCode {
    StatusCode::OK
}

/// Look up the session named by a request, if any.
async fn resolve_session(state: &AppState, raw: Option<&str>) -> Result<Option<Session>> {
    match raw.map(str::trim).filter(|id| !id.is_empty()) {
        Some(raw) => {
            let id = SessionStore::parse_id(raw)?;
            Ok(Some(state.sessions.get(&id).await?))
        }
        None => Ok(None),
    }
}

/// Run a step on its own task, keeping the session's pending set and
/// artifacts current. A client that disconnects does not cancel the step.
async fn tracked<T, F>(state: &AppState, session: Option<Uuid>, step: Step, run: F) -> Result<T>
where
    T: Clone + Into<StepCompletion> + Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    if let Some(id) = &session {
        state.sessions.begin(id, step).await?;
    }

    let sessions = state.sessions.clone();
    let task = tokio::spawn(async move {
        let result = run.await;
        if let Some(id) = session {
            let recorded = match &result {
                Ok(output) => sessions.complete(&id, output.clone().into()).await,
                Err(_) => sessions.abort(&id, step).await,
            };
            if let Err(e) = recorded {
                warn!("Session {} not updated after {:?}: {}", id, step, e);
            }
        }
        result
    });

    task.await?
}

/// POST /api/extract-audio
async fn extract_audio_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ApiResult<Json<StepResponse<ExtractAudioOutput>>> {
    let mut upload: Option<(String, Bytes)> = None;
    let mut session_field: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Invalid multipart body: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("video") => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Failed to read upload: {}", e)))?;
                upload = Some((file_name, bytes));
            }
            Some("sessionId") => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Invalid sessionId field: {}", e)))?;
                session_field = Some(text);
            }
            _ => {}
        }
    }

    let (file_name, bytes) = upload.ok_or_else(|| ApiError::bad_request("No file uploaded"))?;

    let session = match resolve_session(&state, session_field.as_deref()).await? {
        Some(session) => session,
        None => state.sessions.create().await,
    };
    let id = session.id;
    let layout = state.workflow.layout_for(Some(&id));

    let workflow = Arc::clone(&state.workflow);
    let upload_layout = layout.clone();
    let stored = tracked(&state, Some(id), Step::Upload, async move {
        workflow.store_upload(&upload_layout, &file_name, &bytes).await
    })
    .await?;

    let workflow = Arc::clone(&state.workflow);
    let output = tracked(&state, Some(id), Step::ExtractAudio, async move {
        workflow.extract_audio(&layout, &stored.video_filename).await
    })
    .await?;

    Ok(StepResponse::new(Some(id), output))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GenerateSubtitlesRequest {
    video_filename: Option<String>,
    model: Option<String>,
    session_id: Option<String>,
}

/// POST /api/generate-subtitles
async fn generate_subtitles_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerateSubtitlesRequest>,
) -> ApiResult<Json<StepResponse<SubtitleOutput>>> {
    let video = required(req.video_filename, "No video filename provided")?;
    let id = resolve_session(&state, req.session_id.as_deref()).await?.map(|s| s.id);
    let layout = state.workflow.step_layout(id.as_ref())?;
    let model = req.model;

    let workflow = Arc::clone(&state.workflow);
    let output = tracked(&state, id, Step::GenerateSubtitles, async move {
        workflow
            .generate_subtitles(&layout, &video, model.as_deref())
            .await
    })
    .await?;

    Ok(StepResponse::new(id, output))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct TranslateSubtitlesRequest {
    video_filename: Option<String>,
    target_language: Option<String>,
    model: Option<String>,
    /// Accepted for compatibility; the translator works from the video.
    #[allow(dead_code)]
    subtitles: Option<serde_json::Value>,
    session_id: Option<String>,
}

/// POST /api/translate-subtitles
async fn translate_subtitles_handler(
    State(state): State<AppState>,
    Json(req): Json<TranslateSubtitlesRequest>,
) -> ApiResult<Json<StepResponse<TranslationOutput>>> {
    let missing = "Missing target language or video filename";
    let video = required(req.video_filename, missing)?;
    let language = required(req.target_language, missing)?;
    let id = resolve_session(&state, req.session_id.as_deref()).await?.map(|s| s.id);
    let layout = state.workflow.step_layout(id.as_ref())?;
    let model = req.model;

    let workflow = Arc::clone(&state.workflow);
    let output = tracked(&state, id, Step::Translate, async move {
        workflow
            .translate_subtitles(&layout, &video, &language, model.as_deref())
            .await
    })
    .await?;

    Ok(StepResponse::new(id, output))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BurnSubtitlesRequest {
    video_filename: Option<String>,
    srt_path: Option<String>,
    output_suffix: Option<String>,
    session_id: Option<String>,
}

/// POST /api/burn-subtitles
async fn burn_subtitles_handler(
    State(state): State<AppState>,
    Json(req): Json<BurnSubtitlesRequest>,
) -> ApiResult<Json<StepResponse<BurnOutput>>> {
    let missing = "Missing video filename or SRT path";
    let video = required(req.video_filename, missing)?;
    let srt = required(req.srt_path, missing)?;
    let subtitle_path = state.workflow.resolve_subtitle_path(&srt)?;
    let id = resolve_session(&state, req.session_id.as_deref()).await?.map(|s| s.id);
    let layout = state.workflow.step_layout(id.as_ref())?;
    let suffix = req.output_suffix.unwrap_or_default();

    let workflow = Arc::clone(&state.workflow);
    let output = tracked(&state, id, Step::Burn, async move {
        workflow
            .burn_subtitles(&layout, &video, &subtitle_path, &suffix)
            .await
    })
    .await?;

    Ok(StepResponse::new(id, output))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct GenerateTtsRequest {
    subtitles: Option<Vec<NarrationSource>>,
    target_language: Option<String>,
    video_filename: Option<String>,
    session_id: Option<String>,
}

/// POST /api/generate-tts
///
/// Without `subtitles`, the session's subtitles for the language are narrated.
async fn generate_tts_handler(
    State(state): State<AppState>,
    Json(req): Json<GenerateTtsRequest>,
) -> ApiResult<Json<StepResponse<SynthesisOutput>>> {
    let missing = "Missing subtitles, target language, or video filename";
    let video = required(req.video_filename, missing)?;
    let language = required(req.target_language, missing)?;
    let session = resolve_session(&state, req.session_id.as_deref()).await?;

    let sources = match req.subtitles.filter(|s| !s.is_empty()) {
        Some(sources) => sources,
        None => session
            .as_ref()
            .and_then(|s| s.narration_subtitles(&language))
            .map(Vec::<NarrationSource>::from)
            .ok_or_else(|| ApiError::bad_request(missing))?,
    };

    let id = session.map(|s| s.id);
    let layout = state.workflow.step_layout(id.as_ref())?;

    let workflow = Arc::clone(&state.workflow);
    let output = tracked(&state, id, Step::Synthesize, async move {
        workflow
            .synthesize_speech(&layout, &video, &sources, &language)
            .await
    })
    .await?;

    Ok(StepResponse::new(id, output))
}

#[derive(Debug, Deserialize)]
struct DownloadQuery {
    path: Option<String>,
}

fn content_type(path: &FsPath) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("srt") => "text/plain",
        Some("vtt") => "text/vtt",
        Some("mp4") => "video/mp4",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        _ => "application/octet-stream",
    }
}

/// GET /api/download?path=
async fn download_handler(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Response> {
    let public_path = required(query.path, "No path provided")?;
    let file_path = state.workflow.resolve_subtitle_path(&public_path)?;

    let bytes = tokio::fs::read(&file_path)
        .await
        .map_err(|_| ApiError::not_found("File not found"))?;

    let file_name = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok((
        [
            (header::CONTENT_TYPE, content_type(&file_path).to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// GET /api/sessions/:id
async fn session_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let id = SessionStore::parse_id(&id)?;
    let session = state.sessions.get(&id).await?;
    Ok(Json(session.snapshot()))
}

fn required(value: Option<String>, message: &str) -> ApiResult<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request(message))
}
