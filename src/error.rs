use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Video file not found: {}", .0.display())]
    VideoNotFound(PathBuf),

    #[error("Subtitle file not found: {}", .0.display())]
    SubtitleNotFound(PathBuf),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Failed to launch {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{description} failed ({}): {message}", exit_label(.code))]
    ProcessFailed {
        description: String,
        code: Option<i32>,
        message: String,
    },

    #[error("{description} exited cleanly but did not produce {}", .path.display())]
    MissingOutput { description: String, path: PathBuf },

    #[error("Speech synthesis failed: {0}")]
    Synthesis(String),

    #[error("Insufficient text for speech synthesis after cleaning ({chars} chars, need {minimum})")]
    InsufficientText { chars: usize, minimum: usize },

    #[error("Configuration error: {0}")]
    Config(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

impl PipelineError {
    /// Stable tag for the failure class, used in HTTP error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::InvalidInput(_) => "validation",
            PipelineError::VideoNotFound(_)
            | PipelineError::SubtitleNotFound(_)
            | PipelineError::SessionNotFound(_) => "precondition",
            PipelineError::ProcessLaunch { .. } | PipelineError::ProcessFailed { .. } => "process",
            PipelineError::MissingOutput { .. } => "postcondition",
            PipelineError::Synthesis(_) => "synthesis",
            PipelineError::InsufficientText { .. } => "validation",
            PipelineError::Io(_)
            | PipelineError::Json(_)
            | PipelineError::Toml(_)
            | PipelineError::Http(_)
            | PipelineError::Task(_)
            | PipelineError::Config(_) => "internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
