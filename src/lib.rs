//! subdub - subtitle and dubbing pipeline
//!
//! Uploads a video, extracts its audio, transcribes it to subtitles through an
//! external Whisper CLI, optionally translates them, burns subtitles onto the
//! video with ffmpeg, and synthesizes narration in the original speaker's voice
//! that is remuxed onto the video.

pub mod cli;
pub mod config;
pub mod error;
pub mod media;
pub mod naming;
pub mod process;
pub mod server;
pub mod session;
pub mod setup;
pub mod subtitle;
pub mod synthesize;
pub mod transcribe;
pub mod workflow;
