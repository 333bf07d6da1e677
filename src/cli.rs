use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Session id whose artifact directories the step commands use
    #[arg(long, global = true)]
    pub session: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API
    Serve {
        /// Address to bind, overriding the configuration
        #[arg(short, long)]
        bind: Option<String>,
    },

    /// Store a video and extract its audio
    Extract {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Transcribe a stored video into subtitles
    Subtitles {
        /// Stored video filename
        #[arg(short, long)]
        video: String,

        /// Whisper model size
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Produce translated subtitles for a stored video
    Translate {
        /// Stored video filename
        #[arg(short, long)]
        video: String,

        /// Target language code
        #[arg(short, long)]
        lang: String,

        /// Whisper model size
        #[arg(short, long)]
        model: Option<String>,
    },

    /// Burn a subtitle file into a stored video
    Burn {
        /// Stored video filename
        #[arg(short, long)]
        video: String,

        /// Subtitle path as returned by the subtitle steps (e.g. /outputs/clip.srt)
        #[arg(short, long)]
        subtitles: String,

        /// Output name suffix (e.g. _es)
        #[arg(long, default_value = "")]
        suffix: String,
    },

    /// Synthesize narration from a subtitle file and remux it onto a stored video
    Dub {
        /// Stored video filename
        #[arg(short, long)]
        video: String,

        /// Subtitle file to narrate
        #[arg(short, long)]
        subtitles: PathBuf,

        /// Narration language code
        #[arg(short, long)]
        lang: String,
    },

    /// Run the whole pipeline on a video file
    Process {
        /// Input video file
        #[arg(short, long)]
        input: PathBuf,

        /// Target languages for translation (comma-separated)
        #[arg(short, long, default_value = "")]
        target_langs: String,

        /// Whisper model size
        #[arg(short, long)]
        model: Option<String>,

        /// Also synthesize narration for every target language
        #[arg(long)]
        dub: bool,
    },

    /// List the artifacts present for a stored video
    Status {
        /// Stored video filename
        #[arg(short, long)]
        video: String,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        #[arg(short, long, default_value = "subdub.toml")]
        output: PathBuf,
    },
}

/// Split a comma-separated language list, dropping empty entries.
pub fn parse_languages(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|lang| !lang.is_empty())
        .map(str::to_string)
        .collect()
}
