use std::path::Path;

use crate::process::ProcessCommand;

/// Transcoder command with ffmpeg-style flag helpers.
#[derive(Debug, Clone)]
pub struct MediaCommand {
    command: ProcessCommand,
}

impl MediaCommand {
    /// Create a new media processing command
    pub fn new<S1: Into<String>, S2: Into<String>>(binary_path: S1, description: S2) -> Self {
        Self {
            command: ProcessCommand::new(binary_path, description),
        }
    }

    /// Add an argument
    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.command = self.command.arg(arg);
        self
    }

    /// Add input file
    pub fn input<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg("-i").arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Add output file
    pub fn output<P: AsRef<Path>>(self, path: P) -> Self {
        self.arg(path.as_ref().to_string_lossy().to_string())
    }

    /// Force overwrite output
    pub fn overwrite(self) -> Self {
        self.arg("-y")
    }

    /// Set video codec
    pub fn video_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:v").arg(codec)
    }

    /// Set audio codec
    pub fn audio_codec<S: Into<String>>(self, codec: S) -> Self {
        self.arg("-c:a").arg(codec)
    }

    pub fn copy_video(self) -> Self {
        self.video_codec("copy")
    }

    pub fn copy_audio(self) -> Self {
        self.audio_codec("copy")
    }

    /// Disable video
    pub fn no_video(self) -> Self {
        self.arg("-vn")
    }

    pub fn audio_sample_rate(self, rate: u32) -> Self {
        self.arg("-ar").arg(rate.to_string())
    }

    pub fn audio_channels(self, channels: u32) -> Self {
        self.arg("-ac").arg(channels.to_string())
    }

    /// Limit output duration in seconds
    pub fn duration(self, seconds: u32) -> Self {
        self.arg("-t").arg(seconds.to_string())
    }

    /// Select a stream for the output, e.g. `0:v:0`
    pub fn map<S: Into<String>>(self, specifier: S) -> Self {
        self.arg("-map").arg(specifier)
    }

    /// Stop at the end of the shortest input stream
    pub fn shortest(self) -> Self {
        self.arg("-shortest")
    }

    /// Add video filter
    pub fn video_filter<S: Into<String>>(self, filter: S) -> Self {
        self.arg("-vf").arg(filter)
    }

    pub fn description(&self) -> &str {
        &self.command.description
    }

    pub fn into_command(self) -> ProcessCommand {
        self.command
    }
}

/// Escape a file path for use as a filtergraph option value.
pub fn escape_filter_path(path: &Path) -> String {
    let mut escaped = String::new();
    for c in path.to_string_lossy().chars() {
        match c {
            '\\' => escaped.push('/'),
            ':' => escaped.push_str("\\\\:"),
            ' ' | '!' | '[' | ']' | '\'' | ',' | ';' => {
                escaped.push('\\');
                escaped.push(c);
            }
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Builder for the transcoder invocations the pipeline needs
pub struct MediaCommandBuilder {
    binary_path: String,
}

impl MediaCommandBuilder {
    pub fn new<S: Into<String>>(binary_path: S) -> Self {
        Self {
            binary_path: binary_path.into(),
        }
    }

    /// Mono 16kHz PCM sidecar for the transcriber
    pub fn extract_audio<P: AsRef<Path>>(&self, video_path: P, audio_path: P) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio extraction")
            .input(video_path)
            .no_video()
            .audio_codec("pcm_s16le")
            .audio_sample_rate(16000)
            .audio_channels(1)
            .overwrite()
            .output(audio_path)
    }

    /// Render subtitles onto the frames, passing audio through
    pub fn burn_subtitles<P: AsRef<Path>>(
        &self,
        video_path: P,
        subtitle_path: P,
        output_path: P,
        style: &str,
        additional_options: &[String],
    ) -> MediaCommand {
        let mut filter = format!("subtitles={}", escape_filter_path(subtitle_path.as_ref()));
        if !style.is_empty() {
            filter.push_str(&format!(":force_style='{}'", style));
        }

        let mut cmd = MediaCommand::new(&self.binary_path, "Subtitle burning")
            .input(&video_path)
            .video_filter(filter)
            .copy_audio();

        for option in additional_options {
            cmd = cmd.arg(option);
        }

        cmd.overwrite().output(output_path)
    }

    /// Clip the opening seconds of the video's audio as a voice reference
    pub fn extract_voice_sample<P: AsRef<Path>>(
        &self,
        video_path: P,
        sample_path: P,
        seconds: u32,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Voice sample extraction")
            .input(video_path)
            .duration(seconds)
            .audio_sample_rate(16000)
            .audio_channels(1)
            .output(sample_path)
            .overwrite()
    }

    /// Replace the video's audio track, video stream copied unchanged
    pub fn replace_audio<P: AsRef<Path>>(
        &self,
        video_path: P,
        audio_path: P,
        output_path: P,
    ) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Audio remux")
            .input(video_path)
            .input(audio_path)
            .copy_video()
            .map("0:v:0")
            .map("1:a:0")
            .shortest()
            .output(output_path)
            .overwrite()
    }

    pub fn version_check(&self) -> MediaCommand {
        MediaCommand::new(&self.binary_path, "Version check").arg("-version")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_extract_audio_args() {
        let cmd = MediaCommandBuilder::new("ffmpeg")
            .extract_audio(PathBuf::from("up/clip.mp4"), PathBuf::from("up/clip.wav"))
            .into_command();
        assert_eq!(cmd.program, "ffmpeg");
        assert_eq!(
            cmd.args,
            vec!["-i", "up/clip.mp4", "-vn", "-c:a", "pcm_s16le", "-ar", "16000", "-ac", "1", "-y", "up/clip.wav"]
        );
    }

    #[test]
    fn test_burn_filter_is_escaped_and_styled() {
        let cmd = MediaCommandBuilder::new("ffmpeg")
            .burn_subtitles(
                Path::new("in.mp4"),
                Path::new("C:\\subs\\my clip.srt"),
                Path::new("out.mp4"),
                "FontSize=24",
                &["-crf".to_string(), "23".to_string()],
            )
            .into_command();
        assert_eq!(cmd.args[2], "-vf");
        assert_eq!(cmd.args[3], "subtitles=C\\\\:/subs/my\\ clip.srt:force_style='FontSize=24'");
        assert_eq!(&cmd.args[4..], &["-c:a", "copy", "-crf", "23", "-y", "out.mp4"]);
    }

    #[test]
    fn test_replace_audio_maps_streams() {
        let cmd = MediaCommandBuilder::new("ffmpeg")
            .replace_audio(Path::new("v.mp4"), Path::new("a.wav"), Path::new("o.mp4"))
            .into_command();
        assert_eq!(
            cmd.args,
            vec!["-i", "v.mp4", "-i", "a.wav", "-c:v", "copy", "-map", "0:v:0", "-map", "1:a:0", "-shortest", "o.mp4", "-y"]
        );
    }

    #[test]
    fn test_voice_sample_duration() {
        let cmd = MediaCommandBuilder::new("ffmpeg")
            .extract_voice_sample(Path::new("v.mp4"), Path::new("s.wav"), 5)
            .into_command();
        assert_eq!(cmd.args, vec!["-i", "v.mp4", "-t", "5", "-ar", "16000", "-ac", "1", "s.wav", "-y"]);
    }
}
