//! External process invocation.
//!
//! Every pipeline step reaches its tool through [`ProcessRunner`]: the command is
//! spawned, each line it writes to stdout or stderr is handed to the caller's
//! sink as it arrives, and the call resolves once the process exits. There is
//! no timeout and no retry here; a hung tool hangs the caller.
//!
//! The child and its pipes belong to a background task. A caller that stops
//! waiting only stops receiving lines; the tool keeps running to completion.

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::{self, UnboundedSender};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Lines of stderr kept in a failure message.
const ERROR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// Receives every output line of a running process.
pub type LineSink<'a> = &'a (dyn Fn(OutputStream, &str) + Send + Sync);

/// Executable, ordered arguments and a human-readable description used in logs
/// and error messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
    pub description: String,
    pub working_dir: Option<PathBuf>,
}

impl ProcessCommand {
    pub fn new<S1: Into<String>, S2: Into<String>>(program: S1, description: S2) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            description: description.into(),
            working_dir: None,
        }
    }

    pub fn arg<S: Into<String>>(mut self, arg: S) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(|s| s.into()));
        self
    }

    pub fn current_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.working_dir = Some(dir.into());
        self
    }
}

/// Sink that logs each line at DEBUG, tagged with the tool name.
pub fn tracing_sink(tool: &str) -> impl Fn(OutputStream, &str) + Send + Sync + '_ {
    move |stream: OutputStream, line: &str| match stream {
        OutputStream::Stdout => debug!("{}: {}", tool, line),
        OutputStream::Stderr => debug!("{} (stderr): {}", tool, line),
    }
}

/// Everything a successful process wrote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: Vec<String>,
    pub stderr: Vec<String>,
}

impl ProcessOutput {
    /// Last non-blank stdout line; tools report structured status there.
    pub fn last_stdout_line(&self) -> Option<&str> {
        self.stdout
            .iter()
            .rev()
            .map(|line| line.trim())
            .find(|line| !line.is_empty())
    }
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `command` to completion. Resolves only on exit status 0.
    async fn run(&self, command: &ProcessCommand, sink: LineSink<'_>) -> Result<ProcessOutput>;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, command: &ProcessCommand, sink: LineSink<'_>) -> Result<ProcessOutput> {
        debug!("Executing {}: {} {:?}", command.description, command.program, command.args);

        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = &command.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|source| PipelineError::ProcessLaunch {
            program: command.program.clone(),
            source,
        })?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stderr_tx = tx.clone();

        let drain = tokio::spawn(async move {
            let (stdout, stderr, status) = tokio::join!(
                collect_lines(stdout, OutputStream::Stdout, tx),
                collect_lines(stderr, OutputStream::Stderr, stderr_tx),
                child.wait(),
            );
            let output = ProcessOutput {
                stdout: stdout?,
                stderr: stderr?,
            };
            Ok::<_, PipelineError>((output, status?))
        });

        while let Some((stream, line)) = rx.recv().await {
            sink(stream, &line);
        }
        let (output, status) = drain.await??;

        if !status.success() {
            return Err(PipelineError::ProcessFailed {
                description: command.description.clone(),
                code: status.code(),
                message: failure_message(&output),
            });
        }

        debug!("{} finished", command.description);
        Ok(output)
    }
}

async fn collect_lines<R>(
    reader: Option<R>,
    stream: OutputStream,
    lines: UnboundedSender<(OutputStream, String)>,
) -> Result<Vec<String>>
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return Ok(Vec::new());
    };

    let mut captured = Vec::new();
    let mut segments = BufReader::new(reader).split(b'\n');
    while let Some(segment) = segments.next_segment().await? {
        let line = String::from_utf8_lossy(&segment)
            .trim_end_matches('\r')
            .to_string();
        // nobody is listening once the caller has gone; keep draining
        let _ = lines.send((stream, line.clone()));
        captured.push(line);
    }
    Ok(captured)
}

/// Tail of stderr, falling back to stdout when the tool only wrote there.
fn failure_message(output: &ProcessOutput) -> String {
    let lines = if output.stderr.iter().any(|l| !l.trim().is_empty()) {
        &output.stderr
    } else {
        &output.stdout
    };

    let tail: Vec<&str> = lines
        .iter()
        .map(|line| line.trim_end())
        .filter(|line| !line.is_empty())
        .collect();
    let start = tail.len().saturating_sub(ERROR_TAIL_LINES);
    tail[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn quiet(_: OutputStream, _: &str) {}

    #[test]
    fn test_command_builder_keeps_argument_order() {
        let command = ProcessCommand::new("ffmpeg", "Audio extraction")
            .arg("-i")
            .arg("in.mp4")
            .args(["-ac", "1"]);
        assert_eq!(command.args, vec!["-i", "in.mp4", "-ac", "1"]);
        assert_eq!(command.working_dir, None);
    }

    #[test]
    fn test_failure_message_prefers_stderr_tail() {
        let output = ProcessOutput {
            stdout: vec!["progress".to_string()],
            stderr: (0..30).map(|i| format!("line {}", i)).collect(),
        };
        let message = failure_message(&output);
        assert!(message.starts_with("line 10"));
        assert!(message.ends_with("line 29"));

        let stdout_only = ProcessOutput {
            stdout: vec!["Traceback".to_string(), "ValueError".to_string()],
            stderr: vec!["  ".to_string()],
        };
        assert_eq!(failure_message(&stdout_only), "Traceback\nValueError");
    }

    #[test]
    fn test_last_stdout_line_skips_blank_lines() {
        let output = ProcessOutput {
            stdout: vec!["loading".to_string(), "{\"success\": true}".to_string(), "".to_string()],
            stderr: vec![],
        };
        assert_eq!(output.last_stdout_line(), Some("{\"success\": true}"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_forwards_both_streams() {
        let seen = Mutex::new(Vec::new());
        let sink = |stream: OutputStream, line: &str| {
            seen.lock().unwrap().push((stream, line.to_string()));
        };
        let command = ProcessCommand::new("sh", "Echo").args(["-c", "echo out; echo err 1>&2"]);

        let output = TokioProcessRunner.run(&command, &sink).await.unwrap();

        assert_eq!(output.stdout, vec!["out"]);
        assert_eq!(output.stderr, vec!["err"]);
        let seen = seen.lock().unwrap();
        assert!(seen.contains(&(OutputStream::Stdout, "out".to_string())));
        assert!(seen.contains(&(OutputStream::Stderr, "err".to_string())));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_rejects_non_zero_exit() {
        let command = ProcessCommand::new("sh", "Failing tool").args(["-c", "echo boom 1>&2; exit 3"]);
        let err = TokioProcessRunner.run(&command, &quiet).await.unwrap_err();

        match err {
            PipelineError::ProcessFailed { description, code, message } => {
                assert_eq!(description, "Failing tool");
                assert_eq!(code, Some(3));
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_abandoned_run_still_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("done");
        let script = format!(
            "sleep 1; echo progress; echo more 1>&2; touch '{}'",
            marker.display()
        );
        let command = ProcessCommand::new("sh", "Slow tool").args(["-c", script.as_str()]);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(200),
            TokioProcessRunner.run(&command, &quiet),
        )
        .await;
        assert!(abandoned.is_err());

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_runner_reports_missing_executable() {
        let command = ProcessCommand::new("subdub-definitely-not-installed", "Missing tool");
        let err = TokioProcessRunner.run(&command, &quiet).await.unwrap_err();
        assert!(matches!(err, PipelineError::ProcessLaunch { .. }));
    }
}
