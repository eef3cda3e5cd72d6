//! Subprocess execution for command-line builders

use super::{OutputSink, OutputSinks};
use crate::error::BuildError;
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Lines of output kept for error messages
const OUTPUT_TAIL_LINES: usize = 200;

/// Where a builder subprocess runs and what path argument it receives
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocationTarget {
    pub arg: String,
    pub working_dir: Option<PathBuf>,
}

/// Resolves the build path argument for a configured context.
///
/// `.` and empty contexts run in the current directory with the argument
/// unchanged. Any other context becomes the subprocess working directory and
/// the argument becomes `.`, because builders resolve the argument relative
/// to their working directory.
pub fn resolve_invocation(context: &str) -> InvocationTarget {
    if context.is_empty() || context == "." {
        InvocationTarget {
            arg: context.to_string(),
            working_dir: None,
        }
    } else {
        InvocationTarget {
            arg: ".".to_string(),
            working_dir: Some(PathBuf::from(context)),
        }
    }
}

/// A fully resolved builder command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildCommand {
    pub program: String,
    pub args: Vec<String>,
    pub working_dir: Option<PathBuf>,
    pub env: BTreeMap<String, String>,
}

impl BuildCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Appends `flag KEY=VALUE` for every entry
    pub fn key_value_flags(mut self, flag: &str, entries: &BTreeMap<String, String>) -> Self {
        for (key, value) in entries {
            self.args.push(flag.to_string());
            self.args.push(format!("{}={}", key, value));
        }
        self
    }

    pub fn target(mut self, target: InvocationTarget) -> Self {
        self.args.push(target.arg);
        self.working_dir = target.working_dir;
        self
    }

    /// Shell-like rendering with `KEY=VALUE` flag values masked
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        for arg in &self.args {
            match arg.split_once('=') {
                Some((key, _)) if !arg.starts_with('-') => parts.push(format!("{}=***", key)),
                _ => parts.push(arg.clone()),
            }
        }
        parts.join(" ")
    }
}

/// Outcome of a successful command run
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub duration: Duration,
    pub tail: String,
}

/// Bounded ring of the most recent output lines
#[derive(Debug, Default)]
struct OutputTail {
    lines: VecDeque<String>,
}

impl OutputTail {
    fn push(&mut self, line: &str) {
        if self.lines.len() == OUTPUT_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out
    }
}

/// Line reader over raw bytes. Output is decoded lossily, so stray non-UTF-8
/// bytes never stop the pipe from being drained. Partial lines survive a
/// cancelled read, which keeps it usable inside `select!`.
struct OutputLines<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> OutputLines<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 && self.buf.is_empty() {
            return Ok(None);
        }

        let bytes = std::mem::take(&mut self.buf);
        let line = bytes.strip_suffix(b"\n").unwrap_or(&bytes[..]);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        Ok(Some(String::from_utf8_lossy(line).into_owned()))
    }
}

/// Next line from an open stream; pends forever once the stream is closed
async fn next_line<R: AsyncBufRead + Unpin>(
    lines: &mut Option<OutputLines<R>>,
) -> Option<String> {
    match lines {
        Some(lines) => match lines.next_line().await {
            Ok(line) => line,
            Err(e) => {
                debug!(error = %e, "Build output stream failed");
                None
            }
        },
        None => std::future::pending().await,
    }
}

async fn forward_line(sink: &mut Option<OutputSink>, line: &str) {
    if let Some(writer) = sink.as_mut() {
        let result = async {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            debug!(error = %e, "Dropping build output line, sink write failed");
        }
    }
}

/// Runs `command`, streaming output into `sinks` and keeping a tail in memory.
///
/// Cancelling `cancel` kills the process and yields [`BuildError::Cancelled`].
/// A non-zero exit or a spawn failure yields [`BuildError::BuildFailed`].
pub async fn run_command(
    builder: &str,
    command: &BuildCommand,
    cancel: &CancellationToken,
    sinks: &mut OutputSinks,
) -> Result<CommandOutput, BuildError> {
    let start = Instant::now();

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args)
        .envs(&command.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &command.working_dir {
        cmd.current_dir(dir);
    }

    info!(builder, command = %command.display(), "Starting build");

    let mut child = cmd.spawn().map_err(|e| BuildError::BuildFailed {
        builder: builder.to_string(),
        message: format!("failed to start '{}': {}", command.program, e),
        output: String::new(),
    })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let mut out_lines = stdout.map(|s| OutputLines::new(BufReader::new(s)));
    let mut err_lines = stderr.map(|s| OutputLines::new(BufReader::new(s)));
    let mut tail = OutputTail::default();

    let status = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                warn!(builder, "Build cancelled, terminating process");
                child.kill().await.ok();
                return Err(BuildError::Cancelled { builder: builder.to_string() });
            }
            line = next_line(&mut out_lines), if out_lines.is_some() => {
                match line {
                    Some(line) => {
                        tail.push(&line);
                        forward_line(&mut sinks.stdout, &line).await;
                    }
                    None => out_lines = None,
                }
            }
            line = next_line(&mut err_lines), if err_lines.is_some() => {
                match line {
                    Some(line) => {
                        tail.push(&line);
                        forward_line(&mut sinks.stderr, &line).await;
                    }
                    None => err_lines = None,
                }
            }
            status = child.wait(), if out_lines.is_none() && err_lines.is_none() => {
                break status?;
            }
        }
    };

    let duration = start.elapsed();
    if !status.success() {
        let message = match status.code() {
            Some(code) => format!("exited with status {}", code),
            None => "terminated by signal".to_string(),
        };
        return Err(BuildError::BuildFailed {
            builder: builder.to_string(),
            message,
            output: tail.render(),
        });
    }

    debug!(builder, duration_ms = duration.as_millis() as u64, "Build process finished");
    Ok(CommandOutput {
        duration,
        tail: tail.render(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    #[parameterized(
        dot = { "." },
        empty = { "" },
    )]
    fn test_current_dir_context_is_passed_through(context: &str) {
        let target = resolve_invocation(context);
        assert_eq!(target.arg, context);
        assert_eq!(target.working_dir, None);
    }

    #[parameterized(
        relative = { "services/api" },
        dot_relative = { "./web" },
        absolute = { "/srv/app" },
        parent = { "../shared" },
    )]
    fn test_other_context_becomes_working_dir(context: &str) {
        let target = resolve_invocation(context);
        assert_eq!(target.arg, ".");
        assert_eq!(target.working_dir, Some(PathBuf::from(context)));
    }

    #[test]
    fn test_context_is_never_passed_twice() {
        let command = BuildCommand::new("railpack")
            .arg("build")
            .target(resolve_invocation("apps/web"));
        assert_eq!(command.args, vec!["build", "."]);
        assert_eq!(command.working_dir, Some(PathBuf::from("apps/web")));
        assert!(!command.args.iter().any(|a| a == "apps/web"));
    }

    #[test]
    fn test_display_masks_values() {
        let mut env = BTreeMap::new();
        env.insert("TOKEN".to_string(), "secret".to_string());
        let command = BuildCommand::new("nixpacks")
            .arg("build")
            .key_value_flags("--env", &env);
        assert_eq!(command.display(), "nixpacks build --env TOKEN=***");
    }

    #[test]
    fn test_output_tail_is_bounded() {
        let mut tail = OutputTail::default();
        for i in 0..(OUTPUT_TAIL_LINES + 10) {
            tail.push(&format!("line {}", i));
        }
        assert_eq!(tail.lines.len(), OUTPUT_TAIL_LINES);
        assert_eq!(tail.lines.front().unwrap(), "line 10");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_captures_output_without_sinks() {
        let command = BuildCommand::new("sh").args(["-c", "echo building; echo oops >&2; exit 3"]);
        let mut sinks = OutputSinks::default();
        let err = run_command("test", &command, &CancellationToken::new(), &mut sinks)
            .await
            .unwrap_err();
        match err {
            BuildError::BuildFailed {
                message, output, ..
            } => {
                assert!(message.contains('3'));
                assert!(output.contains("building"));
                assert!(output.contains("oops"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_survives_non_utf8_output() {
        // Enough output after the bad byte to fill the pipe if it stopped being read
        let script = "printf 'caf\\351\\n'; i=0; while [ $i -lt 20000 ]; do echo line $i; i=$((i+1)); done; exit 0";
        let command = BuildCommand::new("sh").args(["-c", script]);
        let mut sinks = OutputSinks::default();
        let output = run_command("latin1", &command, &CancellationToken::new(), &mut sinks)
            .await
            .unwrap();
        assert!(output.tail.contains("line 19999"));
    }

    #[tokio::test]
    async fn test_output_lines_decode_lossily() {
        let input: &[u8] = b"caf\xe9\r\nok\nlast";
        let mut lines = OutputLines::new(input);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "caf\u{FFFD}");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "ok");
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "last");
        assert_eq!(lines.next_line().await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_uses_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let command = BuildCommand::new("sh")
            .args(["-c", "test -f marker.txt"])
            .target(resolve_invocation(dir.path().to_str().unwrap()));
        // `sh -c <script> .` binds `.` to $0, so the script is unaffected
        let mut sinks = OutputSinks::default();
        let output = run_command("test", &command, &CancellationToken::new(), &mut sinks).await;
        assert!(output.is_ok());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_command_cancellation() {
        let command = BuildCommand::new("sleep").arg("30");
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let mut sinks = OutputSinks::default();
        let err = run_command("sleepy", &command, &cancel, &mut sinks)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Cancelled { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_build_failure() {
        let command = BuildCommand::new("definitely-not-a-real-builder-binary");
        let mut sinks = OutputSinks::default();
        let err = run_command("ghost", &command, &CancellationToken::new(), &mut sinks)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }
}
