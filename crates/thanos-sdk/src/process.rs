//! Cancellable execution of the external tooling.
//!
//! Every long-running SDK operation is one child process. Its stdout and
//! stderr are streamed line-by-line into the action's log file while stdout
//! is also captured for callers that need the tool's output (URLs, JSON).
//! Cancelling the token kills the child and the operation reports
//! [`SdkError::Cancelled`].

use std::path::Path;
use std::process::Stdio;

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{SdkError, SdkResult};

/// Output of a completed command.
#[derive(Debug)]
pub struct CommandOutput {
    /// Captured stdout lines.
    pub stdout: Vec<String>,
    /// Trailing stderr lines (kept for error reporting).
    pub stderr: Vec<String>,
}

impl CommandOutput {
    /// Join captured stdout into one trimmed string.
    #[must_use]
    pub fn stdout_string(&self) -> String {
        self.stdout.join("\n").trim().to_owned()
    }
}

/// Open the log file for appending, creating parent directories.
pub async fn open_log(path: &Path) -> SdkResult<File> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    Ok(file)
}

/// Run a command to completion, mirroring its output into `log`.
///
/// Returns [`SdkError::Cancelled`] if the token fires before the child
/// exits, and [`SdkError::Command`] on a non-zero exit status.
pub async fn run_logged(
    op: &'static str,
    mut command: Command,
    log: &mut File,
    cancel: &CancellationToken,
) -> SdkResult<CommandOutput> {
    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());

    debug!(op, "spawning external tool");
    let mut child = command.spawn()?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Line channel: both stream readers feed the log writer below so the
    // file sees a single interleaved append stream.
    let (line_tx, mut line_rx) = mpsc::channel::<(bool, String)>(64);

    let stdout_task = tokio::spawn(read_lines(stdout, line_tx.clone(), false));
    let stderr_task = tokio::spawn(read_lines(stderr, line_tx, true));

    let mut captured_stdout = Vec::new();
    let mut captured_stderr = Vec::new();
    let mut lines_done = false;

    let status = loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                warn!(op, "cancelled, killing child process");
                child.kill().await.ok();
                // Drain the readers so the log captures whatever was
                // written before the kill.
                while let Some((_, line)) = line_rx.recv().await {
                    append_line(log, &line).await;
                }
                stdout_task.await.ok();
                stderr_task.await.ok();
                return Err(SdkError::Cancelled);
            }

            line = line_rx.recv(), if !lines_done => {
                match line {
                    Some((is_err, line)) => {
                        append_line(log, &line).await;
                        if is_err {
                            push_bounded(&mut captured_stderr, line);
                        } else {
                            captured_stdout.push(line);
                        }
                    }
                    None => lines_done = true,
                }
            }

            result = child.wait() => {
                break result?;
            }
        }
    };

    // The child has exited; drain remaining buffered lines.
    while let Some((is_err, line)) = line_rx.recv().await {
        append_line(log, &line).await;
        if is_err {
            push_bounded(&mut captured_stderr, line);
        } else {
            captured_stdout.push(line);
        }
    }
    stdout_task.await.ok();
    stderr_task.await.ok();
    log.flush().await.ok();

    if !status.success() {
        return Err(SdkError::Command {
            op,
            exit_code: status.code().unwrap_or(-1),
            stderr: captured_stderr.join("\n"),
        });
    }

    Ok(CommandOutput {
        stdout: captured_stdout,
        stderr: captured_stderr,
    })
}

async fn read_lines(
    stream: Option<impl tokio::io::AsyncRead + Unpin + Send + 'static>,
    tx: mpsc::Sender<(bool, String)>,
    is_err: bool,
) {
    if let Some(stream) = stream {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((is_err, line)).await.is_err() {
                break;
            }
        }
    }
}

async fn append_line(log: &mut File, line: &str) {
    if let Err(e) = log.write_all(format!("{line}\n").as_bytes()).await {
        warn!(error = %e, "failed to append to log file");
    }
}

/// Keep only the tail of stderr; enough context for an error message.
fn push_bounded(lines: &mut Vec<String>, line: String) {
    const MAX_STDERR_LINES: usize = 50;
    if lines.len() == MAX_STDERR_LINES {
        lines.remove(0);
    }
    lines.push(line);
}

/// Run a short-lived command without a log file, capturing stdout.
///
/// Used by the stateless probes.
pub async fn run_quiet(op: &'static str, mut command: Command) -> SdkResult<String> {
    command.stdin(Stdio::null());
    let output = command.output().await?;

    if !output.status.success() {
        return Err(SdkError::Command {
            op,
            exit_code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).trim().to_owned())
}
