//! Work units: the asynchronous jobs behind each task.

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use regex::Regex;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

static PROGRESS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<progress>\s*(\d+(?:\.\d+)?)%?\s*</progress>").unwrap());

/// Lines of stderr kept for error reports.
const STDERR_TAIL: usize = 5;

/// Something a running unit reports back to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkUpdate {
    /// Fraction of the unit's work done, in `[0, 1]`
    Progress(f64),
    /// A line of output
    Chunk(String),
}

pub type WorkSender = mpsc::UnboundedSender<WorkUpdate>;

/// An asynchronous job that reports progress while it runs.
///
/// Returns a short completion message, or an error that fails the owning task.
#[async_trait]
pub trait WorkUnit: Send {
    async fn run(&mut self, tx: WorkSender) -> Result<String>;
}

/// Extract a `<progress>N</progress>` marker as a fraction, clamped to `[0, 1]`.
pub fn parse_progress(line: &str) -> Option<f64> {
    let caps = PROGRESS_REGEX.captures(line)?;
    let percent: f64 = caps.get(1)?.as_str().parse().ok()?;
    Some((percent / 100.0).clamp(0.0, 1.0))
}

/// Read one line, replacing invalid UTF-8. `None` at end of stream.
async fn read_line_lossy<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    buf.clear();
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(buf);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

/// Text of `line` with any progress markers removed.
fn strip_progress(line: &str) -> String {
    PROGRESS_REGEX.replace_all(line, "").trim().to_string()
}

/// Runs a shell command, turning stdout lines into [`WorkUpdate`]s.
///
/// The child is killed if the unit is dropped mid-run (an aborted task).
#[derive(Debug, Clone)]
pub struct CommandUnit {
    command: String,
    working_dir: PathBuf,
}

impl CommandUnit {
    pub fn new(command: impl Into<String>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            working_dir: working_dir.into(),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }
}

#[async_trait]
impl WorkUnit for CommandUnit {
    async fn run(&mut self, tx: WorkSender) -> Result<String> {
        tracing::debug!(command = %self.command, "spawning work unit");
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn command: {}", self.command))?;

        let stdout = child.stdout.take().context("Failed to get stdout")?;
        let stderr = child.stderr.take().context("Failed to get stderr")?;

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL);
            let mut reader = BufReader::new(stderr);
            let mut buf = Vec::new();
            while let Ok(Some(line)) = read_line_lossy(&mut reader, &mut buf).await {
                if tail.len() == STDERR_TAIL {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail.into_iter().collect::<Vec<_>>()
        });

        let mut last_line = String::new();
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();
        while let Some(line) = read_line_lossy(&mut reader, &mut buf)
            .await
            .context("Failed to read command output")?
        {
            if let Some(fraction) = parse_progress(&line) {
                // The receiver only goes away once the task is over
                let _ = tx.send(WorkUpdate::Progress(fraction));
                let rest = strip_progress(&line);
                if !rest.is_empty() {
                    last_line = rest.clone();
                    let _ = tx.send(WorkUpdate::Chunk(rest));
                }
            } else if !line.trim().is_empty() {
                last_line = line.trim().to_string();
                let _ = tx.send(WorkUpdate::Chunk(line));
            }
        }

        let status = child
            .wait()
            .await
            .context("Failed to wait for command")?;
        let stderr_tail = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let code = status
                .code()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            match stderr_tail.last() {
                Some(reason) => bail!("exit status {}: {}", code, reason),
                None => bail!("exit status {}", code),
            }
        }
        Ok(last_line)
    }
}
