//! Bounded execution of a single KB CLI process.
//!
//! [`run`] spawns the interpreter directly (no shell) and captures both output
//! streams. Waiting for the exit status and draining both pipes share one
//! deadline; past it the child is killed. Every failure is reported as a
//! [`RunError`] whose `Display` output is the operator-facing diagnostic.

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::INTERPRETER_ENV;

/// Per-stream capture limit.
pub const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// How long a failed run keeps reading stderr after the child is gone.
const FAILURE_DRAIN_GRACE: Duration = Duration::from_millis(500);

const READ_CHUNK: usize = 8 * 1024;

const FAILURE_LABEL: &str = "KB tool failed.";

/// A fully resolved command line for one invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub interpreter: String,
    pub script_path: PathBuf,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

impl CommandSpec {
    /// The attempted command, space-joined, as shown to operators.
    #[must_use]
    pub fn command_line(&self) -> String {
        let script = self.script_path.display().to_string();
        std::iter::once(self.interpreter.as_str())
            .chain(std::iter::once(script.as_str()))
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Result of running one command. Never partially filled.
#[derive(Debug)]
pub enum Outcome {
    Success { text: String },
    Failure(RunError),
}

impl Outcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Converts into a `Result`, keeping the trimmed stdout on success.
    ///
    /// # Errors
    /// Returns the [`RunError`] for any failed run.
    pub fn into_result(self) -> Result<String, RunError> {
        match self {
            Self::Success { text } => Ok(text),
            Self::Failure(err) => Err(err),
        }
    }
}

#[derive(Debug)]
pub enum RunErrorKind {
    /// The interpreter could not be launched or supervised.
    Spawn(std::io::Error),
    NonZeroExit(ExitStatus),
    Timeout(Duration),
    OutputLimit {
        stream: &'static str,
        limit: usize,
    },
}

impl fmt::Display for RunErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn(err) => write!(f, "failed to launch process: {err}"),
            Self::NonZeroExit(status) => match status.code() {
                Some(code) => write!(f, "process exited with status {code}"),
                None => write!(f, "process terminated by signal"),
            },
            Self::Timeout(timeout) => {
                write!(f, "process timed out after {} ms", timeout.as_millis())
            }
            Self::OutputLimit { stream, limit } => {
                write!(f, "process wrote more than {limit} bytes to {stream}")
            }
        }
    }
}

/// A failed run: what went wrong, what was attempted, and what the child said.
#[derive(Debug)]
pub struct RunError {
    kind: RunErrorKind,
    command_line: String,
    stderr: String,
}

impl RunError {
    #[must_use]
    pub const fn kind(&self) -> &RunErrorKind {
        &self.kind
    }

    #[must_use]
    pub fn command_line(&self) -> &str {
        &self.command_line
    }

    /// Trimmed standard error; empty when nothing was captured.
    #[must_use]
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self.kind, RunErrorKind::Timeout(_))
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{FAILURE_LABEL}")?;
        writeln!(f)?;
        writeln!(f, "Command: {}", self.command_line)?;
        writeln!(f, "Reason: {}", self.kind)?;
        writeln!(f)?;
        writeln!(f, "stderr:")?;
        writeln!(f, "{}", self.stderr)?;
        writeln!(f)?;
        writeln!(f, "Common fixes:")?;
        writeln!(f, "1) Activate venv: source .venv/bin/activate")?;
        writeln!(f, "2) Install deps: make install")?;
        writeln!(
            f,
            "3) If the interpreter isn't found, set {INTERPRETER_ENV} in the host environment"
        )?;
        write!(f, "4) Re-run: make sync")
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            RunErrorKind::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

/// Runs `spec` to completion or until its timeout, whichever comes first.
///
/// The deadline covers the exit status and the end of both output streams, so
/// a grandchild holding a pipe open turns into a timeout rather than a success
/// with missing output. The child is killed on timeout and on every early
/// return (`kill_on_drop`), so no process outlives the call.
pub async fn run(spec: &CommandSpec) -> Outcome {
    let command_line = spec.command_line();
    let started = Instant::now();
    debug!(command = %command_line, timeout_ms = spec.timeout.as_millis(), "spawning kb command");

    let mut command = Command::new(&spec.interpreter);
    command
        .arg(&spec.script_path)
        .args(&spec.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(dir) = &spec.working_dir {
        command.current_dir(dir);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            return failure(RunErrorKind::Spawn(err), command_line, String::new());
        }
    };

    let mut stdout = Capture::spawn(child.stdout.take(), "stdout");
    let mut stderr = Capture::spawn(child.stderr.take(), "stderr");

    let finished = tokio::time::timeout(spec.timeout, async {
        let wait = async { child.wait().await.map_err(RunErrorKind::Spawn) };
        let (status, (), ()) = tokio::try_join!(wait, stdout.finish(), stderr.finish())?;
        Ok::<_, RunErrorKind>(status)
    })
    .await;

    let status = match finished {
        Ok(Ok(status)) => status,
        Ok(Err(kind)) => {
            return abandon(child, stderr, kind, command_line).await;
        }
        Err(_) => {
            return abandon(child, stderr, RunErrorKind::Timeout(spec.timeout), command_line)
                .await;
        }
    };

    let elapsed_ms = started.elapsed().as_millis();
    if status.success() {
        info!(command = %command_line, elapsed_ms, "kb command finished");
        Outcome::Success {
            text: stdout.text().trim().to_string(),
        }
    } else {
        failure(RunErrorKind::NonZeroExit(status), command_line, stderr.text())
    }
}

/// Kills the child and reports `kind`, keeping whatever stderr was captured.
async fn abandon(
    mut child: tokio::process::Child,
    mut stderr: Capture,
    kind: RunErrorKind,
    command_line: String,
) -> Outcome {
    // A child that already exited has been reaped; only a live one needs killing.
    if matches!(child.try_wait(), Ok(None)) {
        if let Err(err) = child.kill().await {
            warn!(command = %command_line, error = %err, "failed to kill kb command");
        }
    }
    if tokio::time::timeout(FAILURE_DRAIN_GRACE, stderr.finish())
        .await
        .is_err()
    {
        debug!(command = %command_line, "stderr still open after kill");
    }
    failure(kind, command_line, stderr.text())
}

fn failure(kind: RunErrorKind, command_line: String, stderr: String) -> Outcome {
    warn!(command = %command_line, reason = %kind, "kb command failed");
    Outcome::Failure(RunError {
        kind,
        command_line,
        stderr: stderr.trim().to_string(),
    })
}

/// Background reader for one child pipe.
///
/// Bytes land in a shared buffer as they arrive, so output read before a
/// timeout or an aborted read is still available.
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<Result<(), RunErrorKind>>>,
}

impl Capture {
    fn spawn<R>(stream: Option<R>, name: &'static str) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = stream
            .map(|stream| tokio::spawn(read_capped(stream, Arc::clone(&buffer), name)));
        Self { buffer, task }
    }

    /// Resolves once the stream hits EOF or exceeds [`MAX_OUTPUT_BYTES`].
    async fn finish(&mut self) -> Result<(), RunErrorKind> {
        let Some(task) = self.task.as_mut() else {
            return Ok(());
        };
        let result = task.await;
        self.task = None;
        match result {
            Ok(result) => result,
            Err(err) => Err(RunErrorKind::Spawn(std::io::Error::other(err))),
        }
    }

    fn text(&self) -> String {
        let buffer = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl Drop for Capture {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

async fn read_capped<R>(
    mut stream: R,
    buffer: Arc<Mutex<Vec<u8>>>,
    name: &'static str,
) -> Result<(), RunErrorKind>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0_u8; READ_CHUNK];
    loop {
        let read = match stream.read(&mut chunk).await {
            Ok(0) => return Ok(()),
            Ok(read) => read,
            Err(err) => {
                debug!(stream = name, error = %err, "kb command output stream closed with error");
                return Ok(());
            }
        };
        let mut buffer = buffer.lock().unwrap_or_else(PoisonError::into_inner);
        let room = MAX_OUTPUT_BYTES - buffer.len();
        if read > room {
            buffer.extend_from_slice(&chunk[..room]);
            return Err(RunErrorKind::OutputLimit {
                stream: name,
                limit: MAX_OUTPUT_BYTES,
            });
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
}
