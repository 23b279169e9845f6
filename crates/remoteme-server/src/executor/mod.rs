//! Executor: runs one client command to completion and reports the outcome
//! as protocol events.
//!
//! Every call spawns exactly one child, bounded by the mode's wall-clock
//! timeout and a combined stdout/stderr cap, and always ends with exactly one
//! `command_exit` event. Child failures never escape as errors; they become an
//! `error` feedback event and a non-zero exit code.

pub mod command;

use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Child;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use remoteme_core::config::{ExecutorConfig, ServerConfig};
use remoteme_core::protocol::{CommandRequest, FeedbackKind, Mode, ServerEvent};

/// Exit code reported when the child produced none (spawn failure, timeout,
/// output overflow, killed by signal).
pub const FALLBACK_EXIT_CODE: i32 = 1;

const NO_OUTPUT: &str = "Command executed successfully (no output)";
const AGENT_COMPLETED: &str = "\n\u{2705} AI agent completed";

/// The command currently running on behalf of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionHandle {
    /// OS process id, if the child was still alive when it was recorded.
    pub pid: Option<u32>,
    pub mode: Mode,
    pub started_at: Instant,
    /// Instant after which the child is killed.
    pub deadline: Instant,
}

/// Output of a child that ran to completion.
#[derive(Debug)]
pub struct Captured {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Ways a command can fail before producing an exit status.
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("Failed to spawn {program}: {reason}")]
    SpawnFailed { program: String, reason: String },

    #[error("Timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("Output exceeded {limit} bytes")]
    OutputLimit { limit: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs shell and agent commands in a fixed working directory.
#[derive(Debug, Clone)]
pub struct Executor {
    config: ExecutorConfig,
    working_dir: PathBuf,
}

impl Executor {
    pub const fn new(config: ExecutorConfig, working_dir: PathBuf) -> Self {
        Self {
            config,
            working_dir,
        }
    }

    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self::new(config.executor.clone(), config.project_root.clone())
    }

    /// Run `request` and send its feedback events followed by exactly one
    /// exit event to `events`. Returns the reported exit code.
    ///
    /// `on_spawn` is called once the child is running. A closed `events`
    /// channel does not stop the child; the remaining events are dropped.
    pub async fn execute<F>(
        &self,
        request: &CommandRequest,
        events: &mpsc::Sender<ServerEvent>,
        on_spawn: F,
    ) -> i32
    where
        F: FnOnce(ExecutionHandle),
    {
        info!(mode = %request.mode, command = %request.message, "Executing command");

        if request.mode == Mode::Agent {
            emit(
                events,
                ServerEvent::feedback(
                    FeedbackKind::Info,
                    format!("\u{1f916} Running AI agent: {}", request.message),
                ),
            )
            .await;
        }

        let result = self.run(request, on_spawn).await;
        let (feedback, exit_code) = report(request.mode, result);
        for (kind, message) in feedback {
            emit(events, ServerEvent::feedback(kind, message)).await;
        }
        emit(events, ServerEvent::exit(exit_code)).await;

        info!(mode = %request.mode, exit_code, "Command finished");
        exit_code
    }

    /// Spawn the child for `request` and capture its output.
    pub async fn run<F>(&self, request: &CommandRequest, on_spawn: F) -> Result<Captured, ExecError>
    where
        F: FnOnce(ExecutionHandle),
    {
        let timeout = self.config.timeout_for(request.mode);
        let command::PreparedCommand { mut command, stdin } =
            command::build(request, &self.config, &self.working_dir);

        let started_at = Instant::now();
        let mut child = command.spawn().map_err(|e| ExecError::SpawnFailed {
            program: command.as_std().get_program().to_string_lossy().into_owned(),
            reason: e.to_string(),
        })?;

        on_spawn(ExecutionHandle {
            pid: child.id(),
            mode: request.mode,
            started_at,
            deadline: started_at + timeout,
        });

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            tokio::spawn(async move {
                if let Err(e) = pipe.write_all(&input).await {
                    debug!(error = %e, "Failed to write command to stdin");
                }
            });
        }

        match tokio::time::timeout(timeout, collect(&mut child, self.config.max_output_bytes)).await
        {
            Ok(Ok(captured)) => Ok(captured),
            Ok(Err(e)) => {
                warn!(error = %e, "Command aborted, killing child");
                child.kill().await.ok();
                Err(e)
            }
            Err(_) => {
                warn!(timeout_secs = timeout.as_secs(), "Command timed out, killing child");
                child.kill().await.ok();
                Err(ExecError::TimedOut(timeout))
            }
        }
    }
}

async fn emit(events: &mpsc::Sender<ServerEvent>, event: ServerEvent) {
    if events.send(event).await.is_err() {
        debug!("Event receiver closed, dropping event");
    }
}

/// Read both output pipes to EOF, then reap the child.
async fn collect(child: &mut Child, limit: usize) -> Result<Captured, ExecError> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let total = AtomicUsize::new(0);

    let (stdout, stderr) = tokio::try_join!(
        read_capped(stdout, &total, limit),
        read_capped(stderr, &total, limit)
    )?;
    let status = child.wait().await?;

    Ok(Captured {
        status,
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
    })
}

/// Read `reader` to EOF, failing once the bytes counted in `total` across all
/// pipes exceed `limit`.
async fn read_capped<R>(
    reader: Option<R>,
    total: &AtomicUsize,
    limit: usize,
) -> Result<Vec<u8>, ExecError>
where
    R: AsyncRead + Unpin,
{
    let Some(mut reader) = reader else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            return Ok(out);
        }
        if total.fetch_add(n, Ordering::Relaxed) + n > limit {
            return Err(ExecError::OutputLimit { limit });
        }
        out.extend_from_slice(&buf[..n]);
    }
}

/// Translate a run result into feedback events and an exit code.
fn report(mode: Mode, result: Result<Captured, ExecError>) -> (Vec<(FeedbackKind, String)>, i32) {
    let prefix = match mode {
        Mode::Terminal => "Command failed",
        Mode::Agent => "AI agent error",
    };

    let captured = match result {
        Ok(captured) => captured,
        Err(e) => {
            return (
                vec![(FeedbackKind::Error, format!("{prefix}: {e}"))],
                FALLBACK_EXIT_CODE,
            );
        }
    };

    if !captured.status.success() {
        let mut message = format!("{prefix}: {}", captured.status);
        if !captured.stderr.is_empty() {
            message.push_str("\nStderr: ");
            message.push_str(&captured.stderr);
        }
        let code = captured.status.code().unwrap_or(FALLBACK_EXIT_CODE);
        return (vec![(FeedbackKind::Error, message)], code);
    }

    let mut feedback = Vec::new();
    match mode {
        Mode::Terminal => {
            if !captured.stderr.is_empty() {
                feedback.push((FeedbackKind::Warning, captured.stderr));
            }
            let output = if captured.stdout.is_empty() {
                NO_OUTPUT.to_string()
            } else {
                captured.stdout
            };
            feedback.push((FeedbackKind::TerminalOutput, output));
        }
        Mode::Agent => {
            if !captured.stderr.is_empty() {
                feedback.push((FeedbackKind::Error, captured.stderr));
            }
            if !captured.stdout.is_empty() {
                feedback.push((FeedbackKind::AiResponse, captured.stdout));
            }
            feedback.push((FeedbackKind::Info, AGENT_COMPLETED.to_string()));
        }
    }
    (feedback, 0)
}
