//! Script execution through the external interpreter.
//!
//! A run stages the script into a scoped temporary file, launches the
//! interpreter against it and streams its output back as typed
//! [`RunEvent`]s over a bounded channel:
//!
//! - each stdout line becomes [`RunEvent::Log`]
//! - each stderr line becomes [`RunEvent::Error`]
//! - exactly one [`RunEvent::Exit`] closes the sequence
//!
//! Lines keep their order within their own stream; the interleaving of the
//! two streams is not guaranteed. A run can be cancelled through its
//! [`CancellationToken`] or bounded by a timeout, and the staged script is
//! removed on every exit path.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempPath;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const DEFAULT_INTERPRETER: &str = r"C:\Windows\System32\WindowsPowerShell\v1.0\powershell.exe";

/// Flags passed before the script path.
pub const DEFAULT_INTERPRETER_ARGS: [&str; 7] = [
    "-NoProfile",
    "-NonInteractive",
    "-ExecutionPolicy",
    "Bypass",
    "-WindowStyle",
    "Hidden",
    "-File",
];

/// Number of events buffered before the output readers wait on the consumer.
const EVENT_BUFFER: usize = 64;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Failures that prevent a run from starting or finishing normally.
///
/// A script that runs and exits nonzero is not an error: that is reported
/// through [`ExecutionOutcome::exit_code`].
#[derive(thiserror::Error, Debug)]
pub enum RunError {
    #[error("Interpreter not found: {0}")]
    InterpreterNotFound(String),
    #[error("Failed to stage script: {0}")]
    Staging(#[source] std::io::Error),
    #[error("Failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed waiting for the interpreter: {0}")]
    Wait(#[source] std::io::Error),
    #[error("Failed to write run output: {0}")]
    Output(#[source] std::io::Error),
    #[error("Run task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Process exit code, or -1 when the process was killed by a signal.
    pub exit_code: i32,
    pub cancelled: bool,
    pub timed_out: bool,
}

impl ExecutionOutcome {
    fn exited(status: ExitStatus) -> Self {
        Self {
            exit_code: status.code().unwrap_or(-1),
            cancelled: false,
            timed_out: false,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.cancelled && !self.timed_out
    }
}

/// One item of a run's output sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Log(String),
    Error(String),
    Exit(ExecutionOutcome),
}

/// Interpreter invocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSettings {
    /// Absolute path, or a bare program name looked up on `PATH`.
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    pub timeout: Option<Duration>,
    /// Prefix the staged script with a UTF-8 byte order mark. Windows
    /// PowerShell reads BOM-less scripts in the legacy code page.
    pub write_bom: bool,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            interpreter: DEFAULT_INTERPRETER.to_string(),
            interpreter_args: DEFAULT_INTERPRETER_ARGS.iter().map(|s| s.to_string()).collect(),
            timeout: None,
            write_bom: true,
        }
    }
}

// =============================================================================
// Traits for Dependency Injection
// =============================================================================

/// Locates and spawns the interpreter process.
pub trait ProcessRunner: Send + Sync {
    /// Resolves the configured interpreter to an executable path.
    fn resolve_program(&self, program: &str) -> Option<PathBuf>;

    /// Spawns `program` with `args`, stdout and stderr piped.
    fn spawn(&self, program: &Path, args: &[String]) -> std::io::Result<Child>;
}

/// Default process runner using `tokio::process::Command`.
pub struct SystemProcessRunner;

impl ProcessRunner for SystemProcessRunner {
    fn resolve_program(&self, program: &str) -> Option<PathBuf> {
        let path = Path::new(program);
        if path.is_absolute() || path.components().count() > 1 {
            path.is_file().then(|| path.to_path_buf())
        } else {
            which::which(program).ok()
        }
    }

    fn spawn(&self, program: &Path, args: &[String]) -> std::io::Result<Child> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        cmd.spawn()
    }
}

// =============================================================================
// Running scripts
// =============================================================================

/// A launched script. Consume events with [`ScriptRun::next_event`], then
/// call [`ScriptRun::wait`] for the final outcome.
pub struct ScriptRun {
    events: mpsc::Receiver<RunEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Result<ExecutionOutcome, RunError>>,
}

impl ScriptRun {
    /// Next event, or `None` once the sequence has ended after `Exit`.
    pub async fn next_event(&mut self) -> Option<RunEvent> {
        self.events.recv().await
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Kills the interpreter. The run still ends with an `Exit` event.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Waits for the run to finish. Events not yet consumed are discarded.
    pub async fn wait(mut self) -> Result<ExecutionOutcome, RunError> {
        while self.events.recv().await.is_some() {}
        self.task.await?
    }
}

/// Output of [`Executor::run_to_completion`].
#[derive(Debug)]
pub struct ExecutionResult {
    pub outcome: ExecutionOutcome,
    /// Everything the script wrote to stderr, one line per line.
    pub stderr: Option<String>,
}

/// Runs assembled scripts through the configured interpreter.
pub struct Executor {
    settings: ExecutorSettings,
    runner: Arc<dyn ProcessRunner>,
}

impl Executor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self::with_runner(settings, Arc::new(SystemProcessRunner))
    }

    /// Creates an executor with a custom process runner (for testing).
    pub fn with_runner(settings: ExecutorSettings, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { settings, runner }
    }

    /// Stages `script_text` and launches the interpreter against it.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The interpreter cannot be located
    /// - The script cannot be written to a temporary file
    /// - The interpreter process cannot be started
    ///
    /// Once this returns `Ok`, every outcome, including a nonzero exit, is
    /// reported through the run's events.
    pub async fn run(
        &self,
        script_text: &str,
        cancel: CancellationToken,
    ) -> Result<ScriptRun, RunError> {
        let program = self
            .runner
            .resolve_program(&self.settings.interpreter)
            .ok_or_else(|| RunError::InterpreterNotFound(self.settings.interpreter.clone()))?;

        let script_path = stage_script(script_text, self.settings.write_bom)?;
        debug!("Staged script at {}", script_path.display());

        let mut args = self.settings.interpreter_args.clone();
        args.push(script_path.to_string_lossy().into_owned());

        let mut child = self.runner.spawn(&program, &args).map_err(|source| {
            error!("Failed to launch {}: {}", program.display(), source);
            RunError::Launch {
                program: program.display().to_string(),
                source,
            }
        })?;

        info!(
            "Launched {} (pid {:?}) for {}",
            program.display(),
            child.id(),
            script_path.display()
        );

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let stdout_pump = tokio::spawn(pump_lines(stdout, tx.clone(), RunEvent::Log));
        let stderr_pump = tokio::spawn(pump_lines(stderr, tx.clone(), RunEvent::Error));

        let task = tokio::spawn(supervise(
            child,
            [stdout_pump, stderr_pump],
            script_path,
            tx,
            cancel.clone(),
            self.settings.timeout,
        ));

        Ok(ScriptRun {
            events: rx,
            cancel,
            task,
        })
    }

    /// Runs a script to its end, writing log lines to `stdout` and error
    /// lines to `stderr` as they arrive.
    pub async fn run_to_completion<W1: Write, W2: Write>(
        &self,
        script_text: &str,
        cancel: CancellationToken,
        stdout: &mut W1,
        stderr: &mut W2,
    ) -> Result<ExecutionResult, RunError> {
        let mut run = self.run(script_text, cancel).await?;
        let mut captured_stderr = Vec::new();

        while let Some(event) = run.next_event().await {
            match event {
                RunEvent::Log(line) => {
                    writeln!(stdout, "{}", line).map_err(RunError::Output)?;
                }
                RunEvent::Error(line) => {
                    writeln!(stderr, "{}", line).map_err(RunError::Output)?;
                    captured_stderr.push(line);
                }
                RunEvent::Exit(outcome) => {
                    debug!("Run exited: {:?}", outcome);
                }
            }
        }

        let outcome = run.wait().await?;
        if !outcome.success() {
            warn!("Script run failed: {:?}", outcome);
        }

        Ok(ExecutionResult {
            outcome,
            stderr: if captured_stderr.is_empty() {
                None
            } else {
                Some(captured_stderr.join("\n"))
            },
        })
    }
}

fn stage_script(script_text: &str, write_bom: bool) -> Result<TempPath, RunError> {
    let mut file = tempfile::Builder::new()
        .prefix("forgeai_")
        .suffix(".ps1")
        .tempfile()
        .map_err(RunError::Staging)?;

    if write_bom {
        file.write_all(b"\xEF\xBB\xBF").map_err(RunError::Staging)?;
    }
    file.write_all(script_text.as_bytes()).map_err(RunError::Staging)?;
    file.flush().map_err(RunError::Staging)?;

    // Close the handle so the interpreter can open the file on every platform.
    Ok(file.into_temp_path())
}

enum Stop {
    Exited(std::io::Result<ExitStatus>),
    Cancelled,
    TimedOut,
}

async fn supervise(
    mut child: Child,
    pumps: [JoinHandle<()>; 2],
    script_path: TempPath,
    events: mpsc::Sender<RunEvent>,
    cancel: CancellationToken,
    timeout: Option<Duration>,
) -> Result<ExecutionOutcome, RunError> {
    let deadline = async move {
        match timeout {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(deadline);

    let readers = pumps.each_ref().map(JoinHandle::abort_handle);
    // Drain what the process wrote before it exited.
    let drained = async move {
        for pump in pumps {
            if let Err(e) = pump.await {
                warn!("Output reader failed: {}", e);
            }
        }
    };

    let stop = tokio::select! {
        status = child.wait() => Stop::Exited(status),
        () = cancel.cancelled() => Stop::Cancelled,
        () = &mut deadline => Stop::TimedOut,
    };

    let result = match stop {
        // A background grandchild can keep the pipes open past the exit, so
        // draining stays bounded by the same cancel and deadline.
        Stop::Exited(Ok(status)) => tokio::select! {
            () = drained => Ok(ExecutionOutcome::exited(status)),
            () = cancel.cancelled() => Ok(interrupted(&readers, false)),
            () = &mut deadline => Ok(interrupted(&readers, true)),
        },
        Stop::Exited(Err(e)) => {
            error!("Failed waiting for the interpreter: {}", e);
            terminate(&mut child, &readers, false).await;
            Err(RunError::Wait(e))
        }
        Stop::Cancelled => Ok(terminate(&mut child, &readers, false).await),
        Stop::TimedOut => Ok(terminate(&mut child, &readers, true).await),
    };

    let outcome = match &result {
        Ok(outcome) => *outcome,
        Err(_) => ExecutionOutcome {
            exit_code: -1,
            cancelled: false,
            timed_out: false,
        },
    };
    info!("Interpreter finished with exit code {}", outcome.exit_code);

    if let Err(e) = script_path.close() {
        warn!("Failed to remove staged script: {}", e);
    }

    // The receiver may already be gone; the outcome is still returned.
    let _ = events.send(RunEvent::Exit(outcome)).await;
    result
}

async fn terminate(child: &mut Child, readers: &[AbortHandle], timed_out: bool) -> ExecutionOutcome {
    warn!("Killing interpreter (pid {:?})", child.id());
    if let Err(e) = child.kill().await {
        warn!("Failed to kill interpreter: {}", e);
    }
    interrupted(readers, timed_out)
}

/// Stops the output readers and reports the run as cancelled or timed out.
fn interrupted(readers: &[AbortHandle], timed_out: bool) -> ExecutionOutcome {
    warn!("Run {}", if timed_out { "timed out" } else { "cancelled" });
    // Orphaned grandchildren may hold the pipes open.
    for reader in readers {
        reader.abort();
    }
    ExecutionOutcome {
        exit_code: -1,
        cancelled: !timed_out,
        timed_out,
    }
}

/// Forwards one output stream line by line. Keeps draining after the
/// receiver is dropped so the child never blocks on a full pipe.
async fn pump_lines<R>(reader: Option<R>, events: mpsc::Sender<RunEvent>, wrap: fn(String) -> RunEvent)
where
    R: AsyncRead + Unpin,
{
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut forwarding = true;

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                if forwarding && events.send(wrap(decode_line(&buf))).await.is_err() {
                    debug!("Event receiver dropped, discarding further output");
                    forwarding = false;
                }
            }
            Err(e) => {
                warn!("Failed to read interpreter output: {}", e);
                break;
            }
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw)
        .trim_end_matches(['\r', '\n'])
        .to_string()
}
