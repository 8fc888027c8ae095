//! Bounded command runner
//!
//! Launches one external command in its own process group, drains stdout and
//! stderr while it runs, and enforces a wall-clock timeout. Waiting is a
//! `select!` over "child exited" and a deadline timer; when the deadline wins
//! the whole process group is killed and the child is reaped.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::execution::command::CommandSpec;
use crate::execution::process_tree::{platform_killer, ProcessTreeKiller};
use crate::types::{AutopushError, AutopushResult};

/// How long to wait for the output readers after the group has been killed
const READER_GRACE: Duration = Duration::from_millis(500);

/// Output captured from a command's stdout and stderr
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapturedOutput {
    pub stdout: String,
    pub stderr: String,
}

impl CapturedOutput {
    fn from_bytes(stdout: Vec<u8>, stderr: Vec<u8>) -> Self {
        Self {
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
        }
    }

    /// stderr, or stdout when stderr is empty (`git commit` reports
    /// "nothing to commit" on stdout)
    pub fn error_text(&self) -> String {
        let text = if self.stderr.trim().is_empty() {
            self.stdout.trim()
        } else {
            self.stderr.trim()
        };
        text.to_string()
    }
}

/// Terminal outcome of one bounded command execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Exited with status zero before the timeout
    Success { output: CapturedOutput },
    /// Exited non-zero (or was killed by a signal) before the timeout
    Failure {
        output: CapturedOutput,
        exit_code: Option<i32>,
    },
    /// Deadline reached; the process group was terminated. `output` holds
    /// whatever had been read before termination.
    Timeout {
        output: CapturedOutput,
        elapsed: Duration,
    },
}

impl CommandOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CommandOutcome::Success { .. })
    }

    pub fn output(&self) -> &CapturedOutput {
        match self {
            CommandOutcome::Success { output }
            | CommandOutcome::Failure { output, .. }
            | CommandOutcome::Timeout { output, .. } => output,
        }
    }

    pub fn error_text(&self) -> String {
        self.output().error_text()
    }
}

/// One in-flight command invocation
#[derive(Debug, Clone)]
pub struct CommandExecution {
    pub command: String,
    pub timeout: Duration,
    pub started_at: Instant,
}

impl CommandExecution {
    pub fn start(spec: &CommandSpec, timeout: Duration) -> Self {
        Self {
            command: spec.to_string(),
            timeout,
            started_at: Instant::now(),
        }
    }

    pub fn deadline(&self) -> Instant {
        self.started_at + self.timeout
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Runs a command under a timeout. The sequencer and preflight checks depend on
/// this seam rather than on process spawning directly.
pub trait CommandRunner: Send + Sync {
    fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
    ) -> impl Future<Output = AutopushResult<CommandOutcome>> + Send;
}

/// Production runner over `tokio::process`
pub struct BoundedRunner {
    killer: Box<dyn ProcessTreeKiller>,
}

impl Default for BoundedRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl BoundedRunner {
    pub fn new() -> Self {
        Self {
            killer: platform_killer(),
        }
    }

    pub fn with_killer(killer: Box<dyn ProcessTreeKiller>) -> Self {
        Self { killer }
    }

    async fn execute(&self, spec: &CommandSpec, timeout: Duration) -> AutopushResult<CommandOutcome> {
        let execution = CommandExecution::start(spec, timeout);
        debug!(
            command = %execution.command,
            timeout_ms = timeout.as_millis() as u64,
            "spawning command"
        );

        let mut child = spec.to_command().spawn().map_err(|source| AutopushError::Spawn {
            command: execution.command.clone(),
            source,
        })?;
        let pid = child.id();

        let mut stdout_reader = tokio::spawn(drain(child.stdout.take(), "stdout"));
        let mut stderr_reader = tokio::spawn(drain(child.stderr.take(), "stderr"));
        let deadline = execution.deadline();

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = tokio::time::sleep_until(deadline) => None,
        };
        let exited = match waited {
            Some(Ok(status)) => Some(status),
            Some(Err(e)) => {
                // The leader's state is unknown; take the group down before bailing
                self.terminate(pid, &mut child, &execution, "wait failed").await;
                stdout_reader.abort();
                stderr_reader.abort();
                return Err(e.into());
            }
            None => None,
        };

        if let Some(status) = exited {
            // Background descendants can keep the pipes open after the leader
            // exits, so the readers are bounded by the same deadline.
            let drained = tokio::time::timeout_at(deadline, async {
                tokio::join!(&mut stdout_reader, &mut stderr_reader)
            })
            .await;

            if let Ok((stdout, stderr)) = drained {
                let output = CapturedOutput::from_bytes(join_output(stdout), join_output(stderr));
                debug!(
                    command = %execution.command,
                    code = ?status.code(),
                    elapsed_ms = execution.elapsed().as_millis() as u64,
                    "command exited"
                );
                return Ok(if status.success() {
                    CommandOutcome::Success { output }
                } else {
                    CommandOutcome::Failure {
                        output,
                        exit_code: status.code(),
                    }
                });
            }
        }

        self.terminate(pid, &mut child, &execution, "timed out").await;
        let output = CapturedOutput::from_bytes(
            collect_after_kill(stdout_reader).await,
            collect_after_kill(stderr_reader).await,
        );
        Ok(CommandOutcome::Timeout {
            output,
            elapsed: execution.elapsed(),
        })
    }

    async fn terminate(
        &self,
        pid: Option<u32>,
        child: &mut Child,
        execution: &CommandExecution,
        reason: &str,
    ) {
        warn!(
            command = %execution.command,
            timeout_ms = execution.timeout.as_millis() as u64,
            reason,
            "terminating process group"
        );
        let signalled = match pid {
            Some(pid) => self.killer.terminate(pid, child),
            None => child.start_kill(),
        };
        if let Err(e) = signalled {
            warn!(command = %execution.command, error = %e, "failed to signal process group");
            let _ = child.start_kill();
        }
        // Reap so no zombie is left behind
        if let Err(e) = child.wait().await {
            warn!(command = %execution.command, error = %e, "failed to reap terminated child");
        }
    }
}

impl CommandRunner for BoundedRunner {
    fn run(
        &self,
        spec: &CommandSpec,
        timeout: Duration,
    ) -> impl Future<Output = AutopushResult<CommandOutcome>> + Send {
        self.execute(spec, timeout)
    }
}

/// Read a pipe to EOF line by line, tracing each line as it arrives
async fn drain<R>(pipe: Option<R>, stream: &'static str) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok(Vec::new());
    };
    let mut reader = BufReader::new(pipe);
    let mut captured = Vec::new();
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        trace!(stream, line = %String::from_utf8_lossy(&line).trim_end(), "output");
        captured.extend_from_slice(&line);
    }
    Ok(captured)
}

fn join_output(
    result: Result<io::Result<Vec<u8>>, tokio::task::JoinError>,
) -> Vec<u8> {
    match result {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => {
            warn!(error = %e, "error reading command output");
            Vec::new()
        }
        Err(e) => {
            warn!(error = %e, "output reader task failed");
            Vec::new()
        }
    }
}

async fn collect_after_kill(mut reader: JoinHandle<io::Result<Vec<u8>>>) -> Vec<u8> {
    match tokio::time::timeout(READER_GRACE, &mut reader).await {
        Ok(result) => join_output(result),
        Err(_) => {
            // A descendant escaped the group and still holds the pipe
            reader.abort();
            Vec::new()
        }
    }
}
