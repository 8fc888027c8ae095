//! Staged git sequencer
//!
//! Runs `git add`, `git commit` and `git push` in order through a
//! [`CommandRunner`], each stage under its own timeout and all three under one
//! overall deadline. The first stage that fails or times out ends the run; the
//! overall deadline is checked before each stage starts.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::execution::{CommandOutcome, CommandRunner, CommandSpec};
use crate::run_log::{Level, LogRecord, RunLog};

/// Stored error text is capped so one noisy stage cannot bloat the run log
const MAX_ERROR_TEXT: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Add,
    Commit,
    Push,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Add, Stage::Commit, Stage::Push];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Add => "add",
            Stage::Commit => "commit",
            Stage::Push => "push",
        }
    }

    /// The git invocation for this stage, without a working directory
    pub fn command(self, message: &str) -> CommandSpec {
        let git = CommandSpec::new("git");
        match self {
            Stage::Add => git.args(["add", "-A"]),
            Stage::Commit => git.args(["commit", "-m", message]),
            Stage::Push => git.arg("push"),
        }
    }

    /// Like [`Stage::command`], but `git add` leaves the `excluded` paths
    /// (relative to the work tree root) unstaged
    pub fn command_excluding(self, message: &str, excluded: &[String]) -> CommandSpec {
        let spec = self.command(message);
        if self != Stage::Add || excluded.is_empty() {
            return spec;
        }
        spec.args(["--", "."]).args(exclude_pathspecs(excluded))
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `:(exclude)` pathspecs for paths relative to the work tree root
pub fn exclude_pathspecs(excluded: &[String]) -> impl Iterator<Item = String> + '_ {
    excluded.iter().map(|path| format!(":(exclude){}", path))
}

/// Per-stage budgets plus the budget for the whole sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub add: Duration,
    pub commit: Duration,
    pub push: Duration,
    pub overall: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            add: Duration::from_secs(10),
            commit: Duration::from_secs(15),
            push: Duration::from_secs(35),
            overall: Duration::from_secs(60),
        }
    }
}

impl StageTimeouts {
    pub fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::Add => self.add,
            Stage::Commit => self.commit,
            Stage::Push => self.push,
        }
    }
}

/// State of one add/commit/push cycle
#[derive(Debug, Clone)]
pub struct SequenceRun {
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub deadline: Instant,
    /// Stage most recently started, `None` before the first one
    pub stage: Option<Stage>,
    pub succeeded: bool,
    started: Instant,
}

impl SequenceRun {
    fn start(message: &str, overall: Duration) -> Self {
        let started = Instant::now();
        Self {
            message: message.to_string(),
            started_at: Utc::now(),
            deadline: started + overall,
            stage: None,
            succeeded: false,
            started,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    fn deadline_passed(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

/// Classified result of a sequence run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    Success,
    /// The stage's command exited non-zero or could not be spawned
    StageFailure {
        stage: Stage,
        message: String,
        exit_code: Option<i32>,
    },
    /// The stage exceeded its own budget and its process group was killed
    StageTimeout { stage: Stage, limit: Duration },
    /// The overall budget ran out before `stage` could start
    OverallTimeout { stage: Stage },
}

impl SequenceOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SequenceOutcome::Success)
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            SequenceOutcome::StageTimeout { .. } | SequenceOutcome::OverallTimeout { .. }
        )
    }

    /// The stage the outcome refers to; `None` on success
    pub fn stage(&self) -> Option<Stage> {
        match self {
            SequenceOutcome::Success => None,
            SequenceOutcome::StageFailure { stage, .. }
            | SequenceOutcome::StageTimeout { stage, .. }
            | SequenceOutcome::OverallTimeout { stage } => Some(*stage),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SequenceOutcome::Success => "success",
            SequenceOutcome::StageFailure { .. } => "stage_failure",
            SequenceOutcome::StageTimeout { .. } => "stage_timeout",
            SequenceOutcome::OverallTimeout { .. } => "overall_timeout",
        }
    }
}

impl fmt::Display for SequenceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceOutcome::Success => write!(f, "add, commit and push succeeded"),
            SequenceOutcome::StageFailure {
                stage,
                message,
                exit_code: Some(code),
            } => write!(f, "{} failed with exit code {}: {}", stage, code, message),
            SequenceOutcome::StageFailure { stage, message, .. } => {
                write!(f, "{} failed: {}", stage, message)
            }
            SequenceOutcome::StageTimeout { stage, limit } => {
                write!(f, "{} timed out after {}s", stage, limit.as_secs_f64())
            }
            SequenceOutcome::OverallTimeout { stage } => {
                write!(f, "overall budget exhausted before {}", stage)
            }
        }
    }
}

/// Runs add/commit/push cycles in one working directory
pub struct GitSequencer<'a, R: CommandRunner> {
    runner: &'a R,
    log: &'a dyn RunLog,
    timeouts: StageTimeouts,
    excluded: Vec<String>,
}

impl<'a, R: CommandRunner> GitSequencer<'a, R> {
    pub fn new(runner: &'a R, log: &'a dyn RunLog, timeouts: StageTimeouts) -> Self {
        Self {
            runner,
            log,
            timeouts,
            excluded: Vec::new(),
        }
    }

    /// Never stage these paths, given relative to the work tree root
    pub fn excluding(mut self, paths: impl IntoIterator<Item = String>) -> Self {
        self.excluded.extend(paths);
        self
    }

    pub fn timeouts(&self) -> &StageTimeouts {
        &self.timeouts
    }

    pub fn excluded(&self) -> &[String] {
        &self.excluded
    }

    /// Run one add/commit/push cycle with `message` as the commit message
    pub async fn run_sequence(&self, working_dir: &Path, message: &str) -> SequenceOutcome {
        let mut run = SequenceRun::start(message, self.timeouts.overall);
        let outcome = self.run_stages(&mut run, working_dir).await;
        run.succeeded = outcome.is_success();
        self.record_summary(&run, &outcome);
        outcome
    }

    async fn run_stages(&self, run: &mut SequenceRun, working_dir: &Path) -> SequenceOutcome {
        for stage in Stage::ALL {
            if run.deadline_passed() {
                return SequenceOutcome::OverallTimeout { stage };
            }
            run.stage = Some(stage);

            if let Some(failed) = self.run_stage(stage, run, working_dir).await {
                return failed;
            }
        }
        SequenceOutcome::Success
    }

    /// Returns the failing outcome, or `None` when the stage succeeded
    async fn run_stage(
        &self,
        stage: Stage,
        run: &SequenceRun,
        working_dir: &Path,
    ) -> Option<SequenceOutcome> {
        let spec = stage
            .command_excluding(&run.message, &self.excluded)
            .current_dir(working_dir)
            .env("GIT_TERMINAL_PROMPT", "0");
        let limit = self.timeouts.for_stage(stage);
        let started = Instant::now();

        let result = self.runner.run(&spec, limit).await;

        let record = LogRecord::new(Level::Info, format!("stage {}", stage))
            .field("stage", stage.name())
            .field("command", spec.to_string())
            .field("timeout_ms", limit.as_millis() as u64)
            .field("elapsed_ms", started.elapsed().as_millis() as u64);

        let (record, failed) = match result {
            Ok(CommandOutcome::Success { .. }) => (record.field("result", "success"), None),
            Ok(CommandOutcome::Failure { output, exit_code }) => {
                let message = truncate(output.error_text());
                let mut record = record
                    .with_level(Level::Error)
                    .field("result", "failure")
                    .field("error", message.clone());
                if let Some(code) = exit_code {
                    record = record.field("exit_code", code);
                }
                (
                    record,
                    Some(SequenceOutcome::StageFailure {
                        stage,
                        message,
                        exit_code,
                    }),
                )
            }
            Ok(CommandOutcome::Timeout { .. }) => (
                record.with_level(Level::Warn).field("result", "timeout"),
                Some(SequenceOutcome::StageTimeout { stage, limit }),
            ),
            Err(e) => {
                let message = e.to_string();
                (
                    record
                        .with_level(Level::Error)
                        .field("result", "error")
                        .field("error", message.clone()),
                    Some(SequenceOutcome::StageFailure {
                        stage,
                        message,
                        exit_code: None,
                    }),
                )
            }
        };

        self.log.record(record);
        failed
    }

    fn record_summary(&self, run: &SequenceRun, outcome: &SequenceOutcome) {
        let level = match outcome {
            SequenceOutcome::Success => Level::Info,
            SequenceOutcome::StageFailure { .. } => Level::Error,
            SequenceOutcome::StageTimeout { .. } | SequenceOutcome::OverallTimeout { .. } => {
                Level::Warn
            }
        };
        let stage_reached = run.stage.map(Stage::name).unwrap_or("none");

        let mut record = LogRecord::new(level, format!("sequence {}", outcome.kind()))
            .field("commit_message", run.message.clone())
            .field("started_at", run.started_at.to_rfc3339())
            .field("ended_at", Utc::now().to_rfc3339())
            .field("elapsed_ms", run.elapsed().as_millis() as u64)
            .field("stage_reached", stage_reached)
            .field("outcome", outcome.kind())
            .field("succeeded", run.succeeded);
        if !run.succeeded {
            record = record.field("detail", outcome.to_string());
        }
        self.log.record(record);
    }
}

fn truncate(mut text: String) -> String {
    if text.len() > MAX_ERROR_TEXT {
        let mut cut = MAX_ERROR_TEXT;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        text.truncate(cut);
        text.push_str("...");
    }
    text
}
