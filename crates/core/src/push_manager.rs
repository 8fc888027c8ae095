//! High-level push management interface
//!
//! This module provides the [`PushManager`] which serves as the primary interface
//! for the CLI. It resolves configuration, owns the command runner and the run
//! log, runs preflight checks and drives single runs or timed batches.
//!
//! ## Example
//!
//! ```rust,no_run
//! use autopush_core::push_manager::{PushManager, PushManagerConfig};
//! use std::path::PathBuf;
//!
//! # async fn example() -> autopush_core::types::AutopushResult<()> {
//! let manager = PushManager::new(PushManagerConfig {
//!     repo: PathBuf::from("."),
//!     ..PushManagerConfig::default()
//! })?;
//!
//! let report = manager.run_batch().await?;
//! println!("{} of {} pushes succeeded", report.succeeded(), report.planned);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info};

use crate::configs::push::{load_push_config, PushOverrides, PushSettings};
use crate::execution::{BoundedRunner, CommandRunner};
use crate::preflight::{preflight, PreflightReport};
use crate::results::BatchReport;
use crate::run_log::{JsonFileLog, TeeLog, TracingLog};
use crate::schedule::{commit_message, BatchPolicy, Scheduler};
use crate::sequencer::{GitSequencer, SequenceOutcome};
use crate::types::{AutopushError, AutopushResult};

/// Configuration for initializing a push manager
#[derive(Debug, Default, Clone)]
pub struct PushManagerConfig {
    pub repo: PathBuf,
    /// Explicit config file; defaults to `autopush.yml` in the repository
    pub config_path: Option<PathBuf>,
    pub overrides: PushOverrides,
}

pub struct PushManager<R: CommandRunner = BoundedRunner> {
    repo: PathBuf,
    settings: PushSettings,
    runner: R,
    log: TeeLog,
    /// Work-tree paths the tool writes itself and must never commit
    excluded: Vec<String>,
}

impl PushManager<BoundedRunner> {
    pub fn new(config: PushManagerConfig) -> AutopushResult<Self> {
        Self::with_runner(config, BoundedRunner::new())
    }
}

impl<R: CommandRunner> PushManager<R> {
    pub fn with_runner(config: PushManagerConfig, runner: R) -> AutopushResult<Self> {
        let repo = std::fs::canonicalize(&config.repo).map_err(|e| {
            AutopushError::Repository(format!(
                "Failed to resolve repository path {}: {}",
                config.repo.display(),
                e
            ))
        })?;

        let file_config = load_push_config(&repo, config.config_path.as_deref())?;
        let settings = PushSettings::resolve(&repo, &file_config, &config.overrides)?;

        let mut log = TeeLog::new().with(TracingLog);
        let mut excluded = Vec::new();
        if let Some(path) = &settings.log_file {
            let file_log = JsonFileLog::open(path)?;
            if let Some(relative) = path_within(&repo, file_log.path()) {
                debug!(path = %relative, "run log is inside the work tree, excluding it from commits");
                excluded.push(relative);
            }
            log = log.with(file_log);
        }

        Ok(Self {
            repo,
            settings,
            runner,
            log,
            excluded,
        })
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    pub fn settings(&self) -> &PushSettings {
        &self.settings
    }

    /// Detect configuration errors without changing anything
    pub async fn check(&self) -> AutopushResult<PreflightReport> {
        preflight(&self.runner, &self.repo, &self.excluded).await
    }

    /// One add/commit/push cycle; `message` defaults to the formatted prefix
    pub async fn run_once(&self, message: Option<&str>) -> AutopushResult<SequenceOutcome> {
        self.check().await?;
        let message = message
            .map(str::to_string)
            .unwrap_or_else(|| commit_message(&self.settings.message_prefix, 1, Utc::now()));

        Ok(self.sequencer().run_sequence(&self.repo, &message).await)
    }

    /// Repeat the cycle according to the repeat plan
    pub async fn run_batch(&self) -> AutopushResult<BatchReport> {
        self.check().await?;
        let runs = self.settings.repeat.total_runs(&mut rand::thread_rng());
        if runs != self.settings.repeat.count {
            info!(
                requested = self.settings.repeat.count,
                runs, "repetition count adjusted by jitter"
            );
        }

        let policy = BatchPolicy {
            stop_on_failure: self.settings.stop_on_failure,
            skip_unchanged: self.settings.skip_unchanged,
        };
        let scheduler = Scheduler::new(
            self.sequencer(),
            &self.runner,
            policy,
            self.settings.repeat.interval,
            self.settings.message_prefix.clone(),
        );
        Ok(scheduler.run_batch(&self.repo, runs).await)
    }

    fn sequencer(&self) -> GitSequencer<'_, R> {
        GitSequencer::new(&self.runner, &self.log, self.settings.timeouts)
            .excluding(self.excluded.iter().cloned())
    }
}

/// `path` relative to `repo` with `/` separators, when it lies inside it.
/// `path` must exist so symlinks resolve the same way as for `repo`.
fn path_within(repo: &Path, path: &Path) -> Option<String> {
    let path = std::fs::canonicalize(path).ok()?;
    let relative = path.strip_prefix(repo).ok()?;
    let parts: Vec<_> = relative
        .components()
        .map(|part| part.as_os_str().to_string_lossy())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_log::LogRecord;
    use crate::sequencer::Stage;
    use crate::results::IterationOutcome;
    use crate::test_support::{add_bare_remote, git_available, init_repo, tracked_files};

    fn manager_config(repo: &Path, overrides: PushOverrides) -> PushManagerConfig {
        PushManagerConfig {
            repo: repo.to_path_buf(),
            config_path: None,
            overrides,
        }
    }

    #[test]
    fn test_missing_repository_path() {
        let err = PushManager::new(manager_config(
            Path::new("/definitely/not/here"),
            PushOverrides::default(),
        ))
        .err()
        .unwrap();
        assert!(matches!(err, AutopushError::Repository(_)));
    }

    #[tokio::test]
    async fn test_check_rejects_plain_directory() {
        let dir = tempfile::tempdir().unwrap();
        let manager = PushManager::new(manager_config(dir.path(), PushOverrides::default())).unwrap();

        assert!(matches!(
            manager.check().await,
            Err(AutopushError::Repository(_))
        ));
    }

    #[tokio::test]
    async fn test_run_once_pushes_to_remote_and_writes_log_file() {
        if !git_available() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let work = root.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        init_repo(&work);
        add_bare_remote(&work, &root.path().join("remote.git"));
        std::fs::write(work.join("data.txt"), "v1").unwrap();

        let overrides = PushOverrides {
            log_file: Some(PathBuf::from("push-log.jsonl")),
            ..PushOverrides::default()
        };
        let manager = PushManager::new(manager_config(&work, overrides)).unwrap();

        let outcome = manager.run_once(Some("sync data")).await.unwrap();
        assert_eq!(outcome, SequenceOutcome::Success);

        let content = std::fs::read_to_string(work.join("push-log.jsonl")).unwrap();
        let records: Vec<LogRecord> = content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(records.len(), 4);
        assert_eq!(records[3].message, "sequence success");
    }

    #[tokio::test]
    async fn test_batch_continues_after_nothing_to_commit() {
        if !git_available() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let work = root.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        init_repo(&work);
        add_bare_remote(&work, &root.path().join("remote.git"));
        std::fs::write(work.join("data.txt"), "v1").unwrap();

        let overrides = PushOverrides {
            count: Some(2),
            interval_secs: Some(0),
            ..PushOverrides::default()
        };
        let manager = PushManager::new(manager_config(&work, overrides)).unwrap();

        let report = manager.run_batch().await.unwrap();

        assert_eq!(report.planned, 2);
        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.stopped, None);
        match &report.iterations[1].outcome {
            IterationOutcome::Sequence(outcome) => {
                assert_eq!(outcome.stage(), Some(Stage::Commit))
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_log_file_inside_repository_is_never_committed() {
        if !git_available() {
            return;
        }
        let root = tempfile::tempdir().unwrap();
        let work = root.path().join("work");
        std::fs::create_dir_all(&work).unwrap();
        init_repo(&work);
        add_bare_remote(&work, &root.path().join("remote.git"));
        std::fs::write(work.join("data.txt"), "v1").unwrap();

        let overrides = PushOverrides {
            count: Some(3),
            interval_secs: Some(0),
            skip_unchanged: Some(true),
            log_file: Some(PathBuf::from("push-log.jsonl")),
            ..PushOverrides::default()
        };
        let manager = PushManager::new(manager_config(&work, overrides)).unwrap();

        let report = manager.run_batch().await.unwrap();

        assert_eq!(report.succeeded(), 1);
        assert_eq!(report.skipped(), 2);
        assert_eq!(report.iterations[1].outcome, IterationOutcome::Skipped);
        assert_eq!(tracked_files(&work), vec!["README.md", "data.txt"]);
        assert!(!manager.check().await.unwrap().has_changes);
    }

    #[test]
    fn test_path_within_repository() {
        let dir = tempfile::tempdir().unwrap();
        let repo = std::fs::canonicalize(dir.path()).unwrap();
        std::fs::create_dir_all(repo.join("logs")).unwrap();
        std::fs::write(repo.join("logs").join("push.jsonl"), "").unwrap();
        let outside = tempfile::NamedTempFile::new().unwrap();

        assert_eq!(
            path_within(&repo, &repo.join("logs").join("push.jsonl")),
            Some("logs/push.jsonl".to_string())
        );
        assert_eq!(path_within(&repo, outside.path()), None);
        assert_eq!(path_within(&repo, &repo.join("missing.jsonl")), None);
    }
}
