//! Repository checks run before any sequence
//!
//! A missing repository or committer identity would make every sequence fail
//! the same way, so they are reported up front as configuration errors.

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::execution::{CommandOutcome, CommandRunner, CommandSpec};
use crate::sequencer::exclude_pathspecs;
use crate::types::{AutopushError, AutopushResult};

/// Budget for each read-only git probe
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Committer identity configured for the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitIdentity {
    pub name: String,
    pub email: String,
}

/// Result of a successful preflight
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreflightReport {
    pub identity: GitIdentity,
    pub has_changes: bool,
}

/// Whether `path` is the root of a git work tree (`.git` may be a file for
/// worktrees and submodules)
pub fn is_git_repo(path: &Path) -> bool {
    path.join(".git").exists()
}

/// Read the committer identity; both `user.name` and `user.email` must be set
pub async fn check_identity<R: CommandRunner>(
    runner: &R,
    repo: &Path,
) -> AutopushResult<GitIdentity> {
    let name = read_config(runner, repo, "user.name").await?;
    let email = read_config(runner, repo, "user.email").await?;

    if name.is_empty() || email.is_empty() {
        return Err(AutopushError::Config(
            "git user.name and user.email must be set, e.g.\n  \
             git config --global user.name \"Your Name\"\n  \
             git config --global user.email \"you@example.com\""
                .to_string(),
        ));
    }
    Ok(GitIdentity { name, email })
}

/// Whether `git status --porcelain` reports anything outside `excluded`
pub async fn has_changes<R: CommandRunner>(
    runner: &R,
    repo: &Path,
    excluded: &[String],
) -> AutopushResult<bool> {
    let mut spec = git(repo).args(["status", "--porcelain"]);
    if !excluded.is_empty() {
        spec = spec.args(["--", "."]).args(exclude_pathspecs(excluded));
    }
    match runner.run(&spec, PROBE_TIMEOUT).await? {
        CommandOutcome::Success { output } => Ok(!output.stdout.trim().is_empty()),
        outcome @ CommandOutcome::Failure { .. } => Err(AutopushError::Command(format!(
            "'{}' failed: {}",
            spec,
            outcome.error_text()
        ))),
        CommandOutcome::Timeout { .. } => Err(AutopushError::Command(format!(
            "'{}' timed out after {}s",
            spec,
            PROBE_TIMEOUT.as_secs()
        ))),
    }
}

/// Run every check for `repo`; changes to `excluded` paths do not count
pub async fn preflight<R: CommandRunner>(
    runner: &R,
    repo: &Path,
    excluded: &[String],
) -> AutopushResult<PreflightReport> {
    if !is_git_repo(repo) {
        return Err(AutopushError::Repository(format!(
            "{} is not a git repository; run `git init` and add a remote first",
            repo.display()
        )));
    }
    let identity = check_identity(runner, repo).await?;
    let has_changes = has_changes(runner, repo, excluded).await?;
    debug!(repo = %repo.display(), name = %identity.name, has_changes, "preflight passed");

    Ok(PreflightReport {
        identity,
        has_changes,
    })
}

fn git(repo: &Path) -> CommandSpec {
    CommandSpec::new("git")
        .current_dir(repo)
        .env("GIT_TERMINAL_PROMPT", "0")
}

/// `git config <key>` exits 1 when the key is unset; that reads as empty
async fn read_config<R: CommandRunner>(
    runner: &R,
    repo: &Path,
    key: &str,
) -> AutopushResult<String> {
    let spec = git(repo).args(["config", key]);
    match runner.run(&spec, PROBE_TIMEOUT).await? {
        CommandOutcome::Success { output } => Ok(output.stdout.trim().to_string()),
        CommandOutcome::Failure { .. } => Ok(String::new()),
        CommandOutcome::Timeout { .. } => Err(AutopushError::Command(format!(
            "'{}' timed out after {}s",
            spec,
            PROBE_TIMEOUT.as_secs()
        ))),
    }
}
