//! Scratch git repositories for tests

use std::path::Path;
use std::process::Command;

pub(crate) fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_CONFIG_GLOBAL", "/dev/null")
        .env("GIT_CONFIG_NOSYSTEM", "1")
        .status()
        .unwrap();
    assert!(status.success(), "git {:?} failed", args);
}

/// Initialise a repository with a committer identity and one commit
pub(crate) fn init_repo(dir: &Path) {
    git(dir, &["init", "-q"]);
    git(dir, &["config", "user.name", "Test User"]);
    git(dir, &["config", "user.email", "test@example.com"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
    std::fs::write(dir.join("README.md"), "scratch\n").unwrap();
    git(dir, &["add", "README.md"]);
    git(dir, &["commit", "-q", "-m", "initial"]);
}

/// Create a bare repository at `remote` and make it the upstream of `work`
pub(crate) fn add_bare_remote(work: &Path, remote: &Path) {
    std::fs::create_dir_all(remote).unwrap();
    git(remote, &["init", "-q", "--bare"]);
    let remote_url = remote.to_string_lossy().into_owned();
    git(work, &["remote", "add", "origin", &remote_url]);
    git(work, &["push", "-q", "-u", "origin", "HEAD"]);
}

/// Paths tracked in the index of `dir`
pub(crate) fn tracked_files(dir: &Path) -> Vec<String> {
    let output = Command::new("git")
        .args(["ls-files"])
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(output.status.success());
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}
