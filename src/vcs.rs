//! VCS protocol: the handful of `git` subprocess invocations the review
//! engine needs. Every function captures stdout, trims it, and returns
//! `Ok(None)` (never an error) when git itself is unavailable or the
//! repository has nothing staged, so the orchestrator can degrade to
//! "nothing to review" rather than aborting the run.

use std::path::{Path, PathBuf};
use std::process::Command;

fn run_git(repo_dir: Option<&Path>, args: &[&str]) -> Option<String> {
    let mut cmd = Command::new("git");
    if let Some(dir) = repo_dir {
        cmd.current_dir(dir);
    }
    cmd.args(args);
    let output = cmd.output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).to_string())
}

/// `git rev-parse --show-toplevel`, falling back to the process cwd when
/// git is unavailable or the cwd isn't inside a repository.
pub fn repo_root(cwd: &Path) -> PathBuf {
    run_git(Some(cwd), &["rev-parse", "--show-toplevel"])
        .map(|s| PathBuf::from(s.trim()))
        .unwrap_or_else(|| cwd.to_path_buf())
}

/// `git rev-parse --abbrev-ref HEAD`.
pub fn current_branch(repo_root: &Path) -> Option<String> {
    run_git(Some(repo_root), &["rev-parse", "--abbrev-ref", "HEAD"])
        .map(|s| s.trim().to_string())
}

/// `git diff --cached --name-only`, one path per line.
pub fn staged_files(repo_root: &Path) -> Vec<PathBuf> {
    run_git(Some(repo_root), &["diff", "--cached", "--name-only"])
        .map(|s| {
            s.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(PathBuf::from)
                .collect()
        })
        .unwrap_or_default()
}

/// `git diff --staged -U0`: a single zero-context unified diff covering
/// every staged file, parsed downstream by [`crate::diff`].
pub fn staged_diff(repo_root: &Path) -> String {
    run_git(Some(repo_root), &["diff", "--staged", "-U0"]).unwrap_or_default()
}
