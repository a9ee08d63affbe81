//! Shared fixtures for git-backed tests, plus worktree integration tests.


use std::fs;
use std::path::Path;
use std::process::Command as StdCommand;
use tempfile::TempDir;

pub fn run_git(dir: &Path, args: &[&str]) -> String {
    let output = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Initialize a test git repository with an initial commit on `main`.
pub fn init_test_repo() -> TempDir {
    let temp = TempDir::new().unwrap();
    let p = temp.path();

    run_git(p, &["init"]);
    run_git(p, &["config", "user.name", "Test User"]);
    run_git(p, &["config", "user.email", "test@example.com"]);
    run_git(p, &["config", "commit.gpgsign", "false"]);

    fs::write(p.join("README.md"), "# Test Repository\n").unwrap();
    run_git(p, &["add", "README.md"]);
    run_git(p, &["commit", "-m", "Initial commit"]);

    let current_branch = run_git(p, &["rev-parse", "--abbrev-ref", "HEAD"]);
    if current_branch != "main" && !current_branch.is_empty() {
        run_git(p, &["branch", "-m", &current_branch, "main"]);
    }

    temp
}

pub fn branch_exists(repo: &Path, branch: &str) -> bool {
    StdCommand::new("git")
        .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
        .current_dir(repo)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
