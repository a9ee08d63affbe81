use anyhow::{Context, Result, anyhow, bail};
use git2::{Repository, WorktreeAddOptions, WorktreePruneOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;

use super::repository::{branch_exists, delete_branch, open_repository};
use crate::utils::{normalize_path, paths_match};

pub const WORKTREES_DIR: &str = ".worktrees";
pub const AGENT_BRANCH_PREFIX: &str = "agent/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorktreeRecord {
    pub path: PathBuf,
    /// Empty for a detached HEAD.
    pub branch_name: String,
    pub is_primary: bool,
}

pub fn session_branch_name(session_id: &str) -> String {
    format!("{AGENT_BRANCH_PREFIX}{session_id}")
}

pub fn session_worktree_path(repo_path: &Path, session_id: &str) -> PathBuf {
    repo_path.join(WORKTREES_DIR).join(session_id)
}

fn is_nested_worktree(path: &Path) -> bool {
    path.components()
        .any(|component| component.as_os_str() == WORKTREES_DIR)
}

fn validate_session_id(session_id: &str) -> Result<()> {
    if session_id.is_empty() {
        bail!("Session id cannot be empty");
    }
    let allowed = |c: char| c.is_ascii_alphanumeric() || matches!(c, '-' | '_');
    if !session_id.chars().all(allowed) {
        bail!("Session id '{session_id}' contains invalid characters");
    }
    Ok(())
}

/// Creates `agent/<session_id>` from `base_branch` and checks it out at
/// `<repo>/.worktrees/<session_id>`. The branch is removed again if the
/// checkout fails.
pub fn create_worktree(repo_path: &Path, session_id: &str, base_branch: &str) -> Result<PathBuf> {
    validate_session_id(session_id)?;
    let repo = open_repository(repo_path)?;
    let branch_name = session_branch_name(session_id);
    let worktree_path = session_worktree_path(repo_path, session_id);

    if worktree_path.exists() {
        bail!("Worktree path already exists: {}", worktree_path.display());
    }
    if branch_exists(&repo, &branch_name) {
        bail!("Branch '{branch_name}' already exists");
    }

    let base_commit = repo
        .revparse_single(base_branch)
        .and_then(|object| object.peel_to_commit())
        .with_context(|| format!("Base branch '{base_branch}' cannot be resolved"))?;

    let container = repo_path.join(WORKTREES_DIR);
    fs::create_dir_all(&container)
        .with_context(|| format!("Failed to create {}", container.display()))?;
    if let Err(e) = exclude_worktrees_dir(&repo, repo_path) {
        log::debug!("Could not add {WORKTREES_DIR} to info/exclude: {e}");
    }

    log::info!(
        "Creating worktree {} on {branch_name} from {base_branch} ({})",
        worktree_path.display(),
        base_commit.id()
    );

    let branch = repo
        .branch(&branch_name, &base_commit, false)
        .with_context(|| format!("Failed to create branch '{branch_name}'"))?;
    let branch_ref = branch.into_reference();

    let mut opts = WorktreeAddOptions::new();
    opts.reference(Some(&branch_ref));

    if let Err(e) = repo.worktree(session_id, &worktree_path, Some(&opts)) {
        if let Err(rollback) = delete_branch(repo_path, &branch_name) {
            log::warn!("Failed to roll back branch '{branch_name}': {rollback:#}");
        }
        if worktree_path.exists() {
            let _ = fs::remove_dir_all(&worktree_path);
        }
        return Err(e).with_context(|| {
            format!("Failed to check out worktree at {}", worktree_path.display())
        });
    }

    Ok(worktree_path)
}

/// Keeps the worktree container out of `git status` in the primary checkout.
fn exclude_worktrees_dir(repo: &Repository, repo_path: &Path) -> Result<()> {
    let workdir = repo
        .workdir()
        .ok_or_else(|| anyhow!("bare repository"))?;
    let relative = normalize_path(repo_path)
        .strip_prefix(normalize_path(workdir))
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let mut pattern = String::from("/");
    for component in relative.components() {
        pattern.push_str(&component.as_os_str().to_string_lossy());
        pattern.push('/');
    }
    pattern.push_str(WORKTREES_DIR);
    pattern.push('/');

    let exclude_path = repo.commondir().join("info").join("exclude");
    let existing = fs::read_to_string(&exclude_path).unwrap_or_default();
    if existing.lines().any(|line| line.trim() == pattern) {
        return Ok(());
    }
    if let Some(parent) = exclude_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&exclude_path)?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        writeln!(file)?;
    }
    writeln!(file, "{pattern}")?;
    Ok(())
}

/// Removes the worktree at `worktree_path` and, for `agent/` branches, the
/// branch it had checked out. Tolerates a worktree that is already gone.
pub fn delete_worktree(repo_path: &Path, worktree_path: &Path) -> Result<()> {
    let records = list_worktrees(repo_path).unwrap_or_else(|e| {
        log::warn!("Could not list worktrees of {}: {e:#}", repo_path.display());
        Vec::new()
    });
    let record = records
        .iter()
        .find(|record| paths_match(&record.path, worktree_path));

    let branch = match record {
        Some(record) if record.is_primary => {
            bail!("Refusing to delete the primary worktree {}", worktree_path.display())
        }
        Some(record) => Some(record.branch_name.clone()).filter(|name| !name.is_empty()),
        None => branch_from_worktree_path(worktree_path),
    };

    remove_worktree(repo_path, worktree_path)?;

    if let Some(branch) = branch.filter(|name| name.starts_with(AGENT_BRANCH_PREFIX)) {
        match delete_branch(repo_path, &branch) {
            Ok(()) => log::info!("Deleted branch {branch}"),
            Err(e) => log::debug!("Branch cleanup for {branch} skipped: {e:#}"),
        }
    }
    Ok(())
}

fn branch_from_worktree_path(worktree_path: &Path) -> Option<String> {
    let parent = worktree_path.parent()?;
    if parent.file_name()? != WORKTREES_DIR {
        return None;
    }
    let session_id = worktree_path.file_name()?.to_str()?;
    Some(session_branch_name(session_id))
}

fn remove_worktree(repo_path: &Path, worktree_path: &Path) -> Result<()> {
    let repo = open_repository(repo_path)?;

    for name in repo.worktrees()?.iter().flatten() {
        let Ok(worktree) = repo.find_worktree(name) else {
            continue;
        };
        if !paths_match(worktree.path(), worktree_path) {
            continue;
        }
        if worktree_path.exists() {
            fs::remove_dir_all(worktree_path).with_context(|| {
                format!("Failed to remove worktree directory {}", worktree_path.display())
            })?;
        }
        let mut opts = WorktreePruneOptions::new();
        opts.locked(true);
        if let Err(e) = worktree.prune(Some(&mut opts)) {
            log::warn!("Failed to prune worktree '{name}' from git registry: {e}");
        }
        log::info!("Removed worktree {}", worktree_path.display());
        return Ok(());
    }

    if worktree_path.exists() {
        fs::remove_dir_all(worktree_path).with_context(|| {
            format!("Failed to remove directory {}", worktree_path.display())
        })?;
        log::info!("Removed unregistered worktree directory {}", worktree_path.display());
    } else {
        log::info!("Worktree {} already gone", worktree_path.display());
    }
    if let Err(e) = prune_worktrees(repo_path) {
        log::debug!("Pruning after removal of {} failed: {e:#}", worktree_path.display());
    }
    Ok(())
}

pub fn list_worktrees(repo_path: &Path) -> Result<Vec<WorktreeRecord>> {
    let output = StdCommand::new("git")
        .args(["worktree", "list", "--porcelain"])
        .current_dir(repo_path)
        .output()
        .context("Failed to run git worktree list")?;
    if !output.status.success() {
        bail!(
            "git worktree list failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(parse_worktree_list(&String::from_utf8_lossy(&output.stdout)))
}

/// Parses `git worktree list --porcelain` output.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeRecord> {
    let mut records = Vec::new();
    let mut current: Option<(PathBuf, String)> = None;

    let mut flush = |current: &mut Option<(PathBuf, String)>| {
        if let Some((path, branch_name)) = current.take() {
            let is_primary = !is_nested_worktree(&path);
            records.push(WorktreeRecord {
                path,
                branch_name,
                is_primary,
            });
        }
    };

    for line in output.lines() {
        let line = line.trim_end_matches('\r');
        if line.is_empty() {
            flush(&mut current);
            continue;
        }
        let (key, value) = line.split_once(' ').unwrap_or((line, ""));
        match key {
            "worktree" => {
                flush(&mut current);
                current = Some((PathBuf::from(value), String::new()));
            }
            "branch" => {
                if let Some((_, branch_name)) = current.as_mut() {
                    *branch_name = value
                        .strip_prefix("refs/heads/")
                        .unwrap_or(value)
                        .to_string();
                }
            }
            _ => {}
        }
    }
    flush(&mut current);
    records
}

/// Drops registry entries whose directories no longer exist.
pub fn prune_worktrees(repo_path: &Path) -> Result<usize> {
    let repo = open_repository(repo_path)?;
    let mut pruned = 0;
    for name in repo.worktrees()?.iter().flatten() {
        if let Ok(worktree) = repo.find_worktree(name)
            && worktree.validate().is_err()
        {
            worktree.prune(Some(&mut WorktreePruneOptions::new()))?;
            pruned += 1;
        }
    }
    if pruned > 0 {
        log::info!("Pruned {pruned} stale worktree(s) in {}", repo_path.display());
    }
    Ok(pruned)
}
