use anyhow::Result;
use git2::{BranchType, Repository, Status, StatusEntry, StatusOptions};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Untracked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChange {
    pub path: String,
    pub status: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitStatus {
    pub files: Vec<FileChange>,
    pub branch: String,
    pub ahead: usize,
    pub behind: usize,
}

/// Working-directory status. Any failure yields an empty status.
pub fn status(workdir: &Path) -> GitStatus {
    read_status(workdir).unwrap_or_else(|e| {
        log::debug!("Status unavailable for {}: {e:#}", workdir.display());
        GitStatus::default()
    })
}

fn read_status(workdir: &Path) -> Result<GitStatus> {
    let repo = Repository::open(workdir)?;
    let mut opts = StatusOptions::new();
    opts.include_untracked(true)
        .recurse_untracked_dirs(true)
        .include_ignored(false)
        .renames_head_to_index(true);

    let files = repo
        .statuses(Some(&mut opts))?
        .iter()
        .filter_map(|entry| file_change(&entry))
        .collect();

    let (branch, ahead, behind) = tracking(&repo);
    Ok(GitStatus {
        files,
        branch,
        ahead,
        behind,
    })
}

fn change_kind(status: Status) -> Option<ChangeKind> {
    if status.is_ignored() || status == Status::CURRENT {
        return None;
    }
    let kind = if status.is_index_new() {
        ChangeKind::Added
    } else if status.is_index_deleted() || status.is_wt_deleted() {
        ChangeKind::Deleted
    } else if status.is_index_renamed() || status.is_wt_renamed() {
        ChangeKind::Renamed
    } else if status.is_wt_new() {
        ChangeKind::Untracked
    } else {
        ChangeKind::Modified
    };
    Some(kind)
}

fn file_change(entry: &StatusEntry<'_>) -> Option<FileChange> {
    let status = change_kind(entry.status())?;
    let delta = entry.head_to_index().or_else(|| entry.index_to_workdir());
    let new_path = delta
        .as_ref()
        .and_then(|d| d.new_file().path())
        .map(|p| p.to_string_lossy().into_owned())
        .or_else(|| entry.path().map(str::to_string))?;
    let old_path = if status == ChangeKind::Renamed {
        delta
            .and_then(|d| d.old_file().path())
            .map(|p| p.to_string_lossy().into_owned())
            .filter(|old| *old != new_path)
    } else {
        None
    };
    Some(FileChange {
        path: new_path,
        status,
        old_path,
    })
}

fn tracking(repo: &Repository) -> (String, usize, usize) {
    let Ok(head) = repo.head() else {
        return (String::new(), 0, 0);
    };
    if !head.is_branch() {
        return ("HEAD".to_string(), 0, 0);
    }
    let name = head.shorthand().unwrap_or_default().to_string();
    let counts = repo
        .find_branch(&name, BranchType::Local)
        .ok()
        .and_then(|branch| {
            let local = branch.get().target()?;
            let upstream = branch.upstream().ok()?.get().target()?;
            repo.graph_ahead_behind(local, upstream).ok()
        })
        .unwrap_or((0, 0));
    (name, counts.0, counts.1)
}
