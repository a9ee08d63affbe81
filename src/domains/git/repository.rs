use anyhow::{Context, Result, anyhow, bail};
use git2::{BranchType, ErrorCode, Repository};
use std::path::Path;

pub fn is_repository(path: &Path) -> bool {
    Repository::discover(path).is_ok()
}

pub fn open_repository(path: &Path) -> Result<Repository> {
    Repository::discover(path)
        .with_context(|| format!("'{}' is not inside a git repository", path.display()))
}

/// Name of the branch HEAD points at. Unborn branches resolve to their
/// symbolic name; a detached HEAD is an error.
pub fn current_branch(path: &Path) -> Result<String> {
    let repo = open_repository(path)?;
    match repo.head() {
        Ok(head) if head.is_branch() => head
            .shorthand()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("HEAD branch name is not valid UTF-8")),
        Ok(_) => bail!("HEAD is detached in '{}'", path.display()),
        Err(e) if e.code() == ErrorCode::UnbornBranch => unborn_head_branch(&repo),
        Err(e) => Err(e).with_context(|| format!("Failed to read HEAD in '{}'", path.display())),
    }
}

fn unborn_head_branch(repo: &Repository) -> Result<String> {
    let head = repo.find_reference("HEAD")?;
    head.symbolic_target()
        .and_then(|target| target.strip_prefix("refs/heads/"))
        .map(str::to_string)
        .ok_or_else(|| anyhow!("HEAD does not point at a branch"))
}

pub fn list_branches(path: &Path) -> Result<Vec<String>> {
    let repo = open_repository(path)?;
    let mut names = Vec::new();
    for branch in repo.branches(Some(BranchType::Local))? {
        let (branch, _) = branch?;
        if let Some(name) = branch.name()? {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

pub fn branch_exists(repo: &Repository, name: &str) -> bool {
    repo.find_branch(name, BranchType::Local).is_ok()
}

pub fn delete_branch(repo_path: &Path, name: &str) -> Result<()> {
    let repo = open_repository(repo_path)?;
    let mut branch = repo
        .find_branch(name, BranchType::Local)
        .with_context(|| format!("Branch '{name}' not found"))?;
    branch
        .delete()
        .with_context(|| format!("Failed to delete branch '{name}'"))
}
