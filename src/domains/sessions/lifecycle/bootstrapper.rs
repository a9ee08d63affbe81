use log::info;
use std::path::{Path, PathBuf};

use crate::domains::git;
use crate::errors::AgentError;

pub struct WorktreeBootstrapper<'a> {
    repo_path: &'a Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapResult {
    pub worktree_path: Option<PathBuf>,
    pub branch_name: String,
    pub base_branch: String,
    pub is_version_controlled: bool,
}

impl<'a> WorktreeBootstrapper<'a> {
    pub fn new(repo_path: &'a Path) -> Self {
        Self { repo_path }
    }

    /// Prepares the working copy for a new session. Blocking.
    ///
    /// Repositories get a fresh worktree on `agent/<session_id>`; anything
    /// else runs in place without version control.
    pub fn bootstrap(
        &self,
        session_id: &str,
        requested_base: Option<&str>,
    ) -> Result<BootstrapResult, AgentError> {
        if !git::is_repository(self.repo_path) {
            info!(
                "{} is not a repository; session '{session_id}' runs in place",
                self.repo_path.display()
            );
            return Ok(BootstrapResult {
                worktree_path: None,
                branch_name: String::new(),
                base_branch: requested_base.unwrap_or_default().to_string(),
                is_version_controlled: false,
            });
        }

        let base_branch = self.resolve_base_branch(requested_base)?;
        let worktree_path = git::create_worktree(self.repo_path, session_id, &base_branch)
            .map_err(|e| {
                AgentError::worktree_create(
                    git::session_worktree_path(self.repo_path, session_id),
                    e,
                )
            })?;

        info!(
            "Bootstrapped worktree for session '{session_id}' at {} (base {base_branch})",
            worktree_path.display()
        );
        Ok(BootstrapResult {
            worktree_path: Some(worktree_path),
            branch_name: git::session_branch_name(session_id),
            base_branch,
            is_version_controlled: true,
        })
    }

    fn resolve_base_branch(&self, requested: Option<&str>) -> Result<String, AgentError> {
        match requested {
            Some(branch) => Ok(branch.to_string()),
            None => git::current_branch(self.repo_path)
                .map_err(|e| AgentError::repository(self.repo_path, format!("{e:#}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::tests::{init_test_repo, run_git};
    use tempfile::TempDir;

    #[test]
    fn plain_directory_runs_in_place() {
        let dir = TempDir::new().unwrap();
        let result = WorktreeBootstrapper::new(dir.path())
            .bootstrap("abcd1234", Some("main"))
            .unwrap();
        assert_eq!(
            result,
            BootstrapResult {
                worktree_path: None,
                branch_name: String::new(),
                base_branch: "main".into(),
                is_version_controlled: false,
            }
        );
        assert!(!dir.path().join(".worktrees").exists());
    }

    #[test]
    fn repository_defaults_to_current_branch() {
        let repo = init_test_repo();
        run_git(repo.path(), &["checkout", "-b", "topic"]);
        let result = WorktreeBootstrapper::new(repo.path())
            .bootstrap("abcd1234", None)
            .unwrap();
        assert_eq!(result.base_branch, "topic");
        assert_eq!(result.branch_name, "agent/abcd1234");
        assert_eq!(
            result.worktree_path,
            Some(repo.path().join(".worktrees").join("abcd1234"))
        );
    }

    #[test]
    fn detached_head_without_base_is_a_repository_error() {
        let repo = init_test_repo();
        run_git(repo.path(), &["checkout", "--detach"]);
        let err = WorktreeBootstrapper::new(repo.path())
            .bootstrap("abcd1234", None)
            .unwrap_err();
        assert!(matches!(err, AgentError::Repository { .. }));
    }

    #[test]
    fn unknown_base_is_a_worktree_create_error() {
        let repo = init_test_repo();
        let err = WorktreeBootstrapper::new(repo.path())
            .bootstrap("abcd1234", Some("missing"))
            .unwrap_err();
        assert!(matches!(err, AgentError::WorktreeCreate { .. }));
    }
}
