use log::info;

use crate::domains::git;
use crate::domains::sessions::entity::Session;
use crate::errors::AgentError;

/// Deletes the session's worktree and agent branch. Blocking.
///
/// Returns `false` when the session has no worktree to reclaim.
pub fn reclaim_worktree(session: &Session) -> Result<bool, AgentError> {
    let Some(worktree_path) = session
        .worktree_path
        .as_deref()
        .filter(|_| session.is_version_controlled)
    else {
        return Ok(false);
    };

    info!(
        "Reclaiming worktree {} of session '{}'",
        worktree_path.display(),
        session.id
    );
    git::delete_worktree(&session.repo_path, worktree_path)
        .map_err(|e| AgentError::worktree_delete(worktree_path, e))?;
    Ok(true)
}
