pub mod files;
pub mod repository;
pub mod status;
pub mod worktrees;

#[cfg(test)]
pub(crate) mod tests;

pub use files::{file_content, file_diff, original_file_content};
pub use repository::{current_branch, is_repository, list_branches};
pub use status::{ChangeKind, FileChange, GitStatus, status};
pub use worktrees::{
    AGENT_BRANCH_PREFIX, WORKTREES_DIR, WorktreeRecord, create_worktree, delete_worktree,
    list_worktrees, parse_worktree_list, prune_worktrees, session_branch_name,
    session_worktree_path,
};
