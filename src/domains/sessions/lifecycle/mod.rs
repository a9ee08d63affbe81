pub mod bootstrapper;
pub mod cancellation;

pub use bootstrapper::{BootstrapResult, WorktreeBootstrapper};
pub use cancellation::reclaim_worktree;
