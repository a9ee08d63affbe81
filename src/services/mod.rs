use std::path::PathBuf;
use std::sync::Arc;

use crate::domains::agents::AgentRegistry;
use crate::domains::git::{self, WorktreeRecord};
use crate::domains::sessions::{SessionOrchestrator, SessionStore};
use crate::domains::settings::{AppConfig, resolve_store_path};
use crate::domains::terminal::{TerminalBackend, TerminalSettings, TerminalSupervisor};
use crate::errors::AgentError;
use crate::events::EventSink;
use crate::utils::run_blocking;

/// Every long-lived service, composed once at startup and passed by reference.
pub struct AppServices {
    pub config: AppConfig,
    pub agents: Arc<AgentRegistry>,
    pub store: Arc<SessionStore>,
    pub terminals: Arc<TerminalSupervisor>,
    pub sessions: SessionOrchestrator,
}

impl AppServices {
    pub fn new(config: AppConfig, events: Arc<dyn EventSink>) -> Self {
        let store = Arc::new(SessionStore::open(resolve_store_path(&config)));
        Self::with_store(config, store, events)
    }

    pub fn with_store(
        config: AppConfig,
        store: Arc<SessionStore>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let agents = Arc::new(AgentRegistry::with_overrides(&config.agent_overrides()));
        let terminals = Arc::new(TerminalSupervisor::new(
            TerminalSettings::from_config(&config),
            Arc::clone(&agents),
            Arc::clone(&events),
        ));
        let sessions = SessionOrchestrator::new(
            Arc::clone(&store),
            Arc::clone(&terminals) as Arc<dyn TerminalBackend>,
            Arc::clone(&agents),
            events,
        );
        Self {
            config,
            agents,
            store,
            terminals,
            sessions,
        }
    }

    pub fn shutdown(&self) {
        self.terminals.kill_all();
    }
}

/// Repository-level operations that are not tied to a session.
pub mod repositories {
    use super::*;

    pub async fn is_repository(path: PathBuf) -> Result<bool, AgentError> {
        run_blocking("detect repository", move || Ok(git::is_repository(&path))).await
    }

    pub async fn branches(path: PathBuf) -> Result<Vec<String>, AgentError> {
        run_blocking("list branches", move || {
            Ok(git::list_branches(&path).unwrap_or_else(|e| {
                log::debug!("No branches for {}: {e:#}", path.display());
                Vec::new()
            }))
        })
        .await
    }

    pub async fn worktrees(repo_path: PathBuf) -> Result<Vec<WorktreeRecord>, AgentError> {
        run_blocking("list worktrees", move || {
            git::list_worktrees(&repo_path)
                .map_err(|e| AgentError::repository(&repo_path, format!("{e:#}")))
        })
        .await
    }

    pub async fn delete_worktree(
        repo_path: PathBuf,
        worktree_path: PathBuf,
    ) -> Result<(), AgentError> {
        run_blocking("delete worktree", move || {
            git::delete_worktree(&repo_path, &worktree_path)
                .map_err(|e| AgentError::worktree_delete(&worktree_path, e))
        })
        .await
    }

    pub async fn prune_worktrees(repo_path: PathBuf) -> Result<usize, AgentError> {
        run_blocking("prune worktrees", move || {
            git::prune_worktrees(&repo_path)
                .map_err(|e| AgentError::repository(&repo_path, format!("{e:#}")))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::git::tests::init_test_repo;
    use crate::events::testing::RecordingSink;
    use tempfile::TempDir;

    fn services() -> AppServices {
        AppServices::with_store(
            AppConfig::default(),
            Arc::new(SessionStore::in_memory()),
            Arc::new(RecordingSink::default()),
        )
    }

    #[tokio::test]
    async fn composes_from_default_config() {
        let services = services();
        assert!(services.sessions.list().is_empty());
        assert_eq!(services.agents.list().len(), 3);
        services.shutdown();
    }

    #[tokio::test]
    async fn repository_operations_degrade_outside_git() {
        let dir = TempDir::new().unwrap();
        assert!(!repositories::is_repository(dir.path().to_path_buf()).await.unwrap());
        assert!(repositories::branches(dir.path().to_path_buf()).await.unwrap().is_empty());
        assert!(repositories::worktrees(dir.path().to_path_buf()).await.is_err());
    }

    #[tokio::test]
    async fn repository_operations_on_a_repo() {
        let repo = init_test_repo();
        let path = repo.path().to_path_buf();
        assert!(repositories::is_repository(path.clone()).await.unwrap());
        assert_eq!(repositories::branches(path.clone()).await.unwrap(), vec!["main"]);

        let worktree = git::create_worktree(&path, "abcd1234", "main").unwrap();
        let records = repositories::worktrees(path.clone()).await.unwrap();
        assert_eq!(records.len(), 2);

        repositories::delete_worktree(path.clone(), worktree.clone()).await.unwrap();
        assert!(!worktree.exists());
        assert_eq!(repositories::prune_worktrees(path).await.unwrap(), 0);
    }
}
