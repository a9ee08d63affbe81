use chrono::Utc;
use dashmap::{DashMap, DashSet};
use log::{info, warn};
use std::path::PathBuf;
use std::sync::Arc;

use super::entity::{CreateSessionConfig, Session, generate_session_id};
use super::lifecycle::{WorktreeBootstrapper, reclaim_worktree};
use super::repository::SessionStore;
use crate::domains::agents::AgentRegistry;
use crate::domains::git::{self, GitStatus};
use crate::domains::terminal::TerminalBackend;
use crate::errors::AgentError;
use crate::events::{AgentEvent, EventSink, SessionRemovedPayload, emit_event};
use crate::utils::run_blocking;

/// Coordinates worktrees, terminals and the session registry.
pub struct SessionOrchestrator {
    sessions: DashMap<String, Session>,
    reserved_ids: DashSet<String>,
    closing_ids: DashSet<String>,
    store: Arc<SessionStore>,
    terminals: Arc<dyn TerminalBackend>,
    agents: Arc<AgentRegistry>,
    events: Arc<dyn EventSink>,
}

impl SessionOrchestrator {
    /// Seeds the registry from the store. Restored sessions have no live process.
    pub fn new(
        store: Arc<SessionStore>,
        terminals: Arc<dyn TerminalBackend>,
        agents: Arc<AgentRegistry>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let sessions = DashMap::new();
        for session in store.sessions() {
            sessions.insert(session.id.clone(), session);
        }
        if !sessions.is_empty() {
            info!("Restored {} session record(s)", sessions.len());
        }
        Self {
            sessions,
            reserved_ids: DashSet::new(),
            closing_ids: DashSet::new(),
            store,
            terminals,
            agents,
            events,
        }
    }

    fn reserve_session_id(&self) -> String {
        loop {
            let id = generate_session_id();
            if !self.sessions.contains_key(&id) && self.reserved_ids.insert(id.clone()) {
                return id;
            }
            warn!("Session id {id} collided with a live session; regenerating");
        }
    }

    pub async fn create(&self, config: CreateSessionConfig) -> Result<Session, AgentError> {
        self.agents.ensure_available(config.agent)?;

        let session_id = self.reserve_session_id();
        let result = self.create_reserved(&session_id, config).await;
        self.reserved_ids.remove(&session_id);
        result
    }

    async fn create_reserved(
        &self,
        session_id: &str,
        config: CreateSessionConfig,
    ) -> Result<Session, AgentError> {
        let repo_path = config.repo_path.clone();
        let requested_base = config.requested_base_branch().map(str::to_string);
        let id = session_id.to_string();
        let bootstrap = run_blocking("bootstrap worktree", move || {
            WorktreeBootstrapper::new(&repo_path).bootstrap(&id, requested_base.as_deref())
        })
        .await?;

        let session = Session {
            id: session_id.to_string(),
            display_name: config.display_name_for(session_id),
            repo_path: config.repo_path,
            worktree_path: bootstrap.worktree_path,
            branch_name: bootstrap.branch_name,
            base_branch_name: bootstrap.base_branch,
            agent_kind: config.agent,
            is_version_controlled: bootstrap.is_version_controlled,
            created_at: Utc::now(),
        };

        self.sessions.insert(session.id.clone(), session.clone());
        self.store.add_session(session.clone());
        emit_event(self.events.as_ref(), AgentEvent::SessionAdded, &session);

        if let Err(e) = self
            .terminals
            .spawn(&session.id, session.working_directory(), session.agent_kind)
            .await
        {
            warn!(
                "Agent launch for session '{}' failed: {e}; worktree {:?} is kept",
                session.id, session.worktree_path
            );
            self.unregister(&session.id);
            return Err(e);
        }

        info!(
            "Created session '{}' ({}) in {}",
            session.id,
            session.agent_kind,
            session.working_directory().display()
        );
        Ok(session)
    }

    fn unregister(&self, session_id: &str) {
        if self.sessions.remove(session_id).is_some() {
            self.store.remove_session(session_id);
            emit_event(
                self.events.as_ref(),
                AgentEvent::SessionRemoved,
                &SessionRemovedPayload {
                    session_id: session_id.to_string(),
                },
            );
        }
    }

    /// Kills the process, optionally reclaims the worktree, then forgets the session.
    ///
    /// A close already in flight for the same id makes this one report `SessionNotFound`.
    pub async fn close(&self, session_id: &str, delete_worktree: bool) -> Result<(), AgentError> {
        if !self.closing_ids.insert(session_id.to_string()) {
            return Err(AgentError::session_not_found(session_id));
        }
        let result = self.close_claimed(session_id, delete_worktree).await;
        self.closing_ids.remove(session_id);
        result
    }

    async fn close_claimed(&self, session_id: &str, delete_worktree: bool) -> Result<(), AgentError> {
        let session = self.get(session_id)?;

        self.terminals.kill(session_id);

        if delete_worktree && session.is_version_controlled {
            let target = session.clone();
            run_blocking("reclaim worktree", move || reclaim_worktree(&target)).await?;
        }

        self.unregister(session_id);
        info!("Closed session '{session_id}' (delete_worktree={delete_worktree})");
        Ok(())
    }

    /// Changes the display name; the id, branch and worktree stay as they are.
    pub fn rename(&self, session_id: &str, name: &str) -> Result<Session, AgentError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AgentError::invalid_request("session name must not be empty"));
        }
        let renamed = {
            let mut entry = self
                .sessions
                .get_mut(session_id)
                .ok_or_else(|| AgentError::session_not_found(session_id))?;
            entry.display_name = name.to_string();
            entry.value().clone()
        };
        self.store
            .update_session(session_id, |stored| stored.display_name = name.to_string());
        info!("Renamed session '{session_id}' to '{name}'");
        Ok(renamed)
    }

    pub fn get(&self, session_id: &str) -> Result<Session, AgentError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| AgentError::session_not_found(session_id))
    }

    pub fn list(&self) -> Vec<Session> {
        self.sessions.iter().map(|entry| entry.value().clone()).collect()
    }

    pub fn working_directory(&self, session_id: &str) -> Result<PathBuf, AgentError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.working_directory().to_path_buf())
            .ok_or_else(|| AgentError::session_not_found(session_id))
    }

    pub fn is_running(&self, session_id: &str) -> bool {
        self.terminals.is_alive(session_id)
    }

    /// Runs on the blocking pool: a child that stops reading stalls the write.
    pub async fn send_input(&self, session_id: &str, data: Vec<u8>) -> Result<(), AgentError> {
        let terminals = Arc::clone(&self.terminals);
        let session_id = session_id.to_string();
        run_blocking("terminal input", move || {
            terminals.write(&session_id, &data);
            Ok(())
        })
        .await
    }

    pub fn resize(&self, session_id: &str, cols: u16, rows: u16) {
        self.terminals.resize(session_id, cols, rows);
    }

    pub async fn status(&self, session_id: &str) -> Result<GitStatus, AgentError> {
        let workdir = self.working_directory(session_id)?;
        run_blocking("git status", move || Ok(git::status(&workdir))).await
    }

    pub async fn file_diff(&self, session_id: &str, file: &str) -> Result<String, AgentError> {
        let workdir = self.working_directory(session_id)?;
        let file = file.to_string();
        run_blocking("git diff", move || Ok(git::file_diff(&workdir, &file))).await
    }

    pub async fn file_content(&self, session_id: &str, file: &str) -> Result<String, AgentError> {
        let workdir = self.working_directory(session_id)?;
        let file = file.to_string();
        run_blocking("read file", move || Ok(git::file_content(&workdir, &file))).await
    }

    pub async fn original_file_content(
        &self,
        session_id: &str,
        file: &str,
    ) -> Result<String, AgentError> {
        let workdir = self.working_directory(session_id)?;
        let file = file.to_string();
        run_blocking("read HEAD file", move || {
            Ok(git::original_file_content(&workdir, &file))
        })
        .await
    }

    pub fn reviewed_files(&self, session_id: &str) -> Result<Vec<String>, AgentError> {
        self.get(session_id)?;
        Ok(self.store.reviewed_files(session_id))
    }

    pub fn add_reviewed_file(&self, session_id: &str, file: &str) -> Result<(), AgentError> {
        self.get(session_id)?;
        self.store.add_reviewed_file(session_id, file);
        Ok(())
    }

    pub fn remove_reviewed_file(&self, session_id: &str, file: &str) -> Result<(), AgentError> {
        self.get(session_id)?;
        self.store.remove_reviewed_file(session_id, file);
        Ok(())
    }

    pub fn clear_reviewed_files(&self, session_id: &str) -> Result<(), AgentError> {
        self.get(session_id)?;
        self.store.clear_reviewed_files(session_id);
        Ok(())
    }
}
