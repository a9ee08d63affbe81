//! Request surface shared by every transport.
//!
//! A request is `{"method": "<name>", "params": {...}}`; parameter names are camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::domains::sessions::CreateSessionConfig;
use crate::domains::terminal::submission::build_submission_payload;
use crate::errors::AgentError;
use crate::services::{AppServices, repositories};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "method", content = "params", rename_all_fields = "camelCase")]
pub enum Request {
    #[serde(rename = "session.create")]
    SessionCreate(CreateSessionConfig),
    #[serde(rename = "session.close")]
    SessionClose {
        session_id: String,
        #[serde(default)]
        delete_worktree: bool,
    },
    #[serde(rename = "session.list")]
    SessionList,
    #[serde(rename = "session.get")]
    SessionGet { session_id: String },
    #[serde(rename = "session.rename")]
    SessionRename { session_id: String, name: String },

    #[serde(rename = "agents.list")]
    AgentsList,

    #[serde(rename = "git.isRepo")]
    GitIsRepo { path: PathBuf },
    #[serde(rename = "git.branches")]
    GitBranches { path: PathBuf },
    #[serde(rename = "git.status")]
    GitStatus { session_id: String },
    #[serde(rename = "git.diff")]
    GitDiff { session_id: String, file: String },

    #[serde(rename = "file.content")]
    FileContent { session_id: String, file: String },
    #[serde(rename = "file.originalContent")]
    FileOriginalContent { session_id: String, file: String },

    #[serde(rename = "terminal.input")]
    TerminalInput { session_id: String, data: String },
    /// Sends `data` as one pasted line followed by Enter.
    #[serde(rename = "terminal.submit")]
    TerminalSubmit { session_id: String, data: String },
    #[serde(rename = "terminal.resize")]
    TerminalResize {
        session_id: String,
        cols: u16,
        rows: u16,
    },
    #[serde(rename = "terminal.state")]
    TerminalState { session_id: String },

    #[serde(rename = "worktree.list")]
    WorktreeList { repo_path: PathBuf },
    #[serde(rename = "worktree.delete")]
    WorktreeDelete {
        repo_path: PathBuf,
        worktree_path: PathBuf,
    },
    #[serde(rename = "worktree.prune")]
    WorktreePrune { repo_path: PathBuf },

    #[serde(rename = "reviewed.get")]
    ReviewedGet { session_id: String },
    #[serde(rename = "reviewed.add")]
    ReviewedAdd { session_id: String, file: String },
    #[serde(rename = "reviewed.remove")]
    ReviewedRemove { session_id: String, file: String },
    #[serde(rename = "reviewed.clear")]
    ReviewedClear { session_id: String },
}

fn to_json<T: Serialize>(value: T) -> Result<Value, AgentError> {
    serde_json::to_value(value).map_err(|e| AgentError::TaskFailed {
        operation: "serialize response".to_string(),
        message: e.to_string(),
    })
}

pub async fn dispatch(services: &AppServices, request: Request) -> Result<Value, AgentError> {
    let sessions = &services.sessions;
    match request {
        Request::SessionCreate(config) => to_json(sessions.create(config).await?),
        Request::SessionClose {
            session_id,
            delete_worktree,
        } => {
            sessions.close(&session_id, delete_worktree).await?;
            Ok(Value::Null)
        }
        Request::SessionList => to_json(sessions.list()),
        Request::SessionGet { session_id } => to_json(sessions.get(&session_id)?),
        Request::SessionRename { session_id, name } => {
            to_json(sessions.rename(&session_id, &name)?)
        }

        Request::AgentsList => to_json(services.agents.list()),

        Request::GitIsRepo { path } => to_json(repositories::is_repository(path).await?),
        Request::GitBranches { path } => to_json(repositories::branches(path).await?),
        Request::GitStatus { session_id } => to_json(sessions.status(&session_id).await?),
        Request::GitDiff { session_id, file } => {
            to_json(sessions.file_diff(&session_id, &file).await?)
        }

        Request::FileContent { session_id, file } => {
            to_json(sessions.file_content(&session_id, &file).await?)
        }
        Request::FileOriginalContent { session_id, file } => {
            to_json(sessions.original_file_content(&session_id, &file).await?)
        }

        Request::TerminalInput { session_id, data } => {
            sessions.send_input(&session_id, data.into_bytes()).await?;
            Ok(Value::Null)
        }
        Request::TerminalSubmit { session_id, data } => {
            let payload = build_submission_payload(data.as_bytes(), true);
            sessions.send_input(&session_id, payload).await?;
            Ok(Value::Null)
        }
        Request::TerminalResize {
            session_id,
            cols,
            rows,
        } => {
            sessions.resize(&session_id, cols, rows);
            Ok(Value::Null)
        }
        Request::TerminalState { session_id } => {
            sessions.get(&session_id)?;
            to_json(services.terminals.state(&session_id))
        }

        Request::WorktreeList { repo_path } => to_json(repositories::worktrees(repo_path).await?),
        Request::WorktreeDelete {
            repo_path,
            worktree_path,
        } => {
            repositories::delete_worktree(repo_path, worktree_path).await?;
            Ok(Value::Null)
        }
        Request::WorktreePrune { repo_path } => {
            to_json(repositories::prune_worktrees(repo_path).await?)
        }

        Request::ReviewedGet { session_id } => to_json(sessions.reviewed_files(&session_id)?),
        Request::ReviewedAdd { session_id, file } => {
            sessions.add_reviewed_file(&session_id, &file)?;
            Ok(Value::Null)
        }
        Request::ReviewedRemove { session_id, file } => {
            sessions.remove_reviewed_file(&session_id, &file)?;
            Ok(Value::Null)
        }
        Request::ReviewedClear { session_id } => {
            sessions.clear_reviewed_files(&session_id)?;
            Ok(Value::Null)
        }
    }
}
