use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::domains::agents::AgentKind;

pub const SESSION_ID_LEN: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub display_name: String,
    pub repo_path: PathBuf,
    /// Present exactly when the session is version controlled.
    pub worktree_path: Option<PathBuf>,
    /// `agent/<id>` for versioned sessions, empty otherwise.
    pub branch_name: String,
    pub base_branch_name: String,
    pub agent_kind: AgentKind,
    pub is_version_controlled: bool,
    pub created_at: DateTime<Utc>,
}

impl Session {
    pub fn working_directory(&self) -> &Path {
        self.worktree_path.as_deref().unwrap_or(&self.repo_path)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionConfig {
    pub repo_path: PathBuf,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub base_branch: Option<String>,
    pub agent: AgentKind,
}

impl CreateSessionConfig {
    pub fn new(repo_path: impl Into<PathBuf>, agent: AgentKind) -> Self {
        Self {
            repo_path: repo_path.into(),
            name: None,
            base_branch: None,
            agent,
        }
    }

    pub fn display_name_for(&self, session_id: &str) -> String {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("Session {session_id}"))
    }

    /// Explicit base branch when one was given and is not blank.
    pub fn requested_base_branch(&self) -> Option<&str> {
        self.base_branch
            .as_deref()
            .map(str::trim)
            .filter(|branch| !branch.is_empty())
    }
}

/// Short session token: the first eight characters of a v4 UUID.
pub fn generate_session_id() -> String {
    let mut id = Uuid::new_v4().simple().to_string();
    id.truncate(SESSION_ID_LEN);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_ids_are_short_hex_tokens() {
        let id = generate_session_id();
        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn display_name_defaults_from_id() {
        let mut config = CreateSessionConfig::new("/repo", AgentKind::ClaudeCode);
        assert_eq!(config.display_name_for("1234abcd"), "Session 1234abcd");
        config.name = Some("  ".into());
        assert_eq!(config.display_name_for("1234abcd"), "Session 1234abcd");
        config.name = Some("Refactor parser".into());
        assert_eq!(config.display_name_for("1234abcd"), "Refactor parser");
    }

    #[test]
    fn blank_base_branch_is_not_a_request() {
        let mut config = CreateSessionConfig::new("/repo", AgentKind::ClaudeCode);
        assert_eq!(config.requested_base_branch(), None);
        config.base_branch = Some(" \t".into());
        assert_eq!(config.requested_base_branch(), None);
        config.base_branch = Some(" develop ".into());
        assert_eq!(config.requested_base_branch(), Some("develop"));
    }

    #[test]
    fn working_directory_prefers_worktree() {
        let mut session = Session {
            id: "abcd1234".into(),
            display_name: "Session abcd1234".into(),
            repo_path: PathBuf::from("/repo"),
            worktree_path: None,
            branch_name: String::new(),
            base_branch_name: String::new(),
            agent_kind: AgentKind::ClaudeCode,
            is_version_controlled: false,
            created_at: Utc::now(),
        };
        assert_eq!(session.working_directory(), Path::new("/repo"));
        session.worktree_path = Some(PathBuf::from("/repo/.worktrees/abcd1234"));
        assert_eq!(
            session.working_directory(),
            Path::new("/repo/.worktrees/abcd1234")
        );
    }

    #[test]
    fn create_config_accepts_camel_case() {
        let config: CreateSessionConfig = serde_json::from_value(serde_json::json!({
            "repoPath": "/repo",
            "baseBranch": "main",
            "agent": "claude-code"
        }))
        .unwrap();
        assert_eq!(config.repo_path, PathBuf::from("/repo"));
        assert_eq!(config.requested_base_branch(), Some("main"));
        assert_eq!(config.name, None);
    }
}
