use serde::Serialize;
use std::fmt;

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(tag = "type", content = "data")]
pub enum AgentError {
    Repository {
        path: String,
        message: String,
    },
    WorktreeCreate {
        path: String,
        message: String,
    },
    WorktreeDelete {
        path: String,
        message: String,
    },
    AgentUnavailable {
        agent: String,
    },
    SessionNotFound {
        session_id: String,
    },
    Persistence {
        path: String,
        message: String,
    },
    Terminal {
        session_id: String,
        operation: String,
        message: String,
    },
    Config {
        key: String,
        message: String,
    },
    InvalidRequest {
        message: String,
    },
    TaskFailed {
        operation: String,
        message: String,
    },
}

impl AgentError {
    pub fn repository(path: impl AsRef<std::path::Path>, error: impl ToString) -> Self {
        AgentError::Repository {
            path: path.as_ref().display().to_string(),
            message: error.to_string(),
        }
    }

    pub fn worktree_create(path: impl AsRef<std::path::Path>, error: impl fmt::Display) -> Self {
        AgentError::WorktreeCreate {
            path: path.as_ref().display().to_string(),
            message: format!("{error:#}"),
        }
    }

    pub fn worktree_delete(path: impl AsRef<std::path::Path>, error: impl fmt::Display) -> Self {
        AgentError::WorktreeDelete {
            path: path.as_ref().display().to_string(),
            message: format!("{error:#}"),
        }
    }

    pub fn session_not_found(session_id: &str) -> Self {
        AgentError::SessionNotFound {
            session_id: session_id.to_string(),
        }
    }

    pub fn terminal(session_id: &str, operation: &str, error: impl ToString) -> Self {
        AgentError::Terminal {
            session_id: session_id.to_string(),
            operation: operation.to_string(),
            message: error.to_string(),
        }
    }

    pub fn invalid_request(message: impl ToString) -> Self {
        AgentError::InvalidRequest {
            message: message.to_string(),
        }
    }
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Repository { path, message } => {
                write!(f, "Repository error at '{path}': {message}")
            }
            Self::WorktreeCreate { path, message } => {
                write!(f, "Failed to create worktree at '{path}': {message}")
            }
            Self::WorktreeDelete { path, message } => {
                write!(f, "Failed to delete worktree at '{path}': {message}")
            }
            Self::AgentUnavailable { agent } => {
                write!(f, "Agent '{agent}' is not available")
            }
            Self::SessionNotFound { session_id } => {
                write!(f, "Session '{session_id}' not found")
            }
            Self::Persistence { path, message } => {
                write!(f, "Persistence error for '{path}': {message}")
            }
            Self::Terminal {
                session_id,
                operation,
                message,
            } => {
                write!(
                    f,
                    "Terminal operation '{operation}' failed for session '{session_id}': {message}"
                )
            }
            Self::Config { key, message } => {
                write!(f, "Configuration error for key '{key}': {message}")
            }
            Self::InvalidRequest { message } => {
                write!(f, "Invalid request: {message}")
            }
            Self::TaskFailed { operation, message } => {
                write!(f, "Background task '{operation}' failed: {message}")
            }
        }
    }
}

impl std::error::Error for AgentError {}

impl From<AgentError> for String {
    fn from(error: AgentError) -> Self {
        error.to_string()
    }
}
