use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::entity::Session;
use crate::errors::AgentError;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoreData {
    #[serde(default)]
    sessions: Vec<Session>,
    #[serde(default)]
    reviewed_files: HashMap<String, Vec<String>>,
}

/// JSON-file store for session records and per-session reviewed files.
///
/// Reads never fail: a missing or corrupt file loads as empty. Writes are
/// best effort; failures are logged and the in-memory state stays authoritative.
pub struct SessionStore {
    path: Option<PathBuf>,
    data: Mutex<StoreData>,
}

impl SessionStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let data = match load(&path) {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Starting with an empty session store: {e}");
                StoreData::default()
            }
        };
        log::info!(
            "Session store at {} holds {} session(s)",
            path.display(),
            data.sessions.len()
        );
        Self {
            path: Some(path),
            data: Mutex::new(data),
        }
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            data: Mutex::new(StoreData::default()),
        }
    }

    pub fn sessions(&self) -> Vec<Session> {
        self.read(|data| data.sessions.clone())
    }

    pub fn add_session(&self, session: Session) {
        self.write(|data| {
            data.sessions.retain(|s| s.id != session.id);
            data.sessions.push(session);
        });
    }

    pub fn update_session<F>(&self, session_id: &str, update: F) -> bool
    where
        F: FnOnce(&mut Session),
    {
        let mut found = false;
        self.write(|data| {
            if let Some(session) = data.sessions.iter_mut().find(|s| s.id == session_id) {
                update(session);
                found = true;
            }
        });
        found
    }

    /// Removes the session together with its reviewed-file set.
    pub fn remove_session(&self, session_id: &str) {
        self.write(|data| {
            data.sessions.retain(|s| s.id != session_id);
            data.reviewed_files.remove(session_id);
        });
    }

    pub fn reviewed_files(&self, session_id: &str) -> Vec<String> {
        self.read(|data| {
            data.reviewed_files
                .get(session_id)
                .cloned()
                .unwrap_or_default()
        })
    }

    pub fn add_reviewed_file(&self, session_id: &str, file: &str) {
        self.write(|data| {
            let files = data.reviewed_files.entry(session_id.to_string()).or_default();
            if !files.iter().any(|f| f == file) {
                files.push(file.to_string());
            }
        });
    }

    pub fn remove_reviewed_file(&self, session_id: &str, file: &str) {
        self.write(|data| {
            if let Some(files) = data.reviewed_files.get_mut(session_id) {
                files.retain(|f| f != file);
            }
        });
    }

    pub fn clear_reviewed_files(&self, session_id: &str) {
        self.write(|data| {
            data.reviewed_files.remove(session_id);
        });
    }

    fn read<T>(&self, f: impl FnOnce(&StoreData) -> T) -> T {
        let data = self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&data)
    }

    fn write(&self, f: impl FnOnce(&mut StoreData)) {
        let mut data = self.data.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut data);
        if let Some(path) = &self.path
            && let Err(e) = save(path, &data)
        {
            log::error!("Failed to persist sessions: {e}");
        }
    }
}

fn load(path: &Path) -> Result<StoreData, AgentError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(StoreData::default()),
        Err(e) => return Err(persistence(path, e)),
    };
    if text.trim().is_empty() {
        return Ok(StoreData::default());
    }
    serde_json::from_str(&text).map_err(|e| persistence(path, e))
}

fn save(path: &Path, data: &StoreData) -> Result<(), AgentError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| persistence(parent, e))?;
    }
    let json = serde_json::to_string_pretty(data).map_err(|e| persistence(path, e))?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).map_err(|e| persistence(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| persistence(path, e))
}

fn persistence(path: &Path, error: impl ToString) -> AgentError {
    AgentError::Persistence {
        path: path.display().to_string(),
        message: error.to_string(),
    }
}
