use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::domains::agents::{AgentKind, AgentOverride};

pub const DEFAULT_LAUNCH_DELAY_MS: u64 = 500;
pub const DEFAULT_COLS: u16 = 120;
pub const DEFAULT_ROWS: u16 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Host shell for agent sessions. `$SHELL` or the platform default when unset.
    pub shell: Option<String>,
    pub launch_delay_ms: u64,
    pub default_cols: u16,
    pub default_rows: u16,
    pub store_path: Option<PathBuf>,
    /// Keyed by agent kind name, e.g. `[agents.codex]`.
    pub agents: HashMap<String, AgentOverride>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            shell: None,
            launch_delay_ms: DEFAULT_LAUNCH_DELAY_MS,
            default_cols: DEFAULT_COLS,
            default_rows: DEFAULT_ROWS,
            store_path: None,
            agents: HashMap::new(),
        }
    }
}

impl AppConfig {
    pub fn launch_delay(&self) -> Duration {
        Duration::from_millis(self.launch_delay_ms)
    }

    /// Agent overrides with recognised kinds; unknown names are logged and skipped.
    pub fn agent_overrides(&self) -> HashMap<AgentKind, AgentOverride> {
        self.agents
            .iter()
            .filter_map(|(name, agent_override)| match name.parse::<AgentKind>() {
                Ok(kind) => Some((kind, agent_override.clone())),
                Err(_) => {
                    log::warn!("Ignoring config for unknown agent '{name}'");
                    None
                }
            })
            .collect()
    }
}
