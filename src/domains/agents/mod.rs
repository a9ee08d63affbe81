use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::AgentError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentKind {
    ClaudeCode,
    Codex,
    Cursor,
}

impl AgentKind {
    pub const ALL: [AgentKind; 3] = [AgentKind::ClaudeCode, AgentKind::Codex, AgentKind::Cursor];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::ClaudeCode => "claude-code",
            AgentKind::Codex => "codex",
            AgentKind::Cursor => "cursor",
        }
    }

    fn builtin_spec(self) -> AgentSpec {
        let (display_name, command, args, available): (&str, &str, &[&str], bool) = match self {
            AgentKind::ClaudeCode => ("Claude Code", "claude", &[], true),
            AgentKind::Codex => ("Codex", "codex", &[], false),
            AgentKind::Cursor => ("Cursor", "cursor", &["--chat"], false),
        };
        AgentSpec {
            kind: self,
            display_name: display_name.to_string(),
            command: command.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            env: HashMap::new(),
            available,
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentKind {
    type Err = AgentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        AgentKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == value.trim())
            .ok_or_else(|| AgentError::invalid_request(format!("unknown agent kind '{value}'")))
    }
}

/// Per-agent settings from the config file. Unset fields keep the built-in value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentOverride {
    #[serde(default)]
    pub available: Option<bool>,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Option<Vec<String>>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSpec {
    pub kind: AgentKind,
    pub display_name: String,
    pub command: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub available: bool,
}

impl AgentSpec {
    /// The line typed into the session shell to start the agent.
    pub fn launch_line(&self) -> String {
        shell_words::join(std::iter::once(self.command.as_str()).chain(self.args.iter().map(String::as_str)))
    }

    fn apply(&mut self, agent_override: &AgentOverride) {
        if let Some(available) = agent_override.available {
            self.available = available;
        }
        if let Some(command) = agent_override.command.as_deref().map(str::trim)
            && !command.is_empty()
        {
            self.command = command.to_string();
        }
        if let Some(args) = &agent_override.args {
            self.args = args.clone();
        }
        self.env.extend(agent_override.env.clone());
    }
}

/// The closed set of launchable agents.
#[derive(Debug, Clone)]
pub struct AgentRegistry {
    specs: HashMap<AgentKind, AgentSpec>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl AgentRegistry {
    pub fn builtin() -> Self {
        Self {
            specs: AgentKind::ALL
                .into_iter()
                .map(|kind| (kind, kind.builtin_spec()))
                .collect(),
        }
    }

    pub fn with_overrides(overrides: &HashMap<AgentKind, AgentOverride>) -> Self {
        let mut registry = Self::builtin();
        for (kind, agent_override) in overrides {
            if let Some(spec) = registry.specs.get_mut(kind) {
                spec.apply(agent_override);
                log::debug!(
                    "Agent '{kind}' configured: command='{}', available={}",
                    spec.command,
                    spec.available
                );
            }
        }
        registry
    }

    pub fn get(&self, kind: AgentKind) -> &AgentSpec {
        // Every kind is inserted by `builtin`.
        &self.specs[&kind]
    }

    pub fn ensure_available(&self, kind: AgentKind) -> Result<&AgentSpec, AgentError> {
        let spec = self.get(kind);
        if spec.available {
            Ok(spec)
        } else {
            Err(AgentError::AgentUnavailable {
                agent: kind.as_str().to_string(),
            })
        }
    }

    pub fn list(&self) -> Vec<AgentSpec> {
        let mut specs: Vec<AgentSpec> = self.specs.values().cloned().collect();
        specs.sort_by_key(|spec| spec.kind);
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_availability() {
        let registry = AgentRegistry::builtin();
        assert!(registry.ensure_available(AgentKind::ClaudeCode).is_ok());
        assert_eq!(
            registry.ensure_available(AgentKind::Codex),
            Err(AgentError::AgentUnavailable {
                agent: "codex".to_string()
            })
        );
        assert!(registry.ensure_available(AgentKind::Cursor).is_err());
    }

    #[test]
    fn launch_line_quotes_arguments() {
        let registry = AgentRegistry::builtin();
        assert_eq!(registry.get(AgentKind::ClaudeCode).launch_line(), "claude");
        assert_eq!(registry.get(AgentKind::Cursor).launch_line(), "cursor --chat");

        let mut spec = registry.get(AgentKind::Codex).clone();
        spec.args = vec!["--model".into(), "o3 mini".into()];
        assert_eq!(spec.launch_line(), "codex --model 'o3 mini'");
    }

    #[test]
    fn overrides_replace_only_set_fields() {
        let overrides = HashMap::from([(
            AgentKind::Codex,
            AgentOverride {
                available: Some(true),
                command: None,
                args: Some(vec!["--full-auto".into()]),
                env: HashMap::from([("OPENAI_LOG".into(), "debug".into())]),
            },
        )]);
        let registry = AgentRegistry::with_overrides(&overrides);
        let codex = registry.ensure_available(AgentKind::Codex).unwrap();
        assert_eq!(codex.command, "codex");
        assert_eq!(codex.launch_line(), "codex --full-auto");
        assert_eq!(codex.env.get("OPENAI_LOG").map(String::as_str), Some("debug"));
        assert!(!registry.get(AgentKind::Cursor).available);
    }

    #[test]
    fn parses_kebab_case_names() {
        assert_eq!("claude-code".parse::<AgentKind>().unwrap(), AgentKind::ClaudeCode);
        assert!("vim".parse::<AgentKind>().is_err());
        assert_eq!(
            serde_json::to_value(AgentKind::ClaudeCode).unwrap(),
            serde_json::json!("claude-code")
        );
    }

    #[test]
    fn list_is_sorted_by_kind() {
        let kinds: Vec<AgentKind> = AgentRegistry::builtin().list().into_iter().map(|s| s.kind).collect();
        assert_eq!(kinds, AgentKind::ALL.to_vec());
    }
}
