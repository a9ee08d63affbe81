use async_trait::async_trait;
use bytes::Bytes;
use pty_host::{PtyEventHandler, PtyExit, PtyHost, TerminalSize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use super::TerminalBackend;
use super::classifier::{ClassifierRegistry, TerminalState};
use super::command_builder::build_shell_command;
use super::shell::{ShellInvocation, effective_shell};
use super::submission::build_submission_payload;
use crate::domains::agents::{AgentKind, AgentRegistry};
use crate::domains::settings::AppConfig;
use crate::errors::AgentError;
use crate::events::{
    AgentEvent, EventSink, TerminalExitPayload, TerminalOutputPayload, TerminalStatePayload,
    emit_event,
};

#[derive(Debug, Clone)]
pub struct TerminalSettings {
    pub shell: ShellInvocation,
    pub launch_delay: Duration,
    pub default_size: TerminalSize,
}

impl TerminalSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            shell: effective_shell(config.shell.as_deref()),
            launch_delay: config.launch_delay(),
            default_size: TerminalSize::new(config.default_cols, config.default_rows),
        }
    }
}

/// Routes PTY output to the event sink and the per-session classifier.
struct OutputRouter {
    classifiers: Arc<ClassifierRegistry>,
    events: Arc<dyn EventSink>,
}

impl PtyEventHandler for OutputRouter {
    fn on_output(&self, id: &str, chunk: Bytes) {
        log::trace!("terminal {id}: {} bytes", chunk.len());
        emit_event(
            self.events.as_ref(),
            AgentEvent::TerminalOutput,
            &TerminalOutputPayload {
                session_id: id.to_string(),
                data: String::from_utf8_lossy(&chunk).into_owned(),
            },
        );
        if let Some(state) = self.classifiers.feed(id, &chunk) {
            log::debug!("Session '{id}' is now {state:?}");
            emit_event(
                self.events.as_ref(),
                AgentEvent::TerminalState,
                &TerminalStatePayload {
                    session_id: id.to_string(),
                    state,
                },
            );
        }
    }

    fn on_exit(&self, exit: PtyExit) {
        // The session now belongs to the replacement; its own exit reports later.
        if exit.superseded {
            log::debug!(
                "Replaced process for '{}' exited with {}",
                exit.id,
                exit.exit_code
            );
            return;
        }
        self.classifiers.remove(&exit.id);
        emit_event(
            self.events.as_ref(),
            AgentEvent::TerminalExit,
            &TerminalExitPayload {
                session_id: exit.id,
                exit_code: exit.exit_code,
            },
        );
    }
}

/// One PTY-backed shell per session, with the agent launched inside it.
pub struct TerminalSupervisor {
    host: Arc<PtyHost>,
    classifiers: Arc<ClassifierRegistry>,
    agents: Arc<AgentRegistry>,
    settings: TerminalSettings,
}

impl TerminalSupervisor {
    pub fn new(
        settings: TerminalSettings,
        agents: Arc<AgentRegistry>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let classifiers = Arc::new(ClassifierRegistry::new());
        let router = OutputRouter {
            classifiers: Arc::clone(&classifiers),
            events,
        };
        Self {
            host: Arc::new(PtyHost::new(Arc::new(router))),
            classifiers,
            agents,
            settings,
        }
    }

    pub fn state(&self, session_id: &str) -> TerminalState {
        self.classifiers.state(session_id)
    }

    pub fn size(&self, session_id: &str) -> Option<TerminalSize> {
        self.host.size(session_id)
    }

    fn schedule_launch(&self, session_id: &str, generation: u64, line: String) {
        let host = Arc::clone(&self.host);
        let delay = self.settings.launch_delay;
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let payload = build_submission_payload(line.as_bytes(), false);
            if host.write_to_generation(&session_id, generation, &payload) {
                log::info!("Launched '{line}' in session '{session_id}'");
            } else {
                log::debug!("Session '{session_id}' went away before launch of '{line}'");
            }
        });
    }
}

#[async_trait]
impl TerminalBackend for TerminalSupervisor {
    async fn spawn(
        &self,
        session_id: &str,
        working_dir: &Path,
        agent: AgentKind,
    ) -> Result<(), AgentError> {
        let spec = self.agents.ensure_available(agent)?;
        let size = self.settings.default_size;

        let mut command = build_shell_command(&self.settings.shell, working_dir, size.cols, size.rows);
        command
            .env
            .extend(spec.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        self.classifiers.reset(session_id);
        let generation = self
            .host
            .spawn(session_id, command.into_builder(), size)
            .map_err(|e| AgentError::terminal(session_id, "spawn", e))?;

        log::info!(
            "Session '{session_id}' shell {} started in {}",
            self.settings.shell.program,
            working_dir.display()
        );
        self.schedule_launch(session_id, generation, spec.launch_line());
        Ok(())
    }

    fn write(&self, session_id: &str, data: &[u8]) {
        self.host.write(session_id, data);
    }

    fn resize(&self, session_id: &str, cols: u16, rows: u16) {
        if cols == 0 || rows == 0 {
            log::debug!("Ignoring resize of '{session_id}' to {cols}x{rows}");
            return;
        }
        self.host.resize(session_id, TerminalSize::new(cols, rows));
    }

    fn kill(&self, session_id: &str) {
        self.host.kill(session_id);
        self.classifiers.reset(session_id);
    }

    fn kill_all(&self) {
        for id in self.host.ids() {
            self.classifiers.reset(&id);
        }
        self.host.kill_all();
    }

    fn is_alive(&self, session_id: &str) -> bool {
        self.host.is_alive(session_id)
    }
}
