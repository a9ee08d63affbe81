pub mod classifier;
pub mod command_builder;
pub mod control_sequences;
pub mod shell;
pub mod submission;
pub mod supervisor;

use async_trait::async_trait;
use std::path::Path;

use crate::domains::agents::AgentKind;
use crate::errors::AgentError;

pub use classifier::{
    ClassifierRegistry, InputKind, OutputClassifier, TerminalState, ToolKind, replay,
};
pub use supervisor::{TerminalSettings, TerminalSupervisor};

/// Process supervision as seen by the session orchestrator.
///
/// `write`, `resize` and `kill` are no-ops for sessions without a live process.
#[async_trait]
pub trait TerminalBackend: Send + Sync {
    /// Starts the session shell in `working_dir` and launches `agent` in it,
    /// replacing any live process registered under `session_id`.
    async fn spawn(
        &self,
        session_id: &str,
        working_dir: &Path,
        agent: AgentKind,
    ) -> Result<(), AgentError>;

    fn write(&self, session_id: &str, data: &[u8]);

    fn resize(&self, session_id: &str, cols: u16, rows: u16);

    fn kill(&self, session_id: &str);

    fn kill_all(&self);

    fn is_alive(&self, session_id: &str) -> bool;
}
