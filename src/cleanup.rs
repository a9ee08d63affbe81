use log::info;
use std::sync::Arc;

use crate::domains::terminal::TerminalBackend;

/// Kills every live terminal when dropped, including during unwinding.
pub struct TerminalCleanupGuard {
    terminals: Arc<dyn TerminalBackend>,
}

impl TerminalCleanupGuard {
    pub fn new(terminals: Arc<dyn TerminalBackend>) -> Self {
        Self { terminals }
    }
}

impl Drop for TerminalCleanupGuard {
    fn drop(&mut self) {
        info!("Shutting down; killing live terminals");
        self.terminals.kill_all();
    }
}
