use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::domains::terminal::classifier::TerminalState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentEvent {
    TerminalOutput,
    TerminalExit,
    TerminalState,
    SessionAdded,
    SessionRemoved,
}

impl AgentEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentEvent::TerminalOutput => "terminal.output",
            AgentEvent::TerminalExit => "terminal.exit",
            AgentEvent::TerminalState => "terminal.state",
            AgentEvent::SessionAdded => "session.added",
            AgentEvent::SessionRemoved => "session.removed",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalOutputPayload {
    pub session_id: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalExitPayload {
    pub session_id: String,
    pub exit_code: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalStatePayload {
    pub session_id: String,
    pub state: TerminalState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRemovedPayload {
    pub session_id: String,
}

/// An event name together with its serialized payload, as written to the wire.
#[derive(Debug, Clone, Serialize)]
pub struct EmittedEvent {
    pub event: &'static str,
    pub payload: Value,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: EmittedEvent);
}

pub fn emit_event<T: Serialize>(sink: &dyn EventSink, event: AgentEvent, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(payload) => sink.emit(EmittedEvent {
            event: event.as_str(),
            payload,
        }),
        Err(e) => log::warn!("Dropping {} event, payload did not serialize: {e}", event.as_str()),
    }
}

/// Fire-and-forget sink over an unbounded channel drained by the transport.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EmittedEvent>,
}

impl EventSink for ChannelSink {
    fn emit(&self, event: EmittedEvent) {
        if self.tx.send(event).is_err() {
            log::trace!("Event receiver dropped; discarding event");
        }
    }
}

pub fn event_channel() -> (ChannelSink, mpsc::UnboundedReceiver<EmittedEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ChannelSink { tx }, rx)
}
