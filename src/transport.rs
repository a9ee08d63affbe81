//! JSON-lines transport: one request per input line, one response per request,
//! plus event lines drained from the event channel.

use anyhow::{Context, Result};
use log::{debug, error, info};
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinSet;

use crate::commands::{Request, dispatch};
use crate::errors::AgentError;
use crate::events::EmittedEvent;
use crate::services::AppServices;

/// Handles one request line and returns the response object.
pub async fn handle_line(services: &AppServices, line: &str) -> Value {
    let (id, request) = match parse_request(line) {
        Ok(parsed) => parsed,
        Err((id, err)) => return json!({ "id": id, "error": err }),
    };
    match dispatch(services, request).await {
        Ok(value) => json!({ "id": id, "ok": value }),
        Err(err) => {
            debug!("Request {id} failed: {err}");
            json!({ "id": id, "error": err })
        }
    }
}

fn parse_request(line: &str) -> Result<(Value, Request), (Value, AgentError)> {
    let mut value: Value = serde_json::from_str(line).map_err(|e| {
        (
            Value::Null,
            AgentError::invalid_request(format!("malformed JSON: {e}")),
        )
    })?;
    let id = value
        .as_object_mut()
        .and_then(|object| object.remove("id"))
        .unwrap_or(Value::Null);
    let request = serde_json::from_value(value)
        .map_err(|e| (id.clone(), AgentError::invalid_request(e)))?;
    Ok((id, request))
}

async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut line = serde_json::to_vec(message).context("Failed to encode outgoing message")?;
    line.push(b'\n');
    writer
        .write_all(&line)
        .await
        .context("Failed to write outgoing message")?;
    writer.flush().await.context("Failed to flush output")?;
    Ok(())
}

/// Serves requests from `reader` until it closes and every in-flight request has answered.
///
/// Requests run concurrently, so responses may be written out of order; callers match on `id`.
pub async fn serve<R, W>(
    services: Arc<AppServices>,
    mut events: UnboundedReceiver<EmittedEvent>,
    reader: R,
    writer: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut in_flight = JoinSet::new();
    let mut reading = true;

    loop {
        tokio::select! {
            line = lines.next_line(), if reading => {
                match line.context("Failed to read request")? {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => {
                        let services = Arc::clone(&services);
                        in_flight.spawn(async move { handle_line(&services, &line).await });
                    }
                    None => {
                        info!("Input closed; finishing {} pending request(s)", in_flight.len());
                        reading = false;
                    }
                }
            }
            Some(event) = events.recv() => write_line(writer, &event).await?,
            Some(joined) = in_flight.join_next() => match joined {
                Ok(response) => write_line(writer, &response).await?,
                Err(e) => error!("Request task failed: {e}"),
            },
        }

        if !reading && in_flight.is_empty() {
            break;
        }
    }

    while let Ok(event) = events.try_recv() {
        write_line(writer, &event).await?;
    }
    Ok(())
}
