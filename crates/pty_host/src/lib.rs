//! Pseudo-terminal process host.
//!
//! Owns one PTY-backed child process per key. Each live entry is tagged with a
//! generation number so that output and exit notifications from a process that
//! has since been replaced can be told apart from the current one.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, ChildKiller, MasterPty, PtySize};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

pub use portable_pty::CommandBuilder;

const READ_BUFFER_SIZE: usize = 8192;

#[derive(Debug, thiserror::Error)]
pub enum PtyHostError {
    #[error("failed to open pty for '{id}': {message}")]
    Open { id: String, message: String },
    #[error("failed to spawn process for '{id}': {message}")]
    Spawn { id: String, message: String },
    #[error("failed to attach to pty for '{id}': {message}")]
    Attach { id: String, message: String },
    #[error("failed to start reader thread for '{id}': {source}")]
    Reader {
        id: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub cols: u16,
    pub rows: u16,
}

impl TerminalSize {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self { cols, rows }
    }
}

impl From<TerminalSize> for PtySize {
    fn from(size: TerminalSize) -> Self {
        PtySize {
            rows: size.rows,
            cols: size.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PtyExit {
    pub id: String,
    pub generation: u64,
    pub exit_code: u32,
    /// The key had already been re-spawned when this process ended.
    pub superseded: bool,
}

/// Receives process output and exit notifications.
///
/// Both callbacks run on the reader thread of the process. For a given key,
/// `on_output` calls arrive in order and the next read does not start until
/// the previous call returned.
pub trait PtyEventHandler: Send + Sync + 'static {
    fn on_output(&self, id: &str, chunk: Bytes);
    fn on_exit(&self, exit: PtyExit);
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

struct PtyEntry {
    generation: u64,
    master: Box<dyn MasterPty + Send>,
    /// Locked on its own so a blocked write never holds the registry.
    writer: SharedWriter,
    killer: Box<dyn ChildKiller + Send + Sync>,
    size: TerminalSize,
}

type Registry = Arc<Mutex<HashMap<String, PtyEntry>>>;

pub struct PtyHost {
    entries: Registry,
    next_generation: AtomicU64,
    handler: Arc<dyn PtyEventHandler>,
}

impl PtyHost {
    pub fn new(handler: Arc<dyn PtyEventHandler>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            next_generation: AtomicU64::new(0),
            handler,
        }
    }

    /// Spawns `command` on a fresh PTY under `id` and returns its generation.
    ///
    /// A live process already registered under `id` is killed and replaced.
    pub fn spawn(
        &self,
        id: &str,
        command: CommandBuilder,
        size: TerminalSize,
    ) -> Result<u64, PtyHostError> {
        let pair = native_pty_system()
            .openpty(size.into())
            .map_err(|e| PtyHostError::Open {
                id: id.to_string(),
                message: e.to_string(),
            })?;

        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| PtyHostError::Spawn {
                id: id.to_string(),
                message: e.to_string(),
            })?;
        // The child holds its own copy of the slave side; keeping ours open
        // would stop the reader from ever seeing EOF.
        drop(pair.slave);

        let mut killer = child.clone_killer();
        let attach = pair
            .master
            .try_clone_reader()
            .and_then(|reader| pair.master.take_writer().map(|writer| (reader, writer)));
        let (reader, writer) = match attach {
            Ok(handles) => handles,
            Err(e) => {
                let _ = killer.kill();
                return Err(PtyHostError::Attach {
                    id: id.to_string(),
                    message: e.to_string(),
                });
            }
        };

        let generation = self.next_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let entry = PtyEntry {
            generation,
            master: pair.master,
            writer: Arc::new(Mutex::new(writer)),
            killer,
            size,
        };

        let previous = self.entries.lock().insert(id.to_string(), entry);
        if let Some(mut previous) = previous {
            warn!(
                "Replacing live process for '{id}' (generation {} -> {generation})",
                previous.generation
            );
            if let Err(e) = previous.killer.kill() {
                debug!("Killing replaced process for '{id}' failed: {e}");
            }
        }

        let entries = Arc::clone(&self.entries);
        let handler = Arc::clone(&self.handler);
        let owner = id.to_string();
        let spawned = thread::Builder::new()
            .name(format!("pty-reader-{id}"))
            .spawn(move || pump_output(owner, generation, reader, child, entries, handler));

        if let Err(source) = spawned {
            if let Some(mut entry) = self.take_if_current(id, generation) {
                let _ = entry.killer.kill();
            }
            return Err(PtyHostError::Reader {
                id: id.to_string(),
                source,
            });
        }

        info!("Spawned process for '{id}' at {}x{} (generation {generation})", size.cols, size.rows);
        Ok(generation)
    }

    /// Writes to the process under `id`. Returns false when nothing is registered.
    ///
    /// May block while the child is not draining its input, but only other
    /// writers to the same `id` wait behind it.
    pub fn write(&self, id: &str, data: &[u8]) -> bool {
        let writer = self.entries.lock().get(id).map(|entry| Arc::clone(&entry.writer));
        match writer {
            Some(writer) => write_to(id, &writer, data),
            None => {
                trace!("Dropping write for unknown pty '{id}'");
                false
            }
        }
    }

    /// Writes only if `id` still maps to the process spawned as `generation`.
    pub fn write_to_generation(&self, id: &str, generation: u64, data: &[u8]) -> bool {
        let writer = self
            .entries
            .lock()
            .get(id)
            .filter(|entry| entry.generation == generation)
            .map(|entry| Arc::clone(&entry.writer));
        writer.is_some_and(|writer| write_to(id, &writer, data))
    }

    pub fn resize(&self, id: &str, size: TerminalSize) -> bool {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(id) else {
            return false;
        };
        match entry.master.resize(size.into()) {
            Ok(()) => {
                entry.size = size;
                true
            }
            Err(e) => {
                warn!("Resize of pty '{id}' to {}x{} failed: {e}", size.cols, size.rows);
                false
            }
        }
    }

    /// Kills and unregisters the process under `id`. Safe to call repeatedly.
    pub fn kill(&self, id: &str) -> bool {
        let removed = self.entries.lock().remove(id);
        match removed {
            Some(mut entry) => {
                if let Err(e) = entry.killer.kill() {
                    debug!("Kill of pty '{id}' reported: {e}");
                }
                info!("Killed process for '{id}'");
                true
            }
            None => false,
        }
    }

    pub fn kill_all(&self) -> usize {
        let drained: Vec<(String, PtyEntry)> = self.entries.lock().drain().collect();
        let count = drained.len();
        for (id, mut entry) in drained {
            if let Err(e) = entry.killer.kill() {
                debug!("Kill of pty '{id}' reported: {e}");
            }
        }
        if count > 0 {
            info!("Killed {count} live process(es)");
        }
        count
    }

    pub fn is_alive(&self, id: &str) -> bool {
        self.entries.lock().contains_key(id)
    }

    pub fn generation(&self, id: &str) -> Option<u64> {
        self.entries.lock().get(id).map(|entry| entry.generation)
    }

    pub fn size(&self, id: &str) -> Option<TerminalSize> {
        self.entries.lock().get(id).map(|entry| entry.size)
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }

    fn take_if_current(&self, id: &str, generation: u64) -> Option<PtyEntry> {
        take_if_current(&self.entries, id, generation)
    }
}

fn write_to(id: &str, writer: &SharedWriter, data: &[u8]) -> bool {
    let mut writer = writer.lock();
    match writer.write_all(data).and_then(|()| writer.flush()) {
        Ok(()) => true,
        Err(e) => {
            debug!("Write to pty '{id}' failed: {e}");
            false
        }
    }
}

fn take_if_current(entries: &Registry, id: &str, generation: u64) -> Option<PtyEntry> {
    let mut guard = entries.lock();
    match guard.get(id) {
        Some(entry) if entry.generation == generation => guard.remove(id),
        _ => None,
    }
}

fn is_current(entries: &Registry, id: &str, generation: u64) -> bool {
    entries
        .lock()
        .get(id)
        .is_some_and(|entry| entry.generation == generation)
}

fn pump_output(
    id: String,
    generation: u64,
    mut reader: Box<dyn Read + Send>,
    mut child: Box<dyn Child + Send + Sync>,
    entries: Registry,
    handler: Arc<dyn PtyEventHandler>,
) {
    let mut buf = [0u8; READ_BUFFER_SIZE];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                if !is_current(&entries, &id, generation) {
                    trace!("Discarding {n} bytes from stale process '{id}' (generation {generation})");
                    continue;
                }
                handler.on_output(&id, Bytes::copy_from_slice(&buf[..n]));
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // EIO once the child side closes on Linux.
                debug!("Reader for '{id}' stopped: {e}");
                break;
            }
        }
    }

    let exit_code = match child.wait() {
        Ok(status) => status.exit_code(),
        Err(e) => {
            warn!("Waiting on process for '{id}' failed: {e}");
            1
        }
    };

    let superseded = {
        let mut guard = entries.lock();
        match guard.get(&id) {
            Some(entry) if entry.generation == generation => {
                guard.remove(&id);
                false
            }
            Some(_) => true,
            None => false,
        }
    };

    info!("Process for '{id}' exited with code {exit_code} (generation {generation})");
    handler.on_exit(PtyExit {
        id,
        generation,
        exit_code,
        superseded,
    });
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    #[derive(Debug)]
    enum Observed {
        Output(String, Vec<u8>),
        Exit(PtyExit),
    }

    struct ChannelHandler {
        tx: mpsc::UnboundedSender<Observed>,
    }

    impl PtyEventHandler for ChannelHandler {
        fn on_output(&self, id: &str, chunk: Bytes) {
            let _ = self.tx.send(Observed::Output(id.to_string(), chunk.to_vec()));
        }

        fn on_exit(&self, exit: PtyExit) {
            let _ = self.tx.send(Observed::Exit(exit));
        }
    }

    fn host() -> (PtyHost, mpsc::UnboundedReceiver<Observed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (PtyHost::new(Arc::new(ChannelHandler { tx })), rx)
    }

    fn sh(script: &str) -> CommandBuilder {
        let mut cmd = CommandBuilder::new("/bin/sh");
        cmd.args(["-c", script]);
        cmd
    }

    async fn wait_for_exit(
        rx: &mut mpsc::UnboundedReceiver<Observed>,
        id: &str,
    ) -> (Vec<u8>, PtyExit) {
        let mut output = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(10), rx.recv())
                .await
                .expect("timed out waiting for pty events")
                .expect("handler dropped");
            match event {
                Observed::Output(owner, chunk) if owner == id => output.extend(chunk),
                Observed::Exit(exit) if exit.id == id => return (output, exit),
                _ => {}
            }
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delivers_output_then_exit_and_unregisters() {
        let (host, mut rx) = host();
        host.spawn("s1", sh("printf hello; exit 3"), TerminalSize::new(80, 24))
            .unwrap();

        let (output, exit) = wait_for_exit(&mut rx, "s1").await;
        assert!(String::from_utf8_lossy(&output).contains("hello"));
        assert_eq!(exit.exit_code, 3);
        assert!(!exit.superseded);
        assert!(!host.is_alive("s1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn respawn_replaces_previous_process() {
        let (host, mut rx) = host();
        let first = host
            .spawn("s1", sh("sleep 30"), TerminalSize::new(80, 24))
            .unwrap();
        let second = host
            .spawn("s1", sh("sleep 30"), TerminalSize::new(100, 40))
            .unwrap();
        assert!(second > first);

        let (_, exit) = wait_for_exit(&mut rx, "s1").await;
        assert_eq!(exit.generation, first);
        assert!(exit.superseded);
        assert_eq!(host.generation("s1"), Some(second));
        assert_eq!(host.size("s1"), Some(TerminalSize::new(100, 40)));

        assert!(host.kill("s1"));
        let (_, exit) = wait_for_exit(&mut rx, "s1").await;
        assert_eq!(exit.generation, second);
        assert!(!exit.superseded);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn kill_is_idempotent() {
        let (host, mut rx) = host();
        host.spawn("s1", sh("sleep 30"), TerminalSize::new(80, 24))
            .unwrap();

        assert!(host.kill("s1"));
        assert!(!host.kill("s1"));
        let _ = wait_for_exit(&mut rx, "s1").await;
        assert!(!host.kill("s1"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn write_reaches_the_child() {
        let (host, mut rx) = host();
        host.spawn("s1", sh("read line; printf \"got:%s\" \"$line\""), TerminalSize::new(80, 24))
            .unwrap();

        assert!(host.write("s1", b"ping\r"));
        let (output, exit) = wait_for_exit(&mut rx, "s1").await;
        assert!(String::from_utf8_lossy(&output).contains("got:ping"));
        assert_eq!(exit.exit_code, 0);
    }

    #[test]
    fn unknown_ids_are_no_ops() {
        let (host, _rx) = host();
        assert!(!host.write("missing", b"data"));
        assert!(!host.write_to_generation("missing", 1, b"data"));
        assert!(!host.resize("missing", TerminalSize::new(10, 10)));
        assert!(!host.kill("missing"));
        assert_eq!(host.kill_all(), 0);
        assert!(host.ids().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn blocked_writer_does_not_stall_other_sessions() {
        let (host, mut rx) = host();
        let host = Arc::new(host);
        host.spawn("stuck", sh("stty -echo; sleep 30"), TerminalSize::new(80, 24))
            .unwrap();
        host.spawn("other", sh("sleep 30"), TerminalSize::new(80, 24))
            .unwrap();

        // Far more line input than the tty queue holds; nothing reads it.
        let flood = b"0123456789abcdef\n".repeat(64 * 1024);
        let writer_host = Arc::clone(&host);
        thread::spawn(move || writer_host.write("stuck", &flood));
        thread::sleep(Duration::from_millis(300));

        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let other_host = Arc::clone(&host);
        thread::spawn(move || {
            let resized = other_host.resize("other", TerminalSize::new(100, 30));
            let alive = other_host.is_alive("stuck");
            let killed = other_host.kill("other");
            let _ = done_tx.send((resized, alive, killed));
        });

        let (resized, alive, killed) = done_rx
            .recv_timeout(Duration::from_secs(3))
            .expect("registry stayed locked behind a blocked write");
        assert!(resized && alive && killed);
        let (_, exit) = wait_for_exit(&mut rx, "other").await;
        assert!(!exit.superseded);

        assert!(host.kill("stuck"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stale_generation_writes_are_rejected() {
        let (host, mut rx) = host();
        let generation = host
            .spawn("s1", sh("sleep 30"), TerminalSize::new(80, 24))
            .unwrap();

        assert!(!host.write_to_generation("s1", generation + 1, b"x"));
        assert!(host.write_to_generation("s1", generation, b"x"));
        assert!(host.resize("s1", TerminalSize::new(132, 50)));
        assert_eq!(host.size("s1"), Some(TerminalSize::new(132, 50)));

        assert_eq!(host.kill_all(), 1);
        let _ = wait_for_exit(&mut rx, "s1").await;
    }
}
