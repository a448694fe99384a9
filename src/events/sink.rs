//! Output targets for engine events.

use std::io::{self, Result as IoResult, Stdout, Write};
use std::sync::{Arc, Mutex};

use super::event::EngineEvent;

/// Abstraction over an output target that consumes full events.
pub trait EventSink: Send + Sync {
    /// Handle one event. The sink decides how to render it.
    fn handle(&mut self, event: &EngineEvent) -> IoResult<()>;
}

/// Line-per-event stdout sink.
pub struct StdOutSink {
    handle: Stdout,
}

impl Default for StdOutSink {
    fn default() -> Self {
        Self {
            handle: io::stdout(),
        }
    }
}

impl EventSink for StdOutSink {
    fn handle(&mut self, event: &EngineEvent) -> IoResult<()> {
        writeln!(self.handle, "{} {event}", event.kind())?;
        self.handle.flush()
    }
}

/// In-memory sink for tests and snapshots.
#[derive(Clone, Default)]
pub struct MemorySink {
    entries: Arc<Mutex<Vec<EngineEvent>>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything captured so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EngineEvent> {
        self.entries.lock().unwrap().clone()
    }

    /// Events of one kind, in arrival order.
    #[must_use]
    pub fn of_kind(&self, kind: &str) -> Vec<EngineEvent> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl EventSink for MemorySink {
    fn handle(&mut self, event: &EngineEvent) -> IoResult<()> {
        self.entries.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Forwards events into a flume channel for async consumers.
pub struct ChannelSink {
    tx: flume::Sender<EngineEvent>,
}

impl ChannelSink {
    #[must_use]
    pub fn new(tx: flume::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EventSink for ChannelSink {
    fn handle(&mut self, event: &EngineEvent) -> IoResult<()> {
        self.tx
            .send(event.clone())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "channel receiver dropped"))
    }
}
