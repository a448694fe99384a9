//! The event bus: receives engine events and broadcasts them to sinks.

use std::sync::{Arc, Mutex};
use tokio::{sync::oneshot, task};

use super::event::EngineEvent;
use super::sink::{EventSink, StdOutSink};

/// Receives events from engine components and broadcasts to every sink.
///
/// One background listener task drains the channel; it is started lazily
/// with [`listen`](Self::listen) and stopped either explicitly with
/// [`stop_listener`](Self::stop_listener) or on drop.
pub struct EventBus {
    sinks: Arc<Mutex<Vec<Box<dyn EventSink>>>>,
    channel: (flume::Sender<EngineEvent>, flume::Receiver<EngineEvent>),
    listener: Arc<Mutex<Option<ListenerState>>>,
}

/// Cheap cloneable producer handle engine components emit through.
///
/// Emission is non-blocking and lossy by design: if the bus is gone the
/// event is dropped with a trace warning, never an engine failure.
#[derive(Clone, Debug)]
pub struct EventEmitter {
    tx: flume::Sender<EngineEvent>,
}

impl EventEmitter {
    pub fn emit(&self, event: EngineEvent) {
        if self.tx.send(event).is_err() {
            tracing::warn!("event bus receiver dropped; engine event discarded");
        }
    }

    /// An emitter wired to nothing; useful for tests of isolated parts.
    #[must_use]
    pub fn disconnected() -> Self {
        let (tx, _rx) = flume::unbounded();
        Self { tx }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_sink(StdOutSink::default())
    }
}

impl EventBus {
    /// Create a bus with a single sink.
    pub fn with_sink<T>(sink: T) -> Self
    where
        T: EventSink + 'static,
    {
        Self::with_sinks(vec![Box::new(sink)])
    }

    /// Create a bus with several sinks.
    #[must_use]
    pub fn with_sinks(sinks: Vec<Box<dyn EventSink>>) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(sinks)),
            channel: flume::unbounded(),
            listener: Arc::new(Mutex::new(None)),
        }
    }

    /// Add a sink after construction (e.g. a per-trigger channel).
    pub fn add_sink<T: EventSink + 'static>(&self, sink: T) {
        self.sinks.lock().unwrap().push(Box::new(sink));
    }

    /// Producer handle for engine components.
    #[must_use]
    pub fn emitter(&self) -> EventEmitter {
        EventEmitter {
            tx: self.channel.0.clone(),
        }
    }

    /// Spawn the background task that drains events into the sinks.
    /// Idempotent.
    pub fn listen(&self) {
        let mut guard = self.listener.lock().expect("listener poisoned");
        if guard.is_some() {
            return;
        }

        let receiver = self.channel.1.clone();
        let sinks = self.sinks.clone();
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let handle = task::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => break,
                    recv = receiver.recv_async() => match recv {
                        Err(_) => break,
                        Ok(event) => {
                            let mut sinks_guard = sinks.lock().unwrap();
                            for sink in sinks_guard.iter_mut() {
                                if let Err(e) = sink.handle(&event) {
                                    tracing::warn!(error = %e, "event sink error");
                                }
                            }
                        }
                    }
                }
            }
        });

        *guard = Some(ListenerState {
            shutdown_tx,
            handle,
        });
    }

    /// Stop the background listener, draining nothing further.
    pub async fn stop_listener(&self) {
        let state = {
            let mut guard = self.listener.lock().expect("listener poisoned");
            guard.take()
        };
        if let Some(state) = state {
            let _ = state.shutdown_tx.send(());
            let _ = state.handle.await;
        }
    }
}

impl Drop for EventBus {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.listener.lock() {
            if let Some(state) = guard.take() {
                let _ = state.shutdown_tx.send(());
                state.handle.abort();
            }
        }
    }
}

struct ListenerState {
    shutdown_tx: oneshot::Sender<()>,
    handle: task::JoinHandle<()>,
}
