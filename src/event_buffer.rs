//! Sink for canonical capture events.
//!
//! The producer event processor pushes every [`ClientCaptureEvent`] it emits into
//! a [`ClientCaptureEventCollector`]. [`CaptureEventBuffer`] is the collector used
//! by real captures: it hands each event, in order, to a file consumer and to an
//! optional in-memory dispatcher.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use log::{error, warn};

use crate::protos::capture::ClientCaptureEvent;

/// Receives the canonical event stream of one capture.
pub trait ClientCaptureEventCollector: Send + Sync {
    fn add_event(&self, event: ClientCaptureEvent);
}

/// A downstream consumer of a [`CaptureEventBuffer`].
pub trait CaptureEventSink: Send {
    fn name(&self) -> &str;

    fn write_event(&mut self, event: &ClientCaptureEvent) -> Result<()>;

    /// Flushes everything written so far. Called once, from `close`.
    fn finish(&mut self) -> Result<()>;
}

/// Forwards events to an in-memory consumer over a bounded channel.
///
/// `write_event` blocks while the channel is full, so events are never dropped.
pub struct ChannelSink {
    sender: SyncSender<ClientCaptureEvent>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, Receiver<ClientCaptureEvent>) {
        let (sender, receiver) = sync_channel(capacity);
        (ChannelSink { sender }, receiver)
    }
}

impl CaptureEventSink for ChannelSink {
    fn name(&self) -> &str {
        "dispatcher"
    }

    fn write_event(&mut self, event: &ClientCaptureEvent) -> Result<()> {
        self.sender
            .send(event.clone())
            .map_err(|_| anyhow!("dispatcher receiver disconnected"))
    }

    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

struct SinkSlot {
    sink: Box<dyn CaptureEventSink>,
    failed: bool,
}

#[derive(Default)]
struct BufferState {
    sinks: Vec<SinkSlot>,
    errors: Vec<String>,
    events_added: u64,
    events_after_close: u64,
    closed: bool,
}

/// What a buffer saw over its lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferSummary {
    pub events_added: u64,
    /// One entry per failed consumer write or flush.
    pub errors: Vec<String>,
}

impl BufferSummary {
    /// A capture whose consumers failed is persisted only partially.
    pub fn is_incomplete(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[derive(Default)]
pub struct CaptureEventBuffer {
    state: Mutex<BufferState>,
}

impl CaptureEventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a consumer. Consumers see events in the order they were added to
    /// the buffer, and are called in the order they were attached.
    pub fn with_sink(self, sink: Box<dyn CaptureEventSink>) -> Self {
        self.state
            .lock()
            .expect("Failed to acquire event buffer lock")
            .sinks
            .push(SinkSlot {
                sink,
                failed: false,
            });
        self
    }

    /// Flushes and releases all consumers. Later events are dropped.
    pub fn close(&self) -> BufferSummary {
        let mut state = self.state.lock().expect("Failed to acquire event buffer lock");
        if !state.closed {
            state.closed = true;
            let mut sinks = std::mem::take(&mut state.sinks);
            for slot in sinks.iter_mut().filter(|slot| !slot.failed) {
                if let Err(e) = slot.sink.finish() {
                    error!("Failed to finish {}: {:#}", slot.sink.name(), e);
                    state
                        .errors
                        .push(format!("{}: {:#}", slot.sink.name(), e));
                }
            }
        }
        if state.events_after_close > 0 {
            warn!(
                "Dropped {} events added after the capture event buffer was closed",
                state.events_after_close
            );
        }
        BufferSummary {
            events_added: state.events_added,
            errors: state.errors.clone(),
        }
    }

    /// True once a consumer failed to write an event.
    pub fn has_errors(&self) -> bool {
        !self
            .state
            .lock()
            .expect("Failed to acquire event buffer lock")
            .errors
            .is_empty()
    }

    pub fn events_added(&self) -> u64 {
        self.state
            .lock()
            .expect("Failed to acquire event buffer lock")
            .events_added
    }
}

impl ClientCaptureEventCollector for CaptureEventBuffer {
    fn add_event(&self, event: ClientCaptureEvent) {
        let mut state = self.state.lock().expect("Failed to acquire event buffer lock");
        if state.closed {
            state.events_after_close += 1;
            return;
        }
        state.events_added += 1;

        let BufferState { sinks, errors, .. } = &mut *state;
        for slot in sinks.iter_mut().filter(|slot| !slot.failed) {
            if let Err(e) = slot.sink.write_event(&event) {
                // Keep accepting events; the capture is reported incomplete at stop.
                error!("Failed to write capture event to {}: {:#}", slot.sink.name(), e);
                errors.push(format!("{}: {:#}", slot.sink.name(), e));
                slot.failed = true;
            }
        }
    }
}

/// Collector that keeps every event in memory.
#[derive(Default)]
pub struct InMemoryEventCollector {
    events: Mutex<Vec<ClientCaptureEvent>>,
}

impl InMemoryEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ClientCaptureEvent> {
        self.events
            .lock()
            .expect("Failed to acquire collector lock")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.events.lock().expect("Failed to acquire collector lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ClientCaptureEventCollector for InMemoryEventCollector {
    fn add_event(&self, event: ClientCaptureEvent) {
        self.events
            .lock()
            .expect("Failed to acquire collector lock")
            .push(event);
    }
}
