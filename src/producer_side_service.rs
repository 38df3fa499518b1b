//! Service that external producers connect to.
//!
//! Each connected producer holds one `ReceiveCommandsAndSendEvents` stream. The
//! service pushes capture commands down the stream from a dedicated send thread
//! and feeds the events coming back into the capture's
//! [`ProducerEventProcessor`] from the connection thread.
//!
//! Stopping a capture sends `StopCaptureCommand` to every producer and waits,
//! bounded by `max_wait_for_all_events_sent_ms`, until each producer that saw the
//! start has answered with `AllEventsSent` or disconnected.
//!
//! [`ProducerSideServiceImpl::on_exit_request`] may run while
//! `on_capture_stop_requested` is waiting, but only from another thread: it takes
//! the state lock the waiting thread releases while blocked on the condition
//! variable.

use std::collections::HashMap;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};

use crate::capture_service::CaptureStartStopListener;
use crate::producer_event_processor::ProducerEventProcessor;
use crate::protos::capture::receive_commands_and_send_events_request::Event as RequestEvent;
use crate::protos::capture::receive_commands_and_send_events_response::Command;
use crate::protos::capture::{
    BufferedCaptureEvents, CaptureFinishedCommand, CaptureOptions,
    ReceiveCommandsAndSendEventsRequest, ReceiveCommandsAndSendEventsResponse,
    StartCaptureCommand, StopCaptureCommand, EXTERNAL_PRODUCER_STARTING_ID,
};
use crate::transport::{
    self, MessageReader, MessageWriter, ServerContext, ServerContextRegistry, SocketServer,
};

pub const DEFAULT_MAX_WAIT_FOR_ALL_EVENTS_SENT_MS: u64 = 10_000;

/// Upper bound on how long a send thread sleeps before re-checking its exit conditions.
const SEND_THREAD_CHECK_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Started,
    Stopping,
    Finished,
}

struct ServiceState {
    capture_status: CaptureStatus,
    capture_options: Option<CaptureOptions>,
    producers_remaining: u64,
    exit_requested: bool,
    // Only producers that were sent a StartCaptureCommand have an entry.
    all_events_sent_received: HashMap<u64, bool>,
}

impl ServiceState {
    /// Bookkeeping for a send thread moving `producer_id` from `prev` to `curr`.
    fn register_transition(&mut self, producer_id: u64, prev: CaptureStatus, curr: CaptureStatus) {
        match (prev, curr) {
            // A producer that first wakes up while stopping is sent start and stop together.
            (_, CaptureStatus::Started) | (CaptureStatus::Finished, CaptureStatus::Stopping) => {
                self.producers_remaining += 1;
                self.all_events_sent_received.insert(producer_id, false);
            }
            (_, CaptureStatus::Stopping) => {}
            (_, CaptureStatus::Finished) => {
                self.all_events_sent_received.insert(producer_id, true);
            }
        }
    }

    /// Returns true if this was the producer's first AllEventsSent of the capture.
    fn record_all_events_sent(&mut self, producer_id: u64) -> bool {
        match self.all_events_sent_received.get_mut(&producer_id) {
            Some(received) if !*received => {
                *received = true;
                self.producers_remaining = self.producers_remaining.saturating_sub(1);
                true
            }
            _ => false,
        }
    }
}

pub struct ProducerSideServiceImpl {
    service_state: Mutex<ServiceState>,
    service_state_changed: Condvar,
    server_contexts: ServerContextRegistry,
    producer_event_processor: RwLock<Option<Arc<ProducerEventProcessor>>>,
    max_wait_for_all_events_sent_ms: AtomicU64,
    next_producer_id: AtomicU64,
}

impl Default for ProducerSideServiceImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl ProducerSideServiceImpl {
    pub fn new() -> Self {
        Self {
            service_state: Mutex::new(ServiceState {
                capture_status: CaptureStatus::Finished,
                capture_options: None,
                producers_remaining: 0,
                exit_requested: false,
                all_events_sent_received: HashMap::new(),
            }),
            service_state_changed: Condvar::new(),
            server_contexts: ServerContextRegistry::new(),
            producer_event_processor: RwLock::new(None),
            max_wait_for_all_events_sent_ms: AtomicU64::new(
                DEFAULT_MAX_WAIT_FOR_ALL_EVENTS_SENT_MS,
            ),
            next_producer_id: AtomicU64::new(EXTERNAL_PRODUCER_STARTING_ID),
        }
    }

    pub fn set_max_wait_for_all_capture_events_ms(&self, ms: u64) {
        self.max_wait_for_all_events_sent_ms
            .store(ms, Ordering::Relaxed);
    }

    pub fn capture_status(&self) -> CaptureStatus {
        self.lock_state().capture_status
    }

    /// Number of producer streams currently being served.
    pub fn connected_producers(&self) -> usize {
        self.server_contexts.len()
    }

    /// Cancels every producer stream. No StopCaptureCommand is sent.
    pub fn on_exit_request(&self) {
        {
            let mut state = self.lock_state();
            state.exit_requested = true;
            state.capture_options = None;
        }
        self.service_state_changed.notify_all();
        self.server_contexts.cancel_all();
        *self
            .producer_event_processor
            .write()
            .expect("Failed to acquire producer event processor lock") = None;
    }

    /// Serves one producer until it disconnects or the service exits.
    pub fn receive_commands_and_send_events(&self, stream: UnixStream) -> Result<()> {
        let context =
            Arc::new(ServerContext::new(&stream).context("Failed to create server context")?);
        let _registration = self.server_contexts.register(context.clone());
        if self.lock_state().exit_requested {
            context.try_cancel();
            return Ok(());
        }

        let producer_id = self.next_producer_id.fetch_add(1, Ordering::Relaxed);
        info!("Producer {} connected", producer_id);

        let (reader, writer) = transport::split(stream).context("Failed to split producer stream")?;
        let receive_events_thread_exited = AtomicBool::new(false);

        thread::scope(|scope| -> Result<()> {
            let send_thread = thread::Builder::new()
                .name("producer-send-cmds".to_string())
                .spawn_scoped(scope, || {
                    self.send_commands_loop(
                        producer_id,
                        writer,
                        &context,
                        &receive_events_thread_exited,
                    )
                })
                .context("Failed to spawn send commands thread")?;

            self.receive_events_loop(producer_id, reader, &receive_events_thread_exited);

            if send_thread.join().is_err() {
                error!("Send commands thread of producer {} panicked", producer_id);
            }
            Ok(())
        })?;

        self.lock_state()
            .all_events_sent_received
            .remove(&producer_id);
        info!("Producer {} disconnected", producer_id);
        Ok(())
    }

    fn lock_state(&self) -> MutexGuard<'_, ServiceState> {
        self.service_state
            .lock()
            .expect("Failed to acquire service state lock")
    }

    fn send_commands_loop(
        &self,
        producer_id: u64,
        mut writer: MessageWriter,
        context: &ServerContext,
        receive_events_thread_exited: &AtomicBool,
    ) {
        let mut prev_status = CaptureStatus::Finished;
        loop {
            let (curr_status, capture_options) = {
                let guard = self.lock_state();
                let (mut guard, _) = self
                    .service_state_changed
                    .wait_timeout_while(guard, SEND_THREAD_CHECK_INTERVAL, |state| {
                        state.capture_status == prev_status
                            && !state.exit_requested
                            && !receive_events_thread_exited.load(Ordering::SeqCst)
                    })
                    .expect("Failed to acquire service state lock");

                if guard.exit_requested || receive_events_thread_exited.load(Ordering::SeqCst) {
                    return;
                }
                if guard.capture_status == prev_status {
                    continue;
                }

                let state = &mut *guard;
                let curr_status = state.capture_status;
                state.register_transition(producer_id, prev_status, curr_status);
                (curr_status, state.capture_options.clone())
            };

            for command in transition_commands(prev_status, curr_status, capture_options) {
                if let Err(e) = writer.write(&command) {
                    error!("Sending command to producer {} failed: {}", producer_id, e);
                    // Unblocks the receive side as well.
                    context.try_cancel();
                    return;
                }
            }
            debug!(
                "Producer {} moved from {:?} to {:?}",
                producer_id, prev_status, curr_status
            );
            prev_status = curr_status;
        }
    }

    fn receive_events_loop(
        &self,
        producer_id: u64,
        mut reader: MessageReader,
        receive_events_thread_exited: &AtomicBool,
    ) {
        loop {
            let request = match reader.read::<ReceiveCommandsAndSendEventsRequest>() {
                Ok(Some(request)) => request,
                Ok(None) => {
                    debug!("Producer {} closed its event stream", producer_id);
                    break;
                }
                Err(e) => {
                    warn!("Reading from producer {} failed: {}", producer_id, e);
                    break;
                }
            };
            if self.lock_state().exit_requested {
                break;
            }

            match request.event {
                Some(RequestEvent::BufferedCaptureEvents(buffered)) => {
                    self.deliver_events(producer_id, buffered)
                }
                Some(RequestEvent::AllEventsSent(_)) => self.on_all_events_sent(producer_id),
                None => error!("Producer {} sent a request without payload", producer_id),
            }
        }

        {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            // A producer that went away will not send anything else.
            if matches!(
                state.capture_status,
                CaptureStatus::Started | CaptureStatus::Stopping
            ) && state.record_all_events_sent(producer_id)
            {
                debug!(
                    "Producer {} disconnected before sending AllEventsSent",
                    producer_id
                );
            }
            receive_events_thread_exited.store(true, Ordering::SeqCst);
        }
        self.service_state_changed.notify_all();
    }

    fn deliver_events(&self, producer_id: u64, buffered: BufferedCaptureEvents) {
        let processor = self
            .producer_event_processor
            .read()
            .expect("Failed to acquire producer event processor lock");
        match processor.as_ref() {
            Some(processor) => {
                for event in buffered.capture_events {
                    processor.process_event(producer_id, event);
                }
            }
            None => debug!(
                "Dropping {} events from producer {} outside of a capture",
                buffered.capture_events.len(),
                producer_id
            ),
        }
    }

    fn on_all_events_sent(&self, producer_id: u64) {
        let mut guard = self.lock_state();
        let state = &mut *guard;
        let status = state.capture_status;
        match status {
            CaptureStatus::Stopping => {
                if state.record_all_events_sent(producer_id) {
                    info!(
                        "Producer {} sent all its events, {} remaining",
                        producer_id, state.producers_remaining
                    );
                    drop(guard);
                    self.service_state_changed.notify_all();
                } else {
                    debug!("Ignoring repeated AllEventsSent from producer {}", producer_id);
                }
            }
            _ => debug!(
                "Ignoring AllEventsSent from producer {} while capture is {:?}",
                producer_id, status
            ),
        }
    }
}

impl CaptureStartStopListener for ProducerSideServiceImpl {
    fn on_capture_start_requested(
        &self,
        capture_options: CaptureOptions,
        producer_event_processor: Arc<ProducerEventProcessor>,
    ) {
        {
            let mut state = self.lock_state();
            if state.capture_status != CaptureStatus::Finished {
                warn!(
                    "Ignoring capture start request while capture is {:?}",
                    state.capture_status
                );
                return;
            }
            *self
                .producer_event_processor
                .write()
                .expect("Failed to acquire producer event processor lock") =
                Some(producer_event_processor);
            state.capture_status = CaptureStatus::Started;
            state.capture_options = Some(capture_options);
        }
        self.service_state_changed.notify_all();
    }

    fn on_capture_stop_requested(&self) {
        let mut state = self.lock_state();
        if state.capture_status != CaptureStatus::Started {
            debug!(
                "Ignoring capture stop request while capture is {:?}",
                state.capture_status
            );
            return;
        }
        state.capture_status = CaptureStatus::Stopping;
        self.service_state_changed.notify_all();

        let max_wait_ms = self.max_wait_for_all_events_sent_ms.load(Ordering::Relaxed);
        let wait_start = Instant::now();
        let (mut state, wait_result) = self
            .service_state_changed
            .wait_timeout_while(state, Duration::from_millis(max_wait_ms), |state| {
                state.producers_remaining > 0 && !state.exit_requested
            })
            .expect("Failed to acquire service state lock");

        if state.exit_requested {
            info!("Exit requested while waiting for producers to send all their events");
        } else if wait_result.timed_out() {
            warn!(
                "Stopped waiting for {} producer(s) to send all their events after {} ms",
                state.producers_remaining, max_wait_ms
            );
        } else {
            info!(
                "All producers sent all their events after {} ms",
                wait_start.elapsed().as_millis()
            );
        }

        state.capture_status = CaptureStatus::Finished;
        state.capture_options = None;
        state.producers_remaining = 0;
        drop(state);
        self.service_state_changed.notify_all();

        *self
            .producer_event_processor
            .write()
            .expect("Failed to acquire producer event processor lock") = None;
    }
}

/// Commands that move a producer from `prev` to `curr`.
fn transition_commands(
    prev: CaptureStatus,
    curr: CaptureStatus,
    capture_options: Option<CaptureOptions>,
) -> Vec<ReceiveCommandsAndSendEventsResponse> {
    let start = || Command::StartCaptureCommand(StartCaptureCommand {
        capture_options: capture_options.clone(),
    });
    let stop = || Command::StopCaptureCommand(StopCaptureCommand {});
    let finished = || Command::CaptureFinishedCommand(CaptureFinishedCommand {});

    let commands = match (prev, curr) {
        (CaptureStatus::Finished, CaptureStatus::Started) => vec![start()],
        (CaptureStatus::Finished, CaptureStatus::Stopping) => vec![start(), stop()],
        (CaptureStatus::Started, CaptureStatus::Stopping) => vec![stop()],
        (CaptureStatus::Started, CaptureStatus::Finished) => vec![stop(), finished()],
        (CaptureStatus::Stopping, CaptureStatus::Started) => vec![finished(), start()],
        (CaptureStatus::Stopping, CaptureStatus::Finished) => vec![finished()],
        _ => Vec::new(),
    };
    commands
        .into_iter()
        .map(|command| ReceiveCommandsAndSendEventsResponse {
            command: Some(command),
        })
        .collect()
}

/// Producer-side service bound to a Unix socket.
pub struct ProducerSideServer {
    service: Arc<ProducerSideServiceImpl>,
    server: SocketServer,
}

impl ProducerSideServer {
    pub fn start(path: &Path, service: Arc<ProducerSideServiceImpl>) -> Result<Self> {
        let handler_service = service.clone();
        let server = SocketServer::bind(path, "producer-side", move |stream| {
            if let Err(e) = handler_service.receive_commands_and_send_events(stream) {
                error!("Producer stream failed: {:#}", e);
            }
        })?;
        Ok(Self { service, server })
    }

    pub fn service(&self) -> &Arc<ProducerSideServiceImpl> {
        &self.service
    }

    /// Cancels all producer streams and waits for their threads.
    pub fn shutdown_and_wait(self) {
        self.service.on_exit_request();
        self.server.shutdown();
    }
}
