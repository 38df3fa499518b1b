//! Arbitration of captures on the service side.
//!
//! [`CaptureServiceImpl`] runs at most one capture at a time. Starting a capture
//! creates the [`CaptureEventBuffer`] and the [`ProducerEventProcessor`] feeding
//! it, emits `CaptureStarted` as the root producer and tells every registered
//! [`CaptureStartStopListener`]. Stopping asks all listeners to stop in parallel,
//! emits `CaptureFinished` and closes the buffer.
//!
//! [`CaptureServiceImpl::capture`] serves the streaming `Capture` call: the
//! client sends a `CaptureRequest`, receives `CaptureResponse` batches while the
//! capture runs and stops it by sending anything or closing its sending half.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use log::{debug, error, info, warn};

use crate::capture_file::CaptureFileRecorder;
use crate::event_buffer::{CaptureEventBuffer, CaptureEventSink, ChannelSink};
use crate::producer_event_processor::{ProcessorStats, ProducerEventProcessor};
use crate::protos::capture::producer_capture_event::Event as ProducerEvent;
use crate::protos::capture::{
    CaptureFinished, CaptureFinishedStatus, CaptureOptions, CaptureRequest, CaptureResponse,
    CaptureStarted, CaptureStatus, ClientCaptureEvent, ROOT_PRODUCER_ID,
};
use crate::transport::{self, MessageWriter, ServerContext, ServerContextRegistry, SocketServer};
use crate::utils::{monotonic_timestamp_ns, process_executable_path, unix_timestamp_ns};

pub const CAPTURE_ALREADY_IN_PROGRESS: &str =
    "Cannot start capture because another capture is already in progress";

/// Largest number of events sent to the client in one `CaptureResponse`.
const MAX_EVENTS_PER_RESPONSE: usize = 1024;

pub const DEFAULT_DISPATCHER_CAPACITY: usize = 4096;

/// Something that produces events while a capture runs.
pub trait CaptureStartStopListener: Send + Sync {
    fn on_capture_start_requested(
        &self,
        capture_options: CaptureOptions,
        producer_event_processor: Arc<ProducerEventProcessor>,
    );

    /// May block until the listener delivered all its events.
    fn on_capture_stop_requested(&self);
}

/// A running capture, handed back to [`CaptureServiceImpl::stop_capture`].
pub struct ActiveCapture {
    buffer: Arc<CaptureEventBuffer>,
    processor: Arc<ProducerEventProcessor>,
    started_at: Instant,
}

impl ActiveCapture {
    pub fn processor(&self) -> &Arc<ProducerEventProcessor> {
        &self.processor
    }
}

#[derive(Debug, Clone)]
pub struct CaptureSummary {
    pub status: CaptureFinishedStatus,
    pub message: String,
    pub events_added: u64,
    pub processor_stats: ProcessorStats,
}

impl CaptureSummary {
    pub fn is_successful(&self) -> bool {
        self.status == CaptureFinishedStatus::Successful
    }
}

pub struct CaptureServiceImpl {
    listeners: RwLock<Vec<Arc<dyn CaptureStartStopListener>>>,
    is_capturing: AtomicBool,
    server_contexts: ServerContextRegistry,
    capture_output_dir: Option<PathBuf>,
    dispatcher_capacity: usize,
}

impl Default for CaptureServiceImpl {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureServiceImpl {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            is_capturing: AtomicBool::new(false),
            server_contexts: ServerContextRegistry::new(),
            capture_output_dir: None,
            dispatcher_capacity: DEFAULT_DISPATCHER_CAPACITY,
        }
    }

    /// Every capture served through [`Self::capture`] is also written below `dir`.
    pub fn with_capture_output_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.capture_output_dir = dir;
        self
    }

    pub fn with_dispatcher_capacity(mut self, capacity: usize) -> Self {
        self.dispatcher_capacity = capacity.max(1);
        self
    }

    pub fn add_capture_start_stop_listener(&self, listener: Arc<dyn CaptureStartStopListener>) {
        self.listeners
            .write()
            .expect("Failed to acquire capture listeners lock")
            .push(listener);
    }

    pub fn remove_capture_start_stop_listener(&self, listener: &Arc<dyn CaptureStartStopListener>) {
        self.listeners
            .write()
            .expect("Failed to acquire capture listeners lock")
            .retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    pub fn is_capturing(&self) -> bool {
        self.is_capturing.load(Ordering::SeqCst)
    }

    fn listeners(&self) -> Vec<Arc<dyn CaptureStartStopListener>> {
        self.listeners
            .read()
            .expect("Failed to acquire capture listeners lock")
            .clone()
    }

    /// Starts a capture whose events go to `sinks`, in order.
    pub fn start_capture(
        &self,
        capture_options: CaptureOptions,
        sinks: Vec<Box<dyn CaptureEventSink>>,
    ) -> Result<ActiveCapture> {
        if self
            .is_capturing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            bail!(CAPTURE_ALREADY_IN_PROGRESS);
        }

        let buffer = Arc::new(
            sinks
                .into_iter()
                .fold(CaptureEventBuffer::new(), |buffer, sink| buffer.with_sink(sink)),
        );
        let processor = Arc::new(ProducerEventProcessor::new(buffer.clone()));

        let pid = capture_options.pid;
        processor.process_event(
            ROOT_PRODUCER_ID,
            ProducerEvent::CaptureStarted(CaptureStarted {
                process_id: pid,
                executable_path: process_executable_path(pid),
                capture_start_timestamp_ns: monotonic_timestamp_ns(),
                capture_start_unix_time_ns: unix_timestamp_ns(),
                capture_options: Some(capture_options.clone()),
            })
            .into(),
        );

        info!("Starting capture of pid {}", pid);
        for listener in self.listeners() {
            listener.on_capture_start_requested(capture_options.clone(), processor.clone());
        }

        Ok(ActiveCapture {
            buffer,
            processor,
            started_at: Instant::now(),
        })
    }

    /// Stops all listeners, finishes the event stream and closes the buffer.
    pub fn stop_capture(&self, capture: ActiveCapture) -> CaptureSummary {
        let listeners = self.listeners();
        let stop_start = Instant::now();
        thread::scope(|scope| {
            let handles: Vec<_> = listeners
                .iter()
                .map(|listener| scope.spawn(move || listener.on_capture_stop_requested()))
                .collect();
            for handle in handles {
                if handle.join().is_err() {
                    error!("A capture listener panicked while stopping");
                }
            }
        });
        debug!(
            "{} capture listeners stopped after {} ms",
            listeners.len(),
            stop_start.elapsed().as_millis()
        );

        let stats = capture.processor.stats();
        let (status, error_message) = if capture.processor.has_fatal_error() {
            (CaptureFinishedStatus::Failed, stats.errors.join("; "))
        } else if capture.buffer.has_errors() {
            (
                CaptureFinishedStatus::Incomplete,
                "Capture data could not be fully written".to_string(),
            )
        } else {
            (CaptureFinishedStatus::Successful, String::new())
        };
        capture.processor.process_event(
            ROOT_PRODUCER_ID,
            ProducerEvent::CaptureFinished(CaptureFinished {
                status: status as i32,
                error_message: error_message.clone(),
            })
            .into(),
        );

        let buffer_summary = capture.buffer.close();
        let (status, message) = match status {
            CaptureFinishedStatus::Failed => (status, format!("Capture failed: {error_message}")),
            _ if buffer_summary.is_incomplete() => (
                CaptureFinishedStatus::Incomplete,
                format!(
                    "Capture is incomplete: {}",
                    buffer_summary.errors.join("; ")
                ),
            ),
            _ => (
                CaptureFinishedStatus::Successful,
                format!(
                    "Capture finished after {} ms with {} events",
                    capture.started_at.elapsed().as_millis(),
                    buffer_summary.events_added
                ),
            ),
        };
        self.is_capturing.store(false, Ordering::SeqCst);

        match status {
            CaptureFinishedStatus::Successful => info!("{}", message),
            _ => warn!("{}", message),
        }
        CaptureSummary {
            status,
            message,
            events_added: buffer_summary.events_added,
            processor_stats: capture.processor.stats(),
        }
    }

    /// Serves one `Capture` call.
    pub fn capture(&self, stream: UnixStream) -> Result<()> {
        let context =
            Arc::new(ServerContext::new(&stream).context("Failed to create server context")?);
        let _registration = self.server_contexts.register(context);
        let (mut reader, mut writer) =
            transport::split(stream).context("Failed to split capture stream")?;

        let request: CaptureRequest = match reader.read() {
            Ok(Some(request)) => request,
            Ok(None) => bail!("Client closed the capture stream before sending a request"),
            Err(e) => return Err(e).context("Failed to read capture request"),
        };
        let capture_options = request.capture_options.unwrap_or_default();

        let mut output_path = None;
        let mut sinks: Vec<Box<dyn CaptureEventSink>> = Vec::new();
        if let Some(dir) = &self.capture_output_dir {
            let path = capture_file_path(dir, capture_options.pid);
            match CaptureFileRecorder::create(&path) {
                Ok(recorder) => {
                    sinks.push(Box::new(recorder));
                    output_path = Some(path);
                }
                Err(e) => warn!("Not recording capture to a file: {:#}", e),
            }
        }
        let (dispatcher, events) = ChannelSink::new(self.dispatcher_capacity);
        sinks.push(Box::new(dispatcher));

        let capture = match self.start_capture(capture_options, sinks) {
            Ok(capture) => capture,
            Err(e) => {
                warn!("Rejecting capture request: {}", e);
                writer.write(&final_response(false, e.to_string()))?;
                writer.close()?;
                return Ok(());
            }
        };

        let (summary, writer) = thread::scope(|scope| -> Result<_> {
            let sender = thread::Builder::new()
                .name("capture-send-events".to_string())
                .spawn_scoped(scope, move || send_events_loop(events, writer))
                .context("Failed to spawn capture event sender")?;

            // Anything from the client, including end of stream, stops the capture.
            match reader.read::<CaptureRequest>() {
                Ok(_) => debug!("Client requested the capture to stop"),
                Err(e) => debug!("Capture stream read ended: {}", e),
            }
            let summary = self.stop_capture(capture);

            let writer = sender
                .join()
                .map_err(|_| anyhow::anyhow!("Capture event sender panicked"))?;
            Ok((summary, writer))
        })?;

        let mut message = summary.message.clone();
        if let Some(path) = output_path {
            message.push_str(&format!("; saved to {}", path.display()));
        }
        if let Some(mut writer) = writer {
            writer.write(&final_response(summary.is_successful(), message))?;
            writer.close()?;
        }
        Ok(())
    }

    /// Aborts every `Capture` call in flight.
    pub fn cancel_all_calls(&self) {
        self.server_contexts.cancel_all();
    }
}

fn final_response(ok: bool, message: String) -> CaptureResponse {
    CaptureResponse {
        capture_events: Vec::new(),
        status: Some(CaptureStatus { ok, message }),
    }
}

pub fn capture_file_path(dir: &Path, pid: u32) -> PathBuf {
    dir.join(format!("capture_{}_{}.orbit", pid, unix_timestamp_ns()))
}

/// Forwards dispatched events to the client until the buffer closes.
///
/// Keeps draining after the client went away so the buffer never blocks on a
/// full dispatcher. Returns the writer if it is still usable.
fn send_events_loop(
    events: Receiver<ClientCaptureEvent>,
    mut writer: MessageWriter,
) -> Option<MessageWriter> {
    let mut writer_ok = true;
    while let Ok(first) = events.recv() {
        let mut batch = vec![first];
        while batch.len() < MAX_EVENTS_PER_RESPONSE {
            match events.try_recv() {
                Ok(event) => batch.push(event),
                Err(_) => break,
            }
        }
        if !writer_ok {
            continue;
        }
        let response = CaptureResponse {
            capture_events: batch,
            status: None,
        };
        if let Err(e) = writer.write(&response) {
            warn!("Sending capture events to the client failed: {}", e);
            writer_ok = false;
        }
    }
    writer_ok.then_some(writer)
}

/// Capture service bound to a Unix socket.
pub struct CaptureServer {
    service: Arc<CaptureServiceImpl>,
    server: SocketServer,
}

impl CaptureServer {
    pub fn start(path: &Path, service: Arc<CaptureServiceImpl>) -> Result<Self> {
        let handler_service = service.clone();
        let server = SocketServer::bind(path, "capture", move |stream| {
            if let Err(e) = handler_service.capture(stream) {
                error!("Capture call failed: {:#}", e);
            }
        })?;
        Ok(Self { service, server })
    }

    pub fn service(&self) -> &Arc<CaptureServiceImpl> {
        &self.service
    }

    pub fn shutdown(self) {
        self.service.cancel_all_calls();
        self.server.shutdown();
    }
}
