//! Client of the `Capture` streaming call, and the ops helper built on it.
//!
//! [`CaptureClient::start_capture`] sends the request and feeds every received
//! event into a [`CaptureEventProcessor`] on a background thread. The capture runs
//! until [`CaptureHandle::stop_and_wait`] closes the sending half of the stream;
//! the service then stops its producers, flushes the remaining events and answers
//! with a final status.
//!
//! [`CaptureClientGgpService`] is the small unary ops surface used by tooling: it
//! starts and stops captures written to capture files. Its calls answer 1 on
//! success and 0 on failure.

use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, bail, Context, Result};
use log::{error, info, warn};

use crate::capture_event_processor::CaptureEventProcessor;
use crate::capture_file::CaptureFileWriter;
use crate::capture_listener::CaptureListener;
use crate::capture_service::capture_file_path;
use crate::gpu_queue_submission_processor::GpuCorrelationStats;
use crate::protos::capture::ops_request::Request as OpsCall;
use crate::protos::capture::{
    CaptureOptions, CaptureRequest, CaptureResponse, CaptureStatus, InstrumentedFunction,
    OpsReply, OpsRequest,
};
use crate::transport::{self, MessageReader, MessageWriter, SocketServer};
use crate::utils::process_executable_path;

pub const OPS_SUCCESS: i32 = 1;
pub const OPS_FAILURE: i32 = 0;

/// Functions of the main executable of `pid`, numbered from 1 in order.
pub fn instrumented_functions(pid: u32, names: &[String]) -> Vec<InstrumentedFunction> {
    let executable_path = process_executable_path(pid);
    names
        .iter()
        .enumerate()
        .map(|(index, name)| InstrumentedFunction {
            function_id: index as u64 + 1,
            file_path: executable_path.clone(),
            file_offset: 0,
            function_name: name.clone(),
        })
        .collect()
}

/// Result of a finished capture.
pub struct CaptureOutcome<L> {
    pub listener: L,
    pub status: CaptureStatus,
    pub events_received: u64,
    pub gpu_correlation_stats: Option<GpuCorrelationStats>,
}

pub struct CaptureClient {
    socket_path: PathBuf,
}

impl CaptureClient {
    pub fn new(socket_path: &Path) -> Self {
        Self {
            socket_path: socket_path.to_path_buf(),
        }
    }

    pub fn start_capture<L>(
        &self,
        capture_options: CaptureOptions,
        listener: L,
    ) -> Result<CaptureHandle<L>>
    where
        L: CaptureListener + Send + 'static,
    {
        let stream = UnixStream::connect(&self.socket_path)
            .with_context(|| format!("Failed to connect to {}", self.socket_path.display()))?;
        let (reader, mut writer) =
            transport::split(stream).context("Failed to split capture stream")?;
        writer
            .write(&CaptureRequest {
                capture_options: Some(capture_options),
            })
            .context("Failed to send capture request")?;

        let receiver = thread::Builder::new()
            .name("capture-client-recv".to_string())
            .spawn(move || receive_events_loop(reader, CaptureEventProcessor::new(listener)))
            .context("Failed to spawn capture receive thread")?;

        Ok(CaptureHandle {
            writer,
            receiver: Some(receiver),
        })
    }
}

fn receive_events_loop<L: CaptureListener>(
    mut reader: MessageReader,
    mut processor: CaptureEventProcessor<L>,
) -> Result<CaptureOutcome<L>> {
    let mut events_received = 0u64;
    loop {
        let response: CaptureResponse = match reader.read() {
            Ok(Some(response)) => response,
            Ok(None) => bail!("Capture stream ended without a final status"),
            Err(e) => return Err(e).context("Failed to read capture events"),
        };
        events_received += response.capture_events.len() as u64;
        processor.process_events(response.capture_events);
        if let Some(status) = response.status {
            let gpu_correlation_stats = processor.gpu_correlation_stats();
            return Ok(CaptureOutcome {
                listener: processor.into_listener(),
                status,
                events_received,
                gpu_correlation_stats,
            });
        }
    }
}

/// A capture in flight.
pub struct CaptureHandle<L> {
    writer: MessageWriter,
    receiver: Option<JoinHandle<Result<CaptureOutcome<L>>>>,
}

impl<L> CaptureHandle<L> {
    /// Asks the service to stop and waits for the last event and the status.
    pub fn stop_and_wait(mut self) -> Result<CaptureOutcome<L>> {
        if let Err(e) = self.writer.close() {
            // The service may already have ended the call, e.g. after rejecting it.
            warn!("Closing the capture stream failed: {}", e);
        }
        let receiver = self
            .receiver
            .take()
            .context("Capture was already waited for")?;
        receiver
            .join()
            .map_err(|_| anyhow!("Capture receive thread panicked"))?
    }
}

struct ActiveGgpCapture {
    handle: CaptureHandle<CaptureFileWriter>,
    path: PathBuf,
}

/// Ops helper that records captures of one process to capture files.
pub struct CaptureClientGgpService {
    client: CaptureClient,
    pid: u32,
    output_dir: PathBuf,
    selected_functions: Mutex<Vec<String>>,
    active_capture: Mutex<Option<ActiveGgpCapture>>,
    shutdown_requested: Mutex<bool>,
    shutdown_changed: Condvar,
}

impl CaptureClientGgpService {
    pub fn new(capture_socket: &Path, pid: u32, output_dir: &Path) -> Self {
        Self {
            client: CaptureClient::new(capture_socket),
            pid,
            output_dir: output_dir.to_path_buf(),
            selected_functions: Mutex::new(Vec::new()),
            active_capture: Mutex::new(None),
            shutdown_requested: Mutex::new(false),
            shutdown_changed: Condvar::new(),
        }
    }

    fn capture_options(&self) -> CaptureOptions {
        let selected_functions = self
            .selected_functions
            .lock()
            .expect("Failed to acquire selected functions lock");
        CaptureOptions {
            pid: self.pid,
            instrumented_functions: instrumented_functions(self.pid, &selected_functions),
            ..Default::default()
        }
    }

    pub fn start_capture(&self) -> i32 {
        let mut active = self
            .active_capture
            .lock()
            .expect("Failed to acquire active capture lock");
        if active.is_some() {
            error!("Cannot start capture because another capture is already in progress");
            return OPS_FAILURE;
        }
        let path = capture_file_path(&self.output_dir, self.pid);
        let started = CaptureFileWriter::create(&path)
            .and_then(|writer| self.client.start_capture(self.capture_options(), writer));
        match started {
            Ok(handle) => {
                info!("Capturing pid {} to {}", self.pid, path.display());
                *active = Some(ActiveGgpCapture { handle, path });
                OPS_SUCCESS
            }
            Err(e) => {
                error!("Failed to start capture: {:#}", e);
                OPS_FAILURE
            }
        }
    }

    pub fn stop_capture(&self) -> i32 {
        let Some(active) = self
            .active_capture
            .lock()
            .expect("Failed to acquire active capture lock")
            .take()
        else {
            error!("No capture to stop");
            return OPS_FAILURE;
        };
        match finish_capture(active) {
            Ok(()) => OPS_SUCCESS,
            Err(e) => {
                error!("{:#}", e);
                OPS_FAILURE
            }
        }
    }

    pub fn update_selected_functions(&self, functions: Vec<String>) -> i32 {
        info!("Selected {} functions", functions.len());
        *self
            .selected_functions
            .lock()
            .expect("Failed to acquire selected functions lock") = functions;
        OPS_SUCCESS
    }

    pub fn selected_functions(&self) -> Vec<String> {
        self.selected_functions
            .lock()
            .expect("Failed to acquire selected functions lock")
            .clone()
    }

    /// Stops a running capture and releases [`Self::wait_for_shutdown`].
    pub fn shutdown_service(&self) -> i32 {
        let active = self
            .active_capture
            .lock()
            .expect("Failed to acquire active capture lock")
            .take();
        if let Some(active) = active {
            if let Err(e) = finish_capture(active) {
                error!("{:#}", e);
            }
        }
        *self
            .shutdown_requested
            .lock()
            .expect("Failed to acquire shutdown lock") = true;
        self.shutdown_changed.notify_all();
        OPS_SUCCESS
    }

    pub fn wait_for_shutdown(&self) {
        let requested = self
            .shutdown_requested
            .lock()
            .expect("Failed to acquire shutdown lock");
        let _requested = self
            .shutdown_changed
            .wait_while(requested, |requested| !*requested)
            .expect("Failed to acquire shutdown lock");
    }

    pub fn handle_request(&self, request: OpsRequest) -> OpsReply {
        let capture_result = match request.request {
            Some(OpsCall::StartCapture(_)) => self.start_capture(),
            Some(OpsCall::StopCapture(_)) => self.stop_capture(),
            Some(OpsCall::UpdateSelectedFunctions(update)) => {
                self.update_selected_functions(update.functions)
            }
            Some(OpsCall::ShutdownService(_)) => self.shutdown_service(),
            None => {
                warn!("Received an ops request without payload");
                OPS_FAILURE
            }
        };
        OpsReply { capture_result }
    }
}

fn finish_capture(active: ActiveGgpCapture) -> Result<()> {
    let mut outcome = active.handle.stop_and_wait()?;
    outcome
        .listener
        .finish()
        .with_context(|| format!("Failed to save capture to {}", active.path.display()))?;
    if !outcome.status.ok {
        bail!("{}", outcome.status.message);
    }
    info!(
        "Saved capture with {} events to {}",
        outcome.events_received,
        active.path.display()
    );
    Ok(())
}

/// Ops helper bound to a Unix socket. Each connection carries one request.
pub struct CaptureClientGgpServer {
    service: Arc<CaptureClientGgpService>,
    server: SocketServer,
}

impl CaptureClientGgpServer {
    pub fn start(path: &Path, service: Arc<CaptureClientGgpService>) -> Result<Self> {
        let handler_service = service.clone();
        let server = SocketServer::bind(path, "capture-ops", move |stream| {
            let (mut reader, mut writer) = match transport::split(stream) {
                Ok(halves) => halves,
                Err(e) => {
                    error!("Failed to split ops stream: {}", e);
                    return;
                }
            };
            match reader.read::<OpsRequest>() {
                Ok(Some(request)) => {
                    let reply = handler_service.handle_request(request);
                    if let Err(e) = writer.write(&reply) {
                        warn!("Failed to send ops reply: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("Failed to read ops request: {}", e),
            }
        })?;
        Ok(Self { service, server })
    }

    pub fn service(&self) -> &Arc<CaptureClientGgpService> {
        &self.service
    }

    pub fn shutdown(self) {
        self.server.shutdown();
    }
}

/// Sends one ops request and returns the legacy result code.
pub fn call_ops(path: &Path, request: OpsCall) -> Result<i32> {
    let stream = UnixStream::connect(path)
        .with_context(|| format!("Failed to connect to {}", path.display()))?;
    let (mut reader, mut writer) = transport::split(stream)?;
    writer.write(&OpsRequest {
        request: Some(request),
    })?;
    writer.close()?;
    let reply: OpsReply = reader
        .read()?
        .context("Ops server closed the connection without a reply")?;
    Ok(reply.capture_result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protos::capture::{StopCaptureRequest, UpdateSelectedFunctionsRequest};

    #[test]
    fn test_update_selected_functions_builds_options() {
        let dir = tempfile::tempdir().unwrap();
        let service = CaptureClientGgpService::new(
            &dir.path().join("missing.sock"),
            std::process::id(),
            dir.path(),
        );
        let reply = service.handle_request(OpsRequest {
            request: Some(OpsCall::UpdateSelectedFunctions(UpdateSelectedFunctionsRequest {
                functions: vec!["main".to_string(), "render".to_string()],
            })),
        });
        assert_eq!(reply.capture_result, OPS_SUCCESS);

        let options = service.capture_options();
        let names: Vec<_> = options
            .instrumented_functions
            .iter()
            .map(|f| (f.function_id, f.function_name.as_str()))
            .collect();
        assert_eq!(names, vec![(1, "main"), (2, "render")]);
    }

    #[test]
    fn test_failures_answer_zero() {
        let dir = tempfile::tempdir().unwrap();
        let service = CaptureClientGgpService::new(&dir.path().join("missing.sock"), 1, dir.path());
        assert_eq!(service.start_capture(), OPS_FAILURE);
        assert_eq!(
            service
                .handle_request(OpsRequest {
                    request: Some(OpsCall::StopCapture(StopCaptureRequest {})),
                })
                .capture_result,
            OPS_FAILURE
        );
        assert_eq!(
            service
                .handle_request(OpsRequest { request: None })
                .capture_result,
            OPS_FAILURE
        );
    }

    #[test]
    fn test_shutdown_releases_waiter() {
        let dir = tempfile::tempdir().unwrap();
        let service = Arc::new(CaptureClientGgpService::new(
            &dir.path().join("missing.sock"),
            1,
            dir.path(),
        ));
        let waiter = {
            let service = service.clone();
            thread::spawn(move || service.wait_for_shutdown())
        };
        assert_eq!(service.shutdown_service(), OPS_SUCCESS);
        waiter.join().unwrap();
    }
}
