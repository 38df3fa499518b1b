//! Common test utilities for the capture pipeline integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use orbit_capture::capture_client::CaptureClient;
use orbit_capture::capture_service::{CaptureServer, CaptureServiceImpl};
use orbit_capture::producer::{CaptureEventProducer, ProducerCommand};
use orbit_capture::producer_side_service::{ProducerSideServer, ProducerSideServiceImpl};
use orbit_capture::protos::capture::producer_capture_event::Event as ProducerEvent;
use orbit_capture::protos::capture::{
    AddressInfo, FunctionCall, InternedString, ProducerCaptureEvent,
};
use tempfile::TempDir;

pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Producer-side server and capture server on sockets in a scratch directory.
pub struct TestServices {
    pub dir: TempDir,
    pub producer_socket: PathBuf,
    pub capture_socket: PathBuf,
    pub producer_side_service: Arc<ProducerSideServiceImpl>,
    producer_side_server: Option<ProducerSideServer>,
    capture_server: Option<CaptureServer>,
}

impl TestServices {
    pub fn start(max_wait_for_all_events_sent_ms: u64, persist_captures: bool) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let producer_socket = dir.path().join("producer.sock");
        let capture_socket = dir.path().join("capture.sock");

        let producer_side_service = Arc::new(ProducerSideServiceImpl::new());
        producer_side_service
            .set_max_wait_for_all_capture_events_ms(max_wait_for_all_events_sent_ms);
        let producer_side_server =
            ProducerSideServer::start(&producer_socket, producer_side_service.clone())
                .expect("Failed to start producer-side server");

        let output_dir = persist_captures.then(|| dir.path().to_path_buf());
        let capture_service =
            Arc::new(CaptureServiceImpl::new().with_capture_output_dir(output_dir));
        capture_service.add_capture_start_stop_listener(producer_side_service.clone());
        let capture_server = CaptureServer::start(&capture_socket, capture_service)
            .expect("Failed to start capture server");

        Self {
            dir,
            producer_socket,
            capture_socket,
            producer_side_service,
            producer_side_server: Some(producer_side_server),
            capture_server: Some(capture_server),
        }
    }

    pub fn client(&self) -> CaptureClient {
        CaptureClient::new(&self.capture_socket)
    }

    /// Connects a producer and waits until the service registered it.
    pub fn connect_producer(&self) -> CaptureEventProducer {
        let expected = self.producer_side_service.connected_producers() + 1;
        let producer = CaptureEventProducer::connect(&self.producer_socket)
            .expect("Failed to connect producer");
        let deadline = Instant::now() + COMMAND_TIMEOUT;
        while self.producer_side_service.connected_producers() < expected {
            assert!(Instant::now() < deadline, "producer was never registered");
            thread::sleep(Duration::from_millis(5));
        }
        producer
    }

    /// Capture files written by the capture service.
    pub fn capture_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(self.dir.path())
            .expect("Failed to list temp dir")
            .map(|entry| entry.expect("Failed to read dir entry").path())
            .filter(|path| path.extension().is_some_and(|ext| ext == "orbit"))
            .collect();
        files.sort();
        files
    }
}

impl Drop for TestServices {
    fn drop(&mut self) {
        if let Some(server) = self.capture_server.take() {
            server.shutdown();
        }
        if let Some(server) = self.producer_side_server.take() {
            server.shutdown_and_wait();
        }
    }
}

pub struct ScriptedProducer {
    /// Signalled once all events were written to the stream.
    pub events_sent: Receiver<()>,
    pub handle: JoinHandle<Vec<ProducerCommand>>,
}

/// Runs a producer that sends `events` after the start command and, if
/// `send_all_events_sent`, answers the stop command with `AllEventsSent`.
/// The thread returns every command it received.
pub fn run_producer(
    producer: CaptureEventProducer,
    events: Vec<ProducerCaptureEvent>,
    send_all_events_sent: bool,
) -> ScriptedProducer {
    let (tx, rx) = channel();
    let handle = thread::spawn(move || {
        let mut commands = Vec::new();
        let start = producer.next_command(COMMAND_TIMEOUT);
        assert!(
            matches!(start, Some(ProducerCommand::StartCapture(_))),
            "expected start command, got {:?}",
            start
        );
        commands.extend(start);

        producer.send_events(events).expect("Failed to send events");
        tx.send(()).expect("Failed to signal sent events");

        let stop = producer.next_command(COMMAND_TIMEOUT);
        assert_eq!(stop, Some(ProducerCommand::StopCapture));
        commands.extend(stop);
        if send_all_events_sent {
            producer
                .notify_all_events_sent()
                .expect("Failed to send AllEventsSent");
        }
        commands.extend(producer.next_command(COMMAND_TIMEOUT));
        producer.disconnect();
        commands
    });
    ScriptedProducer {
        events_sent: rx,
        handle,
    }
}

pub fn event(event: ProducerEvent) -> ProducerCaptureEvent {
    event.into()
}

pub fn function_call(
    pid: u32,
    tid: u32,
    function_id: u64,
    begin: u64,
    end: u64,
) -> ProducerCaptureEvent {
    event(ProducerEvent::FunctionCall(FunctionCall {
        pid,
        tid,
        function_id,
        begin_timestamp_ns: begin,
        end_timestamp_ns: end,
        depth: 0,
        return_value: 0,
        registers: Vec::new(),
    }))
}

pub fn interned_string(key: u64, intern: &str) -> ProducerCaptureEvent {
    event(ProducerEvent::InternedString(InternedString {
        key,
        intern: intern.to_string(),
    }))
}

pub fn address_info(
    absolute_address: u64,
    function_name_key: u64,
    module_path_key: u64,
) -> ProducerCaptureEvent {
    event(ProducerEvent::AddressInfo(AddressInfo {
        absolute_address,
        function_name_key,
        offset_in_function: 4,
        module_path_key,
    }))
}
