//! Client side of the producer-side service.
//!
//! A [`CaptureEventProducer`] connects to the service, surfaces the capture
//! commands it receives on a channel and sends batches of events back.

use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::sync::Mutex;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, warn};

use crate::protos::capture::receive_commands_and_send_events_request::Event as RequestEvent;
use crate::protos::capture::receive_commands_and_send_events_response::Command;
use crate::protos::capture::{
    AllEventsSent, BufferedCaptureEvents, CaptureOptions, ProducerCaptureEvent,
    ReceiveCommandsAndSendEventsRequest, ReceiveCommandsAndSendEventsResponse,
};
use crate::transport::{split, MessageWriter};

#[derive(Debug, Clone, PartialEq)]
pub enum ProducerCommand {
    StartCapture(CaptureOptions),
    StopCapture,
    CaptureFinished,
}

pub struct CaptureEventProducer {
    stream: UnixStream,
    writer: Mutex<MessageWriter>,
    commands: Receiver<ProducerCommand>,
    reader_thread: Option<JoinHandle<()>>,
}

impl CaptureEventProducer {
    pub fn connect(path: &Path) -> Result<Self> {
        let stream = UnixStream::connect(path)
            .with_context(|| format!("Failed to connect to {}", path.display()))?;
        Self::from_stream(stream)
    }

    pub fn from_stream(stream: UnixStream) -> Result<Self> {
        let (mut reader, writer) =
            split(stream.try_clone().context("Failed to clone producer stream")?)
                .context("Failed to split producer stream")?;
        let (tx, rx) = channel();

        let reader_thread = thread::Builder::new()
            .name("producer-commands".to_string())
            .spawn(move || loop {
                let response = match reader.read::<ReceiveCommandsAndSendEventsResponse>() {
                    Ok(Some(response)) => response,
                    Ok(None) => break,
                    Err(e) => {
                        debug!("Command stream ended: {}", e);
                        break;
                    }
                };
                let command = match response.command {
                    Some(Command::StartCaptureCommand(start)) => {
                        ProducerCommand::StartCapture(start.capture_options.unwrap_or_default())
                    }
                    Some(Command::StopCaptureCommand(_)) => ProducerCommand::StopCapture,
                    Some(Command::CaptureFinishedCommand(_)) => ProducerCommand::CaptureFinished,
                    None => {
                        warn!("Received a command without payload");
                        continue;
                    }
                };
                if tx.send(command).is_err() {
                    break;
                }
            })
            .context("Failed to spawn producer command thread")?;

        Ok(Self {
            stream,
            writer: Mutex::new(writer),
            commands: rx,
            reader_thread: Some(reader_thread),
        })
    }

    /// Next command from the service, or `None` if none arrived within `timeout`
    /// or the service closed the stream.
    pub fn next_command(&self, timeout: Duration) -> Option<ProducerCommand> {
        match self.commands.recv_timeout(timeout) {
            Ok(command) => Some(command),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn send_events(&self, capture_events: Vec<ProducerCaptureEvent>) -> Result<()> {
        self.send(RequestEvent::BufferedCaptureEvents(BufferedCaptureEvents {
            capture_events,
        }))
        .context("Failed to send capture events")
    }

    pub fn notify_all_events_sent(&self) -> Result<()> {
        self.send(RequestEvent::AllEventsSent(AllEventsSent {}))
            .context("Failed to send AllEventsSent")
    }

    fn send(&self, event: RequestEvent) -> Result<()> {
        let request = ReceiveCommandsAndSendEventsRequest { event: Some(event) };
        self.writer
            .lock()
            .expect("Failed to acquire producer writer lock")
            .write(&request)?;
        Ok(())
    }

    /// Closes the stream and waits for the command thread.
    pub fn disconnect(mut self) {
        self.close();
    }

    fn close(&mut self) {
        let _ = self.stream.shutdown(Shutdown::Both);
        if let Some(handle) = self.reader_thread.take() {
            if handle.join().is_err() {
                warn!("Producer command thread panicked");
            }
        }
    }
}

impl Drop for CaptureEventProducer {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{read_message, write_message};
    use crate::protos::capture::{StartCaptureCommand, StopCaptureCommand};

    #[test]
    fn test_commands_are_surfaced_in_order() {
        let (producer_end, mut service_end) = UnixStream::pair().unwrap();
        let producer = CaptureEventProducer::from_stream(producer_end).unwrap();

        let options = CaptureOptions {
            pid: 5,
            ..Default::default()
        };
        for command in [
            Command::StartCaptureCommand(StartCaptureCommand {
                capture_options: Some(options.clone()),
            }),
            Command::StopCaptureCommand(StopCaptureCommand {}),
        ] {
            write_message(
                &mut service_end,
                &ReceiveCommandsAndSendEventsResponse {
                    command: Some(command),
                },
            )
            .unwrap();
        }

        let timeout = Duration::from_secs(5);
        assert_eq!(
            producer.next_command(timeout),
            Some(ProducerCommand::StartCapture(options))
        );
        assert_eq!(producer.next_command(timeout), Some(ProducerCommand::StopCapture));
        producer.disconnect();
    }

    #[test]
    fn test_events_reach_the_service_side() {
        let (producer_end, mut service_end) = UnixStream::pair().unwrap();
        let producer = CaptureEventProducer::from_stream(producer_end).unwrap();

        producer
            .send_events(vec![ProducerCaptureEvent::default()])
            .unwrap();
        producer.notify_all_events_sent().unwrap();

        let first: ReceiveCommandsAndSendEventsRequest =
            read_message(&mut service_end).unwrap().unwrap();
        assert!(matches!(
            first.event,
            Some(RequestEvent::BufferedCaptureEvents(ref b)) if b.capture_events.len() == 1
        ));
        let second: ReceiveCommandsAndSendEventsRequest =
            read_message(&mut service_end).unwrap().unwrap();
        assert!(matches!(second.event, Some(RequestEvent::AllEventsSent(_))));
    }
}
