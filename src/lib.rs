//! Capture event pipeline of the Orbit profiler.
//!
//! Producers stream raw events to the producer-side service, the
//! [`producer_event_processor`] turns them into one canonical interned stream,
//! and the [`capture_service`] hands that stream to clients and, optionally, to a
//! capture file. On the client, the [`capture_event_processor`] rebuilds timers
//! and callstacks and delivers them through [`capture_listener::CaptureListener`].
//!
//! # Modules
//!
//! - [`producer_side_service`] - Producer connections and the capture state machine
//! - [`capture_service`] - Client-facing `Capture` call
//! - [`capture_client`] - Client side of `Capture` and the ops helper service
//! - [`capture_file`] - Capture file writer, reader and loader
//! - [`capture_data`] - In-memory capture model with callstack and tracepoint stores
//! - [`gpu_queue_submission_processor`] - Matching of GPU jobs and queue submissions
//! - [`perfetto`] - Export of a loaded capture as a Perfetto trace

pub mod capture_client;
pub mod capture_data;
pub mod capture_event_processor;
pub mod capture_file;
pub mod capture_listener;
pub mod capture_service;
pub mod config;
pub mod error;
pub mod event_buffer;
pub mod framing;
pub mod gpu_queue_submission_processor;
pub mod intern;
pub mod perfetto;
pub mod producer;
pub mod producer_event_processor;
pub mod producer_side_service;
pub mod protos;
pub mod transport;
pub mod utils;

pub use capture_listener::CaptureListener;
pub use config::Config;
pub use error::{CaptureLoadError, FramingError, InterningError};
