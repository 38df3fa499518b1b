//! Runtime configuration of the capture services.
//!
//! Every field has a default, so an empty JSON object (or no file at all) is a
//! valid configuration. Command line flags are applied on top by the binary.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::capture_service::DEFAULT_DISPATCHER_CAPACITY;
use crate::producer_side_service::DEFAULT_MAX_WAIT_FOR_ALL_EVENTS_SENT_MS;

pub const DEFAULT_PRODUCER_SOCKET: &str = "/tmp/orbit-producer-side.sock";
pub const DEFAULT_CAPTURE_SOCKET: &str = "/tmp/orbit-capture.sock";
pub const DEFAULT_OPS_SOCKET: &str = "/tmp/orbit-capture-ops.sock";

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub producer_socket: PathBuf,
    pub capture_socket: PathBuf,
    pub ops_socket: PathBuf,
    pub max_wait_for_all_events_sent_ms: u64,
    /// When set, every capture is also persisted under this directory.
    pub capture_output_dir: Option<PathBuf>,
    /// Bound of the in-memory dispatcher queue.
    pub dispatcher_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            producer_socket: PathBuf::from(DEFAULT_PRODUCER_SOCKET),
            capture_socket: PathBuf::from(DEFAULT_CAPTURE_SOCKET),
            ops_socket: PathBuf::from(DEFAULT_OPS_SOCKET),
            max_wait_for_all_events_sent_ms: DEFAULT_MAX_WAIT_FOR_ALL_EVENTS_SENT_MS,
            capture_output_dir: None,
            dispatcher_capacity: DEFAULT_DISPATCHER_CAPACITY,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Config::default());
        };
        let buf = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&buf).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn from_json(buf: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(buf)?;
        Ok(config)
    }
}
