//! Error types shared across the capture pipeline.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InterningError {
    #[error("key {key} is already interned with a different payload")]
    ConflictingPayload { key: u64 },
}

/// Errors reading or writing length-prefixed protobuf frames.
#[derive(Error, Debug)]
pub enum FramingError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("failed to decode message: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("frame of {0} bytes exceeds the 64 MiB limit")]
    FrameTooLarge(usize),

    #[error("stream ended in the middle of a frame")]
    Truncated,
}

/// Reasons a capture file cannot be loaded.
#[derive(Error, Debug)]
pub enum CaptureLoadError {
    #[error("failed to open capture file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("error reading capture file: {0}")]
    Framing(#[from] FramingError),

    #[error("capture file is empty")]
    MissingHeader,

    #[error("capture file header does not contain a version")]
    MissingVersion,

    #[error(
        "This capture format is no longer supported: found version \"{found}\", required \"{required}\""
    )]
    VersionMismatch { found: String, required: String },

    #[error("capture file does not contain capture info")]
    MissingCaptureInfo,

    #[error("unknown timer type {0}")]
    UnknownTimerType(i32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mismatch_message_names_found_version() {
        let err = CaptureLoadError::VersionMismatch {
            found: "1.51".to_string(),
            required: "1.59".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("\"1.51\""));
        assert!(message.contains("no longer supported"));
    }

    #[test]
    fn test_framing_io_error_is_transparent() {
        let err: FramingError = io::Error::new(io::ErrorKind::BrokenPipe, "pipe closed").into();
        assert_eq!(err.to_string(), "pipe closed");
    }
}
