//! Length-prefixed protobuf framing.
//!
//! Every record is a little-endian `u32` byte length followed by that many bytes
//! of an encoded prost message. Capture files and socket streams share this
//! layout.

use std::io::{self, Read, Write};

use prost::Message;

use crate::error::FramingError;

/// Largest frame accepted by [`read_message`]. Anything bigger is treated as corruption.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

pub fn write_message<W: Write + ?Sized, M: Message>(
    writer: &mut W,
    message: &M,
) -> Result<(), FramingError> {
    let len = message.encoded_len();
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::FrameTooLarge(len));
    }
    let mut buf = Vec::with_capacity(4 + len);
    buf.extend_from_slice(&(len as u32).to_le_bytes());
    message
        .encode(&mut buf)
        .map_err(|e| FramingError::Io(io::Error::other(e)))?;
    writer.write_all(&buf)?;
    Ok(())
}

/// Reads the next frame. Returns `Ok(None)` when the stream ends cleanly on a
/// frame boundary.
pub fn read_message<R: Read + ?Sized, M: Message + Default>(
    reader: &mut R,
) -> Result<Option<M>, FramingError> {
    let mut len_bytes = [0u8; 4];
    if !read_exact_or_eof(reader, &mut len_bytes)? {
        return Ok(None);
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::FrameTooLarge(len));
    }

    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => FramingError::Truncated,
        _ => FramingError::Io(e),
    })?;
    Ok(Some(M::decode(buf.as_slice())?))
}

/// Fills `buf` completely, or returns false if the stream was already at EOF.
fn read_exact_or_eof<R: Read + ?Sized>(
    reader: &mut R,
    buf: &mut [u8],
) -> Result<bool, FramingError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => return Err(FramingError::Truncated),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protos::capture_data::CaptureHeader;
    use std::io::Cursor;

    #[test]
    fn test_frame_layout_is_little_endian_length_prefix() {
        let header = CaptureHeader {
            version: "1.59".to_string(),
        };
        let mut buf = Vec::new();
        write_message(&mut buf, &header).unwrap();

        let len = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        assert_eq!(len, header.encoded_len());
        assert_eq!(buf.len(), 4 + len);
    }

    #[test]
    fn test_clean_eof_returns_none() {
        let mut cursor = Cursor::new(Vec::<u8>::new());
        let msg: Option<CaptureHeader> = read_message(&mut cursor).unwrap();
        assert!(msg.is_none());
    }

    #[test]
    fn test_consecutive_frames() {
        let mut buf = Vec::new();
        for version in ["a", "b"] {
            let header = CaptureHeader {
                version: version.to_string(),
            };
            write_message(&mut buf, &header).unwrap();
        }

        let mut cursor = Cursor::new(buf);
        let first: CaptureHeader = read_message(&mut cursor).unwrap().unwrap();
        let second: CaptureHeader = read_message(&mut cursor).unwrap().unwrap();
        assert_eq!(first.version, "a");
        assert_eq!(second.version, "b");
        assert!(read_message::<_, CaptureHeader>(&mut cursor).unwrap().is_none());
    }

    #[test]
    fn test_truncated_length_prefix() {
        let mut cursor = Cursor::new(vec![5u8, 0]);
        let result: Result<Option<CaptureHeader>, _> = read_message(&mut cursor);
        assert!(matches!(result, Err(FramingError::Truncated)));
    }

    #[test]
    fn test_truncated_payload() {
        let mut buf = Vec::new();
        write_message(
            &mut buf,
            &CaptureHeader {
                version: "1.59".to_string(),
            },
        )
        .unwrap();
        buf.truncate(buf.len() - 1);

        let mut cursor = Cursor::new(buf);
        let result: Result<Option<CaptureHeader>, _> = read_message(&mut cursor);
        assert!(matches!(result, Err(FramingError::Truncated)));
    }

    #[test]
    fn test_oversized_frame_rejected() {
        let len = (MAX_MESSAGE_SIZE as u32) + 1;
        let mut cursor = Cursor::new(len.to_le_bytes().to_vec());
        let result: Result<Option<CaptureHeader>, _> = read_message(&mut cursor);
        assert!(matches!(result, Err(FramingError::FrameTooLarge(_))));
    }
}
