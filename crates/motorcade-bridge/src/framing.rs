//! Length-prefixed JSON framing.
//!
//! Each frame is a 4-byte little-endian `u32` payload length followed by the
//! JSON payload. Inbound lengths above [`MAX_MESSAGE_SIZE`] are rejected
//! before any payload allocation.
//!
//! Reads distinguish three conditions: a frame, an expired wait window
//! (`Ok(None)`), and end of stream, which is a disconnect fault here because
//! the session layer must tell peer-gone apart from no-data-yet.
//!
//! The prefix read is also available split in two ([`read_byte`] +
//! [`read_prefix_after`]): a zero-wait poll reads the first byte without
//! waiting, and once that byte exists the sender has committed a frame, so
//! the rest may be read under a longer timeout.

use std::io::{ErrorKind, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::protocol::{MAX_MESSAGE_SIZE, TransportError};

fn is_wait_expired(e: &std::io::Error) -> bool {
    // SO_RCVTIMEO expiry surfaces as WouldBlock on Unix, TimedOut on Windows.
    matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

fn check_len(len: usize) -> Result<usize, TransportError> {
    if len > MAX_MESSAGE_SIZE {
        return Err(TransportError::PayloadTooLarge {
            size: len,
            max: MAX_MESSAGE_SIZE,
        });
    }
    Ok(len)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize a message into complete frame bytes (prefix plus payload).
pub fn encode_frame<T: Serialize>(message: &T) -> Result<Vec<u8>, TransportError> {
    let payload = serde_json::to_vec(message)?;
    if payload.len() > MAX_MESSAGE_SIZE {
        return Err(TransportError::PayloadTooLarge {
            size: payload.len(),
            max: MAX_MESSAGE_SIZE,
        });
    }
    let mut frame = Vec::with_capacity(payload.len() + 4);
    // Safe: MAX_MESSAGE_SIZE (16 MiB) fits in u32.
    #[allow(clippy::cast_possible_truncation)]
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Write one framed message and flush.
pub fn write_message<T: Serialize, W: Write>(
    writer: &mut W,
    message: &T,
) -> Result<(), TransportError> {
    let frame = encode_frame(message)?;
    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read one framed message. `Ok(None)` means the wait window expired before
/// any prefix byte arrived; end of stream is a disconnect.
pub fn read_message<T: DeserializeOwned, R: Read>(
    reader: &mut R,
) -> Result<Option<T>, TransportError> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(TransportError::Disconnected);
        }
        Err(e) if is_wait_expired(&e) => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let len = check_len(u32::from_le_bytes(len_buf) as usize)?;
    read_payload(reader, len).map(Some)
}

/// Read a single byte, the zero-wait half of a split prefix read.
/// `Ok(None)` means no data was available.
pub fn read_byte<R: Read>(reader: &mut R) -> Result<Option<u8>, TransportError> {
    let mut buf = [0u8; 1];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => return Err(TransportError::Disconnected),
            Ok(_) => return Ok(Some(buf[0])),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) if is_wait_expired(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        }
    }
}

/// Finish a prefix whose first byte was already read. A stall mid-prefix is
/// a timeout fault, not a no-data window.
pub fn read_prefix_after<R: Read>(reader: &mut R, first: u8) -> Result<usize, TransportError> {
    let mut rest = [0u8; 3];
    match reader.read_exact(&mut rest) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(TransportError::Disconnected);
        }
        Err(e) if is_wait_expired(&e) => return Err(TransportError::TimedOut),
        Err(e) => return Err(e.into()),
    }
    check_len(u32::from_le_bytes([first, rest[0], rest[1], rest[2]]) as usize)
}

/// Read and decode a payload of known length. A stall mid-payload is a
/// timeout fault.
pub fn read_payload<T: DeserializeOwned, R: Read>(
    reader: &mut R,
    len: usize,
) -> Result<T, TransportError> {
    let mut payload = vec![0u8; len];
    match reader.read_exact(&mut payload) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(TransportError::Disconnected);
        }
        Err(e) if is_wait_expired(&e) => return Err(TransportError::TimedOut),
        Err(e) => return Err(e.into()),
    }
    Ok(serde_json::from_slice(&payload)?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
