//! Length-prefixed JSON framing for the command channel.
//!
//! Each value is written as a 4-byte big-endian length followed by exactly
//! that many bytes of JSON. `encode` flushes before returning so the peer's
//! blocking read can make progress; `decode` blocks until one complete
//! frame has arrived. There is no schema negotiation: both sides agree
//! out-of-band on the value type carried by each command.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{Read, Write};
use thiserror::Error;

/// Upper bound on a single frame. A frame above this is treated as
/// malformed rather than allocated.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// A request or response could not be framed or unframed.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("stream error while framing value: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame body: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame of {0} bytes exceeds the {MAX_FRAME_BYTES} byte limit")]
    FrameTooLarge(usize),
}

/// Write one framed value to `sink` and flush it.
pub fn encode<W: Write, T: Serialize + ?Sized>(sink: &mut W, value: &T) -> Result<(), CodecError> {
    let body = serde_json::to_vec(value)?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(body.len()));
    }
    let len = body.len() as u32;
    sink.write_all(&len.to_be_bytes())?;
    sink.write_all(&body)?;
    sink.flush()?;
    Ok(())
}

/// Block until one complete framed value has been read from `source`.
///
/// A truncated stream, an oversized length prefix, or a body that is not
/// valid JSON for `T` all fail with a [`CodecError`].
pub fn decode<R: Read, T: DeserializeOwned>(source: &mut R) -> Result<T, CodecError> {
    let mut header = [0u8; 4];
    source.read_exact(&mut header)?;
    let len = u32::from_be_bytes(header) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(CodecError::FrameTooLarge(len));
    }
    let mut body = vec![0u8; len];
    source.read_exact(&mut body)?;
    Ok(serde_json::from_slice(&body)?)
}
