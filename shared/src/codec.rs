//! Signed frame codec
//!
//! Every tick is framed as:
//! ```text
//! [ L bytes: detached signature ][ N bytes: JSON-encoded Reading ]
//! ```
//!
//! Neither field carries a length prefix. `L` is fixed by the signing key
//! (256 bytes for RSA-2048) and the payload ends where its JSON object ends.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::protocol::MAX_PAYLOAD_SIZE;
use crate::Reading;

/// Errors that can occur during encoding/decoding
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Payload too large: {size} bytes (max: {max})")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Frame too short: need {needed} signature bytes, have {available}")]
    FrameTooShort { needed: usize, available: usize },

    #[error("Non-finite {field} value: {value}")]
    NonFinite { field: &'static str, value: f32 },

    #[error("JSON encode error: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("JSON decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Reject payloads that can never be sent
pub fn check_payload_size(size: usize) -> Result<(), CodecError> {
    check_payload_limit(size, MAX_PAYLOAD_SIZE)
}

fn check_payload_limit(size: usize, max: usize) -> Result<(), CodecError> {
    if size > max {
        return Err(CodecError::PayloadTooLarge { size, max });
    }
    Ok(())
}

/// Serialize a reading to its canonical payload bytes
///
/// Fields are written in declaration order (`id`, `timestamp`, `temperatura`,
/// `presion`, `humedad`) with no whitespace, so equal readings always produce
/// equal bytes.
pub fn serialize(reading: &Reading) -> Result<Bytes, CodecError> {
    serialize_with_limit(reading, MAX_PAYLOAD_SIZE)
}

/// Serialize against a tighter bound than [`MAX_PAYLOAD_SIZE`]
///
/// Limits above [`MAX_PAYLOAD_SIZE`] are clamped to it.
pub fn serialize_with_limit(reading: &Reading, limit: usize) -> Result<Bytes, CodecError> {
    check_finite(reading)?;
    let payload = serde_json::to_vec(reading).map_err(CodecError::Serialize)?;
    check_payload_limit(payload.len(), limit.min(MAX_PAYLOAD_SIZE))?;
    Ok(Bytes::from(payload))
}

/// JSON has no NaN or infinity; serde_json would write them as `null`
fn check_finite(reading: &Reading) -> Result<(), CodecError> {
    let fields = [
        ("temperatura", reading.temperature),
        ("presion", reading.pressure),
        ("humedad", reading.humidity),
    ];
    for (field, value) in fields {
        if !value.is_finite() {
            return Err(CodecError::NonFinite { field, value });
        }
    }
    Ok(())
}

/// Try to decode one payload from the front of `buf`
///
/// Returns:
/// - `Ok(Some((reading, consumed)))` once a complete JSON object is buffered
/// - `Ok(None)` if more data is needed
/// - `Err(...)` if the data is not a valid reading
pub fn decode_payload(buf: &[u8]) -> Result<Option<(Reading, usize)>, CodecError> {
    let mut stream = serde_json::Deserializer::from_slice(buf).into_iter::<Reading>();

    match stream.next() {
        Some(Ok(reading)) => Ok(Some((reading, stream.byte_offset()))),
        Some(Err(e)) if e.is_eof() => Ok(None),
        Some(Err(e)) => Err(CodecError::Decode(e)),
        None => Ok(None),
    }
}

/// A detached signature and the payload it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedFrame {
    pub signature: Bytes,
    pub payload: Bytes,
}

impl SignedFrame {
    pub fn new(signature: impl Into<Bytes>, payload: impl Into<Bytes>) -> Self {
        Self {
            signature: signature.into(),
            payload: payload.into(),
        }
    }

    /// Total bytes on the wire
    pub fn len(&self) -> usize {
        self.signature.len() + self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Concatenate signature and payload with no delimiter
    pub fn assemble(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.len());
        self.encode_into(&mut buf);
        buf.freeze()
    }

    /// Append the wire form to a provided buffer
    pub fn encode_into(&self, buf: &mut BytesMut) {
        buf.reserve(self.len());
        buf.put_slice(&self.signature);
        buf.put_slice(&self.payload);
    }

    /// Split an assembled frame given the signature length
    pub fn split(frame: &[u8], signature_len: usize) -> Result<Self, CodecError> {
        if frame.len() < signature_len {
            return Err(CodecError::FrameTooShort {
                needed: signature_len,
                available: frame.len(),
            });
        }
        let (signature, payload) = frame.split_at(signature_len);
        Ok(Self::new(signature.to_vec(), payload.to_vec()))
    }
}

/// A frame pulled off the stream by [`FrameDecoder`]
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub frame: SignedFrame,
    pub reading: Reading,
}

/// Decoder state machine for streaming decoding on the collector side
#[derive(Debug)]
pub struct FrameDecoder {
    signature_len: usize,
    /// Partial frame data being accumulated
    buffer: BytesMut,
}

impl FrameDecoder {
    /// Create a decoder for signatures of a fixed length
    pub fn new(signature_len: usize) -> Self {
        Self {
            signature_len,
            buffer: BytesMut::with_capacity(signature_len + MAX_PAYLOAD_SIZE),
        }
    }

    /// Add data to the decoder buffer
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Try to decode the next frame from the buffer
    ///
    /// Call this repeatedly until it returns `Ok(None)` to drain all complete frames
    pub fn decode_next(&mut self) -> Result<Option<DecodedFrame>, CodecError> {
        if self.buffer.len() <= self.signature_len {
            return Ok(None);
        }

        let body = &self.buffer[self.signature_len..];
        let Some((reading, consumed)) = decode_payload(body)? else {
            // An unterminated object larger than any legal payload never completes
            check_payload_size(body.len())?;
            return Ok(None);
        };
        check_payload_size(consumed)?;

        let signature = self.buffer.split_to(self.signature_len).freeze();
        let payload = self.buffer.split_to(consumed).freeze();

        Ok(Some(DecodedFrame {
            frame: SignedFrame { signature, payload },
            reading,
        }))
    }

    /// Get the current buffer length (for debugging)
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }
}
