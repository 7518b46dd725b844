//! Request and response frames.
//!
//! ```text
//! request:  [command_id:2][sequence_id:4][payload_len:2][payload:payload_len]
//! response: [sequence_id:4][status:2][result_len:2][result:result_len]
//! ```
//!
//! All integers are big-endian. The declared length is checked against the
//! hard maximum before any payload bytes are buffered.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::status::StatusCode;
use crate::error::FrameError;

/// Request header size in bytes.
pub const REQUEST_HEADER_LEN: usize = 8;

/// Response header size in bytes.
pub const RESPONSE_HEADER_LEN: usize = 8;

/// Default hard maximum for payloads and results.
pub const MAX_PAYLOAD_SIZE: usize = 4096;

/// Largest length the two-byte length field can express.
pub const PAYLOAD_LEN_LIMIT: usize = u16::MAX as usize;

/// A diagnostic request as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub command_id: u16,
    pub sequence_id: u32,
    pub payload: Bytes,
}

impl Request {
    pub fn new(command_id: u16, sequence_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            command_id,
            sequence_id,
            payload: payload.into(),
        }
    }

    pub fn encoded_len(&self) -> usize {
        REQUEST_HEADER_LEN + self.payload.len()
    }

    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut, max_payload: usize) -> Result<(), FrameError> {
        let len = checked_len(self.payload.len(), max_payload)?;
        dst.reserve(self.encoded_len());
        dst.put_u16(self.command_id);
        dst.put_u32(self.sequence_id);
        dst.put_u16(len);
        dst.put_slice(&self.payload);
        Ok(())
    }

    /// Decode one frame from the start of `src`.
    pub fn decode(src: &[u8], max_payload: usize) -> Result<Self, FrameError> {
        let total = frame_len(src, REQUEST_HEADER_LEN, max_payload)?;
        let mut header = &src[..REQUEST_HEADER_LEN];
        let command_id = header.get_u16();
        let sequence_id = header.get_u32();
        Ok(Self {
            command_id,
            sequence_id,
            payload: Bytes::copy_from_slice(&src[REQUEST_HEADER_LEN..total]),
        })
    }

    /// Split one complete frame off the front of a stream buffer.
    ///
    /// Returns `Ok(None)` while the frame is still incomplete.
    pub(crate) fn split_frame(
        buf: &mut BytesMut,
        max_payload: usize,
    ) -> Result<Option<Self>, FrameError> {
        let Some(declared) = pending_frame(buf, REQUEST_HEADER_LEN, max_payload)? else {
            return Ok(None);
        };
        let mut header = buf.split_to(REQUEST_HEADER_LEN);
        let command_id = header.get_u16();
        let sequence_id = header.get_u32();
        let payload = buf.split_to(declared).freeze();
        Ok(Some(Self {
            command_id,
            sequence_id,
            payload,
        }))
    }
}

/// The engine's answer to one request.
///
/// `result` is empty unless the status is [`StatusCode::Success`]; every
/// constructor and the decoder enforce this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    sequence_id: u32,
    status: StatusCode,
    result: Bytes,
}

impl Response {
    pub fn new(sequence_id: u32, status: StatusCode, result: impl Into<Bytes>) -> Self {
        let result = if status.is_success() {
            result.into()
        } else {
            Bytes::new()
        };
        Self {
            sequence_id,
            status,
            result,
        }
    }

    pub fn success(sequence_id: u32, result: impl Into<Bytes>) -> Self {
        Self::new(sequence_id, StatusCode::Success, result)
    }

    /// A response carrying only a status.
    pub fn from_status(sequence_id: u32, status: StatusCode) -> Self {
        Self::new(sequence_id, status, Bytes::new())
    }

    pub fn sequence_id(&self) -> u32 {
        self.sequence_id
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn result(&self) -> &Bytes {
        &self.result
    }

    /// Re-tag the response, e.g. when translating an aux correlation id back.
    pub fn with_sequence_id(mut self, sequence_id: u32) -> Self {
        self.sequence_id = sequence_id;
        self
    }

    pub fn encoded_len(&self) -> usize {
        RESPONSE_HEADER_LEN + self.result.len()
    }

    /// Append the encoded frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut, max_payload: usize) -> Result<(), FrameError> {
        let len = checked_len(self.result.len(), max_payload)?;
        dst.reserve(self.encoded_len());
        dst.put_u32(self.sequence_id);
        dst.put_u16(self.status.to_wire());
        dst.put_u16(len);
        dst.put_slice(&self.result);
        Ok(())
    }

    /// Decode one frame from the start of `src`.
    pub fn decode(src: &[u8], max_payload: usize) -> Result<Self, FrameError> {
        let total = frame_len(src, RESPONSE_HEADER_LEN, max_payload)?;
        let mut header = &src[..RESPONSE_HEADER_LEN];
        let sequence_id = header.get_u32();
        let status = StatusCode::from_wire(header.get_u16())?;
        Ok(Self::new(
            sequence_id,
            status,
            Bytes::copy_from_slice(&src[RESPONSE_HEADER_LEN..total]),
        ))
    }

    pub(crate) fn split_frame(
        buf: &mut BytesMut,
        max_payload: usize,
    ) -> Result<Option<Self>, FrameError> {
        let Some(declared) = pending_frame(buf, RESPONSE_HEADER_LEN, max_payload)? else {
            return Ok(None);
        };
        let mut header = buf.split_to(RESPONSE_HEADER_LEN);
        let sequence_id = header.get_u32();
        let raw_status = header.get_u16();
        let result = buf.split_to(declared).freeze();
        let status = StatusCode::from_wire(raw_status)?;
        Ok(Some(Self::new(sequence_id, status, result)))
    }
}

/// The length field is always the last two header bytes.
fn declared_len(src: &[u8], header_len: usize) -> usize {
    let mut field = &src[header_len - 2..header_len];
    field.get_u16() as usize
}

fn checked_len(len: usize, max_payload: usize) -> Result<u16, FrameError> {
    let max = max_payload.min(PAYLOAD_LEN_LIMIT);
    if len > max {
        return Err(FrameError::Oversize { declared: len, max });
    }
    // bounded by PAYLOAD_LEN_LIMIT above
    Ok(len as u16)
}

/// Error for a partial frame left behind when the stream ends.
pub(crate) fn truncated_frame(src: &[u8], header_len: usize) -> FrameError {
    let expected = if src.len() < header_len {
        header_len
    } else {
        header_len + declared_len(src, header_len)
    };
    FrameError::Truncated {
        expected,
        available: src.len(),
    }
}

/// Total frame length for a complete buffer, or the matching error.
fn frame_len(src: &[u8], header_len: usize, max_payload: usize) -> Result<usize, FrameError> {
    if src.len() < header_len {
        return Err(FrameError::Truncated {
            expected: header_len,
            available: src.len(),
        });
    }
    let declared = declared_len(src, header_len);
    if declared > max_payload {
        return Err(FrameError::Oversize {
            declared,
            max: max_payload,
        });
    }
    let total = header_len + declared;
    if src.len() < total {
        return Err(FrameError::Truncated {
            expected: total,
            available: src.len(),
        });
    }
    Ok(total)
}

/// Payload length of the next frame once it is fully buffered.
fn pending_frame(
    buf: &mut BytesMut,
    header_len: usize,
    max_payload: usize,
) -> Result<Option<usize>, FrameError> {
    if buf.len() < header_len {
        return Ok(None);
    }
    let declared = declared_len(&buf[..], header_len);
    if declared > max_payload {
        return Err(FrameError::Oversize {
            declared,
            max: max_payload,
        });
    }
    let total = header_len + declared;
    if buf.len() < total {
        buf.reserve(total - buf.len());
        return Ok(None);
    }
    Ok(Some(declared))
}
