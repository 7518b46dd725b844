//! Stream framing for [`tokio_util::codec::Framed`].
//!
//! [`ServerCodec`] is the engine side of a connection (requests in, responses
//! out); [`ClientCodec`] is the other end, used by the aux link and by tools.
//! Both stop at the first [`FrameError`]; the caller drops the stream.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::core::frame::{
    truncated_frame, Request, Response, MAX_PAYLOAD_SIZE, REQUEST_HEADER_LEN, RESPONSE_HEADER_LEN,
};
use crate::error::FrameError;

#[derive(Debug, Clone, Copy)]
pub struct ServerCodec {
    max_payload: usize,
}

impl ServerCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for ServerCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl Decoder for ServerCodec {
    type Item = Request;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Request>, FrameError> {
        Request::split_frame(src, self.max_payload)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Request>, FrameError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(truncated_frame(buf, REQUEST_HEADER_LEN)),
        }
    }
}

impl Encoder<Response> for ServerCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Response, dst: &mut BytesMut) -> Result<(), FrameError> {
        item.encode(dst, self.max_payload)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClientCodec {
    max_payload: usize,
}

impl ClientCodec {
    pub fn new(max_payload: usize) -> Self {
        Self { max_payload }
    }
}

impl Default for ClientCodec {
    fn default() -> Self {
        Self::new(MAX_PAYLOAD_SIZE)
    }
}

impl Decoder for ClientCodec {
    type Item = Response;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Response>, FrameError> {
        Response::split_frame(src, self.max_payload)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Response>, FrameError> {
        match self.decode(buf)? {
            Some(frame) => Ok(Some(frame)),
            None if buf.is_empty() => Ok(None),
            None => Err(truncated_frame(buf, RESPONSE_HEADER_LEN)),
        }
    }
}

impl Encoder<Request> for ClientCodec {
    type Error = FrameError;

    fn encode(&mut self, item: Request, dst: &mut BytesMut) -> Result<(), FrameError> {
        item.encode(dst, self.max_payload)
    }
}
