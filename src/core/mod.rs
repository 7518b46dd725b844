//! # Core Wire Components
//!
//! Frame layout, status codes and stream codecs.
//!
//! ## Components
//! - **Frame**: [`Request`](frame::Request) and [`Response`](frame::Response)
//!   with byte-level encode/decode
//! - **Status**: the closed set of response outcomes
//! - **Codec**: Tokio codecs for framing over byte streams
//!
//! ## Wire Format
//! ```text
//! request:  [command_id(2)] [sequence_id(4)] [payload_len(2)] [payload(N)]
//! response: [sequence_id(4)] [status(2)] [result_len(2)] [result(N)]
//! ```
//!
//! ## Safety Limits
//! - Declared lengths are validated against the configured maximum before
//!   any payload is buffered
//! - Framing errors are never resynchronised; the connection is dropped

pub mod codec;
pub mod frame;
pub mod status;
