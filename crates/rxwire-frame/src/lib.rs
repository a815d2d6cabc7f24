//! Session-tagged frame envelope for rxwire.
//!
//! Every frame carries a fixed header so a receiver can demultiplex by
//! session without touching the payload:
//! - A 1-byte frame type tag
//! - An 8-byte little-endian session id
//!
//! The payload length is not encoded; it is implied by the datagram.

pub mod codec;
pub mod error;
pub mod kind;

pub use codec::{
    decode_frame, decode_header, encode_frame, encode_frame_into, Frame, FrameHeader,
    DEFAULT_MAX_PAYLOAD, HEADER_SIZE, MAX_DATAGRAM_SIZE,
};
pub use error::{FrameError, Result};
pub use kind::FrameType;
