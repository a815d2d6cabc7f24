//! Frame type tags.
//!
//! Tags are part of the wire contract and must never be renumbered.

use std::fmt;

use crate::error::FrameError;

/// One payload item of the stream.
pub const NEXT: u8 = 0;

/// The stream finished successfully.
pub const COMPLETE: u8 = 1;

/// The stream finished with an error.
pub const ERROR: u8 = 2;

/// Liveness probe.
pub const HEARTBEAT: u8 = 3;

/// Logical frame type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FrameType {
    Next = NEXT,
    Complete = COMPLETE,
    Error = ERROR,
    Heartbeat = HEARTBEAT,
}

impl FrameType {
    /// All frame types, in tag order.
    pub const ALL: [FrameType; 4] = [
        FrameType::Next,
        FrameType::Complete,
        FrameType::Error,
        FrameType::Heartbeat,
    ];

    /// The wire tag.
    pub fn tag(self) -> u8 {
        self as u8
    }

    /// Human-readable name.
    pub fn name(self) -> &'static str {
        match self {
            FrameType::Next => "NEXT",
            FrameType::Complete => "COMPLETE",
            FrameType::Error => "ERROR",
            FrameType::Heartbeat => "HEARTBEAT",
        }
    }

    /// True for frames that carry no stream data.
    pub fn is_control(self) -> bool {
        !matches!(self, FrameType::Next)
    }
}

impl TryFrom<u8> for FrameType {
    type Error = FrameError;

    fn try_from(tag: u8) -> Result<Self, FrameError> {
        match tag {
            NEXT => Ok(FrameType::Next),
            COMPLETE => Ok(FrameType::Complete),
            ERROR => Ok(FrameType::Error),
            HEARTBEAT => Ok(FrameType::Heartbeat),
            other => Err(FrameError::UnknownType(other)),
        }
    }
}

impl fmt::Display for FrameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
