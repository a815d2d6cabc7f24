/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The destination region cannot hold the encoded frame.
    #[error("buffer too small ({len} bytes, need {needed})")]
    BufferTooSmall { len: usize, needed: usize },

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// The input is shorter than a frame header.
    #[error("truncated frame ({len} bytes, header is {header})")]
    Truncated { len: usize, header: usize },

    /// The type tag is not a known frame type.
    #[error("unknown frame type tag {0}")]
    UnknownType(u8),
}

pub type Result<T> = std::result::Result<T, FrameError>;
