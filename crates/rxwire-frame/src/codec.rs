use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::kind::FrameType;

/// Frame header: type tag (1) + session id (8) = 9 bytes.
pub const HEADER_SIZE: usize = 9;

/// Largest payload a single UDP datagram can carry over IPv4.
pub const MAX_DATAGRAM_SIZE: usize = 65_507;

/// Default maximum frame payload: one datagram minus the header.
pub const DEFAULT_MAX_PAYLOAD: usize = MAX_DATAGRAM_SIZE - HEADER_SIZE;

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: FrameType,
    pub session_id: u64,
    /// Offset of the first payload byte in the decoded buffer.
    pub payload_offset: usize,
    pub payload_len: usize,
}

/// A framed message tagged with its session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub frame_type: FrameType,
    pub session_id: u64,
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(frame_type: FrameType, session_id: u64, payload: impl Into<Bytes>) -> Self {
        Self {
            frame_type,
            session_id,
            payload: payload.into(),
        }
    }

    /// A data frame.
    pub fn next(session_id: u64, payload: impl Into<Bytes>) -> Self {
        Self::new(FrameType::Next, session_id, payload)
    }

    /// A heartbeat frame with an empty payload.
    pub fn heartbeat(session_id: u64) -> Self {
        Self::new(FrameType::Heartbeat, session_id, Bytes::new())
    }

    /// A completion frame with an empty payload.
    pub fn complete(session_id: u64) -> Self {
        Self::new(FrameType::Complete, session_id, Bytes::new())
    }

    /// An error frame carrying a UTF-8 message.
    pub fn error(session_id: u64, message: &str) -> Self {
        Self::new(
            FrameType::Error,
            session_id,
            Bytes::copy_from_slice(message.as_bytes()),
        )
    }

    /// The total wire size of this frame (header + payload).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.payload.len()
    }

    /// Append the wire encoding of this frame to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<()> {
        encode_frame(
            self.frame_type,
            self.session_id,
            &self.payload,
            DEFAULT_MAX_PAYLOAD,
            dst,
        )
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────┬────────────────┬──────────────────────────┐
/// │ Type (1B)│ Session (8B LE)│ Payload (rest of datagram)│
/// └──────────┴────────────────┴──────────────────────────┘
/// ```
pub fn encode_frame(
    frame_type: FrameType,
    session_id: u64,
    payload: &[u8],
    max_payload: usize,
    dst: &mut BytesMut,
) -> Result<()> {
    if payload.len() > max_payload {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: max_payload,
        });
    }
    dst.reserve(HEADER_SIZE + payload.len());
    dst.put_u8(frame_type.tag());
    dst.put_u64_le(session_id);
    dst.put_slice(payload);
    Ok(())
}

/// Encode a frame into a fixed, caller-owned region.
///
/// Returns the number of bytes written.
pub fn encode_frame_into(
    frame_type: FrameType,
    session_id: u64,
    payload: &[u8],
    buf: &mut [u8],
) -> Result<usize> {
    let needed = HEADER_SIZE + payload.len();
    if buf.len() < needed {
        return Err(FrameError::BufferTooSmall {
            len: buf.len(),
            needed,
        });
    }

    let mut dst = &mut buf[..needed];
    dst.put_u8(frame_type.tag());
    dst.put_u64_le(session_id);
    dst.put_slice(payload);
    Ok(needed)
}

/// Decode the header of one frame.
///
/// The payload is everything after the header.
pub fn decode_header(src: &[u8]) -> Result<FrameHeader> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            len: src.len(),
            header: HEADER_SIZE,
        });
    }

    let mut header = &src[..HEADER_SIZE];
    let frame_type = FrameType::try_from(header.get_u8())?;
    let session_id = header.get_u64_le();

    Ok(FrameHeader {
        frame_type,
        session_id,
        payload_offset: HEADER_SIZE,
        payload_len: src.len() - HEADER_SIZE,
    })
}

/// Decode one frame. The payload shares `src`'s memory.
pub fn decode_frame(mut src: Bytes) -> Result<Frame> {
    let header = decode_header(&src)?;
    src.advance(header.payload_offset);

    Ok(Frame {
        frame_type: header.frame_type,
        session_id: header.session_id,
        payload: src,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kind;

    #[test]
    fn test_header_roundtrip_across_types_and_ids() {
        let ids = [0u64, 1, 42, 1 << 63, (-1i64) as u64, u64::MAX - 1];
        for frame_type in FrameType::ALL {
            for session_id in ids {
                let mut buf = BytesMut::new();
                encode_frame(frame_type, session_id, b"abc", DEFAULT_MAX_PAYLOAD, &mut buf)
                    .unwrap();

                let header = decode_header(&buf).unwrap();
                assert_eq!(header.frame_type, frame_type);
                assert_eq!(header.session_id, session_id);
                assert_eq!(header.payload_len, 3);
                assert_eq!(&buf[header.payload_offset..], b"abc");
            }
        }
    }

    #[test]
    fn test_empty_payload() {
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Heartbeat, 7, b"", DEFAULT_MAX_PAYLOAD, &mut buf).unwrap();
        assert_eq!(buf.len(), HEADER_SIZE);

        let header = decode_header(&buf).unwrap();
        assert_eq!(header.payload_len, 0);
        assert_eq!(header.session_id, 7);
    }

    #[test]
    fn test_max_payload_roundtrip() {
        let payload = vec![0x5A; DEFAULT_MAX_PAYLOAD];
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Next, u64::MAX, &payload, DEFAULT_MAX_PAYLOAD, &mut buf).unwrap();
        assert_eq!(buf.len(), MAX_DATAGRAM_SIZE);

        let frame = decode_frame(buf.freeze()).unwrap();
        assert_eq!(frame.session_id, u64::MAX);
        assert_eq!(frame.payload.len(), DEFAULT_MAX_PAYLOAD);
    }

    #[test]
    fn test_payload_too_large() {
        let payload = vec![0u8; 17];
        let mut buf = BytesMut::new();
        let result = encode_frame(FrameType::Next, 1, &payload, 16, &mut buf);
        assert_eq!(
            result,
            Err(FrameError::PayloadTooLarge { size: 17, max: 16 })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn test_wire_layout() {
        let mut buf = BytesMut::new();
        encode_frame(FrameType::Error, 0x0102_0304_0506_0708, b"!", 8, &mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            &[kind::ERROR, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, b'!']
        );
    }

    #[test]
    fn test_encode_into_fixed_region() {
        let mut region = [0u8; 32];
        let written = encode_frame_into(FrameType::Next, 42, b"hello", &mut region).unwrap();
        assert_eq!(written, HEADER_SIZE + 5);

        let header = decode_header(&region[..written]).unwrap();
        assert_eq!(header.frame_type, FrameType::Next);
        assert_eq!(header.session_id, 42);
        assert_eq!(header.payload_len, 5);
    }

    #[test]
    fn test_encode_into_region_too_small() {
        let mut region = [0u8; HEADER_SIZE - 1];
        let result = encode_frame_into(FrameType::Heartbeat, 1, b"", &mut region);
        assert_eq!(
            result,
            Err(FrameError::BufferTooSmall {
                len: HEADER_SIZE - 1,
                needed: HEADER_SIZE
            })
        );
    }

    #[test]
    fn test_decode_truncated() {
        let result = decode_header(&[kind::NEXT, 0, 0]);
        assert!(matches!(result, Err(FrameError::Truncated { len: 3, .. })));
    }

    #[test]
    fn test_decode_unknown_type() {
        let mut raw = [0u8; HEADER_SIZE];
        raw[0] = 9;
        assert_eq!(decode_header(&raw), Err(FrameError::UnknownType(9)));
    }

    #[test]
    fn test_decode_frame_shares_payload() {
        let mut buf = BytesMut::new();
        Frame::next(5, Bytes::from_static(b"zero-copy"))
            .encode(&mut buf)
            .unwrap();
        let wire = buf.freeze();

        let frame = decode_frame(wire.clone()).unwrap();
        assert_eq!(frame, Frame::next(5, Bytes::from_static(b"zero-copy")));
        assert_eq!(frame.payload.as_ptr(), wire[HEADER_SIZE..].as_ptr());
    }

    #[test]
    fn test_frame_wire_size() {
        assert_eq!(Frame::heartbeat(1).wire_size(), HEADER_SIZE);
        assert_eq!(Frame::error(1, "boom").wire_size(), HEADER_SIZE + 4);
    }
}
