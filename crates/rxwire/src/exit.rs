use std::fmt;
use std::io;

use rxwire_frame::FrameError;
use rxwire_session::{FatalReason, SessionError};
use rxwire_transport::TransportError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::AddrInUse | io::ErrorKind::AddrNotAvailable => TRANSPORT_ERROR,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::Bind { source, .. }
        | TransportError::Connect { source, .. }
        | TransportError::Io(source) => io_error(context, source),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match err {
        FrameError::PayloadTooLarge { .. }
        | FrameError::Truncated { .. }
        | FrameError::UnknownType(_) => DATA_INVALID,
        FrameError::BufferTooSmall { .. } => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

fn fatal_code(reason: FatalReason) -> i32 {
    match reason {
        FatalReason::ConnectTimeout(_) | FatalReason::BackpressureTimeout { .. } => TIMEOUT,
        FatalReason::Cancelled => FAILURE,
        FatalReason::Closed
        | FatalReason::NotConnected
        | FatalReason::MaxPositionExceeded
        | FatalReason::Unknown(_) => TRANSPORT_ERROR,
    }
}

pub fn session_error(context: &str, err: SessionError) -> CliError {
    let code = match &err {
        SessionError::Encode { source, .. } => return frame_error(context, source.clone()),
        SessionError::Publish { reason, .. } => fatal_code(*reason),
        SessionError::Liveness(_) => TRANSPORT_ERROR,
        SessionError::Upstream { .. } | SessionError::Cancelled { .. } => FAILURE,
        SessionError::InvalidConfig(_) => USAGE,
        SessionError::Scheduler(_) => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn publish_timeouts_map_to_timeout() {
        let err = session_error(
            "send failed",
            SessionError::Publish {
                session_id: 1,
                reason: FatalReason::ConnectTimeout(Duration::from_secs(1)),
            },
        );
        assert_eq!(err.code, TIMEOUT);
        assert!(err.message.starts_with("send failed: "));
    }

    #[test]
    fn invalid_config_is_a_usage_error() {
        let err = session_error("open failed", SessionError::InvalidConfig("zero".into()));
        assert_eq!(err.code, USAGE);
    }

    #[test]
    fn oversized_payload_is_invalid_data() {
        let err = session_error(
            "send failed",
            SessionError::Encode {
                session_id: 1,
                source: FrameError::PayloadTooLarge { size: 10, max: 5 },
            },
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn bind_conflict_is_a_transport_error() {
        let err = transport_error(
            "bind failed",
            TransportError::Bind {
                addr: "127.0.0.1:1".parse().unwrap(),
                source: io::Error::from(io::ErrorKind::AddrInUse),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }
}
