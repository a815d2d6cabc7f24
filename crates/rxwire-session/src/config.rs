use std::time::Duration;

use rxwire_frame::DEFAULT_MAX_PAYLOAD;

use crate::error::{Result, SessionError};
use crate::heartbeat::DEFAULT_MISS_THRESHOLD;

/// Per-session timing and size limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Period between heartbeat frames. Must be non-zero.
    pub heartbeat_interval: Duration,
    /// How long a data publish waits for a peer to connect. Zero fails fast.
    pub connect_timeout: Duration,
    /// How long a data publish retries back-pressure or admin pauses.
    /// Zero means a single attempt.
    pub backpressure_timeout: Duration,
    /// Pause between publish retries. Zero yields the thread instead.
    pub retry_interval: Duration,
    /// Consecutive missed heartbeats that declare the peer dead.
    pub heartbeat_miss_threshold: u32,
    /// Largest NEXT payload accepted for encoding.
    pub max_payload_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            backpressure_timeout: Duration::from_secs(5),
            retry_interval: Duration::from_millis(1),
            heartbeat_miss_threshold: DEFAULT_MISS_THRESHOLD,
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

impl SessionConfig {
    /// Build a config from millisecond settings, keeping the other defaults.
    pub fn from_millis(
        heartbeat_interval_ms: u64,
        connect_timeout_ms: u64,
        backpressure_timeout_ms: u64,
    ) -> Self {
        Self {
            heartbeat_interval: Duration::from_millis(heartbeat_interval_ms),
            connect_timeout: Duration::from_millis(connect_timeout_ms),
            backpressure_timeout: Duration::from_millis(backpressure_timeout_ms),
            ..Self::default()
        }
    }

    /// Reject settings a session cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.heartbeat_interval.is_zero() {
            return Err(SessionError::InvalidConfig(
                "heartbeat interval must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_miss_threshold == 0 {
            return Err(SessionError::InvalidConfig(
                "heartbeat miss threshold must be at least 1".to_string(),
            ));
        }
        if self.max_payload_size > DEFAULT_MAX_PAYLOAD {
            return Err(SessionError::InvalidConfig(format!(
                "max payload size {} exceeds single-frame limit {}",
                self.max_payload_size, DEFAULT_MAX_PAYLOAD
            )));
        }
        Ok(())
    }
}
