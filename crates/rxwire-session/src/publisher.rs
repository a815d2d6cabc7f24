use std::fmt;
use std::time::{Duration, Instant};

use bytes::BytesMut;
use rxwire_frame::{encode_frame, FrameError, FrameType, HEADER_SIZE};
use rxwire_transport::{Channel, OfferStatus};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::retry::{RetryStep, RetryWindow};

/// Why an offer may succeed if repeated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryReason {
    BackPressured,
    AdminAction,
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BackPressured => f.write_str("back pressure"),
            Self::AdminAction => f.write_str("admin action"),
        }
    }
}

/// Why a publish failed for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FatalReason {
    #[error("channel closed")]
    Closed,

    #[error("channel not connected")]
    NotConnected,

    #[error("no connected peer after {0:?}")]
    ConnectTimeout(Duration),

    #[error("{reason} persisted for {elapsed:?}")]
    BackpressureTimeout {
        reason: RetryReason,
        elapsed: Duration,
    },

    #[error("channel max position exceeded")]
    MaxPositionExceeded,

    #[error("unknown transport status {0}")]
    Unknown(i64),

    #[error("publish cancelled")]
    Cancelled,
}

/// Result of one offer attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Accepted at this position.
    Sent(u64),
    Retryable(RetryReason),
    Fatal(FatalReason),
}

impl From<OfferStatus> for PublishOutcome {
    fn from(status: OfferStatus) -> Self {
        match status {
            OfferStatus::Success(position) => Self::Sent(position),
            OfferStatus::BackPressured => Self::Retryable(RetryReason::BackPressured),
            OfferStatus::AdminAction => Self::Retryable(RetryReason::AdminAction),
            OfferStatus::NotConnected => Self::Fatal(FatalReason::NotConnected),
            OfferStatus::Closed => Self::Fatal(FatalReason::Closed),
            OfferStatus::MaxPositionExceeded => Self::Fatal(FatalReason::MaxPositionExceeded),
            OfferStatus::Unknown(code) => Self::Fatal(FatalReason::Unknown(code)),
        }
    }
}

/// Terminal failure of a blocking publish.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PublishError {
    #[error(transparent)]
    Encode(#[from] FrameError),

    #[error(transparent)]
    Fatal(#[from] FatalReason),
}

impl PublishError {
    /// Attach the session id.
    pub fn into_session_error(self, session_id: u64) -> SessionError {
        match self {
            Self::Encode(source) => SessionError::Encode { session_id, source },
            Self::Fatal(reason) => SessionError::Publish { session_id, reason },
        }
    }
}

enum Attempt {
    Done(Result<u64, PublishError>),
    Wait(Duration),
}

/// Encodes frames and offers them to a channel.
///
/// The encode buffer is reused across calls and stays untouched for the
/// whole retry loop of one publish.
#[derive(Debug)]
pub struct MessagePublisher {
    connect_timeout: Duration,
    backpressure_timeout: Duration,
    retry_interval: Duration,
    max_payload_size: usize,
    buf: BytesMut,
}

impl MessagePublisher {
    /// Publisher using the session's timeouts.
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            backpressure_timeout: config.backpressure_timeout,
            retry_interval: config.retry_interval,
            max_payload_size: config.max_payload_size,
            buf: BytesMut::with_capacity(HEADER_SIZE + 1024),
        }
    }

    /// Publisher with zero timeouts, for periodic control frames.
    pub fn single_attempt(max_payload_size: usize) -> Self {
        Self {
            connect_timeout: Duration::ZERO,
            backpressure_timeout: Duration::ZERO,
            retry_interval: Duration::ZERO,
            max_payload_size,
            buf: BytesMut::with_capacity(HEADER_SIZE),
        }
    }

    fn encode(
        &mut self,
        frame_type: FrameType,
        session_id: u64,
        payload: &[u8],
    ) -> Result<(), FrameError> {
        self.buf.clear();
        encode_frame(
            frame_type,
            session_id,
            payload,
            self.max_payload_size,
            &mut self.buf,
        )
    }

    fn window(&self) -> RetryWindow {
        RetryWindow::new(
            self.connect_timeout,
            self.backpressure_timeout,
            self.retry_interval,
        )
    }

    /// Offer once and report what happened.
    ///
    /// Transient conditions come back as [`PublishOutcome::Retryable`]; the
    /// caller retries on its own schedule.
    pub fn try_publish<C: Channel + ?Sized>(
        &mut self,
        channel: &C,
        frame_type: FrameType,
        session_id: u64,
        payload: &[u8],
    ) -> Result<PublishOutcome, FrameError> {
        self.encode(frame_type, session_id, payload)?;
        let outcome = PublishOutcome::from(channel.try_offer(&self.buf));
        trace!(session_id, %frame_type, ?outcome, "offered frame");
        Ok(outcome)
    }

    /// Offer until the frame is sent or the failure is terminal.
    ///
    /// Blocks the calling thread between attempts for at most the configured
    /// timeouts. Never returns a transient condition: an exhausted window
    /// becomes [`FatalReason::BackpressureTimeout`] or
    /// [`FatalReason::ConnectTimeout`]. Returns the channel position on
    /// success.
    pub fn publish_blocking<C: Channel + ?Sized>(
        &mut self,
        channel: &C,
        frame_type: FrameType,
        session_id: u64,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<u64, PublishError> {
        self.encode(frame_type, session_id, payload)?;
        let mut window = self.window();

        loop {
            match self.attempt(channel, &mut window) {
                Attempt::Done(result) => return self.finish(session_id, frame_type, result),
                Attempt::Wait(delay) => {
                    if cancel.is_cancelled() {
                        return Err(FatalReason::Cancelled.into());
                    }
                    idle(delay);
                }
            }
        }
    }

    /// [`MessagePublisher::publish_blocking`] for async callers.
    #[cfg(feature = "async")]
    pub async fn publish_async<C: Channel + ?Sized>(
        &mut self,
        channel: &C,
        frame_type: FrameType,
        session_id: u64,
        payload: &[u8],
        cancel: &CancellationToken,
    ) -> Result<u64, PublishError> {
        self.encode(frame_type, session_id, payload)?;
        let mut window = self.window();

        loop {
            match self.attempt(channel, &mut window) {
                Attempt::Done(result) => return self.finish(session_id, frame_type, result),
                Attempt::Wait(delay) => {
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(FatalReason::Cancelled.into()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn attempt<C: Channel + ?Sized>(&self, channel: &C, window: &mut RetryWindow) -> Attempt {
        let step = match PublishOutcome::from(channel.try_offer(&self.buf)) {
            PublishOutcome::Sent(position) => return Attempt::Done(Ok(position)),
            PublishOutcome::Retryable(reason) => window.on_transient(reason, Instant::now()),
            PublishOutcome::Fatal(FatalReason::NotConnected) => {
                window.on_not_connected(Instant::now())
            }
            PublishOutcome::Fatal(reason) => return Attempt::Done(Err(reason.into())),
        };

        match step {
            RetryStep::Wait(delay) => Attempt::Wait(delay),
            RetryStep::GiveUp(reason) => Attempt::Done(Err(reason.into())),
        }
    }

    fn finish(
        &self,
        session_id: u64,
        frame_type: FrameType,
        result: Result<u64, PublishError>,
    ) -> Result<u64, PublishError> {
        match &result {
            Ok(position) => trace!(session_id, %frame_type, position, "published frame"),
            Err(err) => debug!(session_id, %frame_type, error = %err, "publish failed"),
        }
        result
    }
}

fn idle(delay: Duration) {
    if delay.is_zero() {
        std::thread::yield_now();
    } else {
        std::thread::sleep(delay);
    }
}
