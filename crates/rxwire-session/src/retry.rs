//! Retry policy for blocking publishes.
//!
//! Two independent windows bound one publish call. The connect window opens
//! at the first `NotConnected` result, the back-pressure window at the first
//! `BackPressured` or `AdminAction` result. Neither reopens during the call,
//! so a channel flapping between the two conditions still gives up after
//! `connect_timeout + backpressure_timeout` plus one retry interval.

use std::time::{Duration, Instant};

use crate::publisher::{FatalReason, RetryReason};

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Wait this long, then offer again.
    Wait(Duration),
    /// Stop retrying.
    GiveUp(FatalReason),
}

/// Time bookkeeping for one blocking publish call.
#[derive(Debug, Clone)]
pub struct RetryWindow {
    connect_timeout: Duration,
    backpressure_timeout: Duration,
    retry_interval: Duration,
    unconnected_since: Option<Instant>,
    transient_since: Option<Instant>,
}

impl RetryWindow {
    pub fn new(
        connect_timeout: Duration,
        backpressure_timeout: Duration,
        retry_interval: Duration,
    ) -> Self {
        Self {
            connect_timeout,
            backpressure_timeout,
            retry_interval,
            unconnected_since: None,
            transient_since: None,
        }
    }

    /// Record a `NotConnected` result observed at `now`.
    pub fn on_not_connected(&mut self, now: Instant) -> RetryStep {
        if self.connect_timeout.is_zero() {
            return RetryStep::GiveUp(FatalReason::NotConnected);
        }

        let since = *self.unconnected_since.get_or_insert(now);
        let elapsed = now.saturating_duration_since(since);
        if elapsed >= self.connect_timeout {
            return RetryStep::GiveUp(FatalReason::ConnectTimeout(elapsed));
        }
        RetryStep::Wait(self.retry_interval.min(self.connect_timeout - elapsed))
    }

    /// Record a transient result observed at `now`.
    pub fn on_transient(&mut self, reason: RetryReason, now: Instant) -> RetryStep {
        let since = *self.transient_since.get_or_insert(now);
        let elapsed = now.saturating_duration_since(since);
        if elapsed >= self.backpressure_timeout {
            return RetryStep::GiveUp(FatalReason::BackpressureTimeout { reason, elapsed });
        }
        RetryStep::Wait(self.retry_interval.min(self.backpressure_timeout - elapsed))
    }
}
