//! Periodic heartbeats and peer liveness detection.
//!
//! Every session gets one heartbeat task. All tasks share a single
//! [`HeartbeatScheduler`] thread, so the number of timer threads does not
//! grow with the number of sessions. Each tick is one non-blocking offer;
//! a transient miss is tolerated until it repeats `threshold` times in a
//! row.

use std::fmt;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use rxwire_frame::{FrameError, FrameType};
use rxwire_transport::Channel;
use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::completion::{completion, Completion, CompletionSink};
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::publisher::{FatalReason, MessagePublisher, PublishOutcome};

/// Consecutive missed heartbeats that declare a peer dead, unless configured.
pub const DEFAULT_MISS_THRESHOLD: u32 = 2;

/// What tripped a liveness failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LivenessCause {
    /// Consecutive transient misses reached the threshold.
    MissedHeartbeats,
    /// A heartbeat offer failed for good.
    Fatal(FatalReason),
    /// The heartbeat frame could not be encoded.
    Encode(FrameError),
}

impl fmt::Display for LivenessCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissedHeartbeats => f.write_str("missed heartbeats"),
            Self::Fatal(reason) => write!(f, "{reason}"),
            Self::Encode(err) => write!(f, "{err}"),
        }
    }
}

/// A session's peer or channel stopped responding.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("session {session_id} lost liveness ({misses}/{threshold} heartbeats missed): {cause}")]
pub struct LivenessFailure {
    pub session_id: u64,
    pub misses: u32,
    pub threshold: u32,
    pub cause: LivenessCause,
}

/// Result of recording one heartbeat attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatVerdict {
    /// Already failed; nothing was attempted.
    Suppressed,
    /// Sent; the miss counter is back to zero.
    Alive,
    /// Missed, but below the threshold. Carries the current miss count.
    Missed(u32),
    /// This attempt failed the session.
    Failed,
}

/// Miss counting for one session. Owned by the heartbeat task alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatState {
    fail_counter: u32,
    failed: bool,
    threshold: u32,
}

impl HeartbeatState {
    pub fn new(threshold: u32) -> Self {
        Self {
            fail_counter: 0,
            failed: false,
            threshold: threshold.max(1),
        }
    }

    pub fn record(&mut self, outcome: &PublishOutcome) -> HeartbeatVerdict {
        if self.failed {
            return HeartbeatVerdict::Suppressed;
        }

        match outcome {
            PublishOutcome::Sent(_) => {
                self.fail_counter = 0;
                HeartbeatVerdict::Alive
            }
            PublishOutcome::Retryable(_) => {
                self.fail_counter += 1;
                if self.fail_counter >= self.threshold {
                    self.failed = true;
                    HeartbeatVerdict::Failed
                } else {
                    HeartbeatVerdict::Missed(self.fail_counter)
                }
            }
            PublishOutcome::Fatal(_) => {
                self.failed = true;
                HeartbeatVerdict::Failed
            }
        }
    }

    /// Fail on a fault that produced no outcome at all.
    pub fn record_fault(&mut self) -> HeartbeatVerdict {
        if self.failed {
            return HeartbeatVerdict::Suppressed;
        }
        self.failed = true;
        HeartbeatVerdict::Failed
    }

    pub fn fail_counter(&self) -> u32 {
        self.fail_counter
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn is_failed(&self) -> bool {
        self.failed
    }
}

type FailureHook = Box<dyn FnOnce(&LivenessFailure) + Send>;

/// Sends one session's heartbeats and reports liveness failure once.
pub struct HeartbeatSender<C: Channel + ?Sized> {
    channel: Arc<C>,
    session_id: u64,
    publisher: MessagePublisher,
    state: HeartbeatState,
    liveness: CompletionSink<LivenessFailure>,
    on_failure: Option<FailureHook>,
}

impl<C: Channel + ?Sized> HeartbeatSender<C> {
    pub fn new(
        channel: Arc<C>,
        session_id: u64,
        config: &SessionConfig,
        liveness: CompletionSink<LivenessFailure>,
    ) -> Self {
        Self {
            channel,
            session_id,
            publisher: MessagePublisher::single_attempt(config.max_payload_size),
            state: HeartbeatState::new(config.heartbeat_miss_threshold),
            liveness,
            on_failure: None,
        }
    }

    /// Run `hook` right after the liveness failure is recorded.
    pub fn with_failure_hook(
        mut self,
        hook: impl FnOnce(&LivenessFailure) + Send + 'static,
    ) -> Self {
        self.on_failure = Some(Box::new(hook));
        self
    }

    pub fn state(&self) -> &HeartbeatState {
        &self.state
    }

    /// Offer one heartbeat frame, unless the session has already failed.
    pub fn tick(&mut self) -> HeartbeatVerdict {
        if self.state.is_failed() {
            return HeartbeatVerdict::Suppressed;
        }

        let published =
            self.publisher
                .try_publish(&*self.channel, FrameType::Heartbeat, self.session_id, &[]);
        let (verdict, cause) = match published {
            Ok(outcome) => {
                let cause = match outcome {
                    PublishOutcome::Fatal(reason) => LivenessCause::Fatal(reason),
                    _ => LivenessCause::MissedHeartbeats,
                };
                (self.state.record(&outcome), cause)
            }
            Err(err) => (self.state.record_fault(), LivenessCause::Encode(err)),
        };

        match verdict {
            HeartbeatVerdict::Alive => debug!(session_id = self.session_id, "heartbeat sent"),
            HeartbeatVerdict::Missed(misses) => debug!(
                session_id = self.session_id,
                misses,
                threshold = self.state.threshold(),
                "heartbeat missed"
            ),
            HeartbeatVerdict::Failed => self.fail(cause),
            HeartbeatVerdict::Suppressed => {}
        }
        verdict
    }

    fn fail(&mut self, cause: LivenessCause) {
        let failure = LivenessFailure {
            session_id: self.session_id,
            misses: self.state.fail_counter(),
            threshold: self.state.threshold(),
            cause,
        };
        warn!(session_id = self.session_id, error = %failure, "liveness failure");

        if self.liveness.complete(failure.clone()) {
            if let Some(hook) = self.on_failure.take() {
                hook(&failure);
            }
        }
    }

    /// Tick every `interval` until cancelled or failed.
    ///
    /// The first tick fires one interval after the call. A late tick is not
    /// made up for; the schedule shifts instead.
    pub async fn run(mut self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.tick() == HeartbeatVerdict::Failed {
                        break;
                    }
                }
            }
        }
        debug!(session_id = self.session_id, "heartbeat stopped");
    }
}

impl<C: Channel + ?Sized> fmt::Debug for HeartbeatSender<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HeartbeatSender")
            .field("session_id", &self.session_id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// One thread driving the heartbeat tasks of every session.
///
/// Clones share the thread. It stops once the last clone and the last
/// [`HeartbeatHandle`] it issued are gone, so dropping the scheduler never
/// silently ends the heartbeats of live sessions.
#[derive(Debug, Clone)]
pub struct HeartbeatScheduler {
    inner: Arc<SchedulerInner>,
}

#[derive(Debug)]
struct SchedulerInner {
    handle: Handle,
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
}

impl HeartbeatScheduler {
    /// Start the scheduler thread.
    pub fn start() -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| SessionError::Scheduler(Arc::new(e)))?;
        let handle = runtime.handle().clone();
        let shutdown = CancellationToken::new();

        let stop = shutdown.clone();
        let thread = std::thread::Builder::new()
            .name("rxwire-heartbeat".to_string())
            .spawn(move || {
                runtime.block_on(stop.cancelled());
                debug!("heartbeat scheduler stopped");
            })
            .map_err(|e| SessionError::Scheduler(Arc::new(e)))?;

        debug!("heartbeat scheduler started");
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                handle,
                shutdown,
                thread: Some(thread),
            }),
        })
    }

    /// Start heartbeats for one session.
    pub fn schedule<C>(
        &self,
        channel: Arc<C>,
        session_id: u64,
        config: &SessionConfig,
    ) -> Result<HeartbeatHandle>
    where
        C: Channel + ?Sized + 'static,
    {
        self.spawn(channel, session_id, config, None)
    }

    /// Start heartbeats for one session, running `hook` on liveness failure.
    ///
    /// The hook runs on the scheduler thread and must not block.
    pub fn schedule_with_hook<C>(
        &self,
        channel: Arc<C>,
        session_id: u64,
        config: &SessionConfig,
        hook: impl FnOnce(&LivenessFailure) + Send + 'static,
    ) -> Result<HeartbeatHandle>
    where
        C: Channel + ?Sized + 'static,
    {
        self.spawn(channel, session_id, config, Some(Box::new(hook)))
    }

    fn spawn<C>(
        &self,
        channel: Arc<C>,
        session_id: u64,
        config: &SessionConfig,
        hook: Option<FailureHook>,
    ) -> Result<HeartbeatHandle>
    where
        C: Channel + ?Sized + 'static,
    {
        config.validate()?;

        let (sink, liveness) = completion();
        let mut sender = HeartbeatSender::new(channel, session_id, config, sink);
        sender.on_failure = hook;

        let cancel = self.inner.shutdown.child_token();
        self.inner
            .handle
            .spawn(sender.run(config.heartbeat_interval, cancel.clone()));
        debug!(
            session_id,
            interval_ms = config.heartbeat_interval.as_millis() as u64,
            "heartbeat scheduled"
        );

        Ok(HeartbeatHandle {
            session_id,
            cancel,
            liveness,
            _scheduler: self.clone(),
        })
    }
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.thread().id() != std::thread::current().id() {
                let _ = thread.join();
            }
        }
    }
}

/// A scheduled heartbeat task. Dropping it un-schedules the task.
#[derive(Debug)]
pub struct HeartbeatHandle {
    session_id: u64,
    cancel: CancellationToken,
    liveness: Completion<LivenessFailure>,
    _scheduler: HeartbeatScheduler,
}

impl HeartbeatHandle {
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// Stop sending heartbeats.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Set once if the session loses liveness.
    pub fn liveness(&self) -> Completion<LivenessFailure> {
        self.liveness.clone()
    }
}

impl Drop for HeartbeatHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
