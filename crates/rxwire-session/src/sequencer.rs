use std::sync::Arc;

use bytes::Bytes;
use rxwire_frame::FrameType;
use rxwire_transport::Channel;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::completion::{completion, Completion, CompletionSink};
use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::publisher::MessagePublisher;
use crate::source::{DemandSource, Signal};

/// Terminal signal of a write stream.
pub type Termination = Result<(), SessionError>;

/// Where the sequencer is in its publish cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// Created, not yet running.
    Idle,
    /// One unit of demand is outstanding.
    AwaitingItem,
    /// One frame is being published.
    Publishing,
    /// Finished. Absorbing.
    Terminated,
}

/// Counters for a finished (or running) write stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SequenceStats {
    /// NEXT frames confirmed sent.
    pub frames: u64,
    /// Payload bytes confirmed sent.
    pub bytes: u64,
    /// Channel position after the last confirmed frame.
    pub position: u64,
}

/// Ends a write stream from any thread without blocking.
///
/// The first terminal value written wins; whatever the sequencer produces
/// afterwards is discarded.
#[derive(Debug, Clone)]
pub struct Canceller {
    session_id: u64,
    token: CancellationToken,
    sink: CompletionSink<Termination>,
}

impl Canceller {
    /// Record `result` as the stream's terminal signal and stop the sequencer.
    ///
    /// Returns `false` if the stream had already terminated.
    pub fn terminate(&self, result: Termination) -> bool {
        let won = self.sink.complete(result);
        self.token.cancel();
        won
    }

    /// Terminate with [`SessionError::Cancelled`].
    pub fn cancel(&self) -> bool {
        self.terminate(Err(SessionError::Cancelled {
            session_id: self.session_id,
        }))
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Pumps a demand-driven source into a channel, one frame in flight at a time.
///
/// The next item is requested only after the previous frame is confirmed
/// sent, so frames reach the channel in source order with no concurrent
/// offers from this session. Any fatal publish result ends the stream.
#[derive(Debug)]
pub struct WriteSequencer<C: Channel + ?Sized> {
    channel: Arc<C>,
    session_id: u64,
    publisher: MessagePublisher,
    state: SequencerState,
    stats: SequenceStats,
    token: CancellationToken,
    sink: CompletionSink<Termination>,
    termination: Completion<Termination>,
}

impl<C: Channel + ?Sized> WriteSequencer<C> {
    pub fn new(channel: Arc<C>, session_id: u64, config: &SessionConfig) -> Self {
        let (sink, termination) = completion();
        Self {
            channel,
            session_id,
            publisher: MessagePublisher::new(config),
            state: SequencerState::Idle,
            stats: SequenceStats::default(),
            token: CancellationToken::new(),
            sink,
            termination,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    pub fn stats(&self) -> SequenceStats {
        self.stats
    }

    /// A handle that can end this stream from another thread.
    pub fn canceller(&self) -> Canceller {
        Canceller {
            session_id: self.session_id,
            token: self.token.clone(),
            sink: self.sink.clone(),
        }
    }

    /// The stream's terminal signal, set exactly once.
    pub fn termination(&self) -> Completion<Termination> {
        self.termination.clone()
    }

    /// Drive `source` to its end on the calling thread.
    ///
    /// Blocks while a publish waits out back-pressure. The source's
    /// subscription is released on every exit path.
    pub fn run<S: DemandSource>(&mut self, mut source: S) -> Result<SequenceStats, SessionError> {
        if self.state == SequencerState::Terminated {
            source.cancel();
            return self.outcome();
        }

        debug!(session_id = self.session_id, "write sequence started");
        self.state = SequencerState::AwaitingItem;

        let outcome = loop {
            if self.token.is_cancelled() {
                break None;
            }

            let payload = match source.request(&self.token) {
                None => break None,
                Some(Signal::Complete) => break Some(Ok(())),
                Some(Signal::Error(err)) => break Some(Err(self.upstream(err))),
                Some(Signal::Next(payload)) => payload,
            };

            self.state = SequencerState::Publishing;
            let result = self.publisher.publish_blocking(
                &*self.channel,
                FrameType::Next,
                self.session_id,
                &payload,
                &self.token,
            );
            match result {
                Ok(position) => self.sent(&payload, position),
                Err(_) if self.token.is_cancelled() => break None,
                Err(err) => break Some(Err(err.into_session_error(self.session_id))),
            }
        };

        source.cancel();
        self.finish(outcome)
    }

    /// Drive a stream of payloads to its end.
    ///
    /// Each poll of the stream is one unit of demand. The stream is dropped
    /// before this returns.
    #[cfg(feature = "async")]
    pub async fn run_stream<S, T, E>(&mut self, stream: S) -> Result<SequenceStats, SessionError>
    where
        S: futures_core::Stream<Item = Result<T, E>>,
        T: Into<Bytes>,
        E: std::error::Error + Send + Sync + 'static,
    {
        if self.state == SequencerState::Terminated {
            return self.outcome();
        }

        debug!(session_id = self.session_id, "write stream started");
        self.state = SequencerState::AwaitingItem;
        let token = self.token.clone();

        let outcome = {
            let mut stream = std::pin::pin!(stream);
            loop {
                let next = tokio::select! {
                    biased;
                    _ = token.cancelled() => break None,
                    next = std::future::poll_fn(|cx| stream.as_mut().poll_next(cx)) => next,
                };

                let payload: Bytes = match next {
                    None => break Some(Ok(())),
                    Some(Err(err)) => break Some(Err(self.upstream(err))),
                    Some(Ok(payload)) => payload.into(),
                };

                self.state = SequencerState::Publishing;
                let result = self
                    .publisher
                    .publish_async(
                        &*self.channel,
                        FrameType::Next,
                        self.session_id,
                        &payload,
                        &token,
                    )
                    .await;
                match result {
                    Ok(position) => self.sent(&payload, position),
                    Err(_) if token.is_cancelled() => break None,
                    Err(err) => break Some(Err(err.into_session_error(self.session_id))),
                }
            }
        };

        self.finish(outcome)
    }

    fn upstream<E: std::error::Error + Send + Sync + 'static>(&self, err: E) -> SessionError {
        SessionError::Upstream {
            session_id: self.session_id,
            source: Arc::new(err),
        }
    }

    fn sent(&mut self, payload: &Bytes, position: u64) {
        self.stats.frames += 1;
        self.stats.bytes += payload.len() as u64;
        self.stats.position = position;
        self.state = SequencerState::AwaitingItem;
        trace!(session_id = self.session_id, position, "frame confirmed");
    }

    fn finish(&mut self, outcome: Option<Termination>) -> Result<SequenceStats, SessionError> {
        self.state = SequencerState::Terminated;
        let result = outcome.unwrap_or(Err(SessionError::Cancelled {
            session_id: self.session_id,
        }));
        self.sink.complete(result);
        self.token.cancel();
        self.outcome()
    }

    fn outcome(&self) -> Result<SequenceStats, SessionError> {
        let termination = self.termination.try_get().unwrap_or(Err(SessionError::Cancelled {
            session_id: self.session_id,
        }));
        match termination {
            Ok(()) => {
                debug!(
                    session_id = self.session_id,
                    frames = self.stats.frames,
                    bytes = self.stats.bytes,
                    "write sequence completed"
                );
                Ok(self.stats)
            }
            Err(err) => {
                if err.is_cancelled() {
                    debug!(session_id = self.session_id, "write sequence cancelled");
                } else {
                    warn!(session_id = self.session_id, error = %err, "write sequence failed");
                }
                Err(err)
            }
        }
    }
}
