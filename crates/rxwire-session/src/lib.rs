//! Ordered, flow-controlled, liveness-monitored sessions over rxwire channels.
//!
//! This is the core of rxwire. It turns the non-blocking "offer a frame"
//! primitive into logical streams:
//! - [`MessagePublisher`] interprets offer statuses and owns the retry policy
//! - [`WriteSequencer`] keeps exactly one publish in flight, in source order
//! - [`HeartbeatSender`] proves liveness and detects a dead peer
//! - [`Session`] wires both to one session id and one shared channel
//!
//! Every outcome reaches the stream's [`Completion`] exactly once.

pub mod completion;
pub mod config;
pub mod error;
pub mod heartbeat;
pub mod publisher;
pub mod retry;
pub mod sequencer;
pub mod session;
pub mod source;

pub use completion::{completion, Completion, CompletionSink};
pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use heartbeat::{
    HeartbeatHandle, HeartbeatScheduler, HeartbeatSender, HeartbeatState, HeartbeatVerdict,
    LivenessCause, LivenessFailure, DEFAULT_MISS_THRESHOLD,
};
pub use publisher::{FatalReason, MessagePublisher, PublishError, PublishOutcome, RetryReason};
pub use retry::{RetryStep, RetryWindow};
pub use sequencer::{Canceller, SequenceStats, SequencerState, Termination, WriteSequencer};
pub use session::Session;
pub use source::{
    demand_channel, iter_ok, iter_source, DemandReceiver, DemandSender, DemandSource,
    IterSource, OkIter, SendError, Signal,
};
