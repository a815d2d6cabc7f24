use std::sync::Arc;

use rxwire_transport::Channel;
use tracing::info;

use crate::completion::Completion;
use crate::config::SessionConfig;
use crate::error::{Result, SessionError};
use crate::heartbeat::{HeartbeatHandle, HeartbeatScheduler, LivenessFailure};
use crate::sequencer::{Canceller, SequenceStats, Termination, WriteSequencer};
use crate::source::DemandSource;

/// One logical stream over a shared channel.
///
/// Owns the stream's write sequencer and heartbeat task. Whichever of the two
/// reaches a terminal state first tears the other down: a liveness failure
/// terminates the write stream with [`SessionError::Liveness`], and the end
/// of the write stream un-schedules the heartbeat.
#[derive(Debug)]
pub struct Session<C: Channel + ?Sized + 'static> {
    session_id: u64,
    sequencer: WriteSequencer<C>,
    heartbeat: HeartbeatHandle,
}

impl<C: Channel + ?Sized + 'static> Session<C> {
    /// Open a session and start its heartbeats.
    pub fn open(
        channel: Arc<C>,
        session_id: u64,
        config: &SessionConfig,
        scheduler: &HeartbeatScheduler,
    ) -> Result<Self> {
        config.validate()?;

        let sequencer = WriteSequencer::new(Arc::clone(&channel), session_id, config);
        let canceller = sequencer.canceller();
        let heartbeat =
            scheduler.schedule_with_hook(channel, session_id, config, move |failure| {
                canceller.terminate(Err(SessionError::Liveness(failure.clone())));
            })?;

        info!(session_id, "session opened");
        Ok(Self {
            session_id,
            sequencer,
            heartbeat,
        })
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// The liveness signal, separate from the data-path termination.
    pub fn liveness(&self) -> Completion<LivenessFailure> {
        self.heartbeat.liveness()
    }

    pub fn termination(&self) -> Completion<Termination> {
        self.sequencer.termination()
    }

    pub fn canceller(&self) -> Canceller {
        self.sequencer.canceller()
    }

    /// Publish everything `source` produces, then close the session.
    pub fn run<S: DemandSource>(mut self, source: S) -> Result<SequenceStats> {
        let result = self.sequencer.run(source);
        self.close(&result);
        result
    }

    /// Publish everything `stream` produces, then close the session.
    #[cfg(feature = "async")]
    pub async fn run_stream<S, T, E>(mut self, stream: S) -> Result<SequenceStats>
    where
        S: futures_core::Stream<Item = std::result::Result<T, E>>,
        T: Into<bytes::Bytes>,
        E: std::error::Error + Send + Sync + 'static,
    {
        let result = self.sequencer.run_stream(stream).await;
        self.close(&result);
        result
    }

    fn close(&self, result: &Result<SequenceStats>) {
        self.heartbeat.cancel();
        match result {
            Ok(stats) => info!(
                session_id = self.session_id,
                frames = stats.frames,
                bytes = stats.bytes,
                "session completed"
            ),
            Err(err) => info!(session_id = self.session_id, error = %err, "session closed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rxwire_transport::MemoryChannel;

    use super::*;
    use crate::source::iter_ok;

    #[test]
    fn open_rejects_invalid_config() {
        let scheduler = HeartbeatScheduler::start().unwrap();
        let config = SessionConfig {
            heartbeat_miss_threshold: 0,
            ..SessionConfig::default()
        };

        let err = Session::open(Arc::new(MemoryChannel::new()), 1, &config, &scheduler)
            .unwrap_err();
        assert!(matches!(err, SessionError::InvalidConfig(_)));
    }

    #[test]
    fn completed_run_unschedules_heartbeat() {
        let scheduler = HeartbeatScheduler::start().unwrap();
        let channel = Arc::new(MemoryChannel::new());
        let config = SessionConfig {
            heartbeat_interval: Duration::from_millis(5),
            ..SessionConfig::default()
        };

        let session = Session::open(Arc::clone(&channel), 9, &config, &scheduler).unwrap();
        let liveness = session.liveness();
        let stats = session.run(iter_ok(["a", "b"])).unwrap();
        assert_eq!(stats.frames, 2);

        std::thread::sleep(Duration::from_millis(20));
        let attempts = channel.offer_attempts();
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(channel.offer_attempts(), attempts);
        assert!(!liveness.is_complete());
    }
}
