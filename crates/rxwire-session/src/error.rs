use std::sync::Arc;

use rxwire_frame::FrameError;

use crate::heartbeat::LivenessFailure;
use crate::publisher::FatalReason;

/// Errors that terminate a session or keep one from starting.
///
/// Cloneable so one terminal signal can be observed by every waiter.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    /// A frame could not be encoded. Never retried.
    #[error("failed to encode frame for session {session_id}: {source}")]
    Encode {
        session_id: u64,
        source: FrameError,
    },

    /// The channel failed for good, or a transient condition outlived its timeout.
    #[error("failed to publish into session {session_id}: {reason}")]
    Publish {
        session_id: u64,
        #[source]
        reason: FatalReason,
    },

    /// The payload source signalled an error.
    #[error("upstream failed for session {session_id}: {source}")]
    Upstream {
        session_id: u64,
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// The peer stopped answering heartbeats, or the heartbeat path failed.
    #[error(transparent)]
    Liveness(#[from] LivenessFailure),

    /// The session was cancelled by its owner.
    #[error("session {session_id} cancelled")]
    Cancelled { session_id: u64 },

    /// The session configuration is unusable.
    #[error("invalid session config: {0}")]
    InvalidConfig(String),

    /// The heartbeat scheduler thread could not be started.
    #[error("heartbeat scheduler failed to start: {0}")]
    Scheduler(Arc<std::io::Error>),
}

impl SessionError {
    /// The session this error belongs to, if it is session-scoped.
    pub fn session_id(&self) -> Option<u64> {
        match self {
            Self::Encode { session_id, .. }
            | Self::Publish { session_id, .. }
            | Self::Upstream { session_id, .. }
            | Self::Cancelled { session_id } => Some(*session_id),
            Self::Liveness(failure) => Some(failure.session_id),
            Self::InvalidConfig(_) | Self::Scheduler(_) => None,
        }
    }

    /// True if the session ended because its owner cancelled it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
