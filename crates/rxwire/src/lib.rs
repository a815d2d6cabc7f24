//! Ordered, flow-controlled, liveness-monitored sessions over non-blocking channels.
//!
//! Many logical streams share one channel. Each stream is a session: its
//! frames carry the session id, its writes go out one at a time in source
//! order, and a periodic heartbeat tells it when the peer has gone away.
//!
//! # Crate Structure
//!
//! - [`transport`]: channel abstraction with non-blocking offer (UDP, in-process loopback)
//! - [`frame`]: fixed-header frame codec tagging every message with its session id
//! - [`session`]: retrying publisher, write sequencer, heartbeats and the session coordinator

/// Re-export transport types.
pub mod transport {
    pub use rxwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rxwire_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use rxwire_session::*;
}
