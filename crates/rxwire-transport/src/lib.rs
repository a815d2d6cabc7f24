//! Non-blocking channel abstraction for rxwire.
//!
//! The primitive operation is "offer one complete frame", which never blocks
//! and answers with an [`OfferStatus`] instead:
//! - UDP datagram sockets ([`UdpChannel`])
//! - In-process loopback with fault injection ([`MemoryChannel`])
//!
//! This is the lowest layer of rxwire. Retrying, framing and liveness are
//! built on top of the [`Channel`] trait provided here.

pub mod error;
pub mod memory;
pub mod status;
pub mod traits;
pub mod udp;

pub use error::{Result, TransportError};
pub use memory::MemoryChannel;
pub use status::OfferStatus;
pub use traits::Channel;
pub use udp::UdpChannel;
