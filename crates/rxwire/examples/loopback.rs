//! Run one session over an in-process loopback channel and print what arrived.
//!
//! Run with:
//!   cargo run --example loopback

use std::sync::Arc;
use std::time::Duration;

use rxwire::frame::{decode_frame, FrameType};
use rxwire::session::{iter_ok, HeartbeatScheduler, Session, SessionConfig};
use rxwire::transport::{Channel, MemoryChannel, OfferStatus};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let channel = Arc::new(MemoryChannel::new());
    // One hiccup on the way: the first offer is back-pressured and retried.
    channel.inject(OfferStatus::BackPressured);

    let scheduler = HeartbeatScheduler::start()?;
    let config = SessionConfig {
        heartbeat_interval: Duration::from_millis(100),
        ..SessionConfig::default()
    };
    let session = Session::open(Arc::clone(&channel), 42, &config, &scheduler)?;

    let stats = session.run(iter_ok(["alpha", "beta", "gamma"]))?;
    eprintln!(
        "Sent {} frames ({} bytes) in {} offers",
        stats.frames,
        stats.bytes,
        channel.offer_attempts()
    );

    while let Some(raw) = channel.try_poll() {
        let frame = decode_frame(raw)?;
        if frame.frame_type == FrameType::Next {
            eprintln!(
                "session {} {}: {}",
                frame.session_id,
                frame.frame_type,
                String::from_utf8_lossy(&frame.payload)
            );
        }
    }

    Ok(())
}
