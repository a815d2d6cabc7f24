//! Two sessions sharing one UDP socket, received on a second socket.
//!
//! Run with:
//!   cargo run --example udp-session
//!
//! Or receive with the CLI in another terminal:
//!   cargo run --features cli -- listen 127.0.0.1:40123 --format pretty

use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rxwire::frame::{decode_frame, FrameType};
use rxwire::session::{iter_ok, HeartbeatScheduler, Session, SessionConfig};
use rxwire::transport::UdpChannel;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let receiver = UdpChannel::bind("127.0.0.1:0".parse()?)?;
    let channel = Arc::new(UdpChannel::connect(receiver.local_addr())?);
    eprintln!("Sending {} -> {}", channel.local_addr(), receiver.local_addr());

    let scheduler = HeartbeatScheduler::start()?;
    let config = SessionConfig {
        heartbeat_interval: Duration::from_millis(200),
        ..SessionConfig::default()
    };

    let mut writers = Vec::new();
    for session_id in [1u64, 2] {
        let session = Session::open(Arc::clone(&channel), session_id, &config, &scheduler)?;
        writers.push(thread::spawn(move || {
            let items = (0..5).map(move |i| format!("session {session_id} item {i}"));
            session.run(iter_ok(items))
        }));
    }
    for writer in writers {
        let stats = writer.join().map_err(|_| "writer thread panicked")??;
        eprintln!("Writer done: {} frames", stats.frames);
    }

    let mut received: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    let deadline = Instant::now() + Duration::from_secs(1);
    while Instant::now() < deadline {
        let Some((raw, _from)) = receiver.try_poll_from() else {
            thread::sleep(Duration::from_millis(5));
            continue;
        };
        let frame = decode_frame(raw)?;
        if frame.frame_type == FrameType::Next {
            received
                .entry(frame.session_id)
                .or_default()
                .push(String::from_utf8_lossy(&frame.payload).into_owned());
        }
    }

    for (session_id, items) in received {
        eprintln!("session {session_id}: {items:?}");
    }
    Ok(())
}
