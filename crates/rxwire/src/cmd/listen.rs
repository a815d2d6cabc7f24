use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use rxwire_frame::{decode_frame, Frame, FrameType};
use rxwire_transport::UdpChannel;

use crate::cmd::{install_ctrlc_handler, parse_duration, ListenArgs};
use crate::exit::{transport_error, CliError, CliResult, SUCCESS, TIMEOUT};
use crate::output::{print_frame, OutputFormat};

const IDLE_POLL: Duration = Duration::from_millis(1);

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let idle_timeout = args.timeout.as_deref().map(parse_duration).transpose()?;
    let channel = UdpChannel::bind(args.bind).map_err(|err| transport_error("bind failed", err))?;
    let running = install_ctrlc_handler(|| {})?;

    let mut printed = 0usize;
    let mut last_datagram = Instant::now();

    while running.load(Ordering::SeqCst) {
        let Some((raw, from)) = channel.try_poll_from() else {
            if let Some(timeout) = idle_timeout {
                if last_datagram.elapsed() >= timeout {
                    return Err(CliError::new(
                        TIMEOUT,
                        format!("no datagram received within {timeout:?}"),
                    ));
                }
            }
            thread::sleep(IDLE_POLL);
            continue;
        };
        last_datagram = Instant::now();

        let frame = match decode_frame(raw) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(%from, error = %err, "dropping undecodable datagram");
                continue;
            }
        };
        if !wanted(&args, &frame) {
            continue;
        }

        print_frame(&frame, from, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                return Ok(SUCCESS);
            }
        }
    }

    Ok(SUCCESS)
}

fn wanted(args: &ListenArgs, frame: &Frame) -> bool {
    if frame.frame_type == FrameType::Heartbeat && !args.heartbeats {
        return false;
    }
    args.session_id.map_or(true, |id| id == frame.session_id)
}
