use std::collections::VecDeque;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use rxwire_frame::{decode_frame, FrameType};
use rxwire_transport::UdpChannel;

use crate::cmd::{install_ctrlc_handler, ThroughputArgs};
use crate::exit::{transport_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_rate, OutputFormat, RateOutput};

const REPORT_INTERVAL: Duration = Duration::from_secs(1);
const IDLE_POLL: Duration = Duration::from_millis(1);
const MB: u64 = 1024 * 1024;

/// Per-second receive rate plus a sliding-window average.
struct ThroughputMeter {
    window: Duration,
    samples: VecDeque<(Instant, u64)>,
    since_report: u64,
    frames: u64,
}

impl ThroughputMeter {
    fn new(window: Duration) -> Self {
        Self {
            window,
            samples: VecDeque::new(),
            since_report: 0,
            frames: 0,
        }
    }

    fn record(&mut self, at: Instant, size: u64) {
        self.samples.push_back((at, size));
        self.since_report += size;
        self.frames += 1;
    }

    fn report(&mut self, now: Instant) -> RateOutput {
        if let Some(cutoff) = now.checked_sub(self.window) {
            while self.samples.front().is_some_and(|(at, _)| *at < cutoff) {
                self.samples.pop_front();
            }
        }
        let total: u64 = self.samples.iter().map(|(_, size)| size).sum();
        let window_secs = self.window.as_secs().max(1);

        RateOutput {
            rate_mb: std::mem::take(&mut self.since_report) / MB,
            window_secs,
            window_avg_mb: total / MB / window_secs,
            frames: self.frames,
        }
    }
}

pub fn run(args: ThroughputArgs, format: OutputFormat) -> CliResult<i32> {
    if args.window == 0 {
        return Err(CliError::new(USAGE, "--window must be greater than zero"));
    }

    let channel = UdpChannel::bind(args.bind).map_err(|err| transport_error("bind failed", err))?;
    let running = install_ctrlc_handler(|| {})?;

    let mut meter = ThroughputMeter::new(Duration::from_secs(args.window));
    let mut next_report = Instant::now() + REPORT_INTERVAL;
    let mut reports = 0u64;

    while running.load(Ordering::SeqCst) {
        match channel.try_poll_from() {
            Some((raw, _)) => {
                if let Ok(frame) = decode_frame(raw) {
                    if frame.frame_type == FrameType::Next {
                        meter.record(Instant::now(), frame.payload.len() as u64);
                    }
                }
            }
            None => thread::sleep(IDLE_POLL),
        }

        let now = Instant::now();
        if now >= next_report {
            print_rate(&meter.report(now), format);
            next_report += REPORT_INTERVAL;
            reports += 1;
            if args.reports.is_some_and(|limit| reports >= limit) {
                break;
            }
        }
    }

    Ok(SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_resets_between_reports() {
        let start = Instant::now();
        let mut meter = ThroughputMeter::new(Duration::from_secs(5));
        meter.record(start, 3 * MB);

        let first = meter.report(start + Duration::from_secs(1));
        assert_eq!(first.rate_mb, 3);
        let second = meter.report(start + Duration::from_secs(2));
        assert_eq!(second.rate_mb, 0);
        assert_eq!(second.frames, 1);
    }

    #[test]
    fn window_average_drops_old_samples() {
        let start = Instant::now();
        let mut meter = ThroughputMeter::new(Duration::from_secs(2));
        meter.record(start, 8 * MB);
        meter.record(start + Duration::from_secs(3), 4 * MB);

        let report = meter.report(start + Duration::from_secs(4));
        assert_eq!(report.window_avg_mb, 2);
        assert_eq!(meter.samples.len(), 1);
    }
}
