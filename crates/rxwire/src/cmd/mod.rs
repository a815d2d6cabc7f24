use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod listen;
pub mod send;
pub mod throughput;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Stream payloads to a peer as one session.
    Send(SendArgs),
    /// Bind a socket and print received frames.
    Listen(ListenArgs),
    /// Bind a socket and report the receive rate.
    Throughput(ThroughputArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Throughput(args) => throughput::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Peer address to send to.
    pub peer: SocketAddr,
    /// Local address to send from. Default: ephemeral port.
    #[arg(long)]
    pub bind: Option<SocketAddr>,
    /// Session id stamped on every frame.
    #[arg(long, default_value = "1")]
    pub session_id: u64,
    /// Raw string payload.
    #[arg(long, conflicts_with_all = ["file", "size"])]
    pub data: Option<String>,
    /// Read payload from file.
    #[arg(long, conflicts_with_all = ["data", "size"])]
    pub file: Option<PathBuf>,
    /// Synthetic payload of this many bytes.
    #[arg(long, conflicts_with_all = ["data", "file"])]
    pub size: Option<usize>,
    /// Number of times the payload is sent.
    #[arg(long, default_value = "1")]
    pub count: u64,
    /// Heartbeat period (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub heartbeat_interval: String,
    /// How long to wait for a reachable peer (0 fails fast).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// How long a back-pressured frame is retried (0 tries once).
    #[arg(long, default_value = "5s")]
    pub backpressure_timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Local address to bind.
    pub bind: SocketAddr,
    /// Only print frames of this session.
    #[arg(long)]
    pub session_id: Option<u64>,
    /// Print heartbeat frames too.
    #[arg(long)]
    pub heartbeats: bool,
    /// Exit after printing N frames.
    #[arg(long)]
    pub count: Option<usize>,
    /// Exit with a timeout error if nothing arrives for this long (e.g. 5s, 500ms).
    #[arg(long)]
    pub timeout: Option<String>,
}

#[derive(Args, Debug)]
pub struct ThroughputArgs {
    /// Local address to bind.
    pub bind: SocketAddr,
    /// Sliding average window in seconds.
    #[arg(long, default_value = "5")]
    pub window: u64,
    /// Stop after this many reports.
    #[arg(long)]
    pub reports: Option<u64>,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse `500ms`, `2s` or a bare number of seconds.
pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

/// Flag cleared by Ctrl-C.
pub fn install_ctrlc_handler(
    on_interrupt: impl Fn() + Send + 'static,
) -> CliResult<Arc<AtomicBool>> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || {
        flag.store(false, Ordering::SeqCst);
        on_interrupt();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    Ok(running)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_duration_seconds_and_millis() {
        assert_eq!(parse_duration("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_duration("150ms").unwrap(), Duration::from_millis(150));
        assert_eq!(parse_duration("3").unwrap(), Duration::from_secs(3));
        assert_eq!(parse_duration("0ms").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_duration_rejects_invalid_values() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("bad").is_err());
        assert!(parse_duration("-1s").is_err());
    }
}
