use std::fs;
use std::sync::Arc;
use std::time::Instant;

use rxwire_frame::FrameType;
use rxwire_session::{iter_ok, HeartbeatScheduler, MessagePublisher, Session, SessionConfig};
use rxwire_transport::UdpChannel;
use tokio_util::sync::CancellationToken;

use crate::cmd::{install_ctrlc_handler, parse_duration, SendArgs};
use crate::exit::{io_error, session_error, transport_error, CliResult, SUCCESS};
use crate::output::{print_send_summary, OutputFormat, SendSummary};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let config = session_config(&args)?;
    config
        .validate()
        .map_err(|err| session_error("invalid options", err))?;
    let payload = resolve_payload(&args)?;

    let channel = match args.bind {
        Some(bind) => UdpChannel::connect_from(bind, args.peer),
        None => UdpChannel::connect(args.peer),
    }
    .map_err(|err| transport_error("connect failed", err))?;
    let channel = Arc::new(channel);

    let scheduler =
        HeartbeatScheduler::start().map_err(|err| session_error("scheduler failed", err))?;
    let session = Session::open(Arc::clone(&channel), args.session_id, &config, &scheduler)
        .map_err(|err| session_error("session open failed", err))?;

    let canceller = session.canceller();
    install_ctrlc_handler(move || {
        canceller.cancel();
    })?;

    let started = Instant::now();
    let items = (0..args.count).map(move |_| payload.clone());
    let stats = session
        .run(iter_ok(items))
        .map_err(|err| session_error("send failed", err))?;

    MessagePublisher::new(&config)
        .publish_blocking(
            &*channel,
            FrameType::Complete,
            args.session_id,
            &[],
            &CancellationToken::new(),
        )
        .map_err(|err| {
            session_error(
                "completion failed",
                err.into_session_error(args.session_id),
            )
        })?;
    tracing::debug!(session_id = args.session_id, "sent completion frame");

    let elapsed_ms = started.elapsed().as_millis() as u64;
    print_send_summary(
        &SendSummary::new(args.session_id, args.peer, stats, elapsed_ms),
        format,
    );
    Ok(SUCCESS)
}

fn session_config(args: &SendArgs) -> CliResult<SessionConfig> {
    Ok(SessionConfig {
        heartbeat_interval: parse_duration(&args.heartbeat_interval)?,
        connect_timeout: parse_duration(&args.connect_timeout)?,
        backpressure_timeout: parse_duration(&args.backpressure_timeout)?,
        ..SessionConfig::default()
    })
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    if let Some(size) = args.size {
        return Ok(synthetic_payload(size));
    }
    Ok(Vec::new())
}

fn synthetic_payload(size: usize) -> Vec<u8> {
    (b'a'..=b'z').cycle().take(size).collect()
}
