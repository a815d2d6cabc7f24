use std::io::{IsTerminal, Write};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rxwire_frame::Frame;
use rxwire_session::SequenceStats;
use serde::Serialize;

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

#[derive(Serialize)]
struct FrameOutput<'a> {
    frame_type: &'a str,
    session_id: u64,
    payload_size: usize,
    payload: String,
    from: String,
    timestamp: String,
}

pub fn print_frame(frame: &Frame, from: SocketAddr, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let out = FrameOutput {
                frame_type: frame.frame_type.name(),
                session_id: frame.session_id,
                payload_size: frame.payload.len(),
                payload: payload_preview(&frame.payload),
                from: from.to_string(),
                timestamp: now_unix_seconds(),
            };
            print_json(&out);
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["TYPE", "SESSION", "SIZE", "FROM", "PAYLOAD"])
                .add_row(vec![
                    frame.frame_type.name().to_string(),
                    frame.session_id.to_string(),
                    frame.payload.len().to_string(),
                    from.to_string(),
                    payload_preview(&frame.payload),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "{} session={} size={} from={} payload={}",
                frame.frame_type,
                frame.session_id,
                frame.payload.len(),
                from,
                payload_preview(&frame.payload)
            );
        }
        OutputFormat::Raw => print_raw(&frame.payload),
    }
}

#[derive(Serialize)]
pub struct SendSummary {
    pub session_id: u64,
    pub peer: String,
    pub frames: u64,
    pub bytes: u64,
    pub position: u64,
    pub elapsed_ms: u64,
}

impl SendSummary {
    pub fn new(session_id: u64, peer: SocketAddr, stats: SequenceStats, elapsed_ms: u64) -> Self {
        Self {
            session_id,
            peer: peer.to_string(),
            frames: stats.frames,
            bytes: stats.bytes,
            position: stats.position,
            elapsed_ms,
        }
    }
}

pub fn print_send_summary(summary: &SendSummary, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(summary),
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_header(vec!["SESSION", "PEER", "FRAMES", "BYTES", "ELAPSED"])
                .add_row(vec![
                    summary.session_id.to_string(),
                    summary.peer.clone(),
                    summary.frames.to_string(),
                    summary.bytes.to_string(),
                    format!("{}ms", summary.elapsed_ms),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty | OutputFormat::Raw => {
            println!(
                "session={} peer={} frames={} bytes={} elapsed={}ms",
                summary.session_id,
                summary.peer,
                summary.frames,
                summary.bytes,
                summary.elapsed_ms
            );
        }
    }
}

#[derive(Serialize)]
pub struct RateOutput {
    pub rate_mb: u64,
    pub window_secs: u64,
    pub window_avg_mb: u64,
    pub frames: u64,
}

pub fn print_rate(rate: &RateOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(rate),
        _ => println!(
            "Rate: {} MB/s, {}s avg rate: {} MB/s ({} frames)",
            rate.rate_mb, rate.window_secs, rate.window_avg_mb, rate.frames
        ),
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

fn payload_preview(payload: &[u8]) -> String {
    match std::str::from_utf8(payload) {
        Ok(text) => text.to_string(),
        Err(_) => format!("<binary {} bytes>", payload.len()),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
