//! Submission CLI for the emergency dispatch twin simulator.
//!
//! Two modes: single-shot (`edt-client <type> <x> <y> <delay>`) and
//! batch-file (`edt-client -f <file>`, one `<type> <x> <y> <delay>` line
//! per request, malformed lines skipped). Both sleep for the requested
//! delay before sending.

#![forbid(unsafe_code)]

use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::AsyncBufReadExt;
use tokio::net::UnixDatagram;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use edt_common::protocol::{encode_frame, fits_frame_budget};

#[derive(Parser)]
#[command(name = "edt-client")]
#[command(author, version, about = "Submit emergency requests to an edt-dispatchd instance")]
struct Cli {
    /// Path to the message-bus socket bound by edt-dispatchd.
    #[arg(long, default_value = "/tmp/edt-dispatchd/emergenze")]
    socket: PathBuf,

    /// Batch mode: read `<type> <x> <y> <delay>` lines from this file.
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Single-shot mode: emergency type name.
    r#type: Option<String>,

    /// Single-shot mode: grid x coordinate.
    #[arg(allow_hyphen_values = true)]
    x: Option<i32>,

    /// Single-shot mode: grid y coordinate.
    #[arg(allow_hyphen_values = true)]
    y: Option<i32>,

    /// Single-shot mode: seconds to wait before sending.
    delay: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::new("info"))
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.file {
        run_batch(&cli.socket, path).await
    } else if let (Some(r#type), Some(x), Some(y), Some(delay)) = (&cli.r#type, cli.x, cli.y, cli.delay) {
        send_one(&cli.socket, r#type, x, y, delay).await
    } else {
        bail!("usage:\n  edt-client <type> <x> <y> <delay>\n  edt-client -f <file>");
    }
}

async fn run_batch(socket: &std::path::Path, path: &std::path::Path) -> Result<()> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening batch file {}", path.display()))?;
    let mut lines = tokio::io::BufReader::new(file).lines();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split_whitespace();
        let (Some(r#type), Some(x), Some(y), Some(delay)) = (
            parts.next(),
            parts.next().and_then(|v| v.parse::<i32>().ok()),
            parts.next().and_then(|v| v.parse::<i32>().ok()),
            parts.next().and_then(|v| v.parse::<u64>().ok()),
        ) else {
            warn!(line, "skipping malformed batch line");
            continue;
        };
        if parts.next().is_some() {
            warn!(line, "skipping batch line with trailing fields");
            continue;
        }
        send_one(socket, r#type, x, y, delay).await?;
    }
    Ok(())
}

async fn send_one(socket: &std::path::Path, r#type: &str, x: i32, y: i32, delay: u64) -> Result<()> {
    if delay > 0 {
        tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
    }

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before the unix epoch")?
        .as_secs() as i64;
    let frame = encode_frame(r#type, x, y, now);
    if !fits_frame_budget(&frame) {
        bail!("request '{frame}' exceeds the wire frame size budget");
    }

    let client = UnixDatagram::unbound().context("creating client datagram socket")?;
    client
        .send_to(frame.as_bytes(), socket)
        .await
        .with_context(|| format!("sending request to {}", socket.display()))?;

    info!(r#type, x, y, "submitted emergency request");
    Ok(())
}
