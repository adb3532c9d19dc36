// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! A configurable mock language server for framing tests.
//!
//! Writes Content-Length frames to stdout the way a real server would,
//! including the awkward cases: payloads that dribble out over time, frames
//! that arrive back to back, and stray bytes after the last frame. In echo
//! mode it reads frames from stdin and writes each payload back.
//! No tokio: plain blocking `std::io`.

use std::io::{Read, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::BytesMut;
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use lsp_stdio::stdio::{Decoded, decode_frame, encode_frame};

/// Mock framing peer for integration testing.
#[derive(Parser, Debug)]
#[command(name = "mockls")]
struct Args {
    /// Wait before writing anything (milliseconds).
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,

    /// Payload of a single frame written in `--repeats` pieces.
    #[arg(long)]
    message: Option<String>,

    /// How many times `--message` is repeated inside its frame.
    #[arg(long, default_value_t = 1)]
    repeats: usize,

    /// Pause before each piece of `--message` (milliseconds).
    #[arg(long, default_value_t = 0)]
    interval_ms: u64,

    /// Write stray bytes after the `--message` frame.
    #[arg(long)]
    add_excess: bool,

    /// Complete frames written back to back (repeatable).
    #[arg(long = "frame")]
    frames: Vec<String>,

    /// Echo every frame read from stdin back to stdout, until stdin closes.
    #[arg(long)]
    echo: bool,

    /// Keep stdout open this long after writing (milliseconds).
    #[arg(long, default_value_t = 0)]
    linger_ms: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("mockls=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut stdout = std::io::stdout().lock();

    sleep_ms(args.delay_ms);

    if let Some(message) = &args.message {
        write_dribbled(&mut stdout, message, &args)?;
    }

    if !args.frames.is_empty() {
        let mut burst = Vec::new();
        for frame in &args.frames {
            burst.extend_from_slice(&encode_frame(frame));
        }
        stdout.write_all(&burst).context("Failed to write frames")?;
        stdout.flush()?;
    }

    if args.echo {
        echo(&mut std::io::stdin().lock(), &mut stdout)?;
    }

    sleep_ms(args.linger_ms);
    Ok(())
}

/// Writes one frame whose payload is `message` repeated, one repeat at a time.
fn write_dribbled(out: &mut impl Write, message: &str, args: &Args) -> Result<()> {
    let length = message.len() * args.repeats;

    // Each header line ends in \r\n and the block ends with another \r\n
    write!(out, "Content-Length: {length}\r\n\r\n")?;
    out.flush()?;

    for _ in 0..args.repeats {
        sleep_ms(args.interval_ms);
        out.write_all(message.as_bytes())?;
        out.flush()?;
    }

    if args.add_excess {
        out.write_all(b"extra")?;
    }
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

/// Reads frames from `input` and writes each payload back as a new frame.
fn echo(input: &mut impl Read, out: &mut impl Write) -> Result<()> {
    let mut buffer = BytesMut::new();
    let mut temp = [0u8; 4096];

    loop {
        match input.read(&mut temp) {
            Ok(0) => break,
            Ok(n) => buffer.extend_from_slice(&temp[..n]),
            Err(e) => {
                warn!("mockls: stdin read failed: {e}");
                break;
            }
        }

        while !buffer.is_empty() {
            let before = buffer.len();
            match decode_frame(&mut buffer) {
                Decoded::Frame(frame) => {
                    debug!("mockls: echoing {} bytes", frame.payload.len());
                    out.write_all(&encode_frame(&frame.payload))?;
                    out.flush()?;
                }
                Decoded::Empty => debug!("mockls: skipping empty frame"),
                Decoded::Invalid(e) => warn!("mockls: skipping bad frame: {e}"),
                // Blank lines are consumed one at a time; otherwise wait for more input
                Decoded::NoDataYet if buffer.len() < before => {}
                Decoded::NoDataYet => break,
            }
        }
    }

    Ok(())
}

fn sleep_ms(ms: u64) {
    if ms > 0 {
        std::thread::sleep(Duration::from_millis(ms));
    }
}
