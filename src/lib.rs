// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Framing layer for Language Server Protocol stdio pipes.
//!
//! Turns the raw byte stream of a language server's stdout into a queue of
//! decoded messages, and a queue of outbound messages into Content-Length
//! frames on its stdin. Reading never blocks on an idle server: empty polls
//! back off exponentially between 50ms and 2s by default.

/// Framing configuration.
pub mod config;
/// Error types for decoding and stream I/O.
pub mod error;
/// Frame reader, frame writer and the queues between them and the driver.
pub mod stdio;

pub use config::Config;
pub use error::{DecodeError, FramingError, QueueClosed};
pub use stdio::{Channel, FrameReader, FrameWriter};
