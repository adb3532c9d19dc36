// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

/// Idle-read backoff policy.
pub mod backoff;
/// Driver-facing wiring of a reader and a writer over one duplex stream.
pub mod channel;
/// Content-Length frame encoding and decoding.
pub mod frame;
/// Stream handle and the shared closed flag.
pub mod handle;
/// Join-able FIFO message queues.
pub mod queue;
/// Non-blocking frame reader loop.
pub mod reader;
/// Queue-driven frame writer loop.
pub mod writer;

pub use backoff::Backoff;
pub use channel::Channel;
pub use frame::{
    Decoded, Frame, Headers, MAX_CONTENT_LENGTH, MAX_HEADER_BYTES, decode_frame, encode_frame,
};
pub use handle::{ClosedFlag, StreamHandle};
pub use queue::{QueueReceiver, QueueSender, queue};
pub use reader::{FrameReader, ReadOutcome};
pub use writer::FrameWriter;
