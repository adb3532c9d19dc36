// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Error types for frame reading and writing.
//!
//! None of these escape the read and write loops. They are logged and the
//! loop carries on until the stream closes.

use thiserror::Error;

/// A frame at the head of the stream could not be decoded.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    /// A header line did not have the `Name: value` shape.
    #[error("malformed header line: {line:?}")]
    MalformedHeader {
        /// The offending line, trimmed.
        line: String,
    },

    /// The `Content-Length` value is not a non-negative integer.
    #[error("invalid Content-Length: {value:?}")]
    InvalidContentLength {
        /// The raw header value.
        value: String,
    },

    /// The payload is not valid UTF-8.
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// A partial frame sat in the buffer with no new bytes for too long.
    #[error("gave up on partial frame after stalling ({buffered} bytes buffered)")]
    Stalled {
        /// Bytes discarded.
        buffered: usize,
    },
}

/// Failure of a single read or write cycle.
#[derive(Debug, Error)]
pub enum FramingError {
    /// Bad bytes on the wire.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// The underlying stream reported an error other than closure.
    #[error("stream I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream is closed.
    #[error("stream closed")]
    Closed,
}

impl FramingError {
    /// Returns true if the error means the peer is gone for good.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match self {
            Self::Closed => true,
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::UnexpectedEof
            ),
            Self::Decode(_) => false,
        }
    }
}

/// Result type for frame operations.
pub type Result<T> = std::result::Result<T, FramingError>;

/// The other end of a queue has been dropped. Carries the undelivered message.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("queue closed")]
pub struct QueueClosed(pub String);
