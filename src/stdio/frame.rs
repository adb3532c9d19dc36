// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Content-Length frame encoding and decoding.
//!
//! A frame on the wire is a block of `Name: value` header lines, a blank
//! line, then exactly `Content-Length` bytes of UTF-8 payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::DecodeError;

/// The only header this crate writes.
pub const CONTENT_LENGTH: &str = "Content-Length";

/// Largest payload a frame may declare.
pub const MAX_CONTENT_LENGTH: usize = 1 << 30;

/// Most bytes an unterminated header block may occupy before it is dropped.
pub const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Header lines of a single frame, in wire order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: Vec<(String, String)>,
}

impl Headers {
    /// Appends a header. Duplicate names are kept; lookups see the last one.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Looks up a header by name, ignoring ASCII case.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the declared payload length. A missing header counts as 0.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::InvalidContentLength`] if the value is not a
    /// non-negative integer or exceeds [`MAX_CONTENT_LENGTH`].
    pub fn content_length(&self) -> Result<usize, DecodeError> {
        self.get(CONTENT_LENGTH).map_or(Ok(0), |value| {
            value
                .parse::<usize>()
                .ok()
                .filter(|length| *length <= MAX_CONTENT_LENGTH)
                .ok_or_else(|| DecodeError::InvalidContentLength {
                    value: value.to_string(),
                })
        })
    }

    /// Number of header lines.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no header lines.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn parse_line(&mut self, line: &str) -> Result<(), DecodeError> {
        let Some((name, value)) = line.split_once(':') else {
            return Err(DecodeError::MalformedHeader {
                line: line.to_string(),
            });
        };
        let name = name.trim();
        if name.is_empty() {
            return Err(DecodeError::MalformedHeader {
                line: line.to_string(),
            });
        }
        self.insert(name, value.trim());
        Ok(())
    }
}

/// One complete frame pulled off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Header block, including `Content-Length`.
    pub headers: Headers,
    /// Decoded payload. Its UTF-8 length equals the declared content length.
    pub payload: String,
}

/// Result of a single decode attempt against buffered bytes.
#[derive(Debug, PartialEq, Eq)]
pub enum Decoded {
    /// A complete frame was removed from the buffer.
    Frame(Frame),
    /// Nothing to deliver yet. Either more bytes are needed, or a blank
    /// line was consumed.
    NoDataYet,
    /// A frame declaring no payload was consumed.
    Empty,
    /// The bytes at the head of the buffer are not a valid frame. The
    /// offending bytes have been consumed.
    Invalid(DecodeError),
}

/// Attempts to decode one frame from the front of `buffer`.
///
/// Incomplete input is left untouched so a later call can finish it once
/// more bytes have been appended.
pub fn decode_frame(buffer: &mut BytesMut) -> Decoded {
    let Some(first_end) = find_line_end(buffer, 0) else {
        return incomplete_header(buffer);
    };

    if is_blank(&buffer[..first_end]) {
        buffer.advance(first_end + 1);
        return Decoded::NoDataYet;
    }

    // Locate the blank line that terminates the header block
    let mut line_start = 0;
    let mut header_lines = Vec::new();
    let header_end = loop {
        let Some(line_end) = find_line_end(buffer, line_start) else {
            return incomplete_header(buffer);
        };
        let line = &buffer[line_start..line_end];
        if is_blank(line) {
            break line_end + 1;
        }
        header_lines.push(line_start..line_end);
        line_start = line_end + 1;
    };

    let mut headers = Headers::default();
    for range in header_lines {
        let parsed = std::str::from_utf8(&buffer[range.clone()])
            .map_err(|_| DecodeError::MalformedHeader {
                line: String::from_utf8_lossy(&buffer[range]).trim().to_string(),
            })
            .and_then(|line| headers.parse_line(line.trim()));
        if let Err(e) = parsed {
            buffer.advance(header_end);
            return Decoded::Invalid(e);
        }
    }

    let content_length = match headers.content_length() {
        Ok(length) => length,
        Err(e) => {
            buffer.advance(header_end);
            return Decoded::Invalid(e);
        }
    };

    if content_length == 0 {
        buffer.advance(header_end);
        return Decoded::Empty;
    }

    let Some(frame_end) = header_end.checked_add(content_length) else {
        buffer.advance(header_end);
        return Decoded::Invalid(DecodeError::InvalidContentLength {
            value: content_length.to_string(),
        });
    };
    if buffer.len() < frame_end {
        return Decoded::NoDataYet;
    }

    buffer.advance(header_end);
    let body = buffer.split_to(content_length);
    match String::from_utf8(body.to_vec()) {
        Ok(payload) => Decoded::Frame(Frame { headers, payload }),
        Err(e) => Decoded::Invalid(DecodeError::InvalidUtf8(e.utf8_error())),
    }
}

/// Waits for the rest of a header block, or drops the buffer once it has
/// grown past [`MAX_HEADER_BYTES`] without one.
fn incomplete_header(buffer: &mut BytesMut) -> Decoded {
    if buffer.len() <= MAX_HEADER_BYTES {
        return Decoded::NoDataYet;
    }

    let preview = &buffer[..buffer.len().min(64)];
    let line = String::from_utf8_lossy(preview).trim().to_string();
    buffer.clear();
    Decoded::Invalid(DecodeError::MalformedHeader { line })
}

/// Encodes `message` as a frame carrying only the `Content-Length` header.
#[must_use]
pub fn encode_frame(message: &str) -> Bytes {
    let body = message.as_bytes();
    let header = format!("{CONTENT_LENGTH}: {}\r\n\r\n", body.len());
    let mut frame = BytesMut::with_capacity(header.len() + body.len());
    frame.put_slice(header.as_bytes());
    frame.put_slice(body);
    frame.freeze()
}

/// Index of the next `\n` at or after `from`.
fn find_line_end(buffer: &[u8], from: usize) -> Option<usize> {
    buffer
        .get(from..)?
        .iter()
        .position(|&b| b == b'\n')
        .map(|offset| from + offset)
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}
