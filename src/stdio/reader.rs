// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, trace, warn};

use super::backoff::Backoff;
use super::frame::{Decoded, Frame, decode_frame};
use super::handle::{ClosedFlag, StreamHandle};
use super::queue::QueueSender;
use crate::error::{DecodeError, FramingError};

/// Default number of idle cycles a partial frame may sit in the buffer.
pub const DEFAULT_MAX_STALLED_CYCLES: u32 = 200;

const READ_CHUNK: usize = 8192;

/// What a single read attempt produced.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A complete frame.
    Frame(Frame),
    /// Nothing to deliver this cycle.
    NoDataYet,
    /// Bad bytes or a read error. The reader is still usable.
    Failed(FramingError),
    /// End of stream. No further frames will be produced.
    Closed,
}

enum Fill {
    Read(usize),
    Pending,
    Eof,
}

/// Pulls framed messages off a stream and pushes their payloads onto the
/// inbound queue.
///
/// Reads never wait for bytes: an empty poll counts as an idle cycle and the
/// loop backs off exponentially until traffic resumes.
pub struct FrameReader<R> {
    handle: StreamHandle<R, QueueSender>,
    buffer: BytesMut,
    initial_backoff: Backoff,
    max_stalled_cycles: u32,
    stalled_cycles: u32,
    eof: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Creates a reader that starts idle cycles at `backoff`.
    pub fn new(handle: StreamHandle<R, QueueSender>, initial_backoff: Backoff) -> Self {
        Self {
            handle,
            buffer: BytesMut::with_capacity(READ_CHUNK),
            initial_backoff,
            max_stalled_cycles: DEFAULT_MAX_STALLED_CYCLES,
            stalled_cycles: 0,
            eof: false,
        }
    }

    /// Sets how many idle cycles a partial frame may wait for the rest of its
    /// bytes before it is discarded. 0 waits forever.
    #[must_use]
    pub fn with_max_stalled_cycles(mut self, max_stalled_cycles: u32) -> Self {
        self.max_stalled_cycles = max_stalled_cycles;
        self
    }

    /// The underlying stream handle.
    pub const fn handle(&self) -> &StreamHandle<R, QueueSender> {
        &self.handle
    }

    /// Bytes read but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Reads frames until the stream closes.
    ///
    /// Decode and I/O failures are logged and retried after a backoff; only
    /// closure of the stream (or of the inbound queue) ends the loop.
    pub async fn run(mut self) {
        debug!(component = "reader", "Frame reader started");
        let mut backoff = self.initial_backoff;

        while !self.handle.is_closed() {
            match self.read_one().await {
                ReadOutcome::Frame(frame) => {
                    backoff = backoff.reset();
                    trace!(component = "reader", "Received frame: {}", frame.payload);

                    let sent = tokio::select! {
                        sent = self.handle.queue().send(frame.payload) => sent,
                        () = self.handle.closed().closed() => break,
                    };
                    if let Err(e) = sent {
                        warn!(
                            component = "reader",
                            "Inbound queue closed, dropping message: {}", e.0
                        );
                        break;
                    }
                }
                ReadOutcome::NoDataYet => {
                    backoff = idle(backoff, self.handle.closed()).await;
                }
                ReadOutcome::Failed(e) => {
                    warn!(
                        component = "reader",
                        buffered = self.buffer.len(),
                        "Failed to read frame: {e}"
                    );
                    backoff = idle(backoff, self.handle.closed()).await;
                }
                ReadOutcome::Closed => break,
            }
        }

        debug!(component = "reader", "Frame reader exiting - stream closed");
    }

    /// Makes one non-blocking attempt to produce a frame.
    pub async fn read_one(&mut self) -> ReadOutcome {
        let mut read = 0;
        if !self.eof {
            match self.fill().await {
                Ok(Fill::Read(n)) => {
                    trace!(component = "reader", "Read {n} bytes");
                    read = n;
                }
                Ok(Fill::Pending) => {}
                Ok(Fill::Eof) => {
                    debug!(component = "reader", "Stream reached end of input");
                    self.eof = true;
                }
                Err(e) => return ReadOutcome::Failed(e.into()),
            }
        }

        let before = self.buffer.len();
        match decode_frame(&mut self.buffer) {
            Decoded::Frame(frame) => {
                self.stalled_cycles = 0;
                ReadOutcome::Frame(frame)
            }
            Decoded::Invalid(e) => {
                self.stalled_cycles = 0;
                ReadOutcome::Failed(e.into())
            }
            Decoded::Empty => {
                debug!(component = "reader", "Skipping zero-length frame");
                self.stalled_cycles = 0;
                ReadOutcome::NoDataYet
            }
            Decoded::NoDataYet if self.buffer.len() < before => {
                // A blank line was consumed
                self.stalled_cycles = 0;
                ReadOutcome::NoDataYet
            }
            Decoded::NoDataYet if self.eof => self.finish(),
            Decoded::NoDataYet if read > 0 || self.buffer.is_empty() => {
                self.stalled_cycles = 0;
                ReadOutcome::NoDataYet
            }
            Decoded::NoDataYet => self.stall(),
        }
    }

    /// Polls the stream once without waiting for bytes to arrive.
    async fn fill(&mut self) -> std::io::Result<Fill> {
        self.buffer.reserve(READ_CHUNK);
        let stream = self.handle.stream_mut();

        match tokio::time::timeout(Duration::ZERO, stream.read_buf(&mut self.buffer)).await {
            Err(_) => Ok(Fill::Pending),
            Ok(Ok(0)) => Ok(Fill::Eof),
            Ok(Ok(n)) => Ok(Fill::Read(n)),
            Ok(Err(e)) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(Fill::Pending),
            Ok(Err(e)) => Err(e),
        }
    }

    fn stall(&mut self) -> ReadOutcome {
        self.stalled_cycles += 1;
        if self.max_stalled_cycles == 0 || self.stalled_cycles < self.max_stalled_cycles {
            return ReadOutcome::NoDataYet;
        }

        let buffered = self.buffer.len();
        self.buffer.clear();
        self.stalled_cycles = 0;
        ReadOutcome::Failed(DecodeError::Stalled { buffered }.into())
    }

    fn finish(&mut self) -> ReadOutcome {
        if !self.buffer.is_empty() {
            warn!(
                component = "reader",
                discarded = self.buffer.len(),
                "Stream closed with an incomplete frame buffered: {:?}",
                String::from_utf8_lossy(&self.buffer)
            );
            self.buffer.clear();
        }
        self.handle.closed().close();
        ReadOutcome::Closed
    }
}

/// Escalates the backoff and sleeps for it, waking early if the stream closes.
async fn idle(backoff: Backoff, closed: &ClosedFlag) -> Backoff {
    let backoff = backoff.escalate();
    tokio::select! {
        () = tokio::time::sleep(backoff.next_wait()) => {}
        () = closed.closed() => {}
    }
    backoff
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdio::frame::{MAX_HEADER_BYTES, encode_frame};
    use crate::stdio::queue::{QueueReceiver, queue};
    use anyhow::{Context, Result, bail};
    use tokio::io::{AsyncWriteExt, DuplexStream, duplex};

    const RUN_TIMEOUT: Duration = Duration::from_secs(5);

    fn fast_backoff() -> Backoff {
        Backoff::new(Duration::from_millis(1), Duration::from_millis(5))
    }

    fn setup(capacity: Option<usize>) -> (DuplexStream, FrameReader<DuplexStream>, QueueReceiver) {
        let (peer, stream) = duplex(64 * 1024);
        let (tx, rx) = queue(capacity);
        let handle = StreamHandle::new(stream, tx, ClosedFlag::new());
        (peer, FrameReader::new(handle, fast_backoff()), rx)
    }

    async fn drain(rx: &mut QueueReceiver) -> Vec<String> {
        let mut messages = Vec::new();
        while let Some(message) = rx.recv().await {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn test_no_bytes_is_no_data() {
        let (_peer, mut reader, mut rx) = setup(None);
        assert!(matches!(reader.read_one().await, ReadOutcome::NoDataYet));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_empty_line_is_no_data_not_error() -> Result<()> {
        let (mut peer, mut reader, mut rx) = setup(None);
        peer.write_all(b"\r\n").await?;

        let outcome = reader.read_one().await;
        assert!(matches!(outcome, ReadOutcome::NoDataYet), "got {outcome:?}");
        assert_eq!(reader.buffered(), 0);
        assert!(rx.try_recv().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_read_one_frame() -> Result<()> {
        let (mut peer, mut reader, _rx) = setup(None);
        peer.write_all(&encode_frame("héllo")).await?;

        match reader.read_one().await {
            ReadOutcome::Frame(frame) => assert_eq!(frame.payload, "héllo"),
            other => bail!("expected a frame, got {other:?}"),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_truncated_frame_is_not_delivered() -> Result<()> {
        let (mut peer, reader, mut rx) = setup(None);
        let closed = reader.handle().closed().clone();
        peer.write_all(b"Content-Length: 5\r\n\r\nab").await?;
        drop(peer);

        tokio::time::timeout(RUN_TIMEOUT, reader.run())
            .await
            .context("reader did not stop at end of stream")?;

        assert!(closed.is_closed());
        assert!(drain(&mut rx).await.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_frames_buffered_before_close_are_delivered() -> Result<()> {
        let (mut peer, reader, mut rx) = setup(None);
        for message in ["a", "b", "c"] {
            peer.write_all(&encode_frame(message)).await?;
        }
        peer.write_all(b"trailing garbage").await?;
        drop(peer);

        tokio::time::timeout(RUN_TIMEOUT, reader.run()).await?;
        assert_eq!(drain(&mut rx).await, vec!["a", "b", "c"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_malformed_frame_is_skipped() -> Result<()> {
        let (mut peer, reader, mut rx) = setup(None);
        peer.write_all(b"this is not a header\r\n\r\n").await?;
        peer.write_all(b"Content-Length: nope\r\n\r\n").await?;
        peer.write_all(&encode_frame("ok")).await?;
        drop(peer);

        tokio::time::timeout(RUN_TIMEOUT, reader.run()).await?;
        assert_eq!(drain(&mut rx).await, vec!["ok"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_stream_then_ping_pong() -> Result<()> {
        let (mut peer, reader, mut rx) = setup(None);
        let task = tokio::spawn(reader.run());

        // Let the reader spin through several idle cycles first
        tokio::time::sleep(Duration::from_millis(50)).await;
        let mut burst = encode_frame("ping").to_vec();
        burst.extend_from_slice(&encode_frame("pong"));
        peer.write_all(&burst).await?;

        let first = tokio::time::timeout(RUN_TIMEOUT, rx.recv()).await?;
        let second = tokio::time::timeout(RUN_TIMEOUT, rx.recv()).await?;
        assert_eq!(first.as_deref(), Some("ping"));
        assert_eq!(second.as_deref(), Some("pong"));

        drop(peer);
        tokio::time::timeout(RUN_TIMEOUT, task).await??;
        Ok(())
    }

    #[tokio::test]
    async fn test_payload_split_across_writes() -> Result<()> {
        let (mut peer, reader, mut rx) = setup(None);
        let task = tokio::spawn(reader.run());

        peer.write_all(b"Content-Length: 10\r\n").await?;
        tokio::time::sleep(Duration::from_millis(10)).await;
        peer.write_all(b"\r\nab").await?;
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            peer.write_all(b"ab").await?;
        }

        let message = tokio::time::timeout(RUN_TIMEOUT, rx.recv()).await?;
        assert_eq!(message.as_deref(), Some("ababababab"));

        drop(peer);
        tokio::time::timeout(RUN_TIMEOUT, task).await??;
        Ok(())
    }

    #[tokio::test]
    async fn test_stalled_partial_frame_is_discarded() -> Result<()> {
        let (mut peer, reader, _rx) = setup(None);
        let mut reader = reader.with_max_stalled_cycles(3);
        peer.write_all(b"Content-Length: 100\r\n\r\nshort").await?;

        let mut stalled = None;
        for _ in 0..10 {
            if let ReadOutcome::Failed(e) = reader.read_one().await {
                stalled = Some(e);
                break;
            }
        }

        match stalled {
            Some(FramingError::Decode(DecodeError::Stalled { buffered })) => {
                assert_eq!(buffered, 28);
            }
            other => bail!("expected a stall, got {other:?}"),
        }
        assert_eq!(reader.buffered(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_endless_header_is_dropped() -> Result<()> {
        let (mut peer, mut reader, _rx) = setup(None);
        let chunk = vec![b'a'; 4096];

        let mut dropped = 0;
        for _ in 0..40 {
            peer.write_all(&chunk).await?;
            if let ReadOutcome::Failed(FramingError::Decode(DecodeError::MalformedHeader {
                ..
            })) = reader.read_one().await
            {
                dropped += 1;
            }
            assert!(reader.buffered() <= MAX_HEADER_BYTES);
        }
        assert!(dropped >= 2, "only dropped {dropped} times");

        // The tail of the junk line is dropped with its header block
        peer.write_all(b"\r\n\r\n").await?;
        peer.write_all(&encode_frame("ok")).await?;
        let mut payload = None;
        for _ in 0..10 {
            if let ReadOutcome::Frame(frame) = reader.read_one().await {
                payload = Some(frame.payload);
                break;
            }
        }
        assert_eq!(payload.as_deref(), Some("ok"));
        Ok(())
    }

    #[tokio::test]
    async fn test_zero_length_frame_is_skipped() -> Result<()> {
        let (mut peer, mut reader, mut rx) = setup(None);
        peer.write_all(b"Content-Length: 0\r\n\r\n").await?;
        peer.write_all(&encode_frame("after")).await?;

        let outcome = reader.read_one().await;
        assert!(matches!(outcome, ReadOutcome::NoDataYet), "got {outcome:?}");
        match reader.read_one().await {
            ReadOutcome::Frame(frame) => assert_eq!(frame.payload, "after"),
            other => bail!("expected a frame, got {other:?}"),
        }
        assert!(rx.try_recv().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_backpressure_does_not_drop_messages() -> Result<()> {
        let (mut peer, reader, mut rx) = setup(Some(1));
        for i in 0..5 {
            peer.write_all(&encode_frame(&format!("m{i}"))).await?;
        }
        drop(peer);

        let task = tokio::spawn(reader.run());
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!task.is_finished(), "reader should be waiting on the full queue");

        let messages = tokio::time::timeout(RUN_TIMEOUT, drain(&mut rx)).await?;
        assert_eq!(messages, vec!["m0", "m1", "m2", "m3", "m4"]);
        tokio::time::timeout(RUN_TIMEOUT, task).await??;
        Ok(())
    }

    #[tokio::test]
    async fn test_closing_the_flag_stops_an_idle_reader() -> Result<()> {
        let (_peer, stream) = duplex(64);
        let (tx, _rx) = queue(None);
        let closed = ClosedFlag::new();
        let reader = FrameReader::new(
            StreamHandle::new(stream, tx, closed.clone()),
            Backoff::new(Duration::from_secs(60), Duration::from_secs(60)),
        );
        let task = tokio::spawn(reader.run());

        tokio::time::sleep(Duration::from_millis(20)).await;
        closed.close();
        tokio::time::timeout(RUN_TIMEOUT, task).await??;
        Ok(())
    }

    #[tokio::test]
    async fn test_dropped_consumer_stops_reader() -> Result<()> {
        let (mut peer, reader, rx) = setup(None);
        drop(rx);
        peer.write_all(&encode_frame("nobody listens")).await?;

        tokio::time::timeout(RUN_TIMEOUT, reader.run()).await?;
        Ok(())
    }
}
