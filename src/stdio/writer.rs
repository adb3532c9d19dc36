// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, trace, warn};

use super::frame::encode_frame;
use super::handle::StreamHandle;
use super::queue::QueueReceiver;
use crate::error::{FramingError, Result};

/// Takes payloads off the outbound queue and writes them to the stream as
/// Content-Length frames, one at a time and in queue order.
pub struct FrameWriter<W> {
    handle: StreamHandle<W, QueueReceiver>,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// Creates a writer draining the handle's queue into its stream.
    pub const fn new(handle: StreamHandle<W, QueueReceiver>) -> Self {
        Self { handle }
    }

    /// Writes queued messages until the stream closes or every producer is
    /// gone.
    ///
    /// A message that fails to write is logged and skipped. Each message is
    /// marked done on the queue whether or not it reached the stream,
    /// including any still queued when the loop ends.
    pub async fn run(mut self) {
        debug!(component = "writer", "Frame writer started");

        while !self.handle.is_closed() {
            let closed = self.handle.closed().clone();
            let next = tokio::select! {
                message = self.handle.queue_mut().recv() => message,
                () = closed.closed() => break,
            };
            let Some(message) = next else {
                debug!(component = "writer", "Outbound queue closed");
                break;
            };

            let result = self.write_one(&message).await;
            self.handle.queue().task_done();

            match result {
                Ok(()) => {}
                Err(e) if e.is_closed() => {
                    debug!(component = "writer", "Peer closed the stream: {e}");
                    self.handle.closed().close();
                }
                Err(e) => {
                    warn!(
                        component = "writer",
                        "Couldn't write message: {e}: {message}"
                    );
                }
            }
        }

        self.drain();
        debug!(component = "writer", "Frame writer exiting");
    }

    /// Refuses further messages and marks every queued one done unsent.
    fn drain(&mut self) {
        let queue = self.handle.queue_mut();
        queue.close();
        while let Some(message) = queue.try_recv() {
            queue.task_done();
            warn!(
                component = "writer",
                "Stream closed, dropping unsent message: {message}"
            );
        }
    }

    /// Encodes one message as a frame, writes it and flushes.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::Closed`] if the stream is already closed, or
    /// the I/O error if the write or the flush fails.
    pub async fn write_one(&mut self, message: &str) -> Result<()> {
        if self.handle.is_closed() {
            return Err(FramingError::Closed);
        }

        let frame = encode_frame(message);
        trace!(component = "writer", "Sending frame: {message}");

        let stream = self.handle.stream_mut();
        stream.write_all(&frame).await?;
        stream.flush().await?;
        Ok(())
    }
}
