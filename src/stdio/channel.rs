// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::handle::{ClosedFlag, StreamHandle};
use super::queue::{QueueReceiver, QueueSender, queue};
use super::reader::FrameReader;
use super::writer::FrameWriter;
use crate::config::Config;
use crate::error::QueueClosed;

/// A framed duplex channel over a language server's stdio pipes.
///
/// Owns the driver's ends of both queues and the two background tasks. It
/// does not own the process: whoever spawned it keeps supervising it.
pub struct Channel {
    inbound: QueueReceiver,
    outbound: QueueSender,
    closed: ClosedFlag,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Channel {
    /// Starts a reader on `read_half` and a writer on `write_half`.
    ///
    /// For a child process, pass its stdout and stdin respectively.
    /// Must be called from within a tokio runtime.
    pub fn connect<R, W>(read_half: R, write_half: W, config: &Config) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let closed = ClosedFlag::new();
        let (inbound_tx, inbound) = queue(config.queue_capacity);
        let (outbound, outbound_rx) = queue(config.queue_capacity);

        let reader = FrameReader::new(
            StreamHandle::new(read_half, inbound_tx, closed.clone()),
            config.backoff(),
        )
        .with_max_stalled_cycles(config.max_stalled_cycles);
        let writer = FrameWriter::new(StreamHandle::new(write_half, outbound_rx, closed.clone()));

        debug!(
            min_wait_ms = config.min_wait_ms,
            max_wait_ms = config.max_wait_ms,
            queue_capacity = ?config.queue_capacity,
            "Starting framed stdio channel"
        );

        Self {
            inbound,
            outbound,
            closed,
            reader: tokio::spawn(reader.run()),
            writer: tokio::spawn(writer.run()),
        }
    }

    /// Queues a message for the peer.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] if the writer has already exited.
    pub async fn send(&self, message: impl Into<String>) -> Result<(), QueueClosed> {
        self.outbound.send(message.into()).await
    }

    /// Waits for the next message from the peer and marks it done.
    ///
    /// Returns `None` once the stream has closed and every frame read before
    /// that has been received.
    pub async fn recv(&mut self) -> Option<String> {
        let message = self.inbound.recv().await?;
        self.inbound.task_done();
        Some(message)
    }

    /// Waits until every queued outbound message has been handled by the
    /// writer, either written or dropped because the stream closed.
    pub async fn flush(&self) {
        self.outbound.join().await;
    }

    /// The outbound queue. Clone it to produce from several places in turn.
    pub const fn outbound(&self) -> &QueueSender {
        &self.outbound
    }

    /// Returns true once the stream has closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }

    /// Closes the stream and waits for both tasks to exit.
    pub async fn close(self) {
        self.closed.close();
        drop(self.outbound);

        for (name, task) in [("reader", self.reader), ("writer", self.writer)] {
            if let Err(e) = task.await {
                warn!(component = name, "Frame task ended abnormally: {e}");
            }
        }
    }
}
