// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! FIFO message queues connecting the frame loops to the driver.
//!
//! Each queue tracks unfinished items: `send` adds one, `task_done` on the
//! receiving side removes one, and [`QueueSender::join`] waits for the count
//! to reach zero.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::error::QueueClosed;

enum Tx {
    Bounded(mpsc::Sender<String>),
    Unbounded(mpsc::UnboundedSender<String>),
}

enum Rx {
    Bounded(mpsc::Receiver<String>),
    Unbounded(mpsc::UnboundedReceiver<String>),
}

/// Producing end of a message queue. Cheap to clone.
pub struct QueueSender {
    tx: Tx,
    unfinished: Arc<watch::Sender<usize>>,
}

/// Consuming end of a message queue.
pub struct QueueReceiver {
    rx: Rx,
    unfinished: Arc<watch::Sender<usize>>,
}

/// Creates a queue. `None` is unbounded; `Some(n)` holds at most `n` items
/// (at least 1) and makes `send` wait for room.
#[must_use]
pub fn queue(capacity: Option<usize>) -> (QueueSender, QueueReceiver) {
    let unfinished = Arc::new(watch::Sender::new(0));
    let (tx, rx) = match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (Tx::Bounded(tx), Rx::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (Tx::Unbounded(tx), Rx::Unbounded(rx))
        }
    };

    (
        QueueSender {
            tx,
            unfinished: unfinished.clone(),
        },
        QueueReceiver { rx, unfinished },
    )
}

impl QueueSender {
    /// Enqueues a message, waiting for room if the queue is bounded and full.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] with the message if the receiver is gone.
    pub async fn send(&self, message: String) -> Result<(), QueueClosed> {
        match &self.tx {
            Tx::Bounded(tx) => {
                // Reserving first keeps a cancelled send from counting an item
                let Ok(permit) = tx.reserve().await else {
                    return Err(QueueClosed(message));
                };
                self.unfinished.send_modify(|n| *n += 1);
                permit.send(message);
                Ok(())
            }
            Tx::Unbounded(tx) => {
                self.unfinished.send_modify(|n| *n += 1);
                tx.send(message).map_err(|e| {
                    self.unfinished.send_modify(|n| *n = n.saturating_sub(1));
                    QueueClosed(e.0)
                })
            }
        }
    }

    /// Waits until every message sent so far has been marked done, or until
    /// the receiver is closed and nothing will mark them done.
    pub async fn join(&self) {
        let mut unfinished = self.unfinished.subscribe();
        let receiver_gone = async {
            match &self.tx {
                Tx::Bounded(tx) => tx.closed().await,
                Tx::Unbounded(tx) => tx.closed().await,
            }
        };
        // The watch sender lives in `self`, so `wait_for` only ends at zero
        tokio::select! {
            _ = unfinished.wait_for(|n| *n == 0) => {}
            () = receiver_gone => {}
        }
    }

    /// Messages sent but not yet marked done.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        *self.unfinished.borrow()
    }

    /// Returns true if the receiver has been closed or dropped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        match &self.tx {
            Tx::Bounded(tx) => tx.is_closed(),
            Tx::Unbounded(tx) => tx.is_closed(),
        }
    }
}

impl Clone for QueueSender {
    fn clone(&self) -> Self {
        let tx = match &self.tx {
            Tx::Bounded(tx) => Tx::Bounded(tx.clone()),
            Tx::Unbounded(tx) => Tx::Unbounded(tx.clone()),
        };
        Self {
            tx,
            unfinished: self.unfinished.clone(),
        }
    }
}

impl std::fmt::Debug for QueueSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSender")
            .field("unfinished", &self.unfinished())
            .finish_non_exhaustive()
    }
}

impl QueueReceiver {
    /// Waits for the next message. Returns `None` once every sender is
    /// dropped and the queue is drained.
    pub async fn recv(&mut self) -> Option<String> {
        match &mut self.rx {
            Rx::Bounded(rx) => rx.recv().await,
            Rx::Unbounded(rx) => rx.recv().await,
        }
    }

    /// Stops accepting messages. Ones already queued can still be received.
    pub fn close(&mut self) {
        match &mut self.rx {
            Rx::Bounded(rx) => rx.close(),
            Rx::Unbounded(rx) => rx.close(),
        }
    }

    /// Takes a message if one is ready, without waiting.
    pub fn try_recv(&mut self) -> Option<String> {
        match &mut self.rx {
            Rx::Bounded(rx) => rx.try_recv().ok(),
            Rx::Unbounded(rx) => rx.try_recv().ok(),
        }
    }

    /// Marks one received message as processed.
    pub fn task_done(&self) {
        self.unfinished.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Messages sent but not yet marked done.
    #[must_use]
    pub fn unfinished(&self) -> usize {
        *self.unfinished.borrow()
    }
}

impl std::fmt::Debug for QueueReceiver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueReceiver")
            .field("unfinished", &self.unfinished())
            .finish_non_exhaustive()
    }
}
