// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use std::sync::Arc;

use tokio::sync::watch;

/// Shared "stream closed" flag for one duplex stream.
///
/// The reader sets it at end of stream, the writer sets it when the peer is
/// gone, and the driver sets it to stop both loops.
#[derive(Debug, Clone)]
pub struct ClosedFlag {
    inner: Arc<watch::Sender<bool>>,
}

impl ClosedFlag {
    /// Creates an open flag.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(watch::Sender::new(false)),
        }
    }

    /// Marks the stream closed. Idempotent.
    pub fn close(&self) {
        self.inner.send_if_modified(|closed| !std::mem::replace(closed, true));
    }

    /// Returns true once the stream is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        *self.inner.borrow()
    }

    /// Resolves once the stream is closed.
    pub async fn closed(&self) {
        let mut rx = self.inner.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

impl Default for ClosedFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// One direction of a duplex stream paired with the queue it feeds or drains.
///
/// The handle borrows nothing from the OS: whoever spawned the process owns
/// it. Dropping the handle drops this side's pipe and queue end.
#[derive(Debug)]
pub struct StreamHandle<S, Q> {
    stream: S,
    queue: Q,
    closed: ClosedFlag,
}

impl<S, Q> StreamHandle<S, Q> {
    /// Bundles a stream half, a queue end and the shared closed flag.
    pub const fn new(stream: S, queue: Q, closed: ClosedFlag) -> Self {
        Self {
            stream,
            queue,
            closed,
        }
    }

    /// The stream half, mutably.
    pub const fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    /// The queue end.
    pub const fn queue(&self) -> &Q {
        &self.queue
    }

    /// The queue end, mutably.
    pub const fn queue_mut(&mut self) -> &mut Q {
        &mut self.queue
    }

    /// The shared closed flag.
    pub const fn closed(&self) -> &ClosedFlag {
        &self.closed
    }

    /// Returns true once the stream has been reported closed.
    pub fn is_closed(&self) -> bool {
        self.closed.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_close_wakes_waiters() -> anyhow::Result<()> {
        let flag = ClosedFlag::new();
        let waiter = flag.clone();
        let wait = tokio::spawn(async move { waiter.closed().await });

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!wait.is_finished());
        assert!(!flag.is_closed());

        flag.close();
        flag.close();
        tokio::time::timeout(Duration::from_secs(1), wait).await??;
        assert!(flag.is_closed());
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_resolves_immediately_when_already_closed() -> anyhow::Result<()> {
        let flag = ClosedFlag::new();
        flag.close();
        tokio::time::timeout(Duration::from_millis(100), flag.closed()).await?;
        Ok(())
    }

    #[test]
    fn test_handle_shares_flag() {
        let flag = ClosedFlag::new();
        let handle = StreamHandle::new(Vec::<u8>::new(), (), flag.clone());
        assert!(!handle.is_closed());
        flag.close();
        assert!(handle.is_closed());
    }
}
