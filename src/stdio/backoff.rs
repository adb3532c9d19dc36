// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

use std::time::Duration;

/// Default shortest wait between idle reads.
pub const DEFAULT_MIN_WAIT: Duration = Duration::from_millis(50);

/// Default longest wait between idle reads.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(2000);

/// Shortest wait a backoff will ever sleep for.
pub const MIN_WAIT_FLOOR: Duration = Duration::from_millis(1);

/// Bounded exponential backoff for polling an idle stream.
///
/// Always holds `min_wait <= next_wait <= max_wait`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    min_wait: Duration,
    max_wait: Duration,
    next_wait: Duration,
}

impl Backoff {
    /// Creates a backoff starting at `min_wait`. A `min_wait` below
    /// [`MIN_WAIT_FLOOR`] is raised to it, and a `max_wait` below `min_wait`
    /// is raised to `min_wait`.
    #[must_use]
    pub fn new(min_wait: Duration, max_wait: Duration) -> Self {
        let min_wait = min_wait.max(MIN_WAIT_FLOOR);
        let max_wait = max_wait.max(min_wait);
        Self {
            min_wait,
            max_wait,
            next_wait: min_wait,
        }
    }

    /// Doubles the wait, capped at `max_wait`.
    #[must_use]
    pub fn escalate(self) -> Self {
        let doubled = self.next_wait.saturating_mul(2).min(self.max_wait);
        Self {
            next_wait: doubled.max(self.min_wait),
            ..self
        }
    }

    /// Drops the wait back to `min_wait`.
    #[must_use]
    pub const fn reset(self) -> Self {
        Self {
            next_wait: self.min_wait,
            ..self
        }
    }

    /// The delay the next idle cycle will sleep for, once escalated.
    #[must_use]
    pub const fn next_wait(&self) -> Duration {
        self.next_wait
    }

    /// Lower bound.
    #[must_use]
    pub const fn min_wait(&self) -> Duration {
        self.min_wait
    }

    /// Upper bound.
    #[must_use]
    pub const fn max_wait(&self) -> Duration {
        self.max_wait
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_WAIT, DEFAULT_MAX_WAIT)
    }
}
