/*
 * Copyright (C) 2026 Mark Wells Dev
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::stdio::backoff::{Backoff, DEFAULT_MAX_WAIT, DEFAULT_MIN_WAIT};
use crate::stdio::reader::DEFAULT_MAX_STALLED_CYCLES;

/// Framing settings shared by the reader, the writer and their queues.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct Config {
    /// Shortest wait between idle reads in milliseconds (default: 50, at least 1)
    #[serde(default = "default_min_wait_ms")]
    pub min_wait_ms: u64,

    /// Longest wait between idle reads in milliseconds (default: 2000)
    #[serde(default = "default_max_wait_ms")]
    pub max_wait_ms: u64,

    /// Capacity of each message queue. Unbounded when unset.
    #[serde(default)]
    pub queue_capacity: Option<usize>,

    /// Idle cycles a partial frame may wait before it is dropped (0 = forever)
    #[serde(default = "default_max_stalled_cycles")]
    pub max_stalled_cycles: u32,
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "default waits are a few seconds"
)]
const fn default_min_wait_ms() -> u64 {
    DEFAULT_MIN_WAIT.as_millis() as u64
}

#[allow(
    clippy::cast_possible_truncation,
    reason = "default waits are a few seconds"
)]
const fn default_max_wait_ms() -> u64 {
    DEFAULT_MAX_WAIT.as_millis() as u64
}

const fn default_max_stalled_cycles() -> u32 {
    DEFAULT_MAX_STALLED_CYCLES
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_wait_ms: default_min_wait_ms(),
            max_wait_ms: default_max_wait_ms(),
            queue_capacity: None,
            max_stalled_cycles: default_max_stalled_cycles(),
        }
    }
}

impl Config {
    /// Load configuration from standard paths or a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file cannot be parsed or a value has the
    /// wrong type.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // 1. Start with defaults
        builder = builder
            .set_default("min_wait_ms", default_min_wait_ms())?
            .set_default("max_wait_ms", default_max_wait_ms())?
            .set_default("max_stalled_cycles", default_max_stalled_cycles())?;

        // 2. Load from user config directory (~/.config/lsp-stdio/config.toml)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("lsp-stdio").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        // 3. Load from explicit file if provided
        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 4. Load from environment variables (LSP_STDIO_MIN_WAIT_MS, etc.)
        builder = builder.add_source(config::Environment::with_prefix("LSP_STDIO").try_parsing(true));

        let config = builder
            .build()
            .context("Failed to build configuration")?;

        config.try_deserialize().context("Failed to deserialize configuration")
    }

    /// Idle-read backoff bounds.
    #[must_use]
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.min_wait_ms),
            Duration::from_millis(self.max_wait_ms),
        )
    }
}
