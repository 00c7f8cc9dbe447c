//! Session configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tuning for every [`crate::StreamSession`] a client opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Pump sleep when the engine has nothing ready, in milliseconds.
    #[serde(default = "default_poll_backoff_ms")]
    pub poll_backoff_ms: u64,
    /// Upper bound on waiting for the pump to stop during `close()`.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

fn default_poll_backoff_ms() -> u64 { 10 }
fn default_close_timeout_ms() -> u64 { 1_000 }

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_backoff_ms: default_poll_backoff_ms(),
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl SessionConfig {
    pub fn poll_backoff(&self) -> Duration {
        Duration::from_millis(self.poll_backoff_ms.max(1))
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}
