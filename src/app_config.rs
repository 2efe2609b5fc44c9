use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct ApplicationConfig {
    pub log_level: Option<String>, // CLI --debug wins over this
    pub coalescing_window_ms: u64, // max gap between events of the same incident
    pub frame_wait_ms: u64,        // bounded wait per next_frame call
    pub stream_timeout_ms: u64,    // no frames for this long => camera Error
    pub shutdown_grace_ms: u64,
    pub connect_timeout_ms: u64,
    pub frame_budget_ms: u64,
    pub target_fps: u32,
    pub event_channel_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        ApplicationConfig {
            log_level: Some("info".to_string()),
            coalescing_window_ms: 5_000,
            frame_wait_ms: 500,
            stream_timeout_ms: 10_000,
            shutdown_grace_ms: 3_000,
            connect_timeout_ms: 10_000,
            frame_budget_ms: 200,
            target_fps: 30,
            event_channel_capacity: 256,
            retry: RetryPolicy::default(),
        }
    }
}

impl ApplicationConfig {
    pub fn coalescing_window(&self) -> Duration {
        Duration::from_millis(self.coalescing_window_ms)
    }

    pub fn frame_wait(&self) -> Duration {
        Duration::from_millis(self.frame_wait_ms)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_millis(self.stream_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn frame_budget(&self) -> Duration {
        Duration::from_millis(self.frame_budget_ms)
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(1_000 / u64::from(self.target_fps.max(1)))
    }
}

/// Bounded exponential backoff for network sources.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_backoff_ms: 500,
            max_backoff_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Delay after the `failed_attempts`-th failure (1-based): initial * 2^(n-1), capped.
    pub fn backoff_after(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(20);
        let delay = self.initial_backoff_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }
}
