//! Delay policy between session resets.
//!
//! Exponential backoff with ±25% jitter, capped per attempt, with an
//! optional limit on consecutive failed attempts. The attempt counter is
//! cleared whenever a session becomes active.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Reconnect settings, as written in the configuration file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first reconnect attempt, in milliseconds
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds
    pub max_delay_ms: u64,
    /// Growth factor between attempts
    pub backoff_factor: f64,
    /// Consecutive failed attempts before giving up (0 = never give up)
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 250,
            max_delay_ms: 15_000,
            backoff_factor: 2.0,
            max_attempts: 10,
        }
    }
}

impl ReconnectConfig {
    /// Delay before attempt `attempt` (1-based) without jitter.
    #[must_use]
    pub fn base_delay(&self, attempt: u32) -> Duration {
        #[allow(clippy::cast_possible_wrap)]
        let exp = attempt.saturating_sub(1).min(63) as i32;
        #[allow(clippy::cast_precision_loss)]
        let initial = self.initial_delay_ms as f64;
        #[allow(clippy::cast_precision_loss)]
        let cap = self.max_delay_ms as f64;
        let millis = (initial * self.backoff_factor.max(1.0).powi(exp)).min(cap);
        Duration::from_secs_f64(millis / 1000.0)
    }

    /// Delay before attempt `attempt` (1-based) with ±25% jitter.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let offset: f64 = rand::thread_rng().gen_range(-1.0..1.0);
        Duration::from_secs_f64((base + base * 0.25 * offset).max(0.0))
    }
}

/// Attempt counter driven by the session controller.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl Backoff {
    /// Create a counter for `config`.
    #[must_use]
    pub const fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Register a failed attempt and return the delay before the next one.
    ///
    /// Returns `None` once `max_attempts` consecutive failures have been
    /// recorded.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.attempt = self.attempt.saturating_add(1);
        if self.config.max_attempts > 0 && self.attempt > self.config.max_attempts {
            return None;
        }
        Some(self.config.delay_for_attempt(self.attempt))
    }

    /// Consecutive failures recorded so far.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Clear the counter after a session became active.
    pub fn reset(&mut self) {
        self.attempt = 0;
    }
}
