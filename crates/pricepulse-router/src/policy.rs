// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel retry policy.

use std::time::Duration;

use pricepulse_config::model::RouterConfig;

/// Bounded exponential backoff applied independently to every channel path.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Attempts per channel path, including the first.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
    /// Bound on one send call.
    pub send_timeout: Duration,
}

impl RetryPolicy {
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            multiplier: config.backoff_multiplier,
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            send_timeout: Duration::from_millis(config.send_timeout_ms),
        }
    }

    /// Delay before retry number `retry` (1 for the second attempt).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let ms = self.initial_backoff.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = ms.min(self.max_backoff.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}
