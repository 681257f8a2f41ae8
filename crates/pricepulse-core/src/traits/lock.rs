// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lease-based mutual exclusion between scheduler instances.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::PulseError;

/// Grants time-bounded exclusive ownership of a named key.
///
/// A key is acquirable when nobody holds it, when the current lease has
/// expired, or when `holder` already holds it (renewal).
#[async_trait]
pub trait LockProvider: Send + Sync {
    /// Try to take or renew the lease on `key`. Returns `false` on contention.
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, PulseError>;

    /// Release `key` if `holder` owns it. Releasing a lease held by someone else is a no-op.
    async fn release(&self, key: &str, holder: &str) -> Result<(), PulseError>;
}
