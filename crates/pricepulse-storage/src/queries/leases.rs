// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Time-bounded named leases used as the scheduler's evaluation lock.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use pricepulse_core::PulseError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::fmt_ts;

/// Take `key` if it is free, expired, or already held by `holder`.
///
/// A single upsert decides the outcome, so two instances racing for the same
/// key cannot both win. Expired leases on other keys are swept on the way.
pub async fn try_acquire(
    db: &Database,
    key: &str,
    holder: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<bool, PulseError> {
    let ttl = TimeDelta::from_std(ttl)
        .map_err(|e| PulseError::Internal(format!("lease ttl out of range: {e}")))?;
    let key = key.to_string();
    let holder = holder.to_string();
    let expires_at = fmt_ts(now + ttl);
    let now = fmt_ts(now);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM scheduler_leases WHERE key <> ?1 AND expires_at <= ?2",
                params![key, now],
            )?;
            let changed = tx.execute(
                "INSERT INTO scheduler_leases (key, holder, expires_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(key) DO UPDATE SET
                    holder = excluded.holder,
                    expires_at = excluded.expires_at
                 WHERE scheduler_leases.holder = excluded.holder
                    OR scheduler_leases.expires_at <= ?4",
                params![key, holder, expires_at, now],
            )?;
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn release(db: &Database, key: &str, holder: &str) -> Result<(), PulseError> {
    let key = key.to_string();
    let holder = holder.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM scheduler_leases WHERE key = ?1 AND holder = ?2",
                params![key, holder],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
