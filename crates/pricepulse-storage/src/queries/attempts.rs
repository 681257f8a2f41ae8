// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only channel attempt audit trail and delivery statistics.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use pricepulse_core::types::{ChannelAttempt, DeliveryStats, JobId, JobStatus};
use pricepulse_core::PulseError;
use rusqlite::params;

use crate::database::{map_tr_err, Database};
use crate::models::{attempt_from_row, fmt_ts};

pub async fn record_attempt(db: &Database, attempt: &ChannelAttempt) -> Result<(), PulseError> {
    let attempt = attempt.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO channel_attempts
                    (job_id, channel, attempt, attempted_at, outcome, latency_ms, detail)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    attempt.job_id.0,
                    attempt.channel.to_string(),
                    attempt.attempt,
                    fmt_ts(attempt.attempted_at),
                    attempt.outcome.to_string(),
                    i64::try_from(attempt.latency_ms).unwrap_or(i64::MAX),
                    attempt.detail,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn attempts_for_job(
    db: &Database,
    id: &JobId,
) -> Result<Vec<ChannelAttempt>, PulseError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT job_id, channel, attempt, attempted_at, outcome, latency_ms, detail
                 FROM channel_attempts WHERE job_id = ?1 ORDER BY id ASC",
            )?;
            let rows = stmt
                .query_map(params![id], attempt_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Attempt outcomes since `since`, and job counts by status for jobs created since then.
pub async fn delivery_stats(
    db: &Database,
    since: DateTime<Utc>,
) -> Result<DeliveryStats, PulseError> {
    let since = fmt_ts(since);
    let (counts, by_status) = db
        .connection()
        .call(move |conn| {
            let counts: (i64, i64, i64, i64, Option<f64>) = conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(outcome = 'success'), 0),
                        COALESCE(SUM(outcome = 'transient_failure'), 0),
                        COALESCE(SUM(outcome = 'permanent_failure'), 0),
                        AVG(latency_ms)
                 FROM channel_attempts WHERE attempted_at >= ?1",
                params![since],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )?;
            let mut stmt = conn.prepare(
                "SELECT status, COUNT(*) FROM delivery_jobs
                 WHERE created_at >= ?1 GROUP BY status ORDER BY status",
            )?;
            let by_status = stmt
                .query_map(params![since], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok((counts, by_status))
        })
        .await
        .map_err(map_tr_err)?;

    let (attempts, successes, transient, permanent, mean) = counts;
    let mut jobs_by_status = Vec::with_capacity(by_status.len());
    for (status, n) in by_status {
        let status = JobStatus::from_str(&status).map_err(PulseError::storage)?;
        jobs_by_status.push((status, n.max(0) as u64));
    }
    jobs_by_status.sort_by_key(|(status, _)| *status);

    Ok(DeliveryStats {
        attempts: attempts.max(0) as u64,
        successes: successes.max(0) as u64,
        transient_failures: transient.max(0) as u64,
        permanent_failures: permanent.max(0) as u64,
        mean_latency_ms: mean.unwrap_or(0.0),
        jobs_by_status,
    })
}
