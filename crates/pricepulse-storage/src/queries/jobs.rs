// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery job persistence and the atomic claim.

use chrono::{DateTime, NaiveDate, Utc};
use pricepulse_core::types::{
    ClaimOutcome, ClaimRequest, DeliveryJob, JobId, JobStatus, TrackedProductId,
};
use pricepulse_core::PulseError;
use rusqlite::{params, OptionalExtension, Transaction};

use crate::database::{map_tr_err, Database};
use crate::models::{fmt_date, fmt_ts, job_from_row, JOB_COLUMNS};

pub async fn job_exists(
    db: &Database,
    tracked_product_id: &TrackedProductId,
    due_date: NaiveDate,
) -> Result<bool, PulseError> {
    let tracked = tracked_product_id.0.clone();
    let due_date = fmt_date(due_date);
    db.connection()
        .call(move |conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(
                    SELECT 1 FROM delivery_jobs WHERE tracked_product_id = ?1 AND due_date = ?2
                 )",
                params![tracked, due_date],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a job. The `(tracked_product_id, due_date)` unique key makes this a
/// no-op for duplicates; returns whether a row was written.
pub async fn insert_job(db: &Database, job: &DeliveryJob) -> Result<bool, PulseError> {
    let job = job.clone();
    db.connection()
        .call(move |conn| {
            let inserted = conn.execute(
                "INSERT INTO delivery_jobs
                    (id, tracked_product_id, product_id, user_id, due_at, due_date,
                     payload_ref, status, attempt_count, claimed_by, claim_expires_at,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
                 ON CONFLICT(tracked_product_id, due_date) DO NOTHING",
                params![
                    job.id.0,
                    job.tracked_product_id.0,
                    job.product_id.0,
                    job.user_id.0,
                    fmt_ts(job.due_at),
                    fmt_date(job.due_date),
                    job.payload_ref.0,
                    job.status.to_string(),
                    job.attempt_count,
                    job.claimed_by,
                    job.claim_expires_at.map(fmt_ts),
                    fmt_ts(job.created_at),
                    fmt_ts(job.updated_at),
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_job(db: &Database, id: &JobId) -> Result<Option<DeliveryJob>, PulseError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {JOB_COLUMNS} FROM delivery_jobs WHERE id = ?1"),
                params![id],
                job_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_jobs(
    db: &Database,
    status: Option<JobStatus>,
) -> Result<Vec<DeliveryJob>, PulseError> {
    let status = status.map(|s| s.to_string());
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM delivery_jobs
                 WHERE ?1 IS NULL OR status = ?1
                 ORDER BY due_at ASC, created_at ASC, id ASC"
            ))?;
            let rows = stmt
                .query_map(params![status], job_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

/// Move a pending job to `in_flight` under `claim`. Must run inside a transaction.
fn claim_in_tx(
    tx: &Transaction<'_>,
    id: &str,
    claim: &ClaimRequest,
) -> rusqlite::Result<Option<DeliveryJob>> {
    let changed = tx.execute(
        "UPDATE delivery_jobs
         SET status = 'in_flight',
             attempt_count = attempt_count + 1,
             claimed_by = ?2,
             claim_expires_at = ?3,
             updated_at = ?4
         WHERE id = ?1 AND status = 'pending'",
        params![
            id,
            claim.holder,
            fmt_ts(claim.lease_until),
            fmt_ts(claim.claimed_at)
        ],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    tx.query_row(
        &format!("SELECT {JOB_COLUMNS} FROM delivery_jobs WHERE id = ?1"),
        params![id],
        job_from_row,
    )
    .map(Some)
}

/// Claim the pending job with the earliest due time that is due by `claimed_at`.
pub async fn claim_next(
    db: &Database,
    claim: &ClaimRequest,
) -> Result<Option<DeliveryJob>, PulseError> {
    let claim = claim.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let next: Option<String> = tx
                .query_row(
                    "SELECT id FROM delivery_jobs
                     WHERE status = 'pending' AND due_at <= ?1
                     ORDER BY due_at ASC, created_at ASC
                     LIMIT 1",
                    params![fmt_ts(claim.claimed_at)],
                    |row| row.get(0),
                )
                .optional()?;
            let claimed = match next {
                Some(id) => claim_in_tx(&tx, &id, &claim)?,
                None => None,
            };
            tx.commit()?;
            Ok(claimed)
        })
        .await
        .map_err(map_tr_err)
}

/// Claim a specific job. `AlreadyClaimed` when it is no longer pending.
pub async fn claim(
    db: &Database,
    id: &JobId,
    claim: &ClaimRequest,
) -> Result<ClaimOutcome, PulseError> {
    let id = id.0.clone();
    let claim = claim.clone();
    let result = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM delivery_jobs WHERE id = ?1)",
                params![id],
                |row| row.get(0),
            )?;
            let claimed = if exists {
                claim_in_tx(&tx, &id, &claim)?
            } else {
                None
            };
            tx.commit()?;
            Ok((exists, claimed, id))
        })
        .await
        .map_err(map_tr_err)?;

    match result {
        (false, _, id) => Err(PulseError::NotFound {
            entity: "delivery job",
            id,
        }),
        (true, Some(job), _) => Ok(ClaimOutcome::Claimed(job)),
        (true, None, _) => Ok(ClaimOutcome::AlreadyClaimed),
    }
}

enum TransitionResult {
    Applied,
    Missing,
    Mismatch(String),
}

/// Conditional status change. Claim columns are cleared on every edge that
/// leaves `in_flight`.
pub async fn transition(
    db: &Database,
    id: &JobId,
    from: JobStatus,
    to: JobStatus,
    now: DateTime<Utc>,
) -> Result<(), PulseError> {
    if !from.can_transition_to(to) {
        return Err(PulseError::InvalidTransition {
            job_id: id.0.clone(),
            from: from.to_string(),
            to: to.to_string(),
        });
    }

    let job_id = id.0.clone();
    let result = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE delivery_jobs
                 SET status = ?3,
                     updated_at = ?4,
                     claimed_by = CASE WHEN ?3 = 'in_flight' THEN claimed_by ELSE NULL END,
                     claim_expires_at = CASE WHEN ?3 = 'in_flight' THEN claim_expires_at ELSE NULL END
                 WHERE id = ?1 AND status = ?2",
                params![job_id, from.to_string(), to.to_string(), fmt_ts(now)],
            )?;
            let result = if changed == 1 {
                TransitionResult::Applied
            } else {
                tx.query_row(
                    "SELECT status FROM delivery_jobs WHERE id = ?1",
                    params![job_id],
                    |row| row.get::<_, String>(0),
                )
                .optional()?
                .map_or(TransitionResult::Missing, TransitionResult::Mismatch)
            };
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(map_tr_err)?;

    match result {
        TransitionResult::Applied => Ok(()),
        TransitionResult::Missing => Err(PulseError::NotFound {
            entity: "delivery job",
            id: id.0.clone(),
        }),
        TransitionResult::Mismatch(current) => Err(PulseError::InvalidTransition {
            job_id: id.0.clone(),
            from: current,
            to: to.to_string(),
        }),
    }
}

/// Extend a claim, but only for the holder that owns it.
pub async fn renew_claim(
    db: &Database,
    id: &JobId,
    holder: &str,
    lease_until: DateTime<Utc>,
) -> Result<bool, PulseError> {
    let job_id = id.0.clone();
    let holder = holder.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE delivery_jobs SET claim_expires_at = ?3
                 WHERE id = ?1 AND status = 'in_flight' AND claimed_by = ?2",
                params![job_id, holder, fmt_ts(lease_until)],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Leave `in_flight` for `to`, fenced on the claim holder.
pub async fn finish_claim(
    db: &Database,
    id: &JobId,
    holder: &str,
    to: JobStatus,
    now: DateTime<Utc>,
) -> Result<(), PulseError> {
    if !JobStatus::InFlight.can_transition_to(to) {
        return Err(PulseError::InvalidTransition {
            job_id: id.0.clone(),
            from: JobStatus::InFlight.to_string(),
            to: to.to_string(),
        });
    }

    let job_id = id.0.clone();
    let claim_holder = holder.to_string();
    let (changed, exists) = db
        .connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE delivery_jobs
                 SET status = ?3, updated_at = ?4, claimed_by = NULL, claim_expires_at = NULL
                 WHERE id = ?1 AND status = 'in_flight' AND claimed_by = ?2",
                params![job_id, claim_holder, to.to_string(), fmt_ts(now)],
            )?;
            let exists: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM delivery_jobs WHERE id = ?1)",
                params![job_id],
                |row| row.get(0),
            )?;
            tx.commit()?;
            Ok((changed, exists))
        })
        .await
        .map_err(map_tr_err)?;

    match (changed, exists) {
        (1, _) => Ok(()),
        (_, false) => Err(PulseError::NotFound {
            entity: "delivery job",
            id: id.0.clone(),
        }),
        _ => Err(PulseError::ClaimLost {
            job_id: id.0.clone(),
            holder: holder.to_string(),
        }),
    }
}

/// Return expired `in_flight` claims to `pending`.
pub async fn release_expired_claims(db: &Database, now: DateTime<Utc>) -> Result<u64, PulseError> {
    db.connection()
        .call(move |conn| {
            let now = fmt_ts(now);
            let released = conn.execute(
                "UPDATE delivery_jobs
                 SET status = 'pending', claimed_by = NULL, claim_expires_at = NULL, updated_at = ?1
                 WHERE status = 'in_flight' AND claim_expires_at IS NOT NULL AND claim_expires_at < ?1",
                params![now],
            )?;
            Ok(released as u64)
        })
        .await
        .map_err(map_tr_err)
}
