// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Column encodings and row mappers.
//!
//! Timestamps are stored as RFC 3339 text with millisecond precision and a `Z`
//! suffix, so lexicographic order equals chronological order.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc, Weekday};
use chrono_tz::Tz;
use rusqlite::Row;
use rusqlite::types::Type;

use pricepulse_core::types::{
    AttemptOutcome, Channel, ChannelAttempt, DeliveryJob, Frequency, JobId, JobStatus,
    NotificationPreference, PayloadRef, ProductId, TrackedProduct, TrackedProductId,
    TrackingStatus, UserId,
};

/// Column list matching [`job_from_row`].
pub const JOB_COLUMNS: &str = "id, tracked_product_id, product_id, user_id, due_at, due_date, \
     payload_ref, status, attempt_count, claimed_by, claim_expires_at, created_at, updated_at";

pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn fmt_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn fmt_channels(channels: &BTreeSet<Channel>) -> String {
    channels
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

fn conversion_err(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn message_err(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn get_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

fn get_opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        DateTime::parse_from_rfc3339(&s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

/// Parse a strum-backed enum column.
fn get_enum<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = strum::ParseError>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

pub fn parse_channels(raw: &str) -> Result<BTreeSet<Channel>, strum::ParseError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Channel::from_str)
        .collect()
}

/// Map a row selected with [`JOB_COLUMNS`].
pub fn job_from_row(row: &Row<'_>) -> rusqlite::Result<DeliveryJob> {
    let due_date_raw: String = row.get(5)?;
    let due_date = NaiveDate::parse_from_str(&due_date_raw, "%Y-%m-%d")
        .map_err(|e| conversion_err(5, e))?;
    let attempt_count: i64 = row.get(8)?;
    Ok(DeliveryJob {
        id: JobId(row.get(0)?),
        tracked_product_id: TrackedProductId(row.get(1)?),
        product_id: ProductId(row.get(2)?),
        user_id: UserId(row.get(3)?),
        due_at: get_ts(row, 4)?,
        due_date,
        payload_ref: PayloadRef(row.get(6)?),
        status: get_enum::<JobStatus>(row, 7)?,
        attempt_count: u32::try_from(attempt_count).map_err(|e| conversion_err(8, e))?,
        claimed_by: row.get(9)?,
        claim_expires_at: get_opt_ts(row, 10)?,
        created_at: get_ts(row, 11)?,
        updated_at: get_ts(row, 12)?,
    })
}

/// Map `id, product_id, user_id, created_at, status` starting at `offset`.
pub fn tracked_from_row(row: &Row<'_>, offset: usize) -> rusqlite::Result<TrackedProduct> {
    Ok(TrackedProduct {
        id: TrackedProductId(row.get(offset)?),
        product_id: ProductId(row.get(offset + 1)?),
        user_id: UserId(row.get(offset + 2)?),
        created_at: get_ts(row, offset + 3)?,
        status: get_enum::<TrackingStatus>(row, offset + 4)?,
    })
}

/// Map `user_id, channels, delivery_time, timezone, frequency, weekly_day` starting at `offset`.
pub fn preference_from_row(
    row: &Row<'_>,
    offset: usize,
) -> rusqlite::Result<NotificationPreference> {
    let channels_raw: String = row.get(offset + 1)?;
    let channels = parse_channels(&channels_raw).map_err(|e| conversion_err(offset + 1, e))?;

    let time_raw: String = row.get(offset + 2)?;
    let delivery_time = NaiveTime::parse_from_str(&time_raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(&time_raw, "%H:%M"))
        .map_err(|e| conversion_err(offset + 2, e))?;

    let tz_raw: String = row.get(offset + 3)?;
    let timezone = Tz::from_str(&tz_raw)
        .map_err(|e| message_err(offset + 3, format!("unknown timezone `{tz_raw}`: {e}")))?;

    let day_raw: String = row.get(offset + 5)?;
    let weekly_day = Weekday::from_str(&day_raw)
        .map_err(|_| message_err(offset + 5, format!("unknown weekday `{day_raw}`")))?;

    Ok(NotificationPreference {
        user_id: UserId(row.get(offset)?),
        channels,
        delivery_time,
        timezone,
        frequency: get_enum::<Frequency>(row, offset + 4)?,
        weekly_day,
    })
}

/// Map `job_id, channel, attempt, attempted_at, outcome, latency_ms, detail`.
pub fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<ChannelAttempt> {
    let attempt: i64 = row.get(2)?;
    let latency: i64 = row.get(5)?;
    Ok(ChannelAttempt {
        job_id: JobId(row.get(0)?),
        channel: get_enum::<Channel>(row, 1)?,
        attempt: u32::try_from(attempt).map_err(|e| conversion_err(2, e))?,
        attempted_at: get_ts(row, 3)?,
        outcome: get_enum::<AttemptOutcome>(row, 4)?,
        latency_ms: u64::try_from(latency).map_err(|e| conversion_err(5, e))?,
        detail: row.get(6)?,
    })
}
