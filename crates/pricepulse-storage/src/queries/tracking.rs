// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracked products and notification preferences.

use pricepulse_core::types::{
    NotificationPreference, TrackedProduct, TrackedProductId, TrackingStatus, UserId,
};
use pricepulse_core::PulseError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::{fmt_channels, fmt_ts, preference_from_row, tracked_from_row};

/// Active tracked products joined with their owner's preference.
pub async fn list_active_tracking(
    db: &Database,
) -> Result<Vec<(TrackedProduct, NotificationPreference)>, PulseError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.id, t.product_id, t.user_id, t.created_at, t.status,
                        p.user_id, p.channels, p.delivery_time, p.timezone, p.frequency, p.weekly_day
                 FROM tracked_products t
                 JOIN notification_preferences p ON p.user_id = t.user_id
                 WHERE t.status = 'active'
                 ORDER BY t.created_at ASC, t.id ASC",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((tracked_from_row(row, 0)?, preference_from_row(row, 5)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_tracked_product(
    db: &Database,
    id: &TrackedProductId,
) -> Result<Option<TrackedProduct>, PulseError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT id, product_id, user_id, created_at, status
                 FROM tracked_products WHERE id = ?1",
                params![id],
                |row| tracked_from_row(row, 0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_preference(
    db: &Database,
    user_id: &UserId,
) -> Result<Option<NotificationPreference>, PulseError> {
    let user_id = user_id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT user_id, channels, delivery_time, timezone, frequency, weekly_day
                 FROM notification_preferences WHERE user_id = ?1",
                params![user_id],
                |row| preference_from_row(row, 0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace a tracked product.
pub async fn upsert_tracked_product(
    db: &Database,
    product: &TrackedProduct,
) -> Result<(), PulseError> {
    let product = product.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO tracked_products (id, product_id, user_id, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(id) DO UPDATE SET
                    product_id = excluded.product_id,
                    user_id = excluded.user_id,
                    status = excluded.status",
                params![
                    product.id.0,
                    product.product_id.0,
                    product.user_id.0,
                    product.status.to_string(),
                    fmt_ts(product.created_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Change a tracked product's status. Returns `false` if it does not exist.
pub async fn set_tracking_status(
    db: &Database,
    id: &TrackedProductId,
    status: TrackingStatus,
) -> Result<bool, PulseError> {
    let id = id.0.clone();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE tracked_products SET status = ?1 WHERE id = ?2",
                params![status.to_string(), id],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace a user's preference.
pub async fn upsert_preference(
    db: &Database,
    pref: &NotificationPreference,
) -> Result<(), PulseError> {
    let user_id = pref.user_id.0.clone();
    let channels = fmt_channels(&pref.channels);
    let delivery_time = pref.delivery_time.format("%H:%M:%S").to_string();
    let timezone = pref.timezone.name().to_string();
    let frequency = pref.frequency.to_string();
    let weekly_day = pref.weekly_day.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO notification_preferences
                    (user_id, channels, delivery_time, timezone, frequency, weekly_day)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![user_id, channels, delivery_time, timezone, frequency, weekly_day],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
