// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Latest analysis payload handle per product.

use chrono::{DateTime, Utc};
use pricepulse_core::types::{PayloadLookup, PayloadRef, ProductId};
use pricepulse_core::PulseError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};
use crate::models::fmt_ts;

pub async fn latest_payload_ref(
    db: &Database,
    product_id: &ProductId,
) -> Result<PayloadLookup, PulseError> {
    let product_id = product_id.0.clone();
    let found: Option<String> = db
        .connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT payload_ref FROM analysis_payloads WHERE product_id = ?1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)?;
    Ok(match found {
        Some(payload) => PayloadLookup::Ready(PayloadRef(payload)),
        None => PayloadLookup::NotReady,
    })
}

/// Publish the latest payload for a product, replacing any earlier one.
pub async fn put_payload(
    db: &Database,
    product_id: &ProductId,
    payload_ref: &PayloadRef,
    now: DateTime<Utc>,
) -> Result<(), PulseError> {
    let product_id = product_id.0.clone();
    let payload_ref = payload_ref.0.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO analysis_payloads (product_id, payload_ref, updated_at)
                 VALUES (?1, ?2, ?3)",
                params![product_id, payload_ref, fmt_ts(now)],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
