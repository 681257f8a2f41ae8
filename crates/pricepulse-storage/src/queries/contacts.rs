// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-channel recipient addresses.

use pricepulse_core::types::{Channel, UserId};
use pricepulse_core::PulseError;
use rusqlite::{params, OptionalExtension};

use crate::database::{map_tr_err, Database};

pub async fn get_contact(
    db: &Database,
    user_id: &UserId,
    channel: Channel,
) -> Result<Option<String>, PulseError> {
    let user_id = user_id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT address FROM user_contacts WHERE user_id = ?1 AND channel = ?2",
                params![user_id, channel.to_string()],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_contact(
    db: &Database,
    user_id: &UserId,
    channel: Channel,
    address: &str,
) -> Result<(), PulseError> {
    let user_id = user_id.0.clone();
    let address = address.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO user_contacts (user_id, channel, address)
                 VALUES (?1, ?2, ?3)",
                params![user_id, channel.to_string(), address],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
