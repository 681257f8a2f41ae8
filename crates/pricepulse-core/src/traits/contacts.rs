// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lookup of per-channel recipient addresses.

use async_trait::async_trait;

use crate::error::PulseError;
use crate::types::{Channel, UserId};

/// Resolves a user's address on a channel (push token, phone number, email).
#[async_trait]
pub trait ContactDirectory: Send + Sync {
    async fn contact(&self, user_id: &UserId, channel: Channel)
        -> Result<Option<String>, PulseError>;
}
