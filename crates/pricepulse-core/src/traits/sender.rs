// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel sender trait for push, WhatsApp, and email delivery.

use async_trait::async_trait;

use crate::error::SendError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Channel, MessageId, PayloadRef, UserId};

/// Uniform send capability implemented once per [`Channel`].
///
/// Implementations classify their own failures into [`SendError::Transient`]
/// and [`SendError::Permanent`]. They must not retry internally; retry policy
/// belongs to the router.
#[async_trait]
pub trait ChannelSender: PluginAdapter {
    /// The channel this sender delivers over.
    fn channel(&self) -> Channel;

    /// Deliver the insight identified by `payload` to `user_id`.
    async fn send(&self, user_id: &UserId, payload: &PayloadRef) -> Result<MessageId, SendError>;
}
