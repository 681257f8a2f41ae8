// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel senders and operator alert sinks for PricePulse.
//!
//! Each sender implements [`ChannelSender`] for one channel and classifies
//! its own failures as transient or permanent. [`build_senders`] turns the
//! `[channels]` config section into the set the delivery router registers.

pub mod alert;
pub mod email;
mod http;
pub mod push;
pub mod whatsapp;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use pricepulse_config::model::{AlertingConfig, ChannelsConfig};
use pricepulse_core::types::{Channel, UserId};
use pricepulse_core::{AlertSink, ChannelSender, ContactDirectory, PulseError, SendError};

pub use alert::{LogAlertSink, RetryingAlertSink, WebhookAlertSink};
pub use email::EmailSender;
pub use push::PushSender;
pub use whatsapp::WhatsAppSender;

/// A constructed sender and the admission limit configured for its channel.
pub struct ConfiguredSender {
    pub sender: Arc<dyn ChannelSender>,
    pub max_in_flight: usize,
}

/// Build a sender for every enabled channel.
///
/// `timeout` bounds each provider request; the router applies its own
/// per-attempt timeout on top.
pub fn build_senders(
    config: &ChannelsConfig,
    contacts: Arc<dyn ContactDirectory>,
    timeout: Duration,
) -> Result<Vec<ConfiguredSender>, PulseError> {
    let mut senders = Vec::new();

    if config.push.enabled {
        senders.push(ConfiguredSender {
            sender: Arc::new(PushSender::new(&config.push, contacts.clone(), timeout)?),
            max_in_flight: config.push.max_in_flight,
        });
    }
    if config.whatsapp.enabled {
        senders.push(ConfiguredSender {
            sender: Arc::new(WhatsAppSender::new(
                &config.whatsapp,
                contacts.clone(),
                timeout,
            )?),
            max_in_flight: config.whatsapp.max_in_flight,
        });
    }
    if config.email.enabled {
        senders.push(ConfiguredSender {
            sender: Arc::new(EmailSender::new(&config.email, contacts, timeout)?),
            max_in_flight: config.email.max_in_flight,
        });
    }

    let channels: Vec<String> = senders
        .iter()
        .map(|s| s.sender.channel().to_string())
        .collect();
    info!(channels = ?channels, "channel senders configured");
    Ok(senders)
}

/// The webhook sink when a URL is configured, otherwise the log sink.
/// Either way a failed alert is retried once after `retry_delay_ms`.
pub fn build_alert_sink(config: &AlertingConfig) -> Result<Arc<dyn AlertSink>, PulseError> {
    let inner: Arc<dyn AlertSink> = match &config.webhook_url {
        Some(url) => Arc::new(WebhookAlertSink::new(
            url.clone(),
            Duration::from_millis(config.timeout_ms),
        )?),
        None => Arc::new(LogAlertSink),
    };
    Ok(Arc::new(RetryingAlertSink::new(
        inner,
        Duration::from_millis(config.retry_delay_ms),
    )))
}

/// Look up the user's address on `channel`.
///
/// No address on file can't be fixed by retrying; a directory failure can.
pub(crate) async fn resolve_contact(
    contacts: &dyn ContactDirectory,
    user_id: &UserId,
    channel: Channel,
) -> Result<String, SendError> {
    match contacts.contact(user_id, channel).await {
        Ok(Some(address)) => Ok(address),
        Ok(None) => Err(SendError::Permanent(format!(
            "no {channel} address on file for user {user_id}"
        ))),
        Err(e) => Err(SendError::Transient(format!("contact lookup failed: {e}"))),
    }
}
