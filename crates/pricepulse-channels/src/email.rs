// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMTP email sender built on lettre.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, warn};

use pricepulse_config::model::EmailConfig;
use pricepulse_core::types::{AdapterType, Channel, HealthStatus, MessageId, PayloadRef, UserId};
use pricepulse_core::{ChannelSender, ContactDirectory, PluginAdapter, PulseError, SendError};

use crate::resolve_contact;

/// Sends insight links by email over an SMTP relay.
pub struct EmailSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    subject: String,
    insight_base_url: String,
    contacts: Arc<dyn ContactDirectory>,
}

impl EmailSender {
    /// Connect through the configured relay with STARTTLS.
    pub fn new(
        config: &EmailConfig,
        contacts: Arc<dyn ContactDirectory>,
        timeout: Duration,
    ) -> Result<Self, PulseError> {
        let host = config
            .smtp_host
            .as_deref()
            .ok_or_else(|| PulseError::Config("channels.email.smtp_host is required".into()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| PulseError::Channel {
                message: format!("invalid SMTP relay {host}: {e}"),
                source: Some(Box::new(e)),
            })?
            .port(config.smtp_port)
            .timeout(Some(timeout));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Self::with_transport(config, builder.build(), contacts)
    }

    /// Use a prepared transport. Tests point this at a plaintext local port.
    pub fn with_transport(
        config: &EmailConfig,
        transport: AsyncSmtpTransport<Tokio1Executor>,
        contacts: Arc<dyn ContactDirectory>,
    ) -> Result<Self, PulseError> {
        let from = config
            .from
            .as_deref()
            .ok_or_else(|| PulseError::Config("channels.email.from is required".into()))?
            .parse::<Mailbox>()
            .map_err(|e| PulseError::Config(format!("channels.email.from is not a mailbox: {e}")))?;

        Ok(Self {
            transport,
            from,
            subject: config.subject.clone(),
            insight_base_url: config.insight_base_url.clone(),
            contacts,
        })
    }

    fn build_message(
        &self,
        to: &str,
        payload: &PayloadRef,
        message_id: &str,
    ) -> Result<Message, SendError> {
        let to = to
            .parse::<Mailbox>()
            .map_err(|e| SendError::Permanent(format!("invalid recipient address: {e}")))?;
        let body = format!(
            "Your latest price insight is ready.\n\n{}{}\n",
            self.insight_base_url,
            payload.as_str()
        );

        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(&self.subject)
            .message_id(Some(message_id.to_string()))
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| SendError::Permanent(format!("could not build message: {e}")))
    }
}

fn classify_smtp(error: &lettre::transport::smtp::Error) -> SendError {
    if error.is_permanent() {
        SendError::Permanent(format!("smtp rejected message: {error}"))
    } else {
        // 4xx replies, timeouts, connection and TLS failures.
        SendError::Transient(format!("smtp send failed: {error}"))
    }
}

#[async_trait]
impl PluginAdapter for EmailSender {
    fn name(&self) -> &str {
        "smtp"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Sender
    }

    async fn health_check(&self) -> Result<HealthStatus, PulseError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(HealthStatus::Healthy),
            Ok(false) => Ok(HealthStatus::Degraded("smtp relay refused NOOP".into())),
            Err(e) => {
                warn!(error = %e, "smtp health check failed");
                Ok(HealthStatus::Unhealthy(e.to_string()))
            }
        }
    }

    async fn shutdown(&self) -> Result<(), PulseError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, user_id: &UserId, payload: &PayloadRef) -> Result<MessageId, SendError> {
        let address = resolve_contact(self.contacts.as_ref(), user_id, Channel::Email).await?;
        let message_id = format!("<{}@pricepulse>", uuid::Uuid::new_v4());
        let message = self.build_message(&address, payload, &message_id)?;

        let response = self
            .transport
            .send(message)
            .await
            .map_err(|e| classify_smtp(&e))?;
        debug!(code = %response.code(), user_id = %user_id, "smtp relay accepted message");

        Ok(MessageId(message_id))
    }
}
