// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WhatsApp Cloud API sender.
//!
//! Insights go out as a pre-approved template message whose single body
//! parameter is the payload reference.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use pricepulse_config::model::WhatsAppConfig;
use pricepulse_core::types::{AdapterType, Channel, HealthStatus, MessageId, PayloadRef, UserId};
use pricepulse_core::{ChannelSender, ContactDirectory, PluginAdapter, PulseError, SendError};

use crate::http::{build_client, classify_status, classify_transport};
use crate::resolve_contact;

#[derive(Debug, Serialize)]
struct TemplateMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    template: Template<'a>,
}

#[derive(Debug, Serialize)]
struct Template<'a> {
    name: &'a str,
    language: Language<'a>,
    components: [Component<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Language<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct Component<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    parameters: [TextParameter<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextParameter<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<SentMessage>,
}

#[derive(Debug, Deserialize)]
struct SentMessage {
    id: String,
}

/// Sends insight templates through the WhatsApp Cloud API.
pub struct WhatsAppSender {
    client: reqwest::Client,
    messages_url: String,
    access_token: String,
    template_name: String,
    language: String,
    contacts: Arc<dyn ContactDirectory>,
}

impl WhatsAppSender {
    pub fn new(
        config: &WhatsAppConfig,
        contacts: Arc<dyn ContactDirectory>,
        timeout: Duration,
    ) -> Result<Self, PulseError> {
        let phone_number_id = config.phone_number_id.as_deref().ok_or_else(|| {
            PulseError::Config("channels.whatsapp.phone_number_id is required".into())
        })?;
        let access_token = config.access_token.clone().ok_or_else(|| {
            PulseError::Config("channels.whatsapp.access_token is required".into())
        })?;
        let messages_url = format!(
            "{}/{}/messages",
            config.api_base.trim_end_matches('/'),
            phone_number_id
        );

        Ok(Self {
            client: build_client(timeout)?,
            messages_url,
            access_token,
            template_name: config.template_name.clone(),
            language: config.language.clone(),
            contacts,
        })
    }

    fn message<'a>(&'a self, to: &'a str, payload: &'a PayloadRef) -> TemplateMessage<'a> {
        TemplateMessage {
            messaging_product: "whatsapp",
            to,
            kind: "template",
            template: Template {
                name: &self.template_name,
                language: Language {
                    code: &self.language,
                },
                components: [Component {
                    kind: "body",
                    parameters: [TextParameter {
                        kind: "text",
                        text: payload.as_str(),
                    }],
                }],
            },
        }
    }
}

#[async_trait]
impl PluginAdapter for WhatsAppSender {
    fn name(&self) -> &str {
        "whatsapp-cloud"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Sender
    }

    async fn health_check(&self) -> Result<HealthStatus, PulseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PulseError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for WhatsAppSender {
    fn channel(&self) -> Channel {
        Channel::WhatsApp
    }

    async fn send(&self, user_id: &UserId, payload: &PayloadRef) -> Result<MessageId, SendError> {
        let phone = resolve_contact(self.contacts.as_ref(), user_id, Channel::WhatsApp).await?;

        let response = self
            .client
            .post(&self.messages_url)
            .bearer_auth(&self.access_token)
            .json(&self.message(&phone, payload))
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(%status, user_id = %user_id, "whatsapp cloud api responded");

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let parsed: SendResponse = serde_json::from_str(&body)
            .map_err(|e| SendError::Transient(format!("unreadable whatsapp response: {e}")))?;
        parsed
            .messages
            .into_iter()
            .next()
            .map(|m| MessageId(m.id))
            .ok_or_else(|| SendError::Transient("whatsapp response carried no message id".into()))
    }
}
