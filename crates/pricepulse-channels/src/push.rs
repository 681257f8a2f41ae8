// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push notifications through an HTTP push gateway.
//!
//! Each send is one `POST {endpoint}` carrying the device token and the
//! insight payload reference; the gateway owns fan-out to APNs/FCM.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use pricepulse_config::model::PushConfig;
use pricepulse_core::types::{AdapterType, Channel, HealthStatus, MessageId, PayloadRef, UserId};
use pricepulse_core::{ChannelSender, ContactDirectory, PluginAdapter, PulseError, SendError};

use crate::http::{build_client, classify_status, classify_transport};
use crate::resolve_contact;

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    token: &'a str,
    user_id: &'a str,
    payload_ref: &'a str,
}

/// Sends insights to a push gateway.
pub struct PushSender {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    contacts: Arc<dyn ContactDirectory>,
}

impl PushSender {
    pub fn new(
        config: &PushConfig,
        contacts: Arc<dyn ContactDirectory>,
        timeout: Duration,
    ) -> Result<Self, PulseError> {
        let endpoint = config
            .endpoint
            .clone()
            .ok_or_else(|| PulseError::Config("channels.push.endpoint is required".into()))?;
        Ok(Self {
            client: build_client(timeout)?,
            endpoint,
            api_key: config.api_key.clone(),
            contacts,
        })
    }
}

#[async_trait]
impl PluginAdapter for PushSender {
    fn name(&self) -> &str {
        "push-gateway"
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
impl ChannelSender for PushSender {
    fn channel(&self) -> Channel {
        Channel::Push
    }

    async fn send(&self, user_id: &UserId, payload: &PayloadRef) -> Result<MessageId, SendError> {
        let token = resolve_contact(self.contacts.as_ref(), user_id, Channel::Push).await?;

        let mut request = self.client.post(&self.endpoint).json(&PushRequest {
            token: &token,
            user_id: user_id.as_str(),
            payload_ref: payload.as_str(),
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| classify_transport(&e))?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        debug!(%status, user_id = %user_id, "push gateway responded");

        if !status.is_success() {
            return Err(classify_status(status, &body));
        }

        let id = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Ok(MessageId(id))
    }
}
