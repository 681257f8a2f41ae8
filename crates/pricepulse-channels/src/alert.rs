// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator alert sinks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info, warn};

use pricepulse_core::types::{AdapterType, Alert, HealthStatus};
use pricepulse_core::{AlertSink, PluginAdapter, PulseError};

use crate::http::build_client;

/// Writes alerts to the log at error level. Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogAlertSink;

#[async_trait]
impl PluginAdapter for LogAlertSink {
    fn name(&self) -> &str {
        "log-alerts"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Alerting
    }

    async fn health_check(&self) -> Result<HealthStatus, PulseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PulseError> {
        Ok(())
    }
}

#[async_trait]
impl AlertSink for LogAlertSink {
    async fn alert(&self, alert: &Alert) -> Result<(), PulseError> {
        error!(alert = %alert, "operator alert");
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    text: String,
    #[serde(flatten)]
    alert: &'a Alert,
}

/// Posts each alert as JSON to an operator webhook (Slack-compatible `text`
/// field plus the structured alert).
pub struct WebhookAlertSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, PulseError> {
        Ok(Self {
            client: build_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for WebhookAlertSink {
    fn name(&self) -> &str {
        "webhook-alerts"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Alerting
    }

    async fn health_check(&self) -> Result<HealthStatus, PulseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PulseError> {
        Ok(())
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn alert(&self, alert: &Alert) -> Result<(), PulseError> {
        let body = WebhookBody {
            text: alert.to_string(),
            alert,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| PulseError::Alert {
                message: format!("webhook request failed: {e}"),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PulseError::Alert {
                message: format!("webhook returned {status}"),
            });
        }
        info!(alert = %alert, "alert posted to webhook");
        Ok(())
    }
}

/// Retries a failed alert once after `retry_after`.
///
/// A second failure is logged at error level and returned to the caller.
pub struct RetryingAlertSink {
    inner: Arc<dyn AlertSink>,
    retry_after: Duration,
}

impl RetryingAlertSink {
    pub fn new(inner: Arc<dyn AlertSink>, retry_after: Duration) -> Self {
        Self { inner, retry_after }
    }
}

#[async_trait]
impl PluginAdapter for RetryingAlertSink {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn version(&self) -> semver::Version {
        self.inner.version()
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Alerting
    }

    async fn health_check(&self) -> Result<HealthStatus, PulseError> {
        self.inner.health_check().await
    }

    async fn shutdown(&self) -> Result<(), PulseError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl AlertSink for RetryingAlertSink {
    async fn alert(&self, alert: &Alert) -> Result<(), PulseError> {
        let Err(first) = self.inner.alert(alert).await else {
            return Ok(());
        };
        warn!(
            alert = %alert,
            error = %first,
            retry_after_ms = self.retry_after.as_millis() as u64,
            "alert delivery failed, retrying"
        );
        tokio::time::sleep(self.retry_after).await;

        self.inner.alert(alert).await.inspect_err(|e| {
            error!(alert = %alert, error = %e, "alert undeliverable after retry");
        })
    }
}
