// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alert sink that captures alerts for assertion.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use pricepulse_core::types::{AdapterType, Alert, HealthStatus};
use pricepulse_core::{AlertSink, PluginAdapter, PulseError};

#[derive(Debug, Default, Clone)]
pub struct RecordingAlertSink {
    alerts: Arc<Mutex<Vec<Alert>>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn alerts(&self) -> Vec<Alert> {
        self.alerts.lock().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.alerts.lock().await.len()
    }
}

#[async_trait]
impl PluginAdapter for RecordingAlertSink {
    fn name(&self) -> &str {
        "recording-alerts"
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
impl AlertSink for RecordingAlertSink {
    async fn alert(&self, alert: &Alert) -> Result<(), PulseError> {
        self.alerts.lock().await.push(alert.clone());
        Ok(())
    }
}
