// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics adapter for PricePulse.
//!
//! Uses the metrics-rs facade with the Prometheus exporter. The scheduler and
//! router record through the helpers in [`recording`]; `serve` optionally
//! exposes them on an HTTP scrape endpoint.

pub mod recording;

use std::net::SocketAddr;

use async_trait::async_trait;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use pricepulse_core::types::{AdapterType, HealthStatus};
use pricepulse_core::{PluginAdapter, PulseError};

pub use recording::{
    add_jobs_in_flight, record_channel_attempt, record_job_finished, record_jobs_created,
    record_jobs_deferred, record_lock_skip, register_metrics,
};

/// Prometheus metrics adapter.
///
/// Installs the Prometheus recorder and exposes a handle for rendering
/// metrics in Prometheus text format.
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Install the recorder globally without a scrape endpoint.
    ///
    /// Only one recorder can be installed per process.
    pub fn new() -> Result<Self, PulseError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            PulseError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();
        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Install the recorder globally and serve `/metrics` on `addr`.
    ///
    /// Must be called from within a Tokio runtime; the exporter runs as a
    /// spawned task for the life of the process.
    pub fn with_listener(addr: SocketAddr) -> Result<Self, PulseError> {
        let (recorder, exporter) = PrometheusBuilder::new()
            .with_http_listener(addr)
            .build()
            .map_err(|e| PulseError::Internal(format!("failed to build Prometheus exporter: {e}")))?;
        let handle = recorder.handle();

        metrics::set_global_recorder(recorder).map_err(|_| {
            PulseError::Internal("a metrics recorder is already installed".to_string())
        })?;

        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "prometheus exporter stopped");
            }
        });

        recording::register_metrics();
        tracing::info!(%addr, "prometheus metrics exporter listening");

        Ok(Self { handle })
    }

    /// Get a reference to the Prometheus handle for rendering.
    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

#[async_trait]
impl PluginAdapter for PrometheusAdapter {
    fn name(&self) -> &str {
        "prometheus"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Observability
    }

    async fn health_check(&self) -> Result<HealthStatus, PulseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PulseError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The global recorder can be installed once per process, so this is the
    // only test that calls `new()`.
    #[tokio::test]
    async fn adapter_installs_once_and_renders() {
        let adapter = PrometheusAdapter::new().unwrap();
        assert_eq!(adapter.name(), "prometheus");
        assert_eq!(adapter.adapter_type(), AdapterType::Observability);
        assert_eq!(adapter.health_check().await.unwrap(), HealthStatus::Healthy);

        record_lock_skip();
        assert!(adapter.render().contains("pricepulse_scheduler_lock_skips_total 1"));

        assert!(PrometheusAdapter::new().is_err());
    }
}
