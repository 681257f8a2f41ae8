// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Alerting collaborator trait.

use async_trait::async_trait;

use crate::error::PulseError;
use crate::traits::adapter::PluginAdapter;
use crate::types::Alert;

/// Receives operator-facing alerts (failed jobs, scheduler lock contention).
#[async_trait]
pub trait AlertSink: PluginAdapter {
    /// Deliver one alert.
    async fn alert(&self, alert: &Alert) -> Result<(), PulseError>;
}
