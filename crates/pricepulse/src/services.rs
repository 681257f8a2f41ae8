// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring of storage, senders, and alerting into the scheduler and router.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use pricepulse_config::PulseConfig;
use pricepulse_core::{AlertSink, PulseError, StorageAdapter, SystemClock};
use pricepulse_router::{DeliveryRouter, RouterStores};
use pricepulse_scheduler::{Scheduler, SchedulerStores};
use pricepulse_storage::SqliteStorage;

/// Identity used on scheduler leases and job claims.
///
/// The configured `service.instance_id`, or a fresh one per process.
pub fn holder_id(config: &PulseConfig) -> String {
    config
        .service
        .instance_id
        .clone()
        .unwrap_or_else(|| format!("{}-{}", config.service.name, uuid::Uuid::new_v4().simple()))
}

pub async fn open_storage(config: &PulseConfig) -> Result<Arc<SqliteStorage>, PulseError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    debug!(path = %config.storage.database_path, "storage opened");
    Ok(Arc::new(storage))
}

pub fn alert_sink(config: &PulseConfig) -> Result<Arc<dyn AlertSink>, PulseError> {
    pricepulse_channels::build_alert_sink(&config.alerting)
}

pub fn scheduler(
    config: &PulseConfig,
    storage: Arc<SqliteStorage>,
    alerts: Arc<dyn AlertSink>,
    holder: &str,
) -> Scheduler {
    let stores = SchedulerStores {
        tracking: storage.clone(),
        analysis: storage.clone(),
        jobs: storage.clone(),
        lock: storage,
    };
    Scheduler::new(
        config.scheduler.clone(),
        stores,
        alerts,
        Arc::new(SystemClock),
        holder,
    )
}

/// A router with a sender registered for every enabled channel.
pub fn router(
    config: &PulseConfig,
    storage: Arc<SqliteStorage>,
    alerts: Arc<dyn AlertSink>,
    holder: &str,
) -> Result<DeliveryRouter, PulseError> {
    let senders = pricepulse_channels::build_senders(
        &config.channels,
        storage.clone(),
        Duration::from_millis(config.router.send_timeout_ms),
    )?;

    let stores = RouterStores {
        tracking: storage.clone(),
        jobs: storage,
    };
    let mut router = DeliveryRouter::new(
        config.router.clone(),
        stores,
        alerts,
        Arc::new(SystemClock),
        holder,
    );
    for configured in senders {
        router = router.with_sender(configured.sender, configured.max_in_flight);
    }
    Ok(router)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configured_instance_id_is_the_holder() {
        let mut config = PulseConfig::default();
        config.service.instance_id = Some("worker-a".into());
        assert_eq!(holder_id(&config), "worker-a");
    }

    #[test]
    fn generated_holders_are_unique() {
        let config = PulseConfig::default();
        let a = holder_id(&config);
        assert!(a.starts_with("pricepulse-"));
        assert_ne!(a, holder_id(&config));
    }
}
