// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `pricepulse serve` command implementation.
//!
//! Opens SQLite storage, builds the channel senders and the alert sink, then
//! runs the notification scheduler and the delivery worker pool side by side
//! until a shutdown signal arrives.

use std::sync::Arc;

use tracing::{info, warn};

use pricepulse_config::PulseConfig;
use pricepulse_core::types::HealthStatus;
use pricepulse_core::{PluginAdapter, PulseError, StorageAdapter};

use crate::services;
use crate::shutdown;

pub async fn run_serve(config: PulseConfig) -> Result<(), PulseError> {
    init_tracing(&config.service.log_level);

    let holder = services::holder_id(&config);
    info!(holder = %holder, "starting pricepulse serve");

    #[cfg(feature = "prometheus")]
    let _metrics = start_metrics(&config)?;

    let storage = services::open_storage(&config).await?;
    log_health(storage.name(), storage.health_check().await?);
    let alerts = services::alert_sink(&config)?;
    log_health(alerts.name(), alerts.health_check().await?);

    let cancel = shutdown::install_signal_handler();
    let mut tasks = tokio::task::JoinSet::new();

    if config.scheduler.enabled {
        let scheduler = services::scheduler(&config, storage.clone(), alerts.clone(), &holder);
        let scheduler_cancel = cancel.clone();
        info!(
            interval_secs = config.scheduler.interval_secs,
            lock_ttl_secs = config.scheduler.lock_ttl_secs,
            "notification scheduler enabled"
        );
        tasks.spawn(async move { scheduler.run(scheduler_cancel).await });
    } else {
        info!("notification scheduler disabled");
    }

    let mut running_router = None;
    if config.router.enabled {
        let router = Arc::new(services::router(
            &config,
            storage.clone(),
            alerts.clone(),
            &holder,
        )?);
        if router.channels().is_empty() {
            warn!("no channels enabled; every job will fail");
        }
        for (channel, health) in router.sender_health().await {
            log_health(&channel.to_string(), health);
        }
        let router_cancel = cancel.clone();
        running_router = Some(Arc::clone(&router));
        tasks.spawn(async move { router.run(router_cancel).await });
    } else {
        info!("delivery router disabled");
    }

    if tasks.is_empty() {
        warn!("scheduler and router are both disabled; nothing to run");
    }

    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            warn!(error = %e, "service task ended abnormally");
            cancel.cancel();
        }
    }

    if let Some(router) = running_router {
        router.shutdown_senders().await;
    }
    if let Err(e) = alerts.shutdown().await {
        warn!(error = %e, "alert sink shutdown error");
    }
    storage.close().await?;
    info!("pricepulse serve shutdown complete");
    Ok(())
}

fn log_health(adapter: &str, health: HealthStatus) {
    match health {
        HealthStatus::Healthy => info!(adapter, "adapter healthy"),
        HealthStatus::Degraded(reason) => warn!(adapter, reason = %reason, "adapter degraded"),
        HealthStatus::Unhealthy(reason) => warn!(adapter, reason = %reason, "adapter unhealthy"),
    }
}

#[cfg(feature = "prometheus")]
fn start_metrics(
    config: &PulseConfig,
) -> Result<Option<pricepulse_prometheus::PrometheusAdapter>, PulseError> {
    if !config.metrics.enabled {
        return Ok(None);
    }
    let addr = config
        .metrics
        .listen_address
        .parse::<std::net::SocketAddr>()
        .map_err(|e| {
            PulseError::Config(format!(
                "metrics.listen_address `{}` is not a socket address: {e}",
                config.metrics.listen_address
            ))
        })?;
    let adapter = pricepulse_prometheus::PrometheusAdapter::with_listener(addr)?;
    pricepulse_prometheus::register_metrics();
    info!(%addr, "prometheus scrape endpoint listening");
    Ok(Some(adapter))
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("pricepulse={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
