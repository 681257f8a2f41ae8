// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One-shot operator commands: evaluate, dispatch, requeue, abandon, archive,
//! and `config show`.

use chrono::{DateTime, Utc};

use pricepulse_config::PulseConfig;
use pricepulse_core::types::{JobId, TrackedProductId, TrackingStatus};
use pricepulse_core::{PulseError, StorageAdapter};
use pricepulse_router::DispatchOutcome;
use pricepulse_scheduler::{CycleOutcome, EvaluationReport};

use crate::services;

/// `pricepulse evaluate`: one scheduler pass.
///
/// Without `--at` this takes the window lock like the service does, so it is
/// safe to run next to `serve`.
pub async fn run_evaluate(
    config: &PulseConfig,
    at: Option<DateTime<Utc>>,
) -> Result<(), PulseError> {
    let storage = services::open_storage(config).await?;
    let alerts = services::alert_sink(config)?;
    let holder = services::holder_id(config);
    let scheduler = services::scheduler(config, storage.clone(), alerts, &holder);

    let report = match at {
        Some(at) => Some(scheduler.evaluate(at).await?),
        None => match scheduler.run_cycle().await? {
            CycleOutcome::Evaluated(report) => Some(report),
            CycleOutcome::Skipped { .. } => None,
        },
    };

    match report {
        Some(report) => print_report(&report),
        None => println!("skipped: another instance holds this evaluation window"),
    }
    storage.close().await
}

fn print_report(report: &EvaluationReport) {
    println!("created:            {}", report.created.len());
    for id in &report.created {
        println!("  {id}");
    }
    println!("already scheduled:  {}", report.already_scheduled);
    println!("deferred not ready: {}", report.deferred_not_ready);
    println!("not due:            {}", report.not_due);
    println!("skipped inactive:   {}", report.skipped_inactive);
    if report.errors > 0 {
        println!("errors:             {}", report.errors);
    }
}

/// `pricepulse dispatch [JOB_ID]`.
pub async fn run_dispatch(config: &PulseConfig, job_id: Option<String>) -> Result<(), PulseError> {
    let storage = services::open_storage(config).await?;
    let alerts = services::alert_sink(config)?;
    let holder = services::holder_id(config);
    let router = services::router(config, storage.clone(), alerts, &holder)?;

    let outcomes = match job_id {
        Some(id) => {
            let id = JobId(id);
            match router.dispatch_job(&id).await? {
                Some(outcome) => vec![outcome],
                None => {
                    println!("job {id} is not pending");
                    Vec::new()
                }
            }
        }
        None => router.dispatch_pending().await?,
    };

    for outcome in &outcomes {
        println!("{}", describe(outcome));
    }
    if outcomes.is_empty() {
        println!("nothing dispatched");
    }
    storage.close().await
}

fn describe(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Delivered { job_id, channels } => {
            let names: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
            format!("{job_id}: delivered via {}", names.join(", "))
        }
        DispatchOutcome::Failed { job_id, attempts } => {
            format!("{job_id}: failed after {attempts} attempts")
        }
        DispatchOutcome::Cancelled { job_id } => {
            format!("{job_id}: cancelled, product no longer tracked")
        }
    }
}

/// `pricepulse requeue JOB_ID`.
pub async fn run_requeue(config: &PulseConfig, job_id: &str) -> Result<(), PulseError> {
    let storage = services::open_storage(config).await?;
    let alerts = services::alert_sink(config)?;
    let router = services::router(config, storage.clone(), alerts, &services::holder_id(config))?;
    router.requeue(&JobId::from(job_id)).await?;
    println!("{job_id}: re-queued");
    storage.close().await
}

/// `pricepulse abandon JOB_ID`.
pub async fn run_abandon(config: &PulseConfig, job_id: &str) -> Result<(), PulseError> {
    let storage = services::open_storage(config).await?;
    let alerts = services::alert_sink(config)?;
    let router = services::router(config, storage.clone(), alerts, &services::holder_id(config))?;
    router.abandon(&JobId::from(job_id)).await?;
    println!("{job_id}: abandoned");
    storage.close().await
}

/// `pricepulse archive TRACKED_PRODUCT_ID`.
pub async fn run_archive(config: &PulseConfig, tracked_product_id: &str) -> Result<(), PulseError> {
    let storage = services::open_storage(config).await?;
    let id = TrackedProductId::from(tracked_product_id);
    if !storage.set_tracking_status(&id, TrackingStatus::Archived).await? {
        return Err(PulseError::NotFound {
            entity: "tracked product",
            id: tracked_product_id.to_string(),
        });
    }
    println!("{tracked_product_id}: archived");
    storage.close().await
}

/// `pricepulse config show`.
pub fn show_config(config: &PulseConfig) -> Result<(), PulseError> {
    let rendered = pricepulse_config::to_toml(config)
        .map_err(|e| PulseError::Internal(format!("failed to render config: {e}")))?;
    print!("{rendered}");
    Ok(())
}
