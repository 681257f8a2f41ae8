// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The recurring evaluation pass that turns due preferences into delivery jobs.
//!
//! Each cycle takes a lease on the current minute window so only one instance
//! evaluates it. A cycle that loses the lease is skipped silently; operators
//! hear about it once the consecutive-skip count reaches the configured
//! threshold, and a successful cycle resets the count.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pricepulse_config::model::SchedulerConfig;
use pricepulse_core::types::{
    Alert, DeliveryJob, JobId, NotificationPreference, PayloadLookup, TrackedProduct,
};
use pricepulse_core::{
    AlertSink, AnalysisStore, Clock, JobStore, LockProvider, PulseError, TrackingStore,
};

use crate::due::compute_due;

/// The stores a [`Scheduler`] reads from and writes to.
#[derive(Clone)]
pub struct SchedulerStores {
    pub tracking: Arc<dyn TrackingStore>,
    pub analysis: Arc<dyn AnalysisStore>,
    pub jobs: Arc<dyn JobStore>,
    pub lock: Arc<dyn LockProvider>,
}

/// Counts from one evaluation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EvaluationReport {
    /// Jobs written by this pass.
    pub created: Vec<JobId>,
    /// Due pairs that already had a job for the due date.
    pub already_scheduled: usize,
    /// Due pairs whose analysis was not ready; retried next cycle.
    pub deferred_not_ready: usize,
    /// Pairs whose delivery moment has not been reached today.
    pub not_due: usize,
    /// Products handed back as active that were not.
    pub skipped_inactive: usize,
    /// Pairs that hit a storage error; retried next cycle.
    pub errors: usize,
}

/// What a single [`Scheduler::run_cycle`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Evaluated(EvaluationReport),
    /// Another holder owns this window's lease.
    Skipped { consecutive: u32 },
}

enum PairResult {
    Created(JobId),
    AlreadyScheduled,
    Deferred,
    NotDue,
    Inactive,
}

/// Evaluates active tracking on a timer and enqueues due insights.
pub struct Scheduler {
    config: SchedulerConfig,
    stores: SchedulerStores,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    holder: String,
    consecutive_skips: Mutex<u32>,
}

impl Scheduler {
    /// `holder` identifies this instance in the evaluation lock.
    pub fn new(
        config: SchedulerConfig,
        stores: SchedulerStores,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        holder: impl Into<String>,
    ) -> Self {
        Self {
            config,
            stores,
            alerts,
            clock,
            holder: holder.into(),
            consecutive_skips: Mutex::new(0),
        }
    }

    /// Lease key for the minute window containing `now`.
    pub fn window_key(now: DateTime<Utc>) -> String {
        format!("evaluate:{}", now.format("%Y-%m-%dT%H:%M"))
    }

    /// Evaluate every active tracked product against its owner's preference at `now`.
    ///
    /// Fails only when the active set cannot be read; per-pair storage errors
    /// are logged and counted so one bad row does not starve the rest.
    pub async fn evaluate(&self, now: DateTime<Utc>) -> Result<EvaluationReport, PulseError> {
        let pairs = self.stores.tracking.list_active_tracking().await?;
        let mut report = EvaluationReport::default();

        for (product, pref) in &pairs {
            match self.evaluate_pair(product, pref, now).await {
                Ok(PairResult::Created(id)) => report.created.push(id),
                Ok(PairResult::AlreadyScheduled) => report.already_scheduled += 1,
                Ok(PairResult::Deferred) => report.deferred_not_ready += 1,
                Ok(PairResult::NotDue) => report.not_due += 1,
                Ok(PairResult::Inactive) => report.skipped_inactive += 1,
                Err(e) => {
                    warn!(
                        tracked_product_id = %product.id,
                        error = %e,
                        "evaluation failed for tracked product"
                    );
                    report.errors += 1;
                }
            }
        }

        #[cfg(feature = "prometheus")]
        {
            pricepulse_prometheus::record_jobs_created(report.created.len() as u64);
            pricepulse_prometheus::record_jobs_deferred(report.deferred_not_ready as u64);
        }

        info!(
            evaluated = pairs.len(),
            created = report.created.len(),
            already_scheduled = report.already_scheduled,
            deferred = report.deferred_not_ready,
            errors = report.errors,
            "evaluation pass complete"
        );
        Ok(report)
    }

    async fn evaluate_pair(
        &self,
        product: &TrackedProduct,
        pref: &NotificationPreference,
        now: DateTime<Utc>,
    ) -> Result<PairResult, PulseError> {
        if !product.is_active() {
            return Ok(PairResult::Inactive);
        }
        let Some(slot) = compute_due(pref, now) else {
            return Ok(PairResult::NotDue);
        };
        if self.stores.jobs.job_exists(&product.id, slot.due_date).await? {
            return Ok(PairResult::AlreadyScheduled);
        }

        let payload = match self
            .stores
            .analysis
            .latest_payload_ref(&product.product_id)
            .await?
        {
            PayloadLookup::Ready(payload) => payload,
            PayloadLookup::NotReady => {
                debug!(
                    tracked_product_id = %product.id,
                    product_id = %product.product_id,
                    "analysis not ready, deferring"
                );
                return Ok(PairResult::Deferred);
            }
        };

        let job = DeliveryJob::new(product, slot.due_at, slot.due_date, payload, now);
        if !self.stores.jobs.insert_job(&job).await? {
            // Lost a race with another writer between the check and the insert.
            return Ok(PairResult::AlreadyScheduled);
        }
        debug!(
            job_id = %job.id,
            tracked_product_id = %product.id,
            due_at = %job.due_at,
            "delivery job created"
        );
        Ok(PairResult::Created(job.id))
    }

    /// Take the window lease and evaluate, or record a contention skip.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, PulseError> {
        let now = self.clock.now();
        let key = Self::window_key(now);
        let ttl = Duration::from_secs(self.config.lock_ttl_secs);

        if !self
            .stores
            .lock
            .try_acquire(&key, &self.holder, now, ttl)
            .await?
        {
            let consecutive = self.record_skip(&key).await;
            return Ok(CycleOutcome::Skipped { consecutive });
        }

        *self.consecutive_skips.lock().await = 0;
        let report = self.evaluate(now).await?;
        Ok(CycleOutcome::Evaluated(report))
    }

    async fn record_skip(&self, window: &str) -> u32 {
        let consecutive = {
            let mut skips = self.consecutive_skips.lock().await;
            *skips = skips.saturating_add(1);
            *skips
        };

        #[cfg(feature = "prometheus")]
        pricepulse_prometheus::record_lock_skip();

        debug!(window, consecutive, "evaluation lock held elsewhere, skipping cycle");

        if consecutive == self.config.contention_alert_threshold {
            let alert = Alert::LockContention {
                consecutive_skips: consecutive,
                window: window.to_string(),
            };
            warn!(consecutive, window, "scheduler lock contention above threshold");
            if let Err(e) = self.alerts.alert(&alert).await {
                error!(consecutive, window, error = %e, "contention alert undeliverable");
            }
        }
        consecutive
    }

    /// Run cycles every `interval_secs` until `cancel` fires.
    ///
    /// The first cycle runs immediately. Cycle errors are logged and the loop
    /// continues.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            interval_secs = self.config.interval_secs,
            holder = %self.holder,
            "scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.run_cycle().await {
                        warn!(error = %e, "scheduler cycle failed (non-fatal)");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("scheduler shutting down");
                    break;
                }
            }
        }
    }
}
