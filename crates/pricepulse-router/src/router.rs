// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Claim-time checks, concurrent channel fan-out, and job finalisation.
//!
//! Every enabled channel runs its own retry loop concurrently. The first
//! successful send marks the job delivered and stops the other paths from
//! scheduling further retries; sends already in flight still complete and are
//! audited. When every path gives up the job fails and operators are alerted
//! once.
//!
//! A claim is renewed while its job is being processed, and every exit from
//! `in_flight` is fenced on the claim holder. A worker whose claim was taken
//! over stops retrying and leaves the job to the new holder. Any other error
//! after the claim returns the job to `pending`.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::TimeDelta;
use tokio::sync::Semaphore;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pricepulse_config::model::RouterConfig;
use pricepulse_core::types::{
    Alert, AttemptOutcome, Channel, ChannelAttempt, ClaimOutcome, ClaimRequest, DeliveryJob,
    HealthStatus, JobId, JobStatus, MessageId,
};
use pricepulse_core::{
    AlertSink, ChannelSender, Clock, JobStore, PulseError, SendError, TrackingStore,
};

use crate::policy::RetryPolicy;

/// The stores a [`DeliveryRouter`] reads from and writes to.
#[derive(Clone)]
pub struct RouterStores {
    pub tracking: Arc<dyn TrackingStore>,
    pub jobs: Arc<dyn JobStore>,
}

/// How a claimed job left the router.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// At least one channel delivered.
    Delivered {
        job_id: JobId,
        channels: Vec<Channel>,
    },
    /// Every enabled channel abandoned; operators were alerted.
    Failed { job_id: JobId, attempts: usize },
    /// The tracked product was no longer active; nothing was sent.
    Cancelled { job_id: JobId },
}

impl DispatchOutcome {
    pub fn job_id(&self) -> &JobId {
        match self {
            DispatchOutcome::Delivered { job_id, .. }
            | DispatchOutcome::Failed { job_id, .. }
            | DispatchOutcome::Cancelled { job_id } => job_id,
        }
    }

    /// The job status this outcome left behind.
    pub fn status(&self) -> JobStatus {
        match self {
            DispatchOutcome::Delivered { .. } => JobStatus::Delivered,
            DispatchOutcome::Failed { .. } => JobStatus::Failed,
            DispatchOutcome::Cancelled { .. } => JobStatus::Cancelled,
        }
    }
}

struct SenderSlot {
    sender: Arc<dyn ChannelSender>,
    admission: Arc<Semaphore>,
}

/// Result of one channel path.
#[derive(Debug)]
struct PathReport {
    channel: Channel,
    attempts: usize,
    delivered: Option<MessageId>,
}

/// Claims delivery jobs and fans them out over the user's enabled channels.
pub struct DeliveryRouter {
    config: RouterConfig,
    policy: RetryPolicy,
    stores: RouterStores,
    senders: HashMap<Channel, SenderSlot>,
    alerts: Arc<dyn AlertSink>,
    clock: Arc<dyn Clock>,
    holder: String,
}

impl DeliveryRouter {
    /// `holder` identifies this instance on job claims.
    pub fn new(
        config: RouterConfig,
        stores: RouterStores,
        alerts: Arc<dyn AlertSink>,
        clock: Arc<dyn Clock>,
        holder: impl Into<String>,
    ) -> Self {
        Self {
            policy: RetryPolicy::from_config(&config),
            config,
            stores,
            senders: HashMap::new(),
            alerts,
            clock,
            holder: holder.into(),
        }
    }

    /// Register the sender for its channel, admitting at most `max_in_flight`
    /// concurrent sends. A later registration for the same channel replaces it.
    pub fn with_sender(mut self, sender: Arc<dyn ChannelSender>, max_in_flight: usize) -> Self {
        let channel = sender.channel();
        info!(%channel, sender = sender.name(), max_in_flight, "channel sender registered");
        self.senders.insert(
            channel,
            SenderSlot {
                sender,
                admission: Arc::new(Semaphore::new(max_in_flight.max(1))),
            },
        );
        self
    }

    /// Channels with a registered sender.
    pub fn channels(&self) -> BTreeSet<Channel> {
        self.senders.keys().copied().collect()
    }

    /// Health of every registered sender. A failed check counts as unhealthy.
    pub async fn sender_health(&self) -> Vec<(Channel, HealthStatus)> {
        let checks = self.senders.iter().map(|(&channel, slot)| async move {
            let health = slot
                .sender
                .health_check()
                .await
                .unwrap_or_else(|e| HealthStatus::Unhealthy(e.to_string()));
            (channel, health)
        });
        let mut health = futures::future::join_all(checks).await;
        health.sort_by_key(|(channel, _)| *channel);
        health
    }

    /// Shut every sender down. Errors are logged, not returned.
    pub async fn shutdown_senders(&self) {
        for (channel, slot) in &self.senders {
            if let Err(e) = slot.sender.shutdown().await {
                warn!(%channel, sender = slot.sender.name(), error = %e, "sender shutdown error");
            }
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub(crate) fn stores(&self) -> &RouterStores {
        &self.stores
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub(crate) fn lease(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.config.claim_lease_secs.max(1))
    }

    fn lease_until(&self, from: chrono::DateTime<chrono::Utc>) -> chrono::DateTime<chrono::Utc> {
        from + TimeDelta::seconds(self.config.claim_lease_secs.clamp(1, i64::MAX as u64) as i64)
    }

    fn claim_request(&self) -> ClaimRequest {
        let claimed_at = self.clock.now();
        ClaimRequest {
            holder: self.holder.clone(),
            claimed_at,
            lease_until: self.lease_until(claimed_at),
        }
    }

    /// Claim the oldest due pending job.
    pub async fn claim_next(&self) -> Result<Option<DeliveryJob>, PulseError> {
        self.stores.jobs.claim_next(&self.claim_request()).await
    }

    /// Claim a specific job.
    pub async fn claim(&self, id: &JobId) -> Result<ClaimOutcome, PulseError> {
        self.stores.jobs.claim(id, &self.claim_request()).await
    }

    /// Claim and dispatch one specific job. `None` when someone else holds it.
    pub async fn dispatch_job(&self, id: &JobId) -> Result<Option<DispatchOutcome>, PulseError> {
        match self.claim(id).await? {
            ClaimOutcome::Claimed(job) => self.process_claimed(job).await.map(Some),
            ClaimOutcome::AlreadyClaimed => {
                debug!(job_id = %id, "job already claimed elsewhere");
                Ok(None)
            }
        }
    }

    /// Claim and dispatch due jobs one after another until none remain.
    ///
    /// Stops at the first error; the job that failed is back in `pending`.
    pub async fn dispatch_pending(&self) -> Result<Vec<DispatchOutcome>, PulseError> {
        let mut outcomes = Vec::new();
        while let Some(job) = self.claim_next().await? {
            outcomes.push(self.process_claimed(job).await?);
        }
        Ok(outcomes)
    }

    /// Run an in-flight job to a final status.
    pub async fn process_claimed(&self, job: DeliveryJob) -> Result<DispatchOutcome, PulseError> {
        #[cfg(feature = "prometheus")]
        pricepulse_prometheus::add_jobs_in_flight(1.0);

        let job_id = job.id.clone();
        let result = self.process_inner(job).await;
        if let Err(e) = &result {
            self.release_after_error(&job_id, e).await;
        }

        #[cfg(feature = "prometheus")]
        {
            pricepulse_prometheus::add_jobs_in_flight(-1.0);
            if let Ok(outcome) = &result {
                pricepulse_prometheus::record_job_finished(outcome.status());
            }
        }

        result
    }

    async fn process_inner(&self, job: DeliveryJob) -> Result<DispatchOutcome, PulseError> {
        // The lease may have lapsed between the claim and now.
        if !self.renew(&job.id).await? {
            return Err(self.claim_lost(&job.id));
        }

        let tracked = self
            .stores
            .tracking
            .get_tracked_product(&job.tracked_product_id)
            .await?;
        if !tracked.as_ref().is_some_and(|t| t.is_active()) {
            let tracking_status = tracked.map(|t| t.status);
            self.finish(&job.id, JobStatus::Cancelled).await?;
            info!(
                job_id = %job.id,
                tracked_product_id = %job.tracked_product_id,
                tracking_status = ?tracking_status,
                "tracked product no longer active, job cancelled"
            );
            return Ok(DispatchOutcome::Cancelled { job_id: job.id });
        }

        let prior = self.stores.jobs.attempts_for_job(&job.id).await?;
        let earlier_success: BTreeSet<Channel> = prior
            .iter()
            .filter(|a| a.outcome == AttemptOutcome::Success)
            .map(|a| a.channel)
            .collect();
        if !earlier_success.is_empty() {
            // Delivered under an earlier claim that failed to finalise.
            self.finish(&job.id, JobStatus::Delivered).await?;
            info!(job_id = %job.id, channels = ?earlier_success, "job already delivered, finalised");
            return Ok(DispatchOutcome::Delivered {
                job_id: job.id,
                channels: earlier_success.into_iter().collect(),
            });
        }

        let channels: Vec<Channel> = self
            .stores
            .tracking
            .get_preference(&job.user_id)
            .await?
            .map(|pref| pref.channels.into_iter().collect())
            .unwrap_or_default();

        let stop = CancellationToken::new();
        let paths = channels.iter().map(|&channel| {
            let previous = prior
                .iter()
                .filter(|a| a.channel == channel)
                .map(|a| a.attempt)
                .max()
                .unwrap_or(0);
            self.deliver_on_channel(&job, channel, previous, &stop)
        });
        let fan_out = futures::future::join_all(paths);
        tokio::pin!(fan_out);
        let finished = tokio::select! {
            reports = &mut fan_out => Some(reports),
            () = self.hold_claim(&job.id, &stop) => None,
        };
        let reports = match finished {
            Some(reports) => reports,
            // Claim lost: let the sends already under way complete and be audited.
            None => fan_out.await,
        };

        let succeeded: Vec<Channel> = reports
            .iter()
            .filter(|r| r.delivered.is_some())
            .map(|r| r.channel)
            .collect();
        let attempts: usize = reports.iter().map(|r| r.attempts).sum();

        if !succeeded.is_empty() {
            self.finish(&job.id, JobStatus::Delivered).await?;
            info!(
                job_id = %job.id,
                channels = ?succeeded,
                attempts,
                "delivery job delivered"
            );
            return Ok(DispatchOutcome::Delivered {
                job_id: job.id.clone(),
                channels: succeeded,
            });
        }

        self.finish(&job.id, JobStatus::Failed).await?;
        warn!(
            job_id = %job.id,
            user_id = %job.user_id,
            channels = ?channels,
            attempts,
            "delivery job failed on every channel"
        );

        let alert = Alert::JobFailed {
            job_id: job.id.clone(),
            user_id: job.user_id.clone(),
            product_id: job.product_id.clone(),
            channels,
            attempts,
        };
        if let Err(e) = self.alerts.alert(&alert).await {
            error!(job_id = %job.id, error = %e, "job failure alert undeliverable");
        }

        Ok(DispatchOutcome::Failed {
            job_id: job.id.clone(),
            attempts,
        })
    }

    /// Leave `in_flight`, provided this instance still holds the claim.
    async fn finish(&self, id: &JobId, to: JobStatus) -> Result<(), PulseError> {
        self.stores
            .jobs
            .finish_claim(id, &self.holder, to, self.clock.now())
            .await
    }

    async fn renew(&self, id: &JobId) -> Result<bool, PulseError> {
        self.stores
            .jobs
            .renew_claim(id, &self.holder, self.lease_until(self.clock.now()))
            .await
    }

    fn claim_lost(&self, id: &JobId) -> PulseError {
        PulseError::ClaimLost {
            job_id: id.to_string(),
            holder: self.holder.clone(),
        }
    }

    /// Renew the claim every third of the lease until it is lost, then cancel
    /// `stop`. Never returns while the claim is held.
    async fn hold_claim(&self, id: &JobId, stop: &CancellationToken) {
        let period = self.lease() / 3;
        let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticks.tick().await;
            match self.renew(id).await {
                Ok(true) => debug!(job_id = %id, "job claim renewed"),
                Ok(false) => {
                    warn!(job_id = %id, holder = %self.holder, "job claim taken over, stopping retries");
                    stop.cancel();
                    return;
                }
                Err(e) => warn!(job_id = %id, error = %e, "job claim renewal failed"),
            }
        }
    }

    /// Put a job whose processing errored back in `pending` so it is picked
    /// up again. A lost claim belongs to someone else and is left alone.
    async fn release_after_error(&self, id: &JobId, cause: &PulseError) {
        if matches!(cause, PulseError::ClaimLost { .. }) {
            warn!(job_id = %id, error = %cause, "job claimed by another holder, dropping it");
            return;
        }
        match self.finish(id, JobStatus::Pending).await {
            Ok(()) => warn!(job_id = %id, error = %cause, "job dispatch failed, returned to pending"),
            Err(e) => error!(
                job_id = %id,
                error = %cause,
                release_error = %e,
                "job dispatch failed and the claim could not be released"
            ),
        }
    }

    /// One channel path: attempt, classify, back off, repeat.
    ///
    /// Retries stop early once `stop` is cancelled, either by another path
    /// delivering or by the claim being lost.
    async fn deliver_on_channel(
        &self,
        job: &DeliveryJob,
        channel: Channel,
        previous_attempts: u32,
        stop: &CancellationToken,
    ) -> PathReport {
        let mut report = PathReport {
            channel,
            attempts: 0,
            delivered: None,
        };

        let Some(slot) = self.senders.get(&channel) else {
            let attempt = previous_attempts + 1;
            let error = SendError::Permanent(format!("no sender registered for {channel}"));
            self.record(job, channel, attempt, self.clock.now(), &Err(error), 0)
                .await;
            report.attempts = 1;
            return report;
        };

        for n in 1..=self.policy.max_attempts {
            if n > 1 {
                let backoff = self.policy.backoff(n - 1);
                tokio::select! {
                    _ = tokio::time::sleep(backoff) => {}
                    _ = stop.cancelled() => {
                        debug!(job_id = %job.id, %channel, "retries stopped");
                        break;
                    }
                }
            }

            let attempt = previous_attempts + n;
            let attempted_at = self.clock.now();
            let started = Instant::now();
            let result = self.send_once(slot, job).await;
            let latency_ms = started.elapsed().as_millis().min(u64::MAX as u128) as u64;

            self.record(job, channel, attempt, attempted_at, &result, latency_ms)
                .await;
            report.attempts += 1;

            match result {
                Ok(message_id) => {
                    stop.cancel();
                    report.delivered = Some(message_id);
                    break;
                }
                Err(SendError::Transient(reason)) => {
                    debug!(
                        job_id = %job.id,
                        %channel,
                        attempt,
                        reason = %reason,
                        "transient send failure"
                    );
                }
                Err(SendError::Permanent(reason)) => {
                    info!(
                        job_id = %job.id,
                        %channel,
                        reason = %reason,
                        "permanent send failure, abandoning channel"
                    );
                    break;
                }
            }
        }
        report
    }

    async fn send_once(&self, slot: &SenderSlot, job: &DeliveryJob) -> Result<MessageId, SendError> {
        let _permit = slot
            .admission
            .acquire()
            .await
            .map_err(|_| SendError::Permanent("channel admission closed".to_string()))?;

        match tokio::time::timeout(
            self.policy.send_timeout,
            slot.sender.send(&job.user_id, &job.payload_ref),
        )
        .await
        {
            Ok(result) => result,
            Err(_elapsed) => Err(SendError::Transient(format!(
                "send timed out after {}ms",
                self.policy.send_timeout.as_millis()
            ))),
        }
    }

    async fn record(
        &self,
        job: &DeliveryJob,
        channel: Channel,
        attempt: u32,
        attempted_at: chrono::DateTime<chrono::Utc>,
        result: &Result<MessageId, SendError>,
        latency_ms: u64,
    ) {
        let (outcome, detail) = match result {
            Ok(id) => (AttemptOutcome::Success, id.to_string()),
            Err(e) => (e.outcome(), e.reason().to_string()),
        };

        #[cfg(feature = "prometheus")]
        pricepulse_prometheus::record_channel_attempt(channel, outcome, latency_ms as f64 / 1000.0);

        let entry = ChannelAttempt {
            job_id: job.id.clone(),
            channel,
            attempt,
            attempted_at,
            outcome,
            latency_ms,
            detail: Some(detail),
        };
        if let Err(e) = self.stores.jobs.record_attempt(&entry).await {
            warn!(job_id = %job.id, %channel, attempt, error = %e, "failed to record channel attempt");
        }
    }

    /// Operator re-queue: `failed -> pending`.
    pub async fn requeue(&self, id: &JobId) -> Result<(), PulseError> {
        self.stores
            .jobs
            .transition(id, JobStatus::Failed, JobStatus::Pending, self.clock.now())
            .await?;
        info!(job_id = %id, "failed job re-queued");
        Ok(())
    }

    /// Operator abandon: `failed -> abandoned`. Terminal.
    pub async fn abandon(&self, id: &JobId) -> Result<(), PulseError> {
        self.stores
            .jobs
            .transition(id, JobStatus::Failed, JobStatus::Abandoned, self.clock.now())
            .await?;
        info!(job_id = %id, "failed job abandoned");
        Ok(())
    }
}
