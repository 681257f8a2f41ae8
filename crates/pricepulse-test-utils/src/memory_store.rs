// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory implementation of every store trait and the lease lock.
//!
//! A single mutex guards all state, so claims and uniqueness checks are atomic
//! the same way they are under SQLite's single writer.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use tokio::sync::Mutex;

use pricepulse_core::types::{
    AttemptOutcome, Channel, ChannelAttempt, ClaimOutcome, ClaimRequest, DeliveryJob,
    DeliveryStats, JobId, JobStatus, NotificationPreference, PayloadLookup, PayloadRef, ProductId,
    TrackedProduct, TrackedProductId, TrackingStatus, UserId,
};
use pricepulse_core::{
    AnalysisStore, ContactDirectory, JobStore, LockProvider, PulseError, TrackingStore,
};

#[derive(Default)]
struct State {
    tracked: Vec<TrackedProduct>,
    preferences: HashMap<UserId, NotificationPreference>,
    payloads: HashMap<ProductId, PayloadRef>,
    contacts: HashMap<(UserId, Channel), String>,
    jobs: Vec<DeliveryJob>,
    attempts: Vec<ChannelAttempt>,
    leases: HashMap<String, (String, DateTime<Utc>)>,
    insert_calls: usize,
}

impl State {
    fn job_mut(&mut self, id: &JobId) -> Option<&mut DeliveryJob> {
        self.jobs.iter_mut().find(|j| &j.id == id)
    }
}

fn claim_job(job: &mut DeliveryJob, claim: &ClaimRequest) -> DeliveryJob {
    job.status = JobStatus::InFlight;
    job.attempt_count += 1;
    job.claimed_by = Some(claim.holder.clone());
    job.claim_expires_at = Some(claim.lease_until);
    job.updated_at = claim.claimed_at;
    job.clone()
}

fn held_by(job: &DeliveryJob, holder: &str) -> bool {
    job.status == JobStatus::InFlight && job.claimed_by.as_deref() == Some(holder)
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a tracked product.
    pub async fn add_tracked(&self, product: TrackedProduct) {
        let mut state = self.state.lock().await;
        state.tracked.retain(|p| p.id != product.id);
        state.tracked.push(product);
    }

    pub async fn set_tracking_status(&self, id: &TrackedProductId, status: TrackingStatus) {
        let mut state = self.state.lock().await;
        if let Some(product) = state.tracked.iter_mut().find(|p| &p.id == id) {
            product.status = status;
        }
    }

    pub async fn set_preference(&self, pref: NotificationPreference) {
        self.state
            .lock()
            .await
            .preferences
            .insert(pref.user_id.clone(), pref);
    }

    pub async fn set_payload(&self, product_id: &ProductId, payload: PayloadRef) {
        self.state
            .lock()
            .await
            .payloads
            .insert(product_id.clone(), payload);
    }

    pub async fn clear_payload(&self, product_id: &ProductId) {
        self.state.lock().await.payloads.remove(product_id);
    }

    pub async fn set_contact(&self, user_id: &UserId, channel: Channel, address: &str) {
        self.state
            .lock()
            .await
            .contacts
            .insert((user_id.clone(), channel), address.to_string());
    }

    /// Snapshot of every job in insertion order.
    pub async fn jobs(&self) -> Vec<DeliveryJob> {
        self.state.lock().await.jobs.clone()
    }

    /// Snapshot of every recorded attempt in insertion order.
    pub async fn attempts(&self) -> Vec<ChannelAttempt> {
        self.state.lock().await.attempts.clone()
    }

    /// Number of `insert_job` calls, including rejected duplicates.
    pub async fn insert_calls(&self) -> usize {
        self.state.lock().await.insert_calls
    }
}

#[async_trait]
impl TrackingStore for MemoryStore {
    async fn list_active_tracking(
        &self,
    ) -> Result<Vec<(TrackedProduct, NotificationPreference)>, PulseError> {
        let state = self.state.lock().await;
        Ok(state
            .tracked
            .iter()
            .filter(|p| p.is_active())
            .filter_map(|p| {
                state
                    .preferences
                    .get(&p.user_id)
                    .map(|pref| (p.clone(), pref.clone()))
            })
            .collect())
    }

    async fn get_tracked_product(
        &self,
        id: &TrackedProductId,
    ) -> Result<Option<TrackedProduct>, PulseError> {
        let state = self.state.lock().await;
        Ok(state.tracked.iter().find(|p| &p.id == id).cloned())
    }

    async fn get_preference(
        &self,
        user_id: &UserId,
    ) -> Result<Option<NotificationPreference>, PulseError> {
        Ok(self.state.lock().await.preferences.get(user_id).cloned())
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn latest_payload_ref(&self, product_id: &ProductId) -> Result<PayloadLookup, PulseError> {
        Ok(match self.state.lock().await.payloads.get(product_id) {
            Some(payload) => PayloadLookup::Ready(payload.clone()),
            None => PayloadLookup::NotReady,
        })
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn job_exists(
        &self,
        tracked_product_id: &TrackedProductId,
        due_date: NaiveDate,
    ) -> Result<bool, PulseError> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .any(|j| &j.tracked_product_id == tracked_product_id && j.due_date == due_date))
    }

    async fn insert_job(&self, job: &DeliveryJob) -> Result<bool, PulseError> {
        let mut state = self.state.lock().await;
        state.insert_calls += 1;
        let duplicate = state.jobs.iter().any(|j| {
            j.id == job.id
                || (j.tracked_product_id == job.tracked_product_id && j.due_date == job.due_date)
        });
        if duplicate {
            return Ok(false);
        }
        state.jobs.push(job.clone());
        Ok(true)
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<DeliveryJob>, PulseError> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().find(|j| &j.id == id).cloned())
    }

    async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<DeliveryJob>, PulseError> {
        let state = self.state.lock().await;
        let mut jobs: Vec<DeliveryJob> = state
            .jobs
            .iter()
            .filter(|j| status.is_none_or(|s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by_key(|j| (j.due_at, j.created_at));
        Ok(jobs)
    }

    async fn claim_next(&self, claim: &ClaimRequest) -> Result<Option<DeliveryJob>, PulseError> {
        let mut state = self.state.lock().await;
        let next = state
            .jobs
            .iter_mut()
            .filter(|j| j.status == JobStatus::Pending && j.due_at <= claim.claimed_at)
            .min_by_key(|j| (j.due_at, j.created_at));
        Ok(next.map(|job| claim_job(job, claim)))
    }

    async fn claim(&self, id: &JobId, claim: &ClaimRequest) -> Result<ClaimOutcome, PulseError> {
        let mut state = self.state.lock().await;
        let job = state.job_mut(id).ok_or_else(|| PulseError::NotFound {
            entity: "delivery job",
            id: id.to_string(),
        })?;
        if job.status != JobStatus::Pending {
            return Ok(ClaimOutcome::AlreadyClaimed);
        }
        Ok(ClaimOutcome::Claimed(claim_job(job, claim)))
    }

    async fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PulseError> {
        if !from.can_transition_to(to) {
            return Err(PulseError::InvalidTransition {
                job_id: id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let mut state = self.state.lock().await;
        let job = state.job_mut(id).ok_or_else(|| PulseError::NotFound {
            entity: "delivery job",
            id: id.to_string(),
        })?;
        if job.status != from {
            return Err(PulseError::InvalidTransition {
                job_id: id.to_string(),
                from: job.status.to_string(),
                to: to.to_string(),
            });
        }
        job.status = to;
        job.updated_at = now;
        if to != JobStatus::InFlight {
            job.claimed_by = None;
            job.claim_expires_at = None;
        }
        Ok(())
    }

    async fn renew_claim(
        &self,
        id: &JobId,
        holder: &str,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, PulseError> {
        let mut state = self.state.lock().await;
        match state.job_mut(id) {
            Some(job) if held_by(job, holder) => {
                job.claim_expires_at = Some(lease_until);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish_claim(
        &self,
        id: &JobId,
        holder: &str,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PulseError> {
        if !JobStatus::InFlight.can_transition_to(to) {
            return Err(PulseError::InvalidTransition {
                job_id: id.to_string(),
                from: JobStatus::InFlight.to_string(),
                to: to.to_string(),
            });
        }
        let mut state = self.state.lock().await;
        let job = state.job_mut(id).ok_or_else(|| PulseError::NotFound {
            entity: "delivery job",
            id: id.to_string(),
        })?;
        if !held_by(job, holder) {
            return Err(PulseError::ClaimLost {
                job_id: id.to_string(),
                holder: holder.to_string(),
            });
        }
        job.status = to;
        job.updated_at = now;
        job.claimed_by = None;
        job.claim_expires_at = None;
        Ok(())
    }

    async fn record_attempt(&self, attempt: &ChannelAttempt) -> Result<(), PulseError> {
        self.state.lock().await.attempts.push(attempt.clone());
        Ok(())
    }

    async fn attempts_for_job(&self, id: &JobId) -> Result<Vec<ChannelAttempt>, PulseError> {
        let state = self.state.lock().await;
        Ok(state
            .attempts
            .iter()
            .filter(|a| &a.job_id == id)
            .cloned()
            .collect())
    }

    async fn release_expired_claims(&self, now: DateTime<Utc>) -> Result<u64, PulseError> {
        let mut state = self.state.lock().await;
        let mut released = 0;
        for job in state.jobs.iter_mut() {
            if job.status == JobStatus::InFlight && job.claim_expires_at.is_some_and(|t| t < now) {
                job.status = JobStatus::Pending;
                job.claimed_by = None;
                job.claim_expires_at = None;
                job.updated_at = now;
                released += 1;
            }
        }
        Ok(released)
    }

    async fn delivery_stats(&self, since: DateTime<Utc>) -> Result<DeliveryStats, PulseError> {
        let state = self.state.lock().await;
        let recent: Vec<&ChannelAttempt> = state
            .attempts
            .iter()
            .filter(|a| a.attempted_at >= since)
            .collect();
        let count = |outcome: AttemptOutcome| recent.iter().filter(|a| a.outcome == outcome).count() as u64;
        let mean_latency_ms = if recent.is_empty() {
            0.0
        } else {
            recent.iter().map(|a| a.latency_ms as f64).sum::<f64>() / recent.len() as f64
        };
        let jobs_by_status = JobStatus::ALL
            .iter()
            .map(|s| {
                let n = state
                    .jobs
                    .iter()
                    .filter(|j| j.created_at >= since && j.status == *s)
                    .count() as u64;
                (*s, n)
            })
            .filter(|(_, n)| *n > 0)
            .collect();
        Ok(DeliveryStats {
            attempts: recent.len() as u64,
            successes: count(AttemptOutcome::Success),
            transient_failures: count(AttemptOutcome::TransientFailure),
            permanent_failures: count(AttemptOutcome::PermanentFailure),
            mean_latency_ms,
            jobs_by_status,
        })
    }
}

#[async_trait]
impl LockProvider for MemoryStore {
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, PulseError> {
        let ttl = TimeDelta::from_std(ttl)
            .map_err(|e| PulseError::Internal(format!("lease ttl out of range: {e}")))?;
        let mut state = self.state.lock().await;
        let free = match state.leases.get(key) {
            None => true,
            Some((owner, expires_at)) => owner == holder || *expires_at <= now,
        };
        if free {
            state
                .leases
                .insert(key.to_string(), (holder.to_string(), now + ttl));
        }
        Ok(free)
    }

    async fn release(&self, key: &str, holder: &str) -> Result<(), PulseError> {
        let mut state = self.state.lock().await;
        if state.leases.get(key).is_some_and(|(owner, _)| owner == holder) {
            state.leases.remove(key);
        }
        Ok(())
    }
}

#[async_trait]
impl ContactDirectory for MemoryStore {
    async fn contact(
        &self,
        user_id: &UserId,
        channel: Channel,
    ) -> Result<Option<String>, PulseError> {
        let state = self.state.lock().await;
        Ok(state.contacts.get(&(user_id.clone(), channel)).cloned())
    }
}
