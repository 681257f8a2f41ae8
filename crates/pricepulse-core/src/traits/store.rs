// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Store traits consumed by the scheduler and the router.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::error::PulseError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    ChannelAttempt, ClaimOutcome, ClaimRequest, DeliveryJob, DeliveryStats, JobId, JobStatus,
    NotificationPreference, PayloadLookup, ProductId, TrackedProduct, TrackedProductId, UserId,
};

/// Lifecycle of a persistent backend.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection, etc.).
    async fn initialize(&self) -> Result<(), PulseError>;

    /// Closes the storage backend, flushing pending writes.
    async fn close(&self) -> Result<(), PulseError>;
}

/// The user/preference store.
#[async_trait]
pub trait TrackingStore: Send + Sync {
    /// All tracked products in `active` status, each with its owner's preference.
    /// Products whose owner has no preference are omitted.
    async fn list_active_tracking(
        &self,
    ) -> Result<Vec<(TrackedProduct, NotificationPreference)>, PulseError>;

    async fn get_tracked_product(
        &self,
        id: &TrackedProductId,
    ) -> Result<Option<TrackedProduct>, PulseError>;

    async fn get_preference(
        &self,
        user_id: &UserId,
    ) -> Result<Option<NotificationPreference>, PulseError>;
}

/// The analysis store. Only the latest payload handle is visible to this system.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    async fn latest_payload_ref(&self, product_id: &ProductId) -> Result<PayloadLookup, PulseError>;
}

/// Persistence of delivery jobs and their channel attempt audit trail.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Whether a job already exists for this tracked product on this due date.
    async fn job_exists(
        &self,
        tracked_product_id: &TrackedProductId,
        due_date: NaiveDate,
    ) -> Result<bool, PulseError>;

    /// Insert a job unless one exists for its (tracked product, due date).
    /// Returns `false` when the uniqueness check rejected it.
    async fn insert_job(&self, job: &DeliveryJob) -> Result<bool, PulseError>;

    async fn get_job(&self, id: &JobId) -> Result<Option<DeliveryJob>, PulseError>;

    /// Jobs ordered by due time, optionally filtered by status.
    async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<DeliveryJob>, PulseError>;

    /// Atomically claim the oldest due pending job.
    async fn claim_next(&self, claim: &ClaimRequest) -> Result<Option<DeliveryJob>, PulseError>;

    /// Atomically claim a specific job if it is still pending.
    async fn claim(&self, id: &JobId, claim: &ClaimRequest) -> Result<ClaimOutcome, PulseError>;

    /// Move a job from `from` to `to`. Fails with `InvalidTransition` when the
    /// edge does not exist or the job is no longer in `from`.
    async fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PulseError>;

    /// Push the lease of an in-flight claim held by `holder` out to `lease_until`.
    /// Returns `false` when `holder` no longer holds the claim.
    async fn renew_claim(
        &self,
        id: &JobId,
        holder: &str,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, PulseError>;

    /// Move an in-flight job claimed by `holder` to `to`, clearing the claim.
    /// Fails with `ClaimLost` when the job is not in flight under `holder`.
    async fn finish_claim(
        &self,
        id: &JobId,
        holder: &str,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PulseError>;

    /// Append one channel attempt to the audit trail.
    async fn record_attempt(&self, attempt: &ChannelAttempt) -> Result<(), PulseError>;

    /// Attempts for one job in insertion order.
    async fn attempts_for_job(&self, id: &JobId) -> Result<Vec<ChannelAttempt>, PulseError>;

    /// Return in-flight jobs whose claim lease expired before `now` to pending.
    async fn release_expired_claims(&self, now: DateTime<Utc>) -> Result<u64, PulseError>;

    /// Delivery health since `since`.
    async fn delivery_stats(&self, since: DateTime<Utc>) -> Result<DeliveryStats, PulseError>;
}
