// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of every store trait, the lease lock, and the contact directory.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use pricepulse_config::model::StorageConfig;
use pricepulse_core::types::{
    Channel, ChannelAttempt, ClaimOutcome, ClaimRequest, DeliveryJob, DeliveryStats, JobId,
    JobStatus, NotificationPreference, PayloadLookup, PayloadRef, ProductId, TrackedProduct,
    TrackedProductId, TrackingStatus, UserId,
};
use pricepulse_core::{
    AdapterType, AnalysisStore, ContactDirectory, HealthStatus, JobStore, LockProvider,
    PluginAdapter, PulseError, StorageAdapter, TrackingStore,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened on [`StorageAdapter::initialize`]; every other call
/// fails until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// Create a new SqliteStorage with the given configuration.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, PulseError> {
        self.db.get().ok_or_else(|| {
            PulseError::storage("storage not initialized -- call initialize() first")
        })
    }

    // --- Writes owned by other services; exposed for seeding and operator commands ---

    pub async fn upsert_tracked_product(&self, product: &TrackedProduct) -> Result<(), PulseError> {
        queries::tracking::upsert_tracked_product(self.db()?, product).await
    }

    /// Returns `false` when no such tracked product exists.
    pub async fn set_tracking_status(
        &self,
        id: &TrackedProductId,
        status: TrackingStatus,
    ) -> Result<bool, PulseError> {
        queries::tracking::set_tracking_status(self.db()?, id, status).await
    }

    pub async fn upsert_preference(&self, pref: &NotificationPreference) -> Result<(), PulseError> {
        queries::tracking::upsert_preference(self.db()?, pref).await
    }

    pub async fn set_contact(
        &self,
        user_id: &UserId,
        channel: Channel,
        address: &str,
    ) -> Result<(), PulseError> {
        queries::contacts::set_contact(self.db()?, user_id, channel, address).await
    }

    pub async fn put_payload(
        &self,
        product_id: &ProductId,
        payload_ref: &PayloadRef,
        now: DateTime<Utc>,
    ) -> Result<(), PulseError> {
        queries::payloads::put_payload(self.db()?, product_id, payload_ref, now).await
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, PulseError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PulseError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), PulseError> {
        let db = Database::open(&self.config.database_path, self.config.wal_mode).await?;
        self.db
            .set(db)
            .map_err(|_| PulseError::storage("storage already initialized"))?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), PulseError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }
}

#[async_trait]
impl TrackingStore for SqliteStorage {
    async fn list_active_tracking(
        &self,
    ) -> Result<Vec<(TrackedProduct, NotificationPreference)>, PulseError> {
        queries::tracking::list_active_tracking(self.db()?).await
    }

    async fn get_tracked_product(
        &self,
        id: &TrackedProductId,
    ) -> Result<Option<TrackedProduct>, PulseError> {
        queries::tracking::get_tracked_product(self.db()?, id).await
    }

    async fn get_preference(
        &self,
        user_id: &UserId,
    ) -> Result<Option<NotificationPreference>, PulseError> {
        queries::tracking::get_preference(self.db()?, user_id).await
    }
}

#[async_trait]
impl AnalysisStore for SqliteStorage {
    async fn latest_payload_ref(&self, product_id: &ProductId) -> Result<PayloadLookup, PulseError> {
        queries::payloads::latest_payload_ref(self.db()?, product_id).await
    }
}

#[async_trait]
impl JobStore for SqliteStorage {
    async fn job_exists(
        &self,
        tracked_product_id: &TrackedProductId,
        due_date: NaiveDate,
    ) -> Result<bool, PulseError> {
        queries::jobs::job_exists(self.db()?, tracked_product_id, due_date).await
    }

    async fn insert_job(&self, job: &DeliveryJob) -> Result<bool, PulseError> {
        queries::jobs::insert_job(self.db()?, job).await
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<DeliveryJob>, PulseError> {
        queries::jobs::get_job(self.db()?, id).await
    }

    async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<DeliveryJob>, PulseError> {
        queries::jobs::list_jobs(self.db()?, status).await
    }

    async fn claim_next(&self, claim: &ClaimRequest) -> Result<Option<DeliveryJob>, PulseError> {
        queries::jobs::claim_next(self.db()?, claim).await
    }

    async fn claim(&self, id: &JobId, claim: &ClaimRequest) -> Result<ClaimOutcome, PulseError> {
        queries::jobs::claim(self.db()?, id, claim).await
    }

    async fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PulseError> {
        queries::jobs::transition(self.db()?, id, from, to, now).await
    }

    async fn renew_claim(
        &self,
        id: &JobId,
        holder: &str,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, PulseError> {
        queries::jobs::renew_claim(self.db()?, id, holder, lease_until).await
    }

    async fn finish_claim(
        &self,
        id: &JobId,
        holder: &str,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PulseError> {
        queries::jobs::finish_claim(self.db()?, id, holder, to, now).await
    }

    async fn record_attempt(&self, attempt: &ChannelAttempt) -> Result<(), PulseError> {
        queries::attempts::record_attempt(self.db()?, attempt).await
    }

    async fn attempts_for_job(&self, id: &JobId) -> Result<Vec<ChannelAttempt>, PulseError> {
        queries::attempts::attempts_for_job(self.db()?, id).await
    }

    async fn release_expired_claims(&self, now: DateTime<Utc>) -> Result<u64, PulseError> {
        queries::jobs::release_expired_claims(self.db()?, now).await
    }

    async fn delivery_stats(&self, since: DateTime<Utc>) -> Result<DeliveryStats, PulseError> {
        queries::attempts::delivery_stats(self.db()?, since).await
    }
}

#[async_trait]
impl LockProvider for SqliteStorage {
    async fn try_acquire(
        &self,
        key: &str,
        holder: &str,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Result<bool, PulseError> {
        queries::leases::try_acquire(self.db()?, key, holder, now, ttl).await
    }

    async fn release(&self, key: &str, holder: &str) -> Result<(), PulseError> {
        queries::leases::release(self.db()?, key, holder).await
    }
}

#[async_trait]
impl ContactDirectory for SqliteStorage {
    async fn contact(
        &self,
        user_id: &UserId,
        channel: Channel,
    ) -> Result<Option<String>, PulseError> {
        queries::contacts::get_contact(self.db()?, user_id, channel).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Storage over a fresh file; the directory must outlive the storage.
    fn fresh() -> (TempDir, SqliteStorage) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("pulse.db").display().to_string(),
            wal_mode: true,
        });
        (dir, storage)
    }

    #[tokio::test]
    async fn reports_itself_as_the_sqlite_storage_adapter() {
        let (_dir, storage) = fresh();
        assert_eq!(
            (storage.name(), storage.adapter_type()),
            ("sqlite", AdapterType::Storage)
        );
        assert_eq!(storage.version().major, 0);
    }

    #[tokio::test]
    async fn second_initialize_is_rejected() {
        let (_dir, storage) = fresh();
        storage.initialize().await.unwrap();
        assert!(matches!(
            storage.initialize().await,
            Err(PulseError::Storage { .. })
        ));
    }

    #[tokio::test]
    async fn queries_before_initialize_fail() {
        let (_dir, storage) = fresh();
        assert!(storage.health_check().await.is_err());
        assert!(storage.list_jobs(None).await.is_err());
        assert!(storage.contact(&UserId::from("u-1"), Channel::Email).await.is_err());
    }

    #[tokio::test]
    async fn healthy_until_closed() {
        let (_dir, storage) = fresh();
        storage.initialize().await.unwrap();
        assert_eq!(storage.health_check().await.unwrap(), HealthStatus::Healthy);
        storage.shutdown().await.unwrap();
        storage.close().await.unwrap();
    }
}
