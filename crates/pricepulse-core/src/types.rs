// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the scheduler, the router, and every store adapter.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of an end user.
    UserId
);
string_id!(
    /// Identifier of a catalogue product.
    ProductId
);
string_id!(
    /// Identifier of one user's tracking of one product.
    TrackedProductId
);
string_id!(
    /// Identifier of a delivery job.
    JobId
);
string_id!(
    /// Opaque handle into the analysis store.
    PayloadRef
);
string_id!(
    /// Provider-side identifier of a delivered message.
    MessageId
);

impl JobId {
    /// Generate a fresh random job id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Sender,
    Storage,
    Alerting,
    Observability,
}

/// The closed set of notification channels.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Push,
    WhatsApp,
    Email,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Push, Channel::WhatsApp, Channel::Email];
}

/// Lifecycle of a user's tracking of a product.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TrackingStatus {
    Active,
    Paused,
    Archived,
}

/// How often a user wants insights.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Daily,
    Weekly,
}

/// A product a user has asked the system to monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedProduct {
    pub id: TrackedProductId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub status: TrackingStatus,
}

impl TrackedProduct {
    /// Only active tracking may produce or dispatch delivery jobs.
    pub fn is_active(&self) -> bool {
        self.status == TrackingStatus::Active
    }
}

/// Per-user delivery preferences. Read-only to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPreference {
    pub user_id: UserId,
    pub channels: BTreeSet<Channel>,
    pub delivery_time: NaiveTime,
    pub timezone: Tz,
    pub frequency: Frequency,
    /// Day used when `frequency` is weekly.
    pub weekly_day: Weekday,
}

/// Delivery job lifecycle.
///
/// `pending -> in_flight -> {delivered | failed}`; `failed -> pending` and
/// `failed -> abandoned` are operator actions; `cancelled` is reached when the
/// tracked product stopped being active before dispatch.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InFlight,
    Delivered,
    Failed,
    Abandoned,
    Cancelled,
}

impl JobStatus {
    pub const ALL: [JobStatus; 6] = [
        JobStatus::Pending,
        JobStatus::InFlight,
        JobStatus::Delivered,
        JobStatus::Failed,
        JobStatus::Abandoned,
        JobStatus::Cancelled,
    ];

    /// Whether the state machine has an edge from `self` to `to`.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, to),
            (Pending, InFlight)
                | (Pending, Cancelled)
                | (InFlight, Delivered)
                | (InFlight, Failed)
                | (InFlight, Cancelled)
                | (InFlight, Pending)
                | (Failed, Pending)
                | (Failed, Abandoned)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Delivered | JobStatus::Abandoned | JobStatus::Cancelled
        )
    }
}

/// One scheduled unit of delivery work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryJob {
    pub id: JobId,
    pub tracked_product_id: TrackedProductId,
    pub product_id: ProductId,
    pub user_id: UserId,
    /// The user's local delivery moment, in UTC.
    pub due_at: DateTime<Utc>,
    /// The user's local calendar date of `due_at`; with the tracked product it
    /// forms the idempotence key.
    pub due_date: NaiveDate,
    pub payload_ref: PayloadRef,
    pub status: JobStatus,
    /// Number of dispatch rounds (claims) this job has gone through.
    pub attempt_count: u32,
    pub claimed_by: Option<String>,
    pub claim_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeliveryJob {
    /// Create a new pending job for a tracked product.
    pub fn new(
        tracked: &TrackedProduct,
        due_at: DateTime<Utc>,
        due_date: NaiveDate,
        payload_ref: PayloadRef,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: JobId::generate(),
            tracked_product_id: tracked.id.clone(),
            product_id: tracked.product_id.clone(),
            user_id: tracked.user_id.clone(),
            due_at,
            due_date,
            payload_ref,
            status: JobStatus::Pending,
            attempt_count: 0,
            claimed_by: None,
            claim_expires_at: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Audit outcome of one channel attempt.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    PermanentFailure,
}

/// One audited attempt to deliver a job over one channel. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelAttempt {
    pub job_id: JobId,
    pub channel: Channel,
    /// 1-based attempt number within this job's path on this channel.
    pub attempt: u32,
    pub attempted_at: DateTime<Utc>,
    pub outcome: AttemptOutcome,
    pub latency_ms: u64,
    /// Provider message id on success, failure reason otherwise.
    pub detail: Option<String>,
}

/// Answer from the analysis store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadLookup {
    Ready(PayloadRef),
    NotReady,
}

/// Parameters of an atomic claim.
#[derive(Debug, Clone)]
pub struct ClaimRequest {
    pub holder: String,
    pub claimed_at: DateTime<Utc>,
    pub lease_until: DateTime<Utc>,
}

/// Result of claiming a specific job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The caller now owns the job; it is `in_flight`.
    Claimed(DeliveryJob),
    /// Someone else already moved the job out of `pending`.
    AlreadyClaimed,
}

/// Something the operators must hear about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    /// Every enabled channel abandoned a job.
    JobFailed {
        job_id: JobId,
        user_id: UserId,
        product_id: ProductId,
        channels: Vec<Channel>,
        attempts: usize,
    },
    /// The scheduler skipped consecutive cycles because another holder had the lock.
    LockContention {
        consecutive_skips: u32,
        window: String,
    },
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::JobFailed {
                job_id,
                user_id,
                channels,
                attempts,
                ..
            } => {
                let names: Vec<String> = channels.iter().map(|c| c.to_string()).collect();
                write!(
                    f,
                    "delivery job {job_id} for user {user_id} failed on all channels [{}] after {attempts} attempts",
                    names.join(", ")
                )
            }
            Alert::LockContention {
                consecutive_skips,
                window,
            } => write!(
                f,
                "scheduler skipped {consecutive_skips} consecutive cycles on lock contention (last window {window})"
            ),
        }
    }
}

/// Aggregate delivery health since some instant.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeliveryStats {
    pub attempts: u64,
    pub successes: u64,
    pub transient_failures: u64,
    pub permanent_failures: u64,
    pub mean_latency_ms: f64,
    pub jobs_by_status: Vec<(JobStatus, u64)>,
}

impl DeliveryStats {
    /// Fraction of finished jobs (delivered or failed) that were delivered.
    pub fn job_success_rate(&self) -> Option<f64> {
        let count = |s: JobStatus| {
            self.jobs_by_status
                .iter()
                .find(|(status, _)| *status == s)
                .map(|(_, n)| *n)
                .unwrap_or(0)
        };
        let delivered = count(JobStatus::Delivered);
        let finished = delivered + count(JobStatus::Failed) + count(JobStatus::Abandoned);
        if finished == 0 {
            None
        } else {
            Some(delivered as f64 / finished as f64)
        }
    }
}
