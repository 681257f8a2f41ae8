// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests: scheduler and router sharing one SQLite database.
//!
//! Each test opens its own temp database and wires the real storage adapter
//! to scripted senders, a recording alert sink, and a fake clock.

use std::sync::Arc;

use chrono::{DateTime, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};
use tempfile::TempDir;

use pricepulse_config::model::{RouterConfig, SchedulerConfig, StorageConfig};
use pricepulse_core::types::{
    Alert, AttemptOutcome, Channel, ClaimOutcome, Frequency, JobStatus, NotificationPreference,
    PayloadRef, ProductId, TrackedProduct, TrackedProductId, TrackingStatus, UserId,
};
use pricepulse_core::{ChannelSender, JobStore, PulseError, SendError, StorageAdapter};
use pricepulse_router::{DeliveryRouter, DispatchOutcome, RouterStores};
use pricepulse_scheduler::{CycleOutcome, Scheduler, SchedulerStores};
use pricepulse_storage::SqliteStorage;
use pricepulse_test_utils::{FakeClock, RecordingAlertSink, ScriptedSender};

/// 09:30 in Berlin (CEST, UTC+2) on Monday 2026-10-19.
fn delivery_moment() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 7, 30, 0).unwrap()
}

struct Harness {
    _dir: TempDir,
    storage: Arc<SqliteStorage>,
    alerts: RecordingAlertSink,
    clock: FakeClock,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("pulse.db").to_str().unwrap().to_string(),
            wal_mode: true,
        });
        storage.initialize().await.unwrap();
        Self {
            _dir: dir,
            storage: Arc::new(storage),
            alerts: RecordingAlertSink::new(),
            clock: FakeClock::new(delivery_moment() + TimeDelta::minutes(5)),
        }
    }

    fn scheduler(&self, holder: &str) -> Scheduler {
        Scheduler::new(
            SchedulerConfig::default(),
            SchedulerStores {
                tracking: self.storage.clone(),
                analysis: self.storage.clone(),
                jobs: self.storage.clone(),
                lock: self.storage.clone(),
            },
            Arc::new(self.alerts.clone()),
            Arc::new(self.clock.clone()),
            holder,
        )
    }

    fn router(&self, holder: &str, senders: &[Arc<ScriptedSender>]) -> DeliveryRouter {
        let config = RouterConfig {
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            ..RouterConfig::default()
        };
        let mut router = DeliveryRouter::new(
            config,
            RouterStores {
                tracking: self.storage.clone(),
                jobs: self.storage.clone(),
            },
            Arc::new(self.alerts.clone()),
            Arc::new(self.clock.clone()),
            holder,
        );
        for sender in senders {
            let sender: Arc<dyn ChannelSender> = sender.clone();
            router = router.with_sender(sender, 4);
        }
        router
    }

    /// An active tracked product whose owner wants `channels` at 09:30 Berlin time.
    async fn track(&self, id: &str, channels: &[Channel], analysis_ready: bool) {
        let user = UserId::from(format!("user-{id}").as_str());
        let product_id = ProductId::from(format!("sku-{id}").as_str());
        self.storage
            .upsert_tracked_product(&TrackedProduct {
                id: TrackedProductId::from(id),
                product_id: product_id.clone(),
                user_id: user.clone(),
                created_at: delivery_moment() - TimeDelta::days(30),
                status: TrackingStatus::Active,
            })
            .await
            .unwrap();
        self.storage
            .upsert_preference(&NotificationPreference {
                user_id: user,
                channels: channels.iter().copied().collect(),
                delivery_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
                timezone: chrono_tz::Europe::Berlin,
                frequency: Frequency::Daily,
                weekly_day: Weekday::Mon,
            })
            .await
            .unwrap();
        if analysis_ready {
            self.publish_analysis(id).await;
        }
    }

    async fn publish_analysis(&self, id: &str) {
        self.storage
            .put_payload(
                &ProductId::from(format!("sku-{id}").as_str()),
                &PayloadRef::from(format!("analysis/{id}").as_str()),
                self.clock_now(),
            )
            .await
            .unwrap();
    }

    fn clock_now(&self) -> DateTime<Utc> {
        use pricepulse_core::Clock;
        self.clock.now()
    }

    async fn jobs(&self) -> Vec<pricepulse_core::types::DeliveryJob> {
        self.storage.list_jobs(None).await.unwrap()
    }
}

// ---- Scheduling ----

#[tokio::test]
async fn evaluating_twice_in_one_window_creates_one_job() {
    let h = Harness::new().await;
    h.track("tp-1", &[Channel::Push], true).await;
    let scheduler = h.scheduler("node-a");

    let first = scheduler.evaluate(h.clock_now()).await.unwrap();
    let second = scheduler
        .evaluate(h.clock_now() + TimeDelta::minutes(1))
        .await
        .unwrap();

    assert_eq!(first.created.len(), 1);
    assert!(second.created.is_empty());
    assert_eq!(second.already_scheduled, 1);

    let jobs = h.jobs().await;
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].status, JobStatus::Pending);
    assert_eq!(jobs[0].due_at, delivery_moment());
    assert_eq!(jobs[0].payload_ref, PayloadRef::from("analysis/tp-1"));
}

#[tokio::test]
async fn not_ready_analysis_defers_to_the_next_cycle() {
    let h = Harness::new().await;
    h.track("tp-1", &[Channel::Push], false).await;
    let scheduler = h.scheduler("node-a");

    let report = scheduler.evaluate(h.clock_now()).await.unwrap();
    assert_eq!(report.deferred_not_ready, 1);
    assert!(h.jobs().await.is_empty());

    h.publish_analysis("tp-1").await;
    let report = scheduler
        .evaluate(h.clock_now() + TimeDelta::minutes(1))
        .await
        .unwrap();
    assert_eq!(report.created.len(), 1);
}

#[tokio::test]
async fn second_instance_skips_a_window_already_evaluated() {
    let h = Harness::new().await;
    h.track("tp-1", &[Channel::Push], true).await;

    let a = h.scheduler("node-a").run_cycle().await.unwrap();
    let b = h.scheduler("node-b").run_cycle().await.unwrap();

    assert!(matches!(a, CycleOutcome::Evaluated(ref r) if r.created.len() == 1));
    assert!(matches!(b, CycleOutcome::Skipped { consecutive: 1 }));
    assert_eq!(h.jobs().await.len(), 1);
}

// ---- Delivery ----

#[tokio::test]
async fn scheduled_job_is_delivered_and_audited() {
    let h = Harness::new().await;
    h.track("tp-1", &[Channel::Push], true).await;
    h.scheduler("node-a").evaluate(h.clock_now()).await.unwrap();

    let push = ScriptedSender::succeeding(Channel::Push).shared();
    let outcomes = h.router("node-a", &[push.clone()]).dispatch_pending().await.unwrap();

    assert_eq!(outcomes.len(), 1);
    assert!(matches!(&outcomes[0], DispatchOutcome::Delivered { channels, .. } if channels == &vec![Channel::Push]));
    let calls = push.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payload, PayloadRef::from("analysis/tp-1"));

    let job = &h.jobs().await[0];
    assert_eq!(job.status, JobStatus::Delivered);
    let attempts = h.storage.attempts_for_job(&job.id).await.unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, AttemptOutcome::Success);
}

#[tokio::test]
async fn archived_before_claim_is_cancelled_without_attempts() {
    let h = Harness::new().await;
    h.track("tp-1", &[Channel::Push, Channel::Email], true).await;
    h.scheduler("node-a").evaluate(h.clock_now()).await.unwrap();

    assert!(
        h.storage
            .set_tracking_status(&TrackedProductId::from("tp-1"), TrackingStatus::Archived)
            .await
            .unwrap()
    );

    let push = ScriptedSender::succeeding(Channel::Push).shared();
    let email = ScriptedSender::succeeding(Channel::Email).shared();
    let outcomes = h
        .router("node-a", &[push.clone(), email.clone()])
        .dispatch_pending()
        .await
        .unwrap();

    assert!(matches!(outcomes[0], DispatchOutcome::Cancelled { .. }));
    assert_eq!(push.call_count().await + email.call_count().await, 0);
    let job = &h.jobs().await[0];
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(h.storage.attempts_for_job(&job.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn permanent_push_failure_still_delivers_by_email() {
    let h = Harness::new().await;
    h.track("tp-1", &[Channel::Push, Channel::Email], true).await;
    h.scheduler("node-a").evaluate(h.clock_now()).await.unwrap();

    let push = ScriptedSender::permanent(Channel::Push).shared();
    let email = ScriptedSender::succeeding(Channel::Email).shared();
    h.router("node-a", &[push, email]).dispatch_pending().await.unwrap();

    let job = &h.jobs().await[0];
    assert_eq!(job.status, JobStatus::Delivered);

    let attempts = h.storage.attempts_for_job(&job.id).await.unwrap();
    let on = |c: Channel| attempts.iter().filter(|a| a.channel == c).collect::<Vec<_>>();
    let push_attempts = on(Channel::Push);
    let email_attempts = on(Channel::Email);
    assert_eq!(push_attempts.len(), 1);
    assert_eq!(push_attempts[0].outcome, AttemptOutcome::PermanentFailure);
    assert_eq!(email_attempts.len(), 1);
    assert_eq!(email_attempts[0].outcome, AttemptOutcome::Success);
    assert_eq!(h.alerts.count().await, 0);
}

#[tokio::test]
async fn exhausted_transient_retries_fail_the_job_and_alert_once() {
    let h = Harness::new().await;
    h.track("tp-1", &[Channel::WhatsApp], true).await;
    h.scheduler("node-a").evaluate(h.clock_now()).await.unwrap();

    let whatsapp = ScriptedSender::transient(Channel::WhatsApp).shared();
    let router = h.router("node-a", &[whatsapp.clone()]);
    let outcomes = router.dispatch_pending().await.unwrap();

    assert!(matches!(outcomes[0], DispatchOutcome::Failed { attempts: 3, .. }));
    assert_eq!(whatsapp.call_count().await, 3);

    let job = h.jobs().await.remove(0);
    assert_eq!(job.status, JobStatus::Failed);
    let attempts = h.storage.attempts_for_job(&job.id).await.unwrap();
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.outcome == AttemptOutcome::TransientFailure));

    let alerts = h.alerts.alerts().await;
    assert_eq!(alerts.len(), 1);
    assert!(matches!(&alerts[0], Alert::JobFailed { job_id, .. } if job_id == &job.id));

    // Not auto-retried: a second drain finds nothing to claim.
    assert!(router.dispatch_pending().await.unwrap().is_empty());
    assert_eq!(whatsapp.call_count().await, 3);
}

#[tokio::test]
async fn operator_requeue_and_abandon_only_apply_to_failed_jobs() {
    let h = Harness::new().await;
    h.track("tp-1", &[Channel::Push], true).await;
    h.scheduler("node-a").evaluate(h.clock_now()).await.unwrap();
    let job_id = h.jobs().await[0].id.clone();

    let push = ScriptedSender::transient(Channel::Push)
        .then(Err(SendError::Transient("503".into())))
        .shared();
    let router = h.router("node-a", &[push]);

    // Pending jobs cannot be re-queued or abandoned.
    assert!(matches!(
        router.requeue(&job_id).await,
        Err(PulseError::InvalidTransition { .. })
    ));
    assert!(matches!(
        router.abandon(&job_id).await,
        Err(PulseError::InvalidTransition { .. })
    ));

    router.dispatch_pending().await.unwrap();
    router.requeue(&job_id).await.unwrap();
    assert_eq!(
        h.storage.get_job(&job_id).await.unwrap().unwrap().status,
        JobStatus::Pending
    );

    router.dispatch_pending().await.unwrap();
    router.abandon(&job_id).await.unwrap();
    assert_eq!(
        h.storage.get_job(&job_id).await.unwrap().unwrap().status,
        JobStatus::Abandoned
    );
    assert!(router.requeue(&job_id).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_one_winner() {
    let h = Harness::new().await;
    h.track("tp-1", &[Channel::Push], true).await;
    h.scheduler("node-a").evaluate(h.clock_now()).await.unwrap();
    let job_id = h.jobs().await[0].id.clone();

    let a = Arc::new(h.router("node-a", &[]));
    let b = Arc::new(h.router("node-b", &[]));
    let (ra, rb) = {
        let (a, b) = (a.clone(), b.clone());
        let (ida, idb) = (job_id.clone(), job_id.clone());
        tokio::join!(
            tokio::spawn(async move { a.claim(&ida).await }),
            tokio::spawn(async move { b.claim(&idb).await }),
        )
    };
    let outcomes = [ra.unwrap().unwrap(), rb.unwrap().unwrap()];

    let winners = outcomes
        .iter()
        .filter(|o| matches!(o, ClaimOutcome::Claimed(_)))
        .count();
    let losers = outcomes
        .iter()
        .filter(|o| matches!(o, ClaimOutcome::AlreadyClaimed))
        .count();
    assert_eq!((winners, losers), (1, 1));
    assert_eq!(
        h.storage.get_job(&job_id).await.unwrap().unwrap().status,
        JobStatus::InFlight
    );
}
