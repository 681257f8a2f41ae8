// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Dispatch behaviour of the delivery router against in-memory stores.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc, Weekday};
use tokio_util::sync::CancellationToken;

use pricepulse_config::model::RouterConfig;
use pricepulse_core::types::{
    Alert, AttemptOutcome, Channel, ChannelAttempt, ClaimOutcome, ClaimRequest, DeliveryJob,
    DeliveryStats, Frequency, HealthStatus, JobId, JobStatus, NotificationPreference, PayloadRef,
    ProductId, TrackedProduct, TrackedProductId, TrackingStatus, UserId,
};
use pricepulse_core::{Clock, JobStore, PulseError, SendError};
use pricepulse_router::{DeliveryRouter, DispatchOutcome, RouterStores};
use pricepulse_test_utils::{FakeClock, MemoryStore, RecordingAlertSink, ScriptedSender};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 19, 9, 30, 0).unwrap()
}

struct Fixture {
    store: Arc<MemoryStore>,
    alerts: RecordingAlertSink,
    clock: FakeClock,
}

impl Fixture {
    fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            alerts: RecordingAlertSink::new(),
            clock: FakeClock::new(now()),
        }
    }

    fn router(&self, holder: &str) -> DeliveryRouter {
        self.router_with(RouterConfig::default(), holder)
    }

    fn router_with(&self, config: RouterConfig, holder: &str) -> DeliveryRouter {
        self.router_over(self.store.clone(), config, holder)
    }

    fn router_over(
        &self,
        jobs: Arc<dyn JobStore>,
        config: RouterConfig,
        holder: &str,
    ) -> DeliveryRouter {
        DeliveryRouter::new(
            config,
            RouterStores {
                tracking: self.store.clone(),
                jobs,
            },
            Arc::new(self.alerts.clone()),
            Arc::new(self.clock.clone()),
            holder,
        )
    }

    /// Seed an active product whose owner wants `channels`, plus one pending job.
    async fn seed_job(&self, id: &str, channels: &[Channel]) -> DeliveryJob {
        let user = UserId::from(format!("user-{id}").as_str());
        let tracked = TrackedProduct {
            id: TrackedProductId::from(id),
            product_id: ProductId::from(format!("sku-{id}").as_str()),
            user_id: user.clone(),
            created_at: now() - TimeDelta::days(7),
            status: TrackingStatus::Active,
        };
        self.store.add_tracked(tracked.clone()).await;
        self.store
            .set_preference(NotificationPreference {
                user_id: user,
                channels: channels.iter().copied().collect::<BTreeSet<_>>(),
                delivery_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                timezone: chrono_tz::UTC,
                frequency: Frequency::Daily,
                weekly_day: Weekday::Mon,
            })
            .await;

        let job = DeliveryJob::new(
            &tracked,
            now() - TimeDelta::minutes(30),
            now().date_naive(),
            PayloadRef::from(format!("analysis/{id}").as_str()),
            now() - TimeDelta::minutes(30),
        );
        assert!(self.store.insert_job(&job).await.unwrap());
        job
    }

    async fn status_of(&self, job: &DeliveryJob) -> JobStatus {
        self.store.get_job(&job.id).await.unwrap().unwrap().status
    }
}

/// Job store that fails chosen calls a set number of times, then behaves.
struct FlakyJobs {
    inner: Arc<MemoryStore>,
    attempt_reads_to_fail: AtomicUsize,
    delivered_finishes_to_fail: AtomicUsize,
}

impl FlakyJobs {
    fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            attempt_reads_to_fail: AtomicUsize::new(0),
            delivered_finishes_to_fail: AtomicUsize::new(0),
        }
    }

    fn failing_attempt_reads(self, n: usize) -> Self {
        self.attempt_reads_to_fail.store(n, Ordering::SeqCst);
        self
    }

    fn failing_delivered_finishes(self, n: usize) -> Self {
        self.delivered_finishes_to_fail.store(n, Ordering::SeqCst);
        self
    }

    fn trip(counter: &AtomicUsize) -> Result<(), PulseError> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(PulseError::storage("database is locked"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JobStore for FlakyJobs {
    async fn job_exists(&self, id: &TrackedProductId, due: NaiveDate) -> Result<bool, PulseError> {
        self.inner.job_exists(id, due).await
    }

    async fn insert_job(&self, job: &DeliveryJob) -> Result<bool, PulseError> {
        self.inner.insert_job(job).await
    }

    async fn get_job(&self, id: &JobId) -> Result<Option<DeliveryJob>, PulseError> {
        self.inner.get_job(id).await
    }

    async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<DeliveryJob>, PulseError> {
        self.inner.list_jobs(status).await
    }

    async fn claim_next(&self, claim: &ClaimRequest) -> Result<Option<DeliveryJob>, PulseError> {
        self.inner.claim_next(claim).await
    }

    async fn claim(&self, id: &JobId, claim: &ClaimRequest) -> Result<ClaimOutcome, PulseError> {
        self.inner.claim(id, claim).await
    }

    async fn transition(
        &self,
        id: &JobId,
        from: JobStatus,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PulseError> {
        self.inner.transition(id, from, to, now).await
    }

    async fn renew_claim(
        &self,
        id: &JobId,
        holder: &str,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, PulseError> {
        self.inner.renew_claim(id, holder, lease_until).await
    }

    async fn finish_claim(
        &self,
        id: &JobId,
        holder: &str,
        to: JobStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PulseError> {
        if to == JobStatus::Delivered {
            Self::trip(&self.delivered_finishes_to_fail)?;
        }
        self.inner.finish_claim(id, holder, to, now).await
    }

    async fn record_attempt(&self, attempt: &ChannelAttempt) -> Result<(), PulseError> {
        self.inner.record_attempt(attempt).await
    }

    async fn attempts_for_job(&self, id: &JobId) -> Result<Vec<ChannelAttempt>, PulseError> {
        Self::trip(&self.attempt_reads_to_fail)?;
        self.inner.attempts_for_job(id).await
    }

    async fn release_expired_claims(&self, now: DateTime<Utc>) -> Result<u64, PulseError> {
        self.inner.release_expired_claims(now).await
    }

    async fn delivery_stats(&self, since: DateTime<Utc>) -> Result<DeliveryStats, PulseError> {
        self.inner.delivery_stats(since).await
    }
}

/// Paused-clock durations land on the timer's millisecond ticks.
fn assert_close(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(10),
        "expected ~{expected:?}, got {actual:?}"
    );
}

fn transient() -> SendError {
    SendError::Transient("503 service unavailable".to_string())
}

#[tokio::test(start_paused = true)]
async fn single_channel_success_delivers() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    let push = ScriptedSender::succeeding(Channel::Push).shared();
    let router = fx.router("router-a").with_sender(push.clone(), 4);

    let outcomes = router.dispatch_pending().await.unwrap();
    assert_eq!(
        outcomes,
        vec![DispatchOutcome::Delivered {
            job_id: job.id.clone(),
            channels: vec![Channel::Push],
        }]
    );
    assert_eq!(fx.status_of(&job).await, JobStatus::Delivered);

    let calls = push.calls().await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].payload, job.payload_ref);

    let attempts = fx.store.attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, AttemptOutcome::Success);
    assert_eq!(attempts[0].attempt, 1);
    assert!(attempts[0].detail.as_deref().unwrap().starts_with("push-msg-"));
}

#[tokio::test(start_paused = true)]
async fn permanent_on_one_channel_success_on_another_delivers() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push, Channel::Email]).await;
    let push = ScriptedSender::permanent(Channel::Push).shared();
    let email = ScriptedSender::succeeding(Channel::Email).shared();
    let router = fx
        .router("router-a")
        .with_sender(push.clone(), 4)
        .with_sender(email.clone(), 4);

    let outcome = router.dispatch_job(&job.id).await.unwrap().unwrap();
    assert_eq!(outcome.status(), JobStatus::Delivered);
    assert_eq!(fx.status_of(&job).await, JobStatus::Delivered);

    let attempts = fx.store.attempts().await;
    let push_attempts: Vec<_> = attempts.iter().filter(|a| a.channel == Channel::Push).collect();
    let email_attempts: Vec<_> = attempts.iter().filter(|a| a.channel == Channel::Email).collect();
    assert_eq!(push_attempts.len(), 1);
    assert_eq!(push_attempts[0].outcome, AttemptOutcome::PermanentFailure);
    assert_eq!(email_attempts.len(), 1);
    assert_eq!(email_attempts[0].outcome, AttemptOutcome::Success);
    assert_eq!(fx.alerts.count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn transient_failures_exhaust_cap_then_fail_with_one_alert() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::WhatsApp]).await;
    let whatsapp = ScriptedSender::transient(Channel::WhatsApp).shared();
    let router = fx.router("router-a").with_sender(whatsapp.clone(), 4);

    let outcome = router.dispatch_job(&job.id).await.unwrap().unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Failed {
            job_id: job.id.clone(),
            attempts: 3,
        }
    );
    assert_eq!(fx.status_of(&job).await, JobStatus::Failed);

    let attempts = fx.store.attempts().await;
    assert_eq!(attempts.len(), 3);
    assert!(attempts.iter().all(|a| a.outcome == AttemptOutcome::TransientFailure));
    assert_eq!(
        attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );

    let alerts = fx.alerts.alerts().await;
    assert_eq!(alerts.len(), 1);
    match &alerts[0] {
        Alert::JobFailed {
            job_id, channels, attempts, ..
        } => {
            assert_eq!(job_id, &job.id);
            assert_eq!(channels, &vec![Channel::WhatsApp]);
            assert_eq!(*attempts, 3);
        }
        other => panic!("unexpected alert {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn retries_back_off_exponentially() {
    let fx = Fixture::new();
    fx.seed_job("tp-1", &[Channel::Push]).await;
    let push = ScriptedSender::transient(Channel::Push).shared();
    let router = fx.router("router-a").with_sender(push.clone(), 4);

    router.dispatch_pending().await.unwrap();

    let calls = push.calls().await;
    assert_eq!(calls.len(), 3);
    assert_close(calls[1].started_at - calls[0].started_at, Duration::from_millis(500));
    assert_close(calls[2].started_at - calls[1].started_at, Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn transient_then_success_delivers_on_retry() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Email]).await;
    let email = ScriptedSender::succeeding(Channel::Email)
        .then(Err(transient()))
        .then(Ok(()))
        .shared();
    let router = fx.router("router-a").with_sender(email.clone(), 4);

    router.dispatch_pending().await.unwrap();
    assert_eq!(fx.status_of(&job).await, JobStatus::Delivered);

    let outcomes: Vec<_> = fx.store.attempts().await.iter().map(|a| a.outcome).collect();
    assert_eq!(
        outcomes,
        vec![AttemptOutcome::TransientFailure, AttemptOutcome::Success]
    );
}

#[tokio::test(start_paused = true)]
async fn first_success_stops_other_channel_retries() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push, Channel::Email]).await;
    let push = ScriptedSender::transient(Channel::Push).shared();
    let email = ScriptedSender::succeeding(Channel::Email)
        .with_delay(Duration::from_millis(100))
        .shared();
    let router = fx
        .router("router-a")
        .with_sender(push.clone(), 4)
        .with_sender(email.clone(), 4);

    let outcome = router.dispatch_job(&job.id).await.unwrap().unwrap();
    assert_eq!(
        outcome,
        DispatchOutcome::Delivered {
            job_id: job.id.clone(),
            channels: vec![Channel::Email],
        }
    );
    // Push failed at t=0 and was waiting out its backoff when email succeeded.
    assert_eq!(push.call_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn slow_send_times_out_as_transient() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    let push = ScriptedSender::succeeding(Channel::Push)
        .with_delay(Duration::from_secs(30))
        .shared();
    let config = RouterConfig {
        max_attempts: 2,
        ..RouterConfig::default()
    };
    let router = fx.router_with(config, "router-a").with_sender(push.clone(), 4);

    router.dispatch_pending().await.unwrap();
    assert_eq!(fx.status_of(&job).await, JobStatus::Failed);

    let attempts = fx.store.attempts().await;
    assert_eq!(attempts.len(), 2);
    for attempt in &attempts {
        assert_eq!(attempt.outcome, AttemptOutcome::TransientFailure);
        assert!(attempt.detail.as_deref().unwrap().contains("timed out"));
        assert!((5000..5010).contains(&attempt.latency_ms));
    }
}

#[tokio::test(start_paused = true)]
async fn archived_product_is_cancelled_without_attempts() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push, Channel::Email]).await;
    fx.store
        .set_tracking_status(&job.tracked_product_id, TrackingStatus::Archived)
        .await;
    let push = ScriptedSender::succeeding(Channel::Push).shared();
    let email = ScriptedSender::succeeding(Channel::Email).shared();
    let router = fx
        .router("router-a")
        .with_sender(push.clone(), 4)
        .with_sender(email.clone(), 4);

    let outcome = router.dispatch_job(&job.id).await.unwrap().unwrap();
    assert_eq!(outcome, DispatchOutcome::Cancelled { job_id: job.id.clone() });
    assert_eq!(fx.status_of(&job).await, JobStatus::Cancelled);
    assert!(fx.store.attempts().await.is_empty());
    assert_eq!(push.call_count().await + email.call_count().await, 0);
}

#[tokio::test(start_paused = true)]
async fn paused_product_is_cancelled_too() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    fx.store
        .set_tracking_status(&job.tracked_product_id, TrackingStatus::Paused)
        .await;
    let router = fx
        .router("router-a")
        .with_sender(ScriptedSender::succeeding(Channel::Push).shared(), 4);

    router.dispatch_pending().await.unwrap();
    assert_eq!(fx.status_of(&job).await, JobStatus::Cancelled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_have_one_winner() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    let push = ScriptedSender::succeeding(Channel::Push).shared();
    let a = Arc::new(fx.router("router-a").with_sender(push.clone(), 4));
    let b = Arc::new(fx.router("router-b").with_sender(push.clone(), 4));

    let (ra, rb) = tokio::join!(
        {
            let (a, id) = (a.clone(), job.id.clone());
            tokio::spawn(async move { a.dispatch_job(&id).await })
        },
        {
            let (b, id) = (b.clone(), job.id.clone());
            tokio::spawn(async move { b.dispatch_job(&id).await })
        }
    );
    let results = [ra.unwrap().unwrap(), rb.unwrap().unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
    assert_eq!(push.call_count().await, 1);
    assert_eq!(fx.store.attempts().await.len(), 1);
}

#[tokio::test]
async fn second_claim_observes_already_claimed() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    let a = fx.router("router-a");
    let b = fx.router("router-b");

    assert!(matches!(a.claim(&job.id).await.unwrap(), ClaimOutcome::Claimed(_)));
    assert_eq!(b.claim(&job.id).await.unwrap(), ClaimOutcome::AlreadyClaimed);
}

#[tokio::test(start_paused = true)]
async fn missing_sender_is_a_permanent_failure() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::WhatsApp]).await;
    let router = fx.router("router-a");

    let outcome = router.dispatch_job(&job.id).await.unwrap().unwrap();
    assert_eq!(outcome.status(), JobStatus::Failed);

    let attempts = fx.store.attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, AttemptOutcome::PermanentFailure);
    assert_eq!(fx.alerts.count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn admission_limit_bounds_concurrent_sends() {
    let fx = Fixture::new();
    let push = ScriptedSender::succeeding(Channel::Push)
        .with_delay(Duration::from_millis(200))
        .shared();
    let router = Arc::new(fx.router("router-a").with_sender(push.clone(), 2));

    let mut jobs = Vec::new();
    for i in 0..6 {
        jobs.push(fx.seed_job(&format!("tp-{i}"), &[Channel::Push]).await);
    }

    let mut handles = Vec::new();
    for job in &jobs {
        let router = router.clone();
        let id = job.id.clone();
        handles.push(tokio::spawn(async move { router.dispatch_job(&id).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(push.call_count().await, 6);
    assert_eq!(push.peak_in_flight(), 2);
}

#[tokio::test(start_paused = true)]
async fn requeue_and_abandon_only_from_failed() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    let push = ScriptedSender::permanent(Channel::Push)
        .then(Err(SendError::Permanent("token revoked".to_string())))
        .shared();
    let router = fx.router("router-a").with_sender(push.clone(), 4);

    // Pending jobs cannot be re-queued or abandoned.
    assert!(matches!(
        router.requeue(&job.id).await,
        Err(PulseError::InvalidTransition { .. })
    ));
    assert!(matches!(
        router.abandon(&job.id).await,
        Err(PulseError::InvalidTransition { .. })
    ));

    router.dispatch_pending().await.unwrap();
    assert_eq!(fx.status_of(&job).await, JobStatus::Failed);

    router.requeue(&job.id).await.unwrap();
    assert_eq!(fx.status_of(&job).await, JobStatus::Pending);

    // Second round numbers its attempts after the first.
    router.dispatch_pending().await.unwrap();
    let attempts = fx.store.attempts().await;
    assert_eq!(
        attempts.iter().map(|a| a.attempt).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert_eq!(fx.alerts.count().await, 2);

    router.abandon(&job.id).await.unwrap();
    assert_eq!(fx.status_of(&job).await, JobStatus::Abandoned);
    assert!(router.requeue(&job.id).await.is_err());

    let stored = fx.store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.attempt_count, 2);
}

#[tokio::test(start_paused = true)]
async fn worker_pool_drains_jobs_and_stops_on_cancel() {
    let fx = Fixture::new();
    let push = ScriptedSender::succeeding(Channel::Push).shared();
    let config = RouterConfig {
        workers: 3,
        poll_interval_ms: 50,
        ..RouterConfig::default()
    };
    let router = Arc::new(fx.router_with(config, "router-a").with_sender(push.clone(), 8));

    let mut jobs = Vec::new();
    for i in 0..5 {
        jobs.push(fx.seed_job(&format!("tp-{i}"), &[Channel::Push]).await);
    }

    let cancel = CancellationToken::new();
    let task = tokio::spawn(router.clone().run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(500)).await;
    for job in &jobs {
        assert_eq!(fx.status_of(job).await, JobStatus::Delivered);
    }
    assert_eq!(push.call_count().await, 5);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn worker_pool_releases_expired_claims_on_start() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;

    // A previous process claimed the job and died.
    let crashed = fx.router("router-crashed");
    assert!(crashed.claim_next().await.unwrap().is_some());
    fx.clock.advance(TimeDelta::hours(1));

    let push = ScriptedSender::succeeding(Channel::Push).shared();
    let router = Arc::new(fx.router("router-a").with_sender(push.clone(), 4));
    let cancel = CancellationToken::new();
    let task = tokio::spawn(router.clone().run(cancel.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(fx.status_of(&job).await, JobStatus::Delivered);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn not_yet_due_jobs_are_left_pending() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    fx.clock.set(job.due_at - TimeDelta::minutes(5));
    let router = fx
        .router("router-a")
        .with_sender(ScriptedSender::succeeding(Channel::Push).shared(), 4);

    assert!(router.dispatch_pending().await.unwrap().is_empty());
    assert_eq!(fx.status_of(&job).await, JobStatus::Pending);
}

#[tokio::test(start_paused = true)]
async fn expired_claim_taken_over_is_sent_once() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    let push = ScriptedSender::succeeding(Channel::Push).shared();
    let a = fx.router("router-a").with_sender(push.clone(), 4);
    let b = fx.router("router-b").with_sender(push.clone(), 4);

    let held_by_a = a.claim_next().await.unwrap().unwrap();
    fx.clock.advance(TimeDelta::seconds(301));
    assert_eq!(fx.store.release_expired_claims(fx.clock.now()).await.unwrap(), 1);
    let held_by_b = b.claim_next().await.unwrap().unwrap();

    assert!(matches!(
        a.process_claimed(held_by_a).await,
        Err(PulseError::ClaimLost { .. })
    ));
    assert!(matches!(
        b.process_claimed(held_by_b).await,
        Ok(DispatchOutcome::Delivered { .. })
    ));
    assert_eq!(push.call_count().await, 1);
    assert_eq!(fx.status_of(&job).await, JobStatus::Delivered);
}

#[tokio::test(start_paused = true)]
async fn claim_lost_between_retries_stops_the_old_holder() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    let push = ScriptedSender::transient(Channel::Push).shared();
    let config = RouterConfig {
        claim_lease_secs: 30,
        initial_backoff_ms: 60_000,
        max_backoff_ms: 60_000,
        ..RouterConfig::default()
    };
    let a = Arc::new(fx.router_with(config.clone(), "router-a").with_sender(push.clone(), 4));
    let b = fx.router_with(config, "router-b");

    let claimed = a.claim_next().await.unwrap().unwrap();
    let task = tokio::spawn({
        let a = a.clone();
        async move { a.process_claimed(claimed).await }
    });

    // First attempt has run; A is backing off when its lease lapses.
    tokio::time::sleep(Duration::from_secs(1)).await;
    fx.clock.advance(TimeDelta::seconds(31));
    fx.store.release_expired_claims(fx.clock.now()).await.unwrap();
    assert!(b.claim_next().await.unwrap().is_some());

    let result = task.await.unwrap();
    assert!(matches!(result, Err(PulseError::ClaimLost { .. })));
    assert_eq!(push.call_count().await, 1);
    assert_eq!(fx.alerts.count().await, 0);

    let stored = fx.store.get_job(&job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::InFlight);
    assert_eq!(stored.claimed_by.as_deref(), Some("router-b"));
}

#[tokio::test(start_paused = true)]
async fn store_error_after_claim_returns_job_to_pending() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    let push = ScriptedSender::succeeding(Channel::Push).shared();
    let jobs = Arc::new(FlakyJobs::new(fx.store.clone()).failing_attempt_reads(1));
    let router = fx
        .router_over(jobs, RouterConfig::default(), "router-a")
        .with_sender(push.clone(), 4);

    assert!(matches!(
        router.dispatch_pending().await,
        Err(PulseError::Storage { .. })
    ));
    assert_eq!(fx.status_of(&job).await, JobStatus::Pending);
    assert_eq!(push.call_count().await, 0);

    let outcomes = router.dispatch_pending().await.unwrap();
    assert_eq!(outcomes.len(), 1);
    assert_eq!(fx.status_of(&job).await, JobStatus::Delivered);
    assert_eq!(push.call_count().await, 1);
}

#[tokio::test(start_paused = true)]
async fn worker_pool_retries_a_job_whose_dispatch_errored() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    let push = ScriptedSender::succeeding(Channel::Push).shared();
    let jobs = Arc::new(FlakyJobs::new(fx.store.clone()).failing_attempt_reads(1));
    let config = RouterConfig {
        workers: 1,
        poll_interval_ms: 50,
        ..RouterConfig::default()
    };
    let router = Arc::new(
        fx.router_over(jobs, config, "router-a")
            .with_sender(push.clone(), 4),
    );

    let cancel = CancellationToken::new();
    let task = tokio::spawn(router.clone().run(cancel.clone()));
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert_eq!(fx.status_of(&job).await, JobStatus::Delivered);
    assert_eq!(push.call_count().await, 1);
    assert_eq!(fx.alerts.count().await, 0);

    cancel.cancel();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn delivery_recorded_before_a_failed_finalise_is_not_resent() {
    let fx = Fixture::new();
    let job = fx.seed_job("tp-1", &[Channel::Push]).await;
    let push = ScriptedSender::succeeding(Channel::Push).shared();
    let jobs = Arc::new(FlakyJobs::new(fx.store.clone()).failing_delivered_finishes(1));
    let router = fx
        .router_over(jobs, RouterConfig::default(), "router-a")
        .with_sender(push.clone(), 4);

    assert!(router.dispatch_pending().await.is_err());
    assert_eq!(fx.status_of(&job).await, JobStatus::Pending);

    let outcomes = router.dispatch_pending().await.unwrap();
    assert_eq!(
        outcomes,
        vec![DispatchOutcome::Delivered {
            job_id: job.id.clone(),
            channels: vec![Channel::Push],
        }]
    );
    assert_eq!(push.call_count().await, 1);
    assert_eq!(fx.store.attempts().await.len(), 1);
}

#[tokio::test]
async fn sender_health_covers_every_registered_channel() {
    let fx = Fixture::new();
    let router = fx
        .router("router-a")
        .with_sender(ScriptedSender::succeeding(Channel::Email).shared(), 2)
        .with_sender(ScriptedSender::succeeding(Channel::Push).shared(), 2);

    let health = router.sender_health().await;
    assert_eq!(
        health,
        vec![
            (Channel::Push, HealthStatus::Healthy),
            (Channel::Email, HealthStatus::Healthy),
        ]
    );
    router.shutdown_senders().await;
}
