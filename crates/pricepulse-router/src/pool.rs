// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The worker pool that drains pending jobs while `serve` runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::router::DeliveryRouter;

impl DeliveryRouter {
    /// Run `workers` concurrent workers until `cancel` fires.
    ///
    /// A sweeper returns expired claims to pending, at start-up and then
    /// every half lease, so jobs held by a crashed process are picked up
    /// again. On cancellation each worker finishes the job it holds before
    /// exiting.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        self.release_expired_claims().await;

        let mut pool = JoinSet::new();
        {
            let router = Arc::clone(&self);
            let cancel = cancel.clone();
            pool.spawn(async move { router.sweep_expired_claims(cancel).await });
        }

        let workers = self.config().workers.max(1);
        for worker in 0..workers {
            let router = Arc::clone(&self);
            let cancel = cancel.clone();
            pool.spawn(async move { router.worker_loop(worker, cancel).await });
        }
        info!(workers, channels = ?self.channels(), "delivery router started");

        while let Some(result) = pool.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "router worker panicked");
            }
        }
        info!("delivery router shut down");
    }

    async fn worker_loop(&self, worker: usize, cancel: CancellationToken) {
        let idle = Duration::from_millis(self.config().poll_interval_ms);

        while !cancel.is_cancelled() {
            match self.claim_next().await {
                Ok(Some(job)) => {
                    let job_id = job.id.clone();
                    match self.process_claimed(job).await {
                        Ok(outcome) => {
                            debug!(worker, job_id = %job_id, status = %outcome.status(), "job dispatched");
                            continue;
                        }
                        // Back off before the next claim; the job itself was released.
                        Err(e) => warn!(worker, job_id = %job_id, error = %e, "job dispatch failed"),
                    }
                }
                Ok(None) => {}
                Err(e) => warn!(worker, error = %e, "claiming next job failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(idle) => {}
                _ = cancel.cancelled() => {}
            }
        }
        debug!(worker, "router worker stopped");
    }

    async fn sweep_expired_claims(&self, cancel: CancellationToken) {
        let period = self.lease() / 2;
        let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticks.tick() => {}
                _ = cancel.cancelled() => break,
            }
            self.release_expired_claims().await;
        }
        debug!("claim sweeper stopped");
    }

    async fn release_expired_claims(&self) {
        match self
            .stores()
            .jobs
            .release_expired_claims(self.clock().now())
            .await
        {
            Ok(0) => {}
            Ok(released) => info!(released, "expired job claims returned to pending"),
            Err(e) => warn!(error = %e, "failed to release expired job claims"),
        }
    }
}
