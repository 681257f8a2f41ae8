// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics.

use metrics::{describe_counter, describe_gauge, describe_histogram};
use pricepulse_core::types::{AttemptOutcome, Channel, JobStatus};

/// Register all PricePulse metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "pricepulse_jobs_created_total",
        "Delivery jobs created by the scheduler"
    );
    describe_counter!(
        "pricepulse_jobs_deferred_total",
        "Due insights deferred because analysis was not ready"
    );
    describe_counter!(
        "pricepulse_scheduler_lock_skips_total",
        "Scheduler cycles skipped on lock contention"
    );
    describe_counter!(
        "pricepulse_channel_attempts_total",
        "Channel delivery attempts by channel and outcome"
    );
    describe_counter!(
        "pricepulse_jobs_finished_total",
        "Delivery jobs reaching delivered, failed, or cancelled"
    );
    describe_gauge!(
        "pricepulse_jobs_in_flight",
        "Delivery jobs currently being dispatched"
    );
    describe_histogram!(
        "pricepulse_attempt_latency_seconds",
        "Channel send latency in seconds"
    );
}

/// Record newly created delivery jobs.
pub fn record_jobs_created(count: u64) {
    metrics::counter!("pricepulse_jobs_created_total").increment(count);
}

/// Record deferrals caused by not-ready analysis.
pub fn record_jobs_deferred(count: u64) {
    metrics::counter!("pricepulse_jobs_deferred_total").increment(count);
}

/// Record one scheduler cycle lost to lock contention.
pub fn record_lock_skip() {
    metrics::counter!("pricepulse_scheduler_lock_skips_total").increment(1);
}

/// Record one channel attempt and its latency.
pub fn record_channel_attempt(channel: Channel, outcome: AttemptOutcome, latency_secs: f64) {
    metrics::counter!(
        "pricepulse_channel_attempts_total",
        "channel" => channel.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
    metrics::histogram!("pricepulse_attempt_latency_seconds", "channel" => channel.to_string())
        .record(latency_secs);
}

/// Record a job reaching the end of a dispatch round.
pub fn record_job_finished(status: JobStatus) {
    metrics::counter!("pricepulse_jobs_finished_total", "status" => status.to_string())
        .increment(1);
}

/// Adjust the in-flight job gauge.
pub fn add_jobs_in_flight(delta: f64) {
    metrics::gauge!("pricepulse_jobs_in_flight").increment(delta);
}
