// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `pricepulse status` command implementation.
//!
//! Reads attempt and job aggregates straight from the database, so it works
//! whether or not the service is running.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use pricepulse_config::PulseConfig;
use pricepulse_core::types::DeliveryStats;
use pricepulse_core::{JobStore, PulseError, StorageAdapter};

use crate::services;

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub since: DateTime<Utc>,
    pub job_success_rate: Option<f64>,
    #[serde(flatten)]
    pub stats: DeliveryStats,
}

pub async fn run_status(config: &PulseConfig, since_hours: i64, json: bool) -> Result<(), PulseError> {
    let storage = services::open_storage(config).await?;
    let since = Utc::now() - TimeDelta::hours(since_hours.max(0));
    let stats = storage.delivery_stats(since).await?;
    storage.close().await?;

    let response = StatusResponse {
        since,
        job_success_rate: stats.job_success_rate(),
        stats,
    };
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        print!("{}", render_table(&response));
    }
    Ok(())
}

fn percent(part: u64, whole: u64) -> String {
    if whole == 0 {
        "-".to_string()
    } else {
        format!("{:.1}%", part as f64 * 100.0 / whole as f64)
    }
}

fn render_table(response: &StatusResponse) -> String {
    let s = &response.stats;
    let mut out = String::new();
    out.push_str(&format!("since {}\n\n", response.since.format("%Y-%m-%d %H:%M UTC")));
    out.push_str(&format!("attempts            {}\n", s.attempts));
    out.push_str(&format!(
        "  success           {} ({})\n",
        s.successes,
        percent(s.successes, s.attempts)
    ));
    out.push_str(&format!(
        "  transient         {} ({})\n",
        s.transient_failures,
        percent(s.transient_failures, s.attempts)
    ));
    out.push_str(&format!(
        "  permanent         {} ({})\n",
        s.permanent_failures,
        percent(s.permanent_failures, s.attempts)
    ));
    out.push_str(&format!("mean latency        {:.0} ms\n\n", s.mean_latency_ms));

    out.push_str("jobs\n");
    for (status, count) in &s.jobs_by_status {
        out.push_str(&format!("  {:<17} {count}\n", status.to_string()));
    }
    if let Some(rate) = response.job_success_rate {
        out.push_str(&format!("job success rate    {:.1}%\n", rate * 100.0));
    }
    out
}
