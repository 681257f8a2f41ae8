// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for PricePulse.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level PricePulse configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PulseConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Notification scheduler settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Delivery router settings.
    #[serde(default)]
    pub router: RouterConfig,

    /// Per-channel sender settings.
    #[serde(default)]
    pub channels: ChannelsConfig,

    /// Operator alerting settings.
    #[serde(default)]
    pub alerting: AlertingConfig,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Service identity configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Display name of the service, used in logs and alerts.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Identity of this process when holding scheduler locks and job claims.
    /// `None` derives a random id at startup.
    #[serde(default)]
    pub instance_id: Option<String>,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            instance_id: None,
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "pricepulse".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("pricepulse").join("pricepulse.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("pricepulse.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// Notification scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Run the scheduler loop in `serve`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between evaluation cycles.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// Lease length of the per-window evaluation lock, in seconds.
    #[serde(default = "default_lock_ttl_secs")]
    pub lock_ttl_secs: u64,

    /// Consecutive lock-contention skips before operators are alerted.
    #[serde(default = "default_contention_alert_threshold")]
    pub contention_alert_threshold: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_interval_secs(),
            lock_ttl_secs: default_lock_ttl_secs(),
            contention_alert_threshold: default_contention_alert_threshold(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_secs() -> u64 {
    60
}

fn default_lock_ttl_secs() -> u64 {
    120
}

fn default_contention_alert_threshold() -> u32 {
    5
}

/// Delivery router configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RouterConfig {
    /// Run the router worker pool in `serve`.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Number of concurrent workers pulling pending jobs.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Milliseconds an idle worker waits before polling for work again.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Attempts per channel before that channel's path is abandoned.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Multiplier applied to the delay after every retry.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Upper bound on any single retry delay, in milliseconds.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Bound on a single send call; exceeding it is a transient failure.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Lease on a claimed job, renewed while the job is processed. Expired
    /// claims are returned to pending by the worker pool's sweep.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            workers: default_workers(),
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            max_backoff_ms: default_max_backoff_ms(),
            send_timeout_ms: default_send_timeout_ms(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}

fn default_workers() -> usize {
    8
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_send_timeout_ms() -> u64 {
    5_000
}

fn default_claim_lease_secs() -> u64 {
    300
}

/// Sender configuration for every channel.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub push: PushConfig,

    #[serde(default)]
    pub whatsapp: WhatsAppConfig,

    #[serde(default)]
    pub email: EmailConfig,
}

/// HTTP push gateway sender.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PushConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Gateway URL receiving `POST` requests with the device token and payload.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token for the gateway.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Concurrent sends admitted to the gateway.
    #[serde(default = "default_push_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            api_key: None,
            max_in_flight: default_push_max_in_flight(),
        }
    }
}

fn default_push_max_in_flight() -> usize {
    64
}

/// WhatsApp Cloud API sender.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct WhatsAppConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Graph API base URL, including the version segment.
    #[serde(default = "default_whatsapp_api_base")]
    pub api_base: String,

    /// Business phone number id messages are sent from.
    #[serde(default)]
    pub phone_number_id: Option<String>,

    /// System user access token.
    #[serde(default)]
    pub access_token: Option<String>,

    /// Pre-approved message template carrying the insight link.
    #[serde(default = "default_whatsapp_template")]
    pub template_name: String,

    /// Template language code.
    #[serde(default = "default_whatsapp_language")]
    pub language: String,

    /// Concurrent sends admitted to the Cloud API.
    #[serde(default = "default_whatsapp_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for WhatsAppConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_base: default_whatsapp_api_base(),
            phone_number_id: None,
            access_token: None,
            template_name: default_whatsapp_template(),
            language: default_whatsapp_language(),
            max_in_flight: default_whatsapp_max_in_flight(),
        }
    }
}

fn default_whatsapp_api_base() -> String {
    "https://graph.facebook.com/v21.0".to_string()
}

fn default_whatsapp_template() -> String {
    "price_insight".to_string()
}

fn default_whatsapp_language() -> String {
    "en_US".to_string()
}

fn default_whatsapp_max_in_flight() -> usize {
    16
}

/// SMTP email sender.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub smtp_host: Option<String>,

    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    /// Sender mailbox, e.g. `PricePulse <insights@example.com>`.
    #[serde(default)]
    pub from: Option<String>,

    #[serde(default = "default_email_subject")]
    pub subject: String,

    /// Base URL the payload reference is appended to in the message body.
    #[serde(default = "default_insight_base_url")]
    pub insight_base_url: String,

    /// Concurrent SMTP sessions admitted.
    #[serde(default = "default_email_max_in_flight")]
    pub max_in_flight: usize,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: None,
            smtp_port: default_smtp_port(),
            username: None,
            password: None,
            from: None,
            subject: default_email_subject(),
            insight_base_url: default_insight_base_url(),
            max_in_flight: default_email_max_in_flight(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_email_subject() -> String {
    "Your price insight is ready".to_string()
}

fn default_insight_base_url() -> String {
    "https://app.pricepulse.example/insights/".to_string()
}

fn default_email_max_in_flight() -> usize {
    16
}

/// Operator alerting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AlertingConfig {
    /// Webhook receiving JSON alerts. `None` logs alerts only.
    #[serde(default)]
    pub webhook_url: Option<String>,

    /// Request timeout for the webhook, in milliseconds.
    #[serde(default = "default_alert_timeout_ms")]
    pub timeout_ms: u64,

    /// Delay before the single retry of a failed alert, in milliseconds.
    #[serde(default = "default_alert_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_ms: default_alert_timeout_ms(),
            retry_delay_ms: default_alert_retry_delay_ms(),
        }
    }
}

fn default_alert_timeout_ms() -> u64 {
    5_000
}

fn default_alert_retry_delay_ms() -> u64 {
    2_000
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Address the scrape endpoint listens on.
    #[serde(default = "default_metrics_listen_address")]
    pub listen_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_address: default_metrics_listen_address(),
        }
    }
}

fn default_metrics_listen_address() -> String {
    "127.0.0.1:9464".to_string()
}
