// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks the semantic constraints serde cannot express: positive intervals,
//! coherent backoff bounds, credentials for enabled channels, parseable addresses.

use crate::diagnostic::ConfigError;
use crate::model::PulseConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &PulseConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.service.log_level
        ));
    }

    if let Some(id) = &config.service.instance_id
        && id.trim().is_empty()
    {
        fail("service.instance_id must not be empty when set".to_string());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let scheduler = &config.scheduler;
    if scheduler.interval_secs == 0 {
        fail("scheduler.interval_secs must be at least 1".to_string());
    }
    if scheduler.lock_ttl_secs < scheduler.interval_secs {
        fail(format!(
            "scheduler.lock_ttl_secs ({}) must not be shorter than scheduler.interval_secs ({})",
            scheduler.lock_ttl_secs, scheduler.interval_secs
        ));
    }
    if scheduler.contention_alert_threshold == 0 {
        fail("scheduler.contention_alert_threshold must be at least 1".to_string());
    }

    let router = &config.router;
    if router.workers == 0 {
        fail("router.workers must be at least 1".to_string());
    }
    if router.max_attempts == 0 {
        fail("router.max_attempts must be at least 1".to_string());
    }
    if router.backoff_multiplier < 1.0 || !router.backoff_multiplier.is_finite() {
        fail(format!(
            "router.backoff_multiplier must be a finite number >= 1.0, got {}",
            router.backoff_multiplier
        ));
    }
    if router.initial_backoff_ms > router.max_backoff_ms {
        fail(format!(
            "router.initial_backoff_ms ({}) must not exceed router.max_backoff_ms ({})",
            router.initial_backoff_ms, router.max_backoff_ms
        ));
    }
    if router.send_timeout_ms == 0 {
        fail("router.send_timeout_ms must be at least 1".to_string());
    }
    if router.claim_lease_secs == 0 {
        fail("router.claim_lease_secs must be at least 1".to_string());
    }

    let push = &config.channels.push;
    if push.enabled {
        match push.endpoint.as_deref() {
            None => fail("channels.push.endpoint is required when push is enabled".to_string()),
            Some(url) if !is_http_url(url) => fail(format!(
                "channels.push.endpoint `{url}` must be an http(s) URL"
            )),
            Some(_) => {}
        }
    }
    if push.max_in_flight == 0 {
        fail("channels.push.max_in_flight must be at least 1".to_string());
    }

    let whatsapp = &config.channels.whatsapp;
    if whatsapp.enabled {
        if whatsapp.phone_number_id.is_none() {
            fail(
                "channels.whatsapp.phone_number_id is required when whatsapp is enabled"
                    .to_string(),
            );
        }
        if whatsapp.access_token.is_none() {
            fail(
                "channels.whatsapp.access_token is required when whatsapp is enabled".to_string(),
            );
        }
        if !is_http_url(&whatsapp.api_base) {
            fail(format!(
                "channels.whatsapp.api_base `{}` must be an http(s) URL",
                whatsapp.api_base
            ));
        }
    }
    if whatsapp.max_in_flight == 0 {
        fail("channels.whatsapp.max_in_flight must be at least 1".to_string());
    }

    let email = &config.channels.email;
    if email.enabled {
        if email.smtp_host.is_none() {
            fail("channels.email.smtp_host is required when email is enabled".to_string());
        }
        match email.from.as_deref() {
            None => fail("channels.email.from is required when email is enabled".to_string()),
            Some(from) if !from.contains('@') => fail(format!(
                "channels.email.from `{from}` is not a mailbox address"
            )),
            Some(_) => {}
        }
        if email.username.is_some() != email.password.is_some() {
            fail(
                "channels.email.username and channels.email.password must be set together"
                    .to_string(),
            );
        }
    }
    if email.max_in_flight == 0 {
        fail("channels.email.max_in_flight must be at least 1".to_string());
    }

    if let Some(url) = &config.alerting.webhook_url
        && !is_http_url(url)
    {
        fail(format!("alerting.webhook_url `{url}` must be an http(s) URL"));
    }

    if config.metrics.enabled
        && config
            .metrics
            .listen_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        fail(format!(
            "metrics.listen_address `{}` is not a valid socket address",
            config.metrics.listen_address
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
