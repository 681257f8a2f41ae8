// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Layered config loading with Figment.
//!
//! Merge order (later overrides earlier):
//! 1. Compiled defaults
//! 2. `/etc/pricepulse/pricepulse.toml`
//! 3. `~/.config/pricepulse/pricepulse.toml`
//! 4. `./pricepulse.toml`
//! 5. `PRICEPULSE_*` environment variables

#![allow(clippy::result_large_err)] // figment::Error is external

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::PulseConfig;

/// Env var sections, most specific first so `channels_push_` wins over a bare prefix.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("channels_push_", "channels.push."),
    ("channels_whatsapp_", "channels.whatsapp."),
    ("channels_email_", "channels.email."),
    ("service_", "service."),
    ("storage_", "storage."),
    ("scheduler_", "scheduler."),
    ("router_", "router."),
    ("alerting_", "alerting."),
    ("metrics_", "metrics."),
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
pub fn load_config() -> Result<PulseConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no files, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<PulseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PulseConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<PulseConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PulseConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Config files consulted by [`load_config`], lowest precedence first.
///
/// A missing file is skipped.
pub fn search_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/pricepulse/pricepulse.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("pricepulse").join("pricepulse.toml"));
    }
    paths.push(PathBuf::from("pricepulse.toml"));
    paths
}

/// The Figment used for the XDG lookup, before extraction.
pub fn build_figment() -> Figment {
    search_paths()
        .into_iter()
        .fold(
            Figment::new().merge(Serialized::defaults(PulseConfig::default())),
            |figment, path| figment.merge(Toml::file(path)),
        )
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env var name onto a dotted config key.
///
/// Only the section prefix is rewritten: `router_max_backoff_ms` becomes
/// `router.max_backoff_ms`, never `router.max.backoff.ms`.
pub fn map_env_key(key: &str) -> String {
    for (prefix, section) in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{section}{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("PRICEPULSE_").map(|key| map_env_key(key.as_str()).into())
}
