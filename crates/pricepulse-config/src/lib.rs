// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for PricePulse.
//!
//! Every table rejects unknown keys. Files are merged from `/etc`, the XDG
//! config dir and the working directory, then `PRICEPULSE_*` variables win.
//! Errors come back as a list of miette diagnostics.
//!
//! # Usage
//!
//! ```no_run
//! use pricepulse_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("scheduler interval: {}s", config.scheduler.interval_secs);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::PulseConfig;

use std::path::Path;

/// Load configuration from the XDG hierarchy and validate it.
///
/// On a Figment error every config file that exists is re-read so the
/// diagnostics can point at the offending key.
pub fn load_and_validate() -> Result<PulseConfig, Vec<ConfigError>> {
    checked(loader::load_config(), || {
        loader::search_paths().iter().filter_map(|p| read_source(p)).collect()
    })
}

/// Load configuration from an explicit file (plus env overrides) and validate it.
pub fn load_and_validate_path(path: &Path) -> Result<PulseConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_path(path), || {
        read_source(path).into_iter().collect()
    })
}

/// Load configuration from a TOML string and validate it.
pub fn load_and_validate_str(toml_content: &str) -> Result<PulseConfig, Vec<ConfigError>> {
    checked(loader::load_config_from_str(toml_content), || {
        vec![("<inline>".to_string(), toml_content.to_string())]
    })
}

/// Render a configuration as TOML, e.g. for `pricepulse config show`.
pub fn to_toml(config: &PulseConfig) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(config)
}

/// Validate a loaded config, or turn the Figment error into diagnostics
/// against the sources `sources` yields.
fn checked(
    loaded: Result<PulseConfig, figment::Error>,
    sources: impl FnOnce() -> Vec<(String, String)>,
) -> Result<PulseConfig, Vec<ConfigError>> {
    match loaded {
        Ok(config) => validation::validate_config(&config).map(|()| config),
        Err(err) => Err(diagnostic::figment_to_config_errors(err, &sources())),
    }
}

/// `(path, content)` for a config file, keyed the way Figment names it.
fn read_source(path: &Path) -> Option<(String, String)> {
    let content = std::fs::read_to_string(path).ok()?;
    let absolute = if path.is_relative() {
        std::env::current_dir().map(|d| d.join(path)).unwrap_or_else(|_| path.to_path_buf())
    } else {
        path.to_path_buf()
    };
    Some((absolute.display().to_string(), content))
}
