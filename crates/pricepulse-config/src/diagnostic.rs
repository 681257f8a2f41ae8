// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config errors as miette diagnostics.
//!
//! Figment reports a typo in `[channels.push]` as an unknown field plus a
//! path. This module turns that into a span inside the TOML file that
//! produced it, the list of keys the section accepts, and a Jaro-Winkler
//! "did you mean" when one key is close enough.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// One problem with the loaded configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {}", section_label(section))]
    #[diagnostic(
        code(pricepulse::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// Dotted table the key appeared in; empty for the top level.
        section: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not a {} setting", section_label(section))]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(pricepulse::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("this value")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(pricepulse::config::missing_key),
        help("set `{key}` in pricepulse.toml or through its PRICEPULSE_ variable")
    )]
    MissingKey { key: String },

    /// A value that parsed but makes no sense (zero workers, missing credentials).
    #[error("validation error: {message}")]
    #[diagnostic(code(pricepulse::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(pricepulse::config::other))]
    Other(String),
}

fn section_label(section: &str) -> String {
    if section.is_empty() {
        "the top level".to_string()
    } else {
        format!("[{section}]")
    }
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Convert every error figment collected into a diagnostic.
///
/// `toml_sources` holds `(path, content)` for each file that was merged; it
/// is used only to attach spans.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let section: Vec<String> = error.path.iter().map(ToString::to_string).collect();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let (span, src) = locate(&error, &section, field, toml_sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section: section.join("."),
                        suggestion: suggest_key(field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: dotted(&section, field),
                },
                Kind::InvalidType(actual, expected) => {
                    // For a type error the path already ends at the offending key.
                    let (table, key) = match section.split_last() {
                        Some((key, table)) => (table.to_vec(), key.clone()),
                        None => (Vec::new(), String::new()),
                    };
                    let (span, src) = locate(&error, &table, &key, toml_sources);
                    ConfigError::InvalidType {
                        key: section.join("."),
                        detail: format!("found {actual}"),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn dotted(section: &[String], field: &str) -> String {
    if section.is_empty() {
        field.to_string()
    } else {
        format!("{}.{field}", section.join("."))
    }
}

/// Pick the TOML source the error came from and find `field` in it.
///
/// Falls back to the only source when figment recorded no file, which is
/// the case for inline strings.
fn locate(
    error: &figment::Error,
    section: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let from_file = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(path) => Some(path.display().to_string()),
            _ => None,
        });

    let source = match from_file {
        Some(path) => toml_sources.iter().find(|(p, _)| *p == path),
        None if toml_sources.len() == 1 => toml_sources.first(),
        None => None,
    };

    source
        .and_then(|(path, content)| {
            find_key_offset(content, section, field).map(|offset| {
                (
                    Some(SourceSpan::new(offset.into(), field.len())),
                    Some(NamedSource::new(path, content.clone())),
                )
            })
        })
        .unwrap_or((None, None))
}

/// Byte offset of `field` inside the `[section]` table of `content`.
///
/// Lines are matched against the table header exactly, so `[channels.push]`
/// is never confused with `[channels.push.extra]`. Top-level keys are looked
/// for before the first header.
pub fn find_key_offset(content: &str, section: &[String], field: &str) -> Option<usize> {
    let wanted = section.join(".");
    let mut current = String::new();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if let Some(header) = trimmed.strip_prefix('[') {
            current = header
                .split(']')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
        } else if current == wanted
            && let Some(rest) = trimmed.strip_prefix(field)
            && rest.trim_start().starts_with('=')
        {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

/// The valid key closest to `unknown`, if any clears the similarity threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print each error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn suggests_interval_for_typo() {
        let valid = ["enabled", "interval_secs", "lock_ttl_secs"];
        assert_eq!(suggest_key("intervl_secs", &valid).as_deref(), Some("interval_secs"));
        assert_eq!(suggest_key("zzzzzz", &valid), None);
    }

    #[test]
    fn finds_key_in_nested_table() {
        let content = "[router]\nworkers = 2\n\n[channels.push]\nendpont = \"x\"\n";
        let o = find_key_offset(content, &path(&["channels", "push"]), "endpont").unwrap();
        assert_eq!(&content[o..o + 7], "endpont");
    }

    #[test]
    fn key_in_another_table_is_not_matched() {
        let content = "[router]\nworkers = 2\n[scheduler]\nstray = 1\n";
        assert_eq!(find_key_offset(content, &path(&["router"]), "stray"), None);
    }

    #[test]
    fn prefix_of_a_longer_key_is_not_matched() {
        let content = "[router]\nworkers_max = 2\nworkers = 3\n";
        let o = find_key_offset(content, &path(&["router"]), "workers").unwrap();
        assert_eq!(&content[o..o + 11], "workers = 3");
    }

    #[test]
    fn top_level_keys_precede_the_first_header() {
        let content = "stray = 1\n[router]\nworkers = 2\n";
        assert_eq!(find_key_offset(content, &[], "stray"), Some(0));
        assert_eq!(find_key_offset(content, &[], "workers"), None);
    }

    #[test]
    fn section_labels() {
        assert_eq!(section_label(""), "the top level");
        assert_eq!(section_label("channels.email"), "[channels.email]");
    }
}
