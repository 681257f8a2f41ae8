// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for PricePulse.

use thiserror::Error;

use crate::types::AttemptOutcome;

/// The primary error type used across all PricePulse adapter traits and core operations.
#[derive(Debug, Error)]
pub enum PulseError {
    /// Configuration errors (invalid TOML, missing required fields, bad values).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Channel sender errors outside of a delivery attempt (construction, health).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The alerting collaborator could not be reached.
    #[error("alert delivery failed: {message}")]
    Alert { message: String },

    /// A delivery job was asked to move along an edge its state machine does not have.
    #[error("job {job_id}: invalid transition from {from} to {to}")]
    InvalidTransition {
        job_id: String,
        from: String,
        to: String,
    },

    /// An in-flight job is no longer claimed by the caller: its lease expired
    /// and another holder took it, or it already left `in_flight`.
    #[error("job {job_id}: claim no longer held by {holder}")]
    ClaimLost { job_id: String, holder: String },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl PulseError {
    /// Wrap any error as a storage error.
    pub fn storage(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Storage {
            source: source.into(),
        }
    }
}

/// The result of a single failed send through a [`ChannelSender`](crate::ChannelSender).
///
/// Senders classify their own failures; the router never inspects messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Network error, timeout, rate limit, or provider-side 5xx. Retried with backoff.
    #[error("transient send failure: {0}")]
    Transient(String),

    /// Revoked token, unknown recipient, rejected payload. Never retried.
    #[error("permanent send failure: {0}")]
    Permanent(String),
}

impl SendError {
    /// Whether the router may retry this failure on the same channel.
    pub fn is_transient(&self) -> bool {
        matches!(self, SendError::Transient(_))
    }

    /// The audit outcome recorded for this failure.
    pub fn outcome(&self) -> AttemptOutcome {
        match self {
            SendError::Transient(_) => AttemptOutcome::TransientFailure,
            SendError::Permanent(_) => AttemptOutcome::PermanentFailure,
        }
    }

    /// The human-readable failure reason.
    pub fn reason(&self) -> &str {
        match self {
            SendError::Transient(r) | SendError::Permanent(r) => r,
        }
    }
}
