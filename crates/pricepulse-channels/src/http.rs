// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Failure classification shared by the HTTP senders.

use std::time::Duration;

use pricepulse_core::{PulseError, SendError};
use reqwest::StatusCode;

/// Longest response body excerpt carried into a failure reason.
const MAX_BODY_EXCERPT: usize = 256;

pub(crate) fn build_client(timeout: Duration) -> Result<reqwest::Client, PulseError> {
    reqwest::Client::builder()
        .user_agent(concat!("pricepulse/", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()
        .map_err(|e| PulseError::Channel {
            message: format!("failed to build HTTP client: {e}"),
            source: Some(Box::new(e)),
        })
}

/// Whether a provider status is worth retrying: rate limits, request
/// timeouts, and server-side errors.
pub(crate) fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Classify a non-success provider response.
pub(crate) fn classify_status(status: StatusCode, body: &str) -> SendError {
    let reason = format!("provider returned {status}: {}", excerpt(body));
    if is_transient_status(status) {
        SendError::Transient(reason)
    } else {
        SendError::Permanent(reason)
    }
}

/// Classify a request that never produced a response.
pub(crate) fn classify_transport(error: &reqwest::Error) -> SendError {
    if error.is_builder() {
        SendError::Permanent(format!("invalid request: {error}"))
    } else {
        SendError::Transient(format!("request failed: {error}"))
    }
}

fn excerpt(body: &str) -> &str {
    let trimmed = body.trim();
    if trimmed.len() <= MAX_BODY_EXCERPT {
        return trimmed;
    }
    let mut end = MAX_BODY_EXCERPT;
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    &trimmed[..end]
}
