// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel sender with scripted outcomes.
//!
//! Outcomes queued with [`ScriptedSender::then`] are consumed in order; once
//! the script runs out every further call returns the fallback outcome.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use pricepulse_core::types::{AdapterType, Channel, HealthStatus, MessageId, PayloadRef, UserId};
use pricepulse_core::{ChannelSender, PluginAdapter, PulseError, SendError};

/// One captured call to [`ChannelSender::send`].
#[derive(Debug, Clone)]
pub struct SendCall {
    pub user_id: UserId,
    pub payload: PayloadRef,
    /// Tokio time when the call started; meaningful under a paused clock.
    pub started_at: Instant,
}

pub struct ScriptedSender {
    channel: Channel,
    script: Mutex<VecDeque<Result<(), SendError>>>,
    fallback: Result<(), SendError>,
    delay: Option<Duration>,
    calls: Mutex<Vec<SendCall>>,
    sent: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl ScriptedSender {
    fn with_fallback(channel: Channel, fallback: Result<(), SendError>) -> Self {
        Self {
            channel,
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: Mutex::new(Vec::new()),
            sent: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak_in_flight: AtomicUsize::new(0),
        }
    }

    /// Every call succeeds.
    pub fn succeeding(channel: Channel) -> Self {
        Self::with_fallback(channel, Ok(()))
    }

    /// Every call fails transiently.
    pub fn transient(channel: Channel) -> Self {
        Self::with_fallback(
            channel,
            Err(SendError::Transient("provider unavailable".to_string())),
        )
    }

    /// Every call fails permanently.
    pub fn permanent(channel: Channel) -> Self {
        Self::with_fallback(
            channel,
            Err(SendError::Permanent("recipient rejected".to_string())),
        )
    }

    /// Queue one outcome ahead of the fallback.
    pub fn then(mut self, outcome: Result<(), SendError>) -> Self {
        self.script.get_mut().push_back(outcome);
        self
    }

    /// Hold every call for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Wrap in an `Arc` for registration with the router.
    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub async fn calls(&self) -> Vec<SendCall> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Highest number of calls observed running at the same time.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PluginAdapter for ScriptedSender {
    fn name(&self) -> &str {
        "scripted-sender"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Sender
    }

    async fn health_check(&self) -> Result<HealthStatus, PulseError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), PulseError> {
        Ok(())
    }
}

#[async_trait]
impl ChannelSender for ScriptedSender {
    fn channel(&self) -> Channel {
        self.channel
    }

    async fn send(&self, user_id: &UserId, payload: &PayloadRef) -> Result<MessageId, SendError> {
        self.calls.lock().await.push(SendCall {
            user_id: user_id.clone(),
            payload: payload.clone(),
            started_at: Instant::now(),
        });
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(running, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let outcome = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome.map(|()| {
            let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
            MessageId::from(format!("{}-msg-{n}", self.channel).as_str())
        })
    }
}
