// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter and collaborator trait definitions.
//!
//! Pluggable adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod alert;
pub mod clock;
pub mod contacts;
pub mod lock;
pub mod sender;
pub mod store;

pub use adapter::PluginAdapter;
pub use alert::AlertSink;
pub use clock::{Clock, SystemClock};
pub use contacts::ContactDirectory;
pub use lock::LockProvider;
pub use sender::ChannelSender;
pub use store::{AnalysisStore, JobStore, StorageAdapter, TrackingStore};
