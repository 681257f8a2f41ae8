// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for PricePulse.
//!
//! Deterministic stand-ins for every external collaborator of the scheduler
//! and the router, so both can be exercised without a database or network.

pub mod clock;
pub mod memory_store;
pub mod mock_alert;
pub mod mock_sender;

pub use clock::FakeClock;
pub use memory_store::MemoryStore;
pub use mock_alert::RecordingAlertSink;
pub use mock_sender::{ScriptedSender, SendCall};
