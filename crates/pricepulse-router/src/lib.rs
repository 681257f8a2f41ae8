// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery router for PricePulse.
//!
//! Pending delivery jobs are claimed atomically and fanned out concurrently
//! over the user's enabled channels. Each channel path retries transient
//! failures with bounded exponential backoff under a per-send timeout and a
//! per-channel admission limit; the first success delivers the job.

mod pool;
pub mod policy;
pub mod router;

pub use policy::RetryPolicy;
pub use router::{DeliveryRouter, DispatchOutcome, RouterStores};
