// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules. Each function takes `&Database` and runs on the
//! connection's background thread.

pub mod attempts;
pub mod contacts;
pub mod jobs;
pub mod leases;
pub mod payloads;
pub mod tracking;
