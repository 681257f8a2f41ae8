// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Notification scheduler for PricePulse.
//!
//! Decides when each user's daily or weekly insight for a tracked product is
//! due in their own timezone and creates exactly one delivery job for it.

pub mod due;
pub mod runner;

pub use due::{DueSlot, compute_due, delivery_slot, resolve_local};
pub use runner::{CycleOutcome, EvaluationReport, Scheduler, SchedulerStores};
