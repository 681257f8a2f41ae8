// SPDX-FileCopyrightText: 2026 PricePulse Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Due-window computation in the user's timezone.
//!
//! A user's delivery moment is their local calendar date combined with their
//! preferred time-of-day. The due window runs from that moment to the end of
//! the local day, so an evaluation that lands anywhere inside it schedules the
//! insight and one that lands before it waits.
//!
//! Daylight-saving transitions resolve deterministically: an ambiguous local
//! time (clocks fall back) takes the earlier instant, and a local time inside
//! a gap (clocks spring forward) moves forward minute by minute to the first
//! instant that exists.

use chrono::offset::LocalResult;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;

use pricepulse_core::types::{Frequency, NotificationPreference};

/// Upper bound on the forward search out of a DST gap. No zone has skipped
/// more than a day of wall-clock time.
const MAX_GAP_MINUTES: i64 = 48 * 60;

/// A delivery moment and the local date that keys it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DueSlot {
    /// Delivery moment in UTC.
    pub due_at: DateTime<Utc>,
    /// The user's local calendar date the slot belongs to.
    pub due_date: NaiveDate,
}

/// The slot scheduled for the user's local day containing `now`, whether or
/// not it has been reached yet.
///
/// `None` when the preference has no delivery on that day (weekly frequency
/// on any other weekday).
pub fn delivery_slot(pref: &NotificationPreference, now: DateTime<Utc>) -> Option<DueSlot> {
    let local_date = now.with_timezone(&pref.timezone).date_naive();
    if pref.frequency == Frequency::Weekly && local_date.weekday() != pref.weekly_day {
        return None;
    }
    let due_at = resolve_local(pref.timezone, local_date.and_time(pref.delivery_time));
    Some(DueSlot {
        due_at,
        due_date: local_date,
    })
}

/// The slot for `now` if its delivery moment has been crossed.
pub fn compute_due(pref: &NotificationPreference, now: DateTime<Utc>) -> Option<DueSlot> {
    delivery_slot(pref, now).filter(|slot| now >= slot.due_at)
}

/// Convert a wall-clock time in `tz` to UTC.
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    let mut candidate = local;
    for _ in 0..=MAX_GAP_MINUTES {
        match tz.from_local_datetime(&candidate) {
            LocalResult::Single(dt) => return dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => return earliest.with_timezone(&Utc),
            LocalResult::None => candidate += TimeDelta::minutes(1),
        }
    }
    Utc.from_utc_datetime(&local)
}
