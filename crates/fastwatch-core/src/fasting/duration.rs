//! Elapsed/remaining calculations.
//!
//! All helpers are pure functions of stored timestamps and `now`; nothing
//! caches a remaining-time value.

use chrono::{DateTime, Utc};

use super::model::{EatingWindow, FastingSession};

const MS_PER_MINUTE: i64 = 60_000;

/// Whole minutes from `from` to `to`, rounded toward negative infinity.
pub fn floor_minutes(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_milliseconds().div_euclid(MS_PER_MINUTE)
}

/// Minutes fasted so far; uses `end_time` once the session is closed.
pub fn elapsed_minutes(session: &FastingSession, now: DateTime<Utc>) -> i64 {
    floor_minutes(session.start_time, session.end_time.unwrap_or(now)).max(0)
}

/// Final duration of a closed session, 0 while it is still open.
pub fn session_duration(session: &FastingSession) -> i64 {
    match session.end_time {
        Some(end) => floor_minutes(session.start_time, end).max(0),
        None => 0,
    }
}

pub fn eating_window_elapsed(window: &EatingWindow, now: DateTime<Utc>) -> i64 {
    floor_minutes(window.start_time, window.end_time.unwrap_or(now)).max(0)
}

/// Minutes left before the next fast is due, clamped at zero.
pub fn eating_window_remaining(window: &EatingWindow, now: DateTime<Utc>) -> i64 {
    floor_minutes(now, window.next_fast_due_time).max(0)
}

/// Signed minutes until the deadline; negative once overdue.
pub fn minutes_until_due(window: &EatingWindow, now: DateTime<Utc>) -> i64 {
    floor_minutes(now, window.next_fast_due_time)
}

/// Minutes past the deadline, clamped at zero.
pub fn overdue_minutes(window: &EatingWindow, now: DateTime<Utc>) -> i64 {
    floor_minutes(window.next_fast_due_time, now).max(0)
}
