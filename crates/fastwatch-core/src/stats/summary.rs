//! Streak, success-rate and weekly statistics over closed sessions.
//!
//! Calendar days are taken in the time zone of the `now` passed in, so the
//! CLI can report local days while tests pin UTC.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::fasting::{session_duration, FastingSession};
use crate::storage::FastingStore;

/// Window used for the success rate.
pub const SUCCESS_RATE_DAYS: i64 = 30;
/// Days reported in `week_data`.
pub const WEEK_DAYS: i64 = 7;

/// One calendar day in the weekly series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayStat {
    pub date: NaiveDate,
    /// Minutes fasted, 0 when no session started that day.
    pub duration: i64,
    pub goal_met: bool,
    pub stopped_early: bool,
}

/// Derived statistics. Recomputed on every request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FastingStats {
    pub current_streak: u32,
    pub total_fasts: usize,
    /// Percent of successes among sessions started in the last 30 days.
    pub success_rate: f64,
    /// Mean fast length in minutes.
    pub average_duration: i64,
    pub total_successes: usize,
    pub total_failures: usize,
    pub week_data: Vec<DayStat>,
}

/// A fast succeeds when it was not cut short and lasted the full goal.
pub fn is_success(session: &FastingSession) -> bool {
    !session.stopped_early && session_duration(session) >= i64::from(session.goal_minutes)
}

fn local_date<Tz: TimeZone>(at: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    at.with_timezone(tz).date_naive()
}

/// Per-day outcome: a day counts as a success if any fast started that day
/// succeeded.
pub fn day_outcomes<Tz: TimeZone>(
    sessions: &[FastingSession],
    tz: &Tz,
) -> BTreeMap<NaiveDate, bool> {
    let mut days = BTreeMap::new();
    for session in sessions.iter().filter(|s| !s.is_active()) {
        let entry = days.entry(local_date(session.start_time, tz)).or_insert(false);
        *entry |= is_success(session);
    }
    days
}

/// Consecutive successful days ending today.
pub fn current_streak(days: &BTreeMap<NaiveDate, bool>, today: NaiveDate) -> u32 {
    let mut streak = 0;
    let mut day = Some(today);
    while let Some(d) = day {
        if days.get(&d) != Some(&true) {
            break;
        }
        streak += 1;
        day = d.pred_opt();
    }
    streak
}

/// Compute all statistics at `now`. Active sessions are ignored.
pub fn compute_stats<Tz: TimeZone>(sessions: &[FastingSession], now: DateTime<Tz>) -> FastingStats {
    let tz = now.timezone();
    let today = now.date_naive();
    let now_utc = now.with_timezone(&Utc);

    let mut closed: Vec<&FastingSession> = sessions.iter().filter(|s| !s.is_active()).collect();
    closed.sort_by_key(|s| s.start_time);

    let total_fasts = closed.len();
    let total_successes = closed.iter().filter(|s| is_success(s)).count();

    let cutoff = now_utc - Duration::days(SUCCESS_RATE_DAYS);
    let recent: Vec<_> = closed.iter().filter(|s| s.start_time >= cutoff).collect();
    let recent_successes = recent.iter().filter(|s| is_success(s)).count();
    let success_rate = if recent.is_empty() {
        0.0
    } else {
        (recent_successes as f64 / recent.len() as f64 * 1000.0).round() / 10.0
    };

    let average_duration = if closed.is_empty() {
        0
    } else {
        let total: i64 = closed.iter().map(|s| session_duration(s)).sum();
        (total as f64 / closed.len() as f64).round() as i64
    };

    let week_data = (0..WEEK_DAYS)
        .rev()
        .map(|offset| {
            let date = today - Duration::days(offset);
            match closed.iter().find(|s| local_date(s.start_time, &tz) == date) {
                Some(session) => DayStat {
                    date,
                    duration: session_duration(session),
                    goal_met: is_success(session),
                    stopped_early: session.stopped_early,
                },
                None => DayStat {
                    date,
                    duration: 0,
                    goal_met: false,
                    stopped_early: false,
                },
            }
        })
        .collect();

    FastingStats {
        current_streak: current_streak(&day_outcomes(sessions, &tz), today),
        total_fasts,
        success_rate,
        average_duration,
        total_successes,
        total_failures: total_fasts - total_successes,
        week_data,
    }
}

/// Load the session history from the store and compute statistics.
pub async fn load_stats<Tz: TimeZone>(
    store: &dyn FastingStore,
    now: DateTime<Tz>,
) -> Result<FastingStats, StoreError> {
    let sessions = store.list_sessions().await?;
    Ok(compute_stats(&sessions, now))
}
