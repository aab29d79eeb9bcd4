//! Statistics over the fasting history.
//!
//! Everything here is derived on demand from stored sessions; nothing is
//! cached or persisted.

mod summary;

pub use summary::{
    compute_stats, current_streak, day_outcomes, is_success, load_stats, DayStat, FastingStats,
    SUCCESS_RATE_DAYS, WEEK_DAYS,
};
