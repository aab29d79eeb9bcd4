//! # Fastwatch Core Library
//!
//! Core logic for an intermittent-fasting tracker. Every operation is
//! available through the `fastwatch` CLI; any other front end is a thin layer
//! over the same library.
//!
//! ## Architecture
//!
//! - **Fasting engine**: alternates fasting sessions and eating windows.
//!   State is derived from the store on demand and every operation takes an
//!   explicit `now`, so callers (and tests) own the clock.
//! - **Milestone scheduler**: a polling loop that fires countdown, overdue and
//!   fasting reminders at most once per eating window or session.
//! - **Notification channels**: a local inbox and Telegram, dispatched in
//!   parallel.
//! - **Storage**: SQLite, in-memory, or SQLite mirrored to a remote HTTP
//!   backend, behind one async [`FastingStore`] trait. TOML configuration.
//! - **Stats**: streaks, success rate and a weekly series.
//!
//! ## Key Components
//!
//! - [`FastingEngine`]: fasting/eating state machine
//! - [`MilestoneScheduler`]: notification milestone tracker
//! - [`FastingStore`]: persistence abstraction
//! - [`Config`]: application configuration management

pub mod error;
pub mod fasting;
pub mod notify;
pub mod scheduler;
pub mod stats;
pub mod storage;

pub use error::{
    ConfigError, CoreError, FastingError, NotifyError, SchedulerError, StoreError,
};
pub use fasting::{
    CurrentState, EatingWindow, FastingEngine, FastingPreset, FastingSession, WindowPhase,
};
pub use notify::{
    dispatch, ChannelKind, LocalNotifier, NotificationChannel, NotificationKind,
    NotificationRecord, NotificationSettings, TelegramNotifier,
};
pub use scheduler::{
    FastingFlags, MilestoneScheduler, NotificationMilestone, NotificationState, SchedulerHandle,
    TickReport,
};
pub use stats::{compute_stats, load_stats, DayStat, FastingStats};
pub use storage::{open_store, Config, FastingStore, MemoryStore, SqliteStore, SyncedStore};
