//! Persistence for presets, sessions, eating windows and scheduler state.
//!
//! Callers only see [`FastingStore`]. The backend is picked once at
//! construction time by [`open_store`]: plain SQLite, or SQLite mirrored to
//! a remote HTTP backend when sync is enabled.

mod config;
pub mod memory;
pub mod sqlite;
pub mod synced;

pub use config::{Config, SchedulerConfig, SyncConfig, TelegramConfig};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use synced::{RemoteMirror, SyncedStore};

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{ConfigError, StoreError};
use crate::fasting::{
    EatingWindow, EatingWindowPatch, FastingPreset, FastingSession, PresetPatch, SessionPatch,
};
use crate::notify::NotificationRecord;
use crate::scheduler::{FastingFlags, NotificationState};

pub type StoreResult<T> = Result<T, StoreError>;

/// Typed record operations shared by every backend.
///
/// `update_*` returns `Ok(None)` when the id is unknown; `delete_*` returns
/// whether a record was removed. `active_*` picks the record with the most
/// recent `start_time` among those with no `end_time`.
#[async_trait]
pub trait FastingStore: Send + Sync {
    // ── Presets ──────────────────────────────────────────────────────
    async fn list_presets(&self) -> StoreResult<Vec<FastingPreset>>;
    async fn get_preset(&self, id: &str) -> StoreResult<Option<FastingPreset>>;
    async fn create_preset(&self, preset: &FastingPreset) -> StoreResult<()>;
    async fn update_preset(
        &self,
        id: &str,
        patch: &PresetPatch,
    ) -> StoreResult<Option<FastingPreset>>;
    async fn delete_preset(&self, id: &str) -> StoreResult<bool>;

    // ── Sessions ─────────────────────────────────────────────────────
    async fn list_sessions(&self) -> StoreResult<Vec<FastingSession>>;
    async fn get_session(&self, id: &str) -> StoreResult<Option<FastingSession>>;
    async fn create_session(&self, session: &FastingSession) -> StoreResult<()>;
    async fn update_session(
        &self,
        id: &str,
        patch: &SessionPatch,
    ) -> StoreResult<Option<FastingSession>>;
    async fn delete_session(&self, id: &str) -> StoreResult<bool>;
    async fn active_session(&self) -> StoreResult<Option<FastingSession>>;

    // ── Eating windows ───────────────────────────────────────────────
    async fn list_eating_windows(&self) -> StoreResult<Vec<EatingWindow>>;
    async fn get_eating_window(&self, id: &str) -> StoreResult<Option<EatingWindow>>;
    async fn create_eating_window(&self, window: &EatingWindow) -> StoreResult<()>;
    async fn update_eating_window(
        &self,
        id: &str,
        patch: &EatingWindowPatch,
    ) -> StoreResult<Option<EatingWindow>>;
    async fn delete_eating_window(&self, id: &str) -> StoreResult<bool>;
    async fn active_eating_window(&self) -> StoreResult<Option<EatingWindow>>;

    // ── Scheduler state ──────────────────────────────────────────────
    async fn notification_state(&self) -> StoreResult<NotificationState>;
    async fn save_notification_state(&self, state: &NotificationState) -> StoreResult<()>;
    async fn fasting_flags(&self, session_id: &str) -> StoreResult<FastingFlags>;
    async fn save_fasting_flags(&self, flags: &FastingFlags) -> StoreResult<()>;

    // ── Local notification inbox ─────────────────────────────────────
    async fn push_notification(&self, record: &NotificationRecord) -> StoreResult<()>;
    /// Newest first.
    async fn list_notifications(&self, limit: usize) -> StoreResult<Vec<NotificationRecord>>;
}

/// Open the configured backend.
///
/// # Errors
/// Returns an error if the SQLite database cannot be opened or migrated.
pub fn open_store(config: &Config) -> Result<Arc<dyn FastingStore>, crate::error::CoreError> {
    let path = data_dir()?.join("fastwatch.db");
    let local = SqliteStore::open(&path)?;
    if config.sync.enabled {
        let mirror = RemoteMirror::new(&config.sync)?;
        tracing::info!(base_url = %config.sync.base_url, "remote sync enabled");
        Ok(Arc::new(SyncedStore::new(local, mirror)))
    } else {
        Ok(Arc::new(local))
    }
}

/// Returns `~/.config/fastwatch[-dev]/` based on FASTWATCH_ENV.
///
/// Set FASTWATCH_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("FASTWATCH_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("fastwatch-dev")
    } else {
        base_dir.join("fastwatch")
    };

    std::fs::create_dir_all(&dir).map_err(ConfigError::DataDir)?;
    Ok(dir)
}

/// Most recently started record among those still open.
pub(crate) fn most_recent_open<'a, T, I, F>(records: I, key: F) -> Option<&'a T>
where
    I: IntoIterator<Item = &'a T>,
    F: Fn(&T) -> (chrono::DateTime<chrono::Utc>, bool),
{
    records
        .into_iter()
        .filter(|r| key(r).1)
        .max_by_key(|r| key(r).0)
}
