//! SQLite-based record storage.
//!
//! Provides persistent storage for:
//! - Fasting presets, sessions and eating windows
//! - Scheduler state (kv table) and per-session fasting flags
//! - The local notification inbox
//!
//! Timestamps are stored as RFC 3339 strings with millisecond precision so
//! that `ORDER BY start_time` sorts chronologically.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{FastingStore, StoreResult};
use crate::error::StoreError;
use crate::fasting::{
    EatingWindow, EatingWindowPatch, FastingPreset, FastingSession, PresetPatch, SessionPatch,
};
use crate::notify::{NotificationKind, NotificationRecord};
use crate::scheduler::{FastingFlags, NotificationState};

const NOTIFICATION_STATE_KEY: &str = "notification_state";

const SESSION_COLUMNS: &str =
    "id, start_time, end_time, goal_minutes, preset_name, stopped_early, eating_window_minutes";
const WINDOW_COLUMNS: &str =
    "id, start_time, end_time, expected_duration_minutes, next_fast_due_time";

/// SQLite database for fasting records.
///
/// `rusqlite::Connection` is not `Sync`, so it lives behind a mutex that is
/// never held across an `.await`.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path` and migrate the schema.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(|source| StoreError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database (for tests and dry runs).
    pub fn open_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> StoreResult<()> {
        self.conn.lock()?.execute_batch(
            "CREATE TABLE IF NOT EXISTS presets (
                id               TEXT PRIMARY KEY,
                name             TEXT NOT NULL,
                duration_minutes INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sessions (
                id                    TEXT PRIMARY KEY,
                start_time            TEXT NOT NULL,
                end_time              TEXT,
                goal_minutes          INTEGER NOT NULL,
                preset_name           TEXT NOT NULL,
                stopped_early         INTEGER NOT NULL DEFAULT 0,
                eating_window_minutes INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS eating_windows (
                id                        TEXT PRIMARY KEY,
                start_time                TEXT NOT NULL,
                end_time                  TEXT,
                expected_duration_minutes INTEGER NOT NULL,
                next_fast_due_time        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS fasting_flags (
                session_id      TEXT PRIMARY KEY,
                goal_reached    INTEGER NOT NULL DEFAULT 0,
                two_hours_extra INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS notifications (
                id             TEXT PRIMARY KEY,
                kind           TEXT NOT NULL,
                minutes_offset INTEGER NOT NULL,
                message        TEXT NOT NULL,
                created_at     TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS kv (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            -- Active-record lookups and history listing
            CREATE INDEX IF NOT EXISTS idx_sessions_start_time ON sessions(start_time);
            CREATE INDEX IF NOT EXISTS idx_sessions_open ON sessions(end_time, start_time);
            CREATE INDEX IF NOT EXISTS idx_windows_open ON eating_windows(end_time, start_time);
            CREATE INDEX IF NOT EXISTS idx_notifications_created_at ON notifications(created_at);",
        )?;
        Ok(())
    }

    /// Get a value from the kv store.
    pub fn kv_get(&self, key: &str) -> StoreResult<Option<String>> {
        let conn = self.conn.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    /// Set a value in the kv store.
    pub fn kv_set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.conn.lock()?.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn query_sessions(&self, filter: &str) -> StoreResult<Vec<FastingSession>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions {filter} ORDER BY start_time ASC"
        ))?;
        let rows = stmt.query_map([], session_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn query_windows(&self, filter: &str) -> StoreResult<Vec<EatingWindow>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {WINDOW_COLUMNS} FROM eating_windows {filter} ORDER BY start_time ASC"
        ))?;
        let rows = stmt.query_map([], window_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[async_trait]
impl FastingStore for SqliteStore {
    async fn list_presets(&self) -> StoreResult<Vec<FastingPreset>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, name, duration_minutes FROM presets ORDER BY duration_minutes, name",
        )?;
        let rows = stmt.query_map([], preset_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    async fn get_preset(&self, id: &str) -> StoreResult<Option<FastingPreset>> {
        let conn = self.conn.lock()?;
        let preset = conn
            .query_row(
                "SELECT id, name, duration_minutes FROM presets WHERE id = ?1",
                params![id],
                preset_from_row,
            )
            .optional()?;
        Ok(preset)
    }

    async fn create_preset(&self, preset: &FastingPreset) -> StoreResult<()> {
        self.conn.lock()?.execute(
            "INSERT OR REPLACE INTO presets (id, name, duration_minutes) VALUES (?1, ?2, ?3)",
            params![preset.id, preset.name, preset.duration_minutes],
        )?;
        Ok(())
    }

    async fn update_preset(
        &self,
        id: &str,
        patch: &PresetPatch,
    ) -> StoreResult<Option<FastingPreset>> {
        let Some(mut preset) = self.get_preset(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut preset);
        self.conn.lock()?.execute(
            "UPDATE presets SET name = ?2, duration_minutes = ?3 WHERE id = ?1",
            params![preset.id, preset.name, preset.duration_minutes],
        )?;
        Ok(Some(preset))
    }

    async fn delete_preset(&self, id: &str) -> StoreResult<bool> {
        let n = self
            .conn
            .lock()?
            .execute("DELETE FROM presets WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    async fn list_sessions(&self) -> StoreResult<Vec<FastingSession>> {
        self.query_sessions("")
    }

    async fn get_session(&self, id: &str) -> StoreResult<Option<FastingSession>> {
        let conn = self.conn.lock()?;
        let session = conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1"),
                params![id],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    async fn create_session(&self, session: &FastingSession) -> StoreResult<()> {
        self.conn.lock()?.execute(
            "INSERT OR REPLACE INTO sessions
                (id, start_time, end_time, goal_minutes, preset_name,
                 stopped_early, eating_window_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                session.id,
                fmt_ts(session.start_time),
                session.end_time.map(fmt_ts),
                session.goal_minutes,
                session.preset_name,
                session.stopped_early,
                session.eating_window_minutes,
            ],
        )?;
        Ok(())
    }

    async fn update_session(
        &self,
        id: &str,
        patch: &SessionPatch,
    ) -> StoreResult<Option<FastingSession>> {
        let Some(mut session) = self.get_session(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut session);
        self.conn.lock()?.execute(
            "UPDATE sessions SET end_time = ?2, stopped_early = ?3 WHERE id = ?1",
            params![session.id, session.end_time.map(fmt_ts), session.stopped_early],
        )?;
        Ok(Some(session))
    }

    async fn delete_session(&self, id: &str) -> StoreResult<bool> {
        let conn = self.conn.lock()?;
        conn.execute("DELETE FROM fasting_flags WHERE session_id = ?1", params![id])?;
        let n = conn.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    async fn active_session(&self) -> StoreResult<Option<FastingSession>> {
        let conn = self.conn.lock()?;
        let session = conn
            .query_row(
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM sessions
                     WHERE end_time IS NULL ORDER BY start_time DESC LIMIT 1"
                ),
                [],
                session_from_row,
            )
            .optional()?;
        Ok(session)
    }

    async fn list_eating_windows(&self) -> StoreResult<Vec<EatingWindow>> {
        self.query_windows("")
    }

    async fn get_eating_window(&self, id: &str) -> StoreResult<Option<EatingWindow>> {
        let conn = self.conn.lock()?;
        let window = conn
            .query_row(
                &format!("SELECT {WINDOW_COLUMNS} FROM eating_windows WHERE id = ?1"),
                params![id],
                window_from_row,
            )
            .optional()?;
        Ok(window)
    }

    async fn create_eating_window(&self, window: &EatingWindow) -> StoreResult<()> {
        self.conn.lock()?.execute(
            "INSERT OR REPLACE INTO eating_windows
                (id, start_time, end_time, expected_duration_minutes, next_fast_due_time)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                window.id,
                fmt_ts(window.start_time),
                window.end_time.map(fmt_ts),
                window.expected_duration_minutes,
                fmt_ts(window.next_fast_due_time),
            ],
        )?;
        Ok(())
    }

    async fn update_eating_window(
        &self,
        id: &str,
        patch: &EatingWindowPatch,
    ) -> StoreResult<Option<EatingWindow>> {
        let Some(mut window) = self.get_eating_window(id).await? else {
            return Ok(None);
        };
        patch.apply(&mut window);
        self.conn.lock()?.execute(
            "UPDATE eating_windows SET end_time = ?2 WHERE id = ?1",
            params![window.id, window.end_time.map(fmt_ts)],
        )?;
        Ok(Some(window))
    }

    async fn delete_eating_window(&self, id: &str) -> StoreResult<bool> {
        let n = self
            .conn
            .lock()?
            .execute("DELETE FROM eating_windows WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    async fn active_eating_window(&self) -> StoreResult<Option<EatingWindow>> {
        let conn = self.conn.lock()?;
        let window = conn
            .query_row(
                &format!(
                    "SELECT {WINDOW_COLUMNS} FROM eating_windows
                     WHERE end_time IS NULL ORDER BY start_time DESC LIMIT 1"
                ),
                [],
                window_from_row,
            )
            .optional()?;
        Ok(window)
    }

    async fn notification_state(&self) -> StoreResult<NotificationState> {
        match self.kv_get(NOTIFICATION_STATE_KEY)? {
            Some(json) => Ok(serde_json::from_str(&json)?),
            None => Ok(NotificationState::default()),
        }
    }

    async fn save_notification_state(&self, state: &NotificationState) -> StoreResult<()> {
        let json = serde_json::to_string(state)?;
        self.kv_set(NOTIFICATION_STATE_KEY, &json)
    }

    async fn fasting_flags(&self, session_id: &str) -> StoreResult<FastingFlags> {
        let conn = self.conn.lock()?;
        let flags = conn
            .query_row(
                "SELECT session_id, goal_reached, two_hours_extra
                 FROM fasting_flags WHERE session_id = ?1",
                params![session_id],
                |row| {
                    Ok(FastingFlags {
                        session_id: row.get(0)?,
                        goal_reached: row.get(1)?,
                        two_hours_extra: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(flags.unwrap_or_else(|| FastingFlags::new(session_id)))
    }

    async fn save_fasting_flags(&self, flags: &FastingFlags) -> StoreResult<()> {
        self.conn.lock()?.execute(
            "INSERT OR REPLACE INTO fasting_flags (session_id, goal_reached, two_hours_extra)
             VALUES (?1, ?2, ?3)",
            params![flags.session_id, flags.goal_reached, flags.two_hours_extra],
        )?;
        Ok(())
    }

    async fn push_notification(&self, record: &NotificationRecord) -> StoreResult<()> {
        self.conn.lock()?.execute(
            "INSERT INTO notifications (id, kind, minutes_offset, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.kind.as_str(),
                record.minutes_offset,
                record.message,
                fmt_ts(record.created_at),
            ],
        )?;
        Ok(())
    }

    async fn list_notifications(&self, limit: usize) -> StoreResult<Vec<NotificationRecord>> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, minutes_offset, message, created_at
             FROM notifications ORDER BY created_at DESC, rowid DESC LIMIT ?1",
        )?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(params![limit], |row| {
            let raw_kind: String = row.get(1)?;
            let kind = NotificationKind::from_str_opt(&raw_kind).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    1,
                    Type::Text,
                    format!("unknown notification kind '{raw_kind}'").into(),
                )
            })?;
            Ok(NotificationRecord {
                id: row.get(0)?,
                kind,
                minutes_offset: row.get(2)?,
                message: row.get(3)?,
                created_at: ts(row, 4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

fn fmt_ts(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(idx, &raw)
}

fn opt_ts(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| parse_ts(idx, &r)).transpose()
}

fn parse_ts(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn preset_from_row(row: &Row<'_>) -> rusqlite::Result<FastingPreset> {
    Ok(FastingPreset {
        id: row.get(0)?,
        name: row.get(1)?,
        duration_minutes: row.get(2)?,
    })
}

fn session_from_row(row: &Row<'_>) -> rusqlite::Result<FastingSession> {
    Ok(FastingSession {
        id: row.get(0)?,
        start_time: ts(row, 1)?,
        end_time: opt_ts(row, 2)?,
        goal_minutes: row.get(3)?,
        preset_name: row.get(4)?,
        stopped_early: row.get(5)?,
        eating_window_minutes: row.get(6)?,
    })
}

fn window_from_row(row: &Row<'_>) -> rusqlite::Result<EatingWindow> {
    Ok(EatingWindow {
        id: row.get(0)?,
        start_time: ts(row, 1)?,
        end_time: opt_ts(row, 2)?,
        expected_duration_minutes: row.get(3)?,
        next_fast_due_time: ts(row, 4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn session_roundtrip_and_close() {
        let store = SqliteStore::open_memory().unwrap();
        let preset = FastingPreset::new("16:8", 960);
        let session = FastingSession::start(&preset, t0());
        store.create_session(&session).await.unwrap();

        assert_eq!(store.active_session().await.unwrap(), Some(session.clone()));

        let end = t0() + Duration::minutes(500);
        let closed = store
            .update_session(&session.id, &SessionPatch::close(end, true))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(closed.end_time, Some(end));
        assert!(closed.stopped_early);
        assert!(store.active_session().await.unwrap().is_none());
        assert_eq!(store.get_session(&session.id).await.unwrap(), Some(closed));
    }

    #[tokio::test]
    async fn active_window_is_latest_open() {
        let store = SqliteStore::open_memory().unwrap();
        let a = EatingWindow::open(t0(), 480);
        let b = EatingWindow::open(t0() + Duration::milliseconds(1500), 480);
        store.create_eating_window(&b).await.unwrap();
        store.create_eating_window(&a).await.unwrap();

        let active = store.active_eating_window().await.unwrap().unwrap();
        assert_eq!(active.id, b.id);
        assert_eq!(active.start_time, b.start_time);
    }

    #[tokio::test]
    async fn notification_state_persists_through_kv() {
        let store = SqliteStore::open_memory().unwrap();
        assert_eq!(
            store.notification_state().await.unwrap(),
            NotificationState::default()
        );

        let mut state = NotificationState::for_window("w1");
        state.milestones[0].mark(t0(), false);
        store.save_notification_state(&state).await.unwrap();
        assert_eq!(store.notification_state().await.unwrap(), state);
    }

    #[tokio::test]
    async fn flags_default_then_persist() {
        let store = SqliteStore::open_memory().unwrap();
        let mut flags = store.fasting_flags("s1").await.unwrap();
        assert!(!flags.goal_reached);
        flags.goal_reached = true;
        store.save_fasting_flags(&flags).await.unwrap();
        assert!(store.fasting_flags("s1").await.unwrap().goal_reached);
    }

    #[tokio::test]
    async fn inbox_lists_newest_first() {
        let store = SqliteStore::open_memory().unwrap();
        for (i, kind) in [NotificationKind::OneHourLeft, NotificationKind::WindowEnded]
            .into_iter()
            .enumerate()
        {
            let record = NotificationRecord::new(kind, 0, t0() + Duration::minutes(i as i64));
            store.push_notification(&record).await.unwrap();
        }
        let inbox = store.list_notifications(1).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::WindowEnded);
    }

    #[test]
    fn kv_store() {
        let store = SqliteStore::open_memory().unwrap();
        assert!(store.kv_get("test").unwrap().is_none());
        store.kv_set("test", "hello").unwrap();
        assert_eq!(store.kv_get("test").unwrap().unwrap(), "hello");
    }
}
