//! In-memory store for tests and dry runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{most_recent_open, FastingStore, StoreResult};
use crate::fasting::{
    EatingWindow, EatingWindowPatch, FastingPreset, FastingSession, PresetPatch, SessionPatch,
};
use crate::notify::NotificationRecord;
use crate::scheduler::{FastingFlags, NotificationState};

#[derive(Default)]
struct Inner {
    presets: Vec<FastingPreset>,
    sessions: Vec<FastingSession>,
    windows: Vec<EatingWindow>,
    notification_state: NotificationState,
    flags: HashMap<String, FastingFlags>,
    inbox: Vec<NotificationRecord>,
    writes: usize,
}

/// Records live in insertion order behind a single mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of mutating calls so far.
    pub fn write_count(&self) -> usize {
        self.inner.lock().map(|g| g.writes).unwrap_or(0)
    }
}

#[async_trait]
impl FastingStore for MemoryStore {
    async fn list_presets(&self) -> StoreResult<Vec<FastingPreset>> {
        Ok(self.inner.lock()?.presets.clone())
    }

    async fn get_preset(&self, id: &str) -> StoreResult<Option<FastingPreset>> {
        let guard = self.inner.lock()?;
        Ok(guard.presets.iter().find(|p| p.id == id).cloned())
    }

    async fn create_preset(&self, preset: &FastingPreset) -> StoreResult<()> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        guard.presets.retain(|p| p.id != preset.id);
        guard.presets.push(preset.clone());
        Ok(())
    }

    async fn update_preset(
        &self,
        id: &str,
        patch: &PresetPatch,
    ) -> StoreResult<Option<FastingPreset>> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        Ok(guard.presets.iter_mut().find(|p| p.id == id).map(|p| {
            patch.apply(p);
            p.clone()
        }))
    }

    async fn delete_preset(&self, id: &str) -> StoreResult<bool> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        let before = guard.presets.len();
        guard.presets.retain(|p| p.id != id);
        Ok(guard.presets.len() != before)
    }

    async fn list_sessions(&self) -> StoreResult<Vec<FastingSession>> {
        Ok(self.inner.lock()?.sessions.clone())
    }

    async fn get_session(&self, id: &str) -> StoreResult<Option<FastingSession>> {
        let guard = self.inner.lock()?;
        Ok(guard.sessions.iter().find(|s| s.id == id).cloned())
    }

    async fn create_session(&self, session: &FastingSession) -> StoreResult<()> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        guard.sessions.retain(|s| s.id != session.id);
        guard.sessions.push(session.clone());
        Ok(())
    }

    async fn update_session(
        &self,
        id: &str,
        patch: &SessionPatch,
    ) -> StoreResult<Option<FastingSession>> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        Ok(guard.sessions.iter_mut().find(|s| s.id == id).map(|s| {
            patch.apply(s);
            s.clone()
        }))
    }

    async fn delete_session(&self, id: &str) -> StoreResult<bool> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        let before = guard.sessions.len();
        guard.sessions.retain(|s| s.id != id);
        guard.flags.remove(id);
        Ok(guard.sessions.len() != before)
    }

    async fn active_session(&self) -> StoreResult<Option<FastingSession>> {
        let guard = self.inner.lock()?;
        Ok(most_recent_open(&guard.sessions, |s| (s.start_time, s.is_active())).cloned())
    }

    async fn list_eating_windows(&self) -> StoreResult<Vec<EatingWindow>> {
        Ok(self.inner.lock()?.windows.clone())
    }

    async fn get_eating_window(&self, id: &str) -> StoreResult<Option<EatingWindow>> {
        let guard = self.inner.lock()?;
        Ok(guard.windows.iter().find(|w| w.id == id).cloned())
    }

    async fn create_eating_window(&self, window: &EatingWindow) -> StoreResult<()> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        guard.windows.retain(|w| w.id != window.id);
        guard.windows.push(window.clone());
        Ok(())
    }

    async fn update_eating_window(
        &self,
        id: &str,
        patch: &EatingWindowPatch,
    ) -> StoreResult<Option<EatingWindow>> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        Ok(guard.windows.iter_mut().find(|w| w.id == id).map(|w| {
            patch.apply(w);
            w.clone()
        }))
    }

    async fn delete_eating_window(&self, id: &str) -> StoreResult<bool> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        let before = guard.windows.len();
        guard.windows.retain(|w| w.id != id);
        Ok(guard.windows.len() != before)
    }

    async fn active_eating_window(&self) -> StoreResult<Option<EatingWindow>> {
        let guard = self.inner.lock()?;
        Ok(most_recent_open(&guard.windows, |w| (w.start_time, w.is_active())).cloned())
    }

    async fn notification_state(&self) -> StoreResult<NotificationState> {
        Ok(self.inner.lock()?.notification_state.clone())
    }

    async fn save_notification_state(&self, state: &NotificationState) -> StoreResult<()> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        guard.notification_state = state.clone();
        Ok(())
    }

    async fn fasting_flags(&self, session_id: &str) -> StoreResult<FastingFlags> {
        let guard = self.inner.lock()?;
        Ok(guard
            .flags
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| FastingFlags::new(session_id)))
    }

    async fn save_fasting_flags(&self, flags: &FastingFlags) -> StoreResult<()> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        guard.flags.insert(flags.session_id.clone(), flags.clone());
        Ok(())
    }

    async fn push_notification(&self, record: &NotificationRecord) -> StoreResult<()> {
        let mut guard = self.inner.lock()?;
        guard.writes += 1;
        guard.inbox.push(record.clone());
        Ok(())
    }

    async fn list_notifications(&self, limit: usize) -> StoreResult<Vec<NotificationRecord>> {
        let guard = self.inner.lock()?;
        Ok(guard.inbox.iter().rev().take(limit).cloned().collect())
    }
}
