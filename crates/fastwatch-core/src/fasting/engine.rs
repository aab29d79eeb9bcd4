//! Fasting engine implementation.
//!
//! The engine owns the session/eating-window lifecycle. It keeps no state
//! of its own: every command reads the active records from the store, and
//! every query derives its answer from those records and the `now` passed
//! in by the caller.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = FastingEngine::new(store);
//! let session = engine.start_fast(&preset.id, Utc::now()).await?;
//! let state = engine.current_state(Utc::now()).await?;
//! let closed = engine.stop_fast(Utc::now()).await?;
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};

use super::duration::elapsed_minutes;
use super::model::{
    EatingWindow, EatingWindowPatch, FastingPreset, FastingSession, PresetPatch, SessionPatch,
};
use super::state::{derive_state, CurrentState};
use crate::error::FastingError;
use crate::storage::FastingStore;

pub type FastingResult<T> = Result<T, FastingError>;

/// Core fasting state machine over a [`FastingStore`].
#[derive(Clone)]
pub struct FastingEngine {
    store: Arc<dyn FastingStore>,
}

impl FastingEngine {
    pub fn new(store: Arc<dyn FastingStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn FastingStore> {
        &self.store
    }

    // ── Queries ──────────────────────────────────────────────────────

    /// Derive the current state. Never cached.
    pub async fn current_state(&self, now: DateTime<Utc>) -> FastingResult<CurrentState> {
        let session = self.store.active_session().await?;
        let window = if session.is_some() {
            None
        } else {
            self.store.active_eating_window().await?
        };
        Ok(derive_state(session, window, now))
    }

    /// Closed sessions, newest first.
    pub async fn session_history(&self) -> FastingResult<Vec<FastingSession>> {
        let mut sessions: Vec<_> = self
            .store
            .list_sessions()
            .await?
            .into_iter()
            .filter(|s| !s.is_active())
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    /// Closed eating windows, newest first.
    pub async fn eating_window_history(&self) -> FastingResult<Vec<EatingWindow>> {
        let mut windows: Vec<_> = self
            .store
            .list_eating_windows()
            .await?
            .into_iter()
            .filter(|w| !w.is_active())
            .collect();
        windows.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(windows)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Begin a fast from a preset.
    ///
    /// Closes the active eating window first, if any.
    ///
    /// # Errors
    /// `PresetNotFound` for an unknown preset, `SessionAlreadyActive` when a
    /// fast is already running. Neither case writes anything.
    pub async fn start_fast(
        &self,
        preset_id: &str,
        now: DateTime<Utc>,
    ) -> FastingResult<FastingSession> {
        let preset = self
            .store
            .get_preset(preset_id)
            .await?
            .ok_or_else(|| FastingError::PresetNotFound(preset_id.to_string()))?;

        if let Some(active) = self.store.active_session().await? {
            return Err(FastingError::SessionAlreadyActive {
                session_id: active.id,
                started_at: active.start_time,
            });
        }

        if let Some(window) = self.store.active_eating_window().await? {
            self.store
                .update_eating_window(&window.id, &EatingWindowPatch::close(now))
                .await?;
            tracing::debug!(window_id = %window.id, "closed eating window on fast start");
        }

        let session = FastingSession::start(&preset, now);
        self.store.create_session(&session).await?;
        tracing::info!(
            session_id = %session.id,
            preset = %session.preset_name,
            goal_minutes = session.goal_minutes,
            "fast started"
        );
        Ok(session)
    }

    /// End the active fast and open the following eating window.
    ///
    /// Returns `None` without touching the store when nothing is active.
    pub async fn stop_fast(&self, now: DateTime<Utc>) -> FastingResult<Option<FastingSession>> {
        let Some(session) = self.store.active_session().await? else {
            return Ok(None);
        };

        let elapsed = elapsed_minutes(&session, now);
        let stopped_early = elapsed < i64::from(session.goal_minutes);
        let closed = self
            .store
            .update_session(&session.id, &SessionPatch::close(now, stopped_early))
            .await?
            .ok_or_else(|| FastingError::SessionNotFound(session.id.clone()))?;

        let window = EatingWindow::open(now, closed.eating_window_minutes);
        self.store.create_eating_window(&window).await?;

        tracing::info!(
            session_id = %closed.id,
            elapsed_minutes = elapsed,
            stopped_early,
            next_fast_due = %window.next_fast_due_time,
            "fast stopped"
        );
        Ok(Some(closed))
    }

    /// Close the active eating window without starting a fast.
    pub async fn close_eating_window(
        &self,
        now: DateTime<Utc>,
    ) -> FastingResult<Option<EatingWindow>> {
        let Some(window) = self.store.active_eating_window().await? else {
            return Ok(None);
        };
        let closed = self
            .store
            .update_eating_window(&window.id, &EatingWindowPatch::close(now))
            .await?
            .ok_or_else(|| FastingError::EatingWindowNotFound(window.id.clone()))?;
        Ok(Some(closed))
    }

    // ── Presets ──────────────────────────────────────────────────────

    pub async fn presets(&self) -> FastingResult<Vec<FastingPreset>> {
        Ok(self.store.list_presets().await?)
    }

    /// Seed the default presets into an empty store. Returns how many were added.
    pub async fn seed_default_presets(&self) -> FastingResult<usize> {
        if !self.store.list_presets().await?.is_empty() {
            return Ok(0);
        }
        let defaults = FastingPreset::defaults();
        for preset in &defaults {
            self.store.create_preset(preset).await?;
        }
        Ok(defaults.len())
    }

    /// Look a preset up by id, falling back to a case-insensitive name match.
    pub async fn resolve_preset(&self, id_or_name: &str) -> FastingResult<FastingPreset> {
        if let Some(preset) = self.store.get_preset(id_or_name).await? {
            return Ok(preset);
        }
        self.store
            .list_presets()
            .await?
            .into_iter()
            .find(|p| p.name.eq_ignore_ascii_case(id_or_name))
            .ok_or_else(|| FastingError::PresetNotFound(id_or_name.to_string()))
    }

    pub async fn create_preset(
        &self,
        name: &str,
        duration_minutes: u32,
    ) -> FastingResult<FastingPreset> {
        validate_preset(Some(name), Some(duration_minutes))?;
        let preset = FastingPreset::new(name.trim(), duration_minutes);
        self.store.create_preset(&preset).await?;
        Ok(preset)
    }

    pub async fn update_preset(
        &self,
        id: &str,
        patch: PresetPatch,
    ) -> FastingResult<FastingPreset> {
        validate_preset(patch.name.as_deref(), patch.duration_minutes)?;
        let patch = PresetPatch {
            name: patch.name.map(|n| n.trim().to_string()),
            ..patch
        };
        self.store
            .update_preset(id, &patch)
            .await?
            .ok_or_else(|| FastingError::PresetNotFound(id.to_string()))
    }

    /// Sessions keep their copied name/goal, so deleting a preset is safe.
    pub async fn delete_preset(&self, id: &str) -> FastingResult<()> {
        if self.store.delete_preset(id).await? {
            Ok(())
        } else {
            Err(FastingError::PresetNotFound(id.to_string()))
        }
    }
}

fn validate_preset(name: Option<&str>, duration_minutes: Option<u32>) -> FastingResult<()> {
    if name.is_some_and(|n| n.trim().is_empty()) {
        return Err(FastingError::InvalidPreset("name must not be empty".into()));
    }
    if duration_minutes == Some(0) {
        return Err(FastingError::InvalidPreset(
            "duration must be at least one minute".into(),
        ));
    }
    Ok(())
}
