//! Local-first store mirrored to a remote HTTP backend.
//!
//! The wrapped local store is authoritative: reads never leave it, and a
//! write is complete once the local write succeeds. Each successful write
//! is then pushed to the remote as `PUT {base}/{collection}/{id}` (or
//! `DELETE`). Remote failures are logged and swallowed.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{FastingStore, StoreResult, SyncConfig};
use crate::error::StoreError;
use crate::fasting::{
    EatingWindow, EatingWindowPatch, FastingPreset, FastingSession, PresetPatch, SessionPatch,
};
use crate::notify::NotificationRecord;
use crate::scheduler::{FastingFlags, NotificationState};

const PRESETS: &str = "presets";
const SESSIONS: &str = "sessions";
const EATING_WINDOWS: &str = "eating_windows";
const NOTIFICATION_STATE: &str = "notification_state";
const FASTING_FLAGS: &str = "fasting_flags";
const NOTIFICATIONS: &str = "notifications";

/// HTTP client for the remote record backend.
pub struct RemoteMirror {
    client: Client,
    base_url: String,
}

impl RemoteMirror {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &SyncConfig) -> StoreResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, collection: &str, id: &str) -> String {
        format!("{}/{}/{}", self.base_url, collection, id)
    }

    pub async fn put<T: Serialize + Sync>(
        &self,
        collection: &str,
        id: &str,
        record: &T,
    ) -> StoreResult<()> {
        let resp = self
            .client
            .put(self.url(collection, id))
            .json(record)
            .send()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        check_status(resp.status())
    }

    pub async fn delete(&self, collection: &str, id: &str) -> StoreResult<()> {
        let resp = self
            .client
            .delete(self.url(collection, id))
            .send()
            .await
            .map_err(|e| StoreError::Remote(e.to_string()))?;
        // Already gone remotely is as good as deleted.
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_status(resp.status())
    }
}

fn check_status(status: reqwest::StatusCode) -> StoreResult<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(StoreError::Remote(format!("HTTP {status}")))
    }
}

/// Wraps a local store and mirrors every write to a [`RemoteMirror`].
pub struct SyncedStore<S> {
    local: S,
    remote: RemoteMirror,
}

impl<S: FastingStore> SyncedStore<S> {
    pub fn new(local: S, remote: RemoteMirror) -> Self {
        Self { local, remote }
    }

    pub fn local(&self) -> &S {
        &self.local
    }

    async fn push<T: Serialize + Sync>(&self, collection: &str, id: &str, record: &T) {
        if let Err(e) = self.remote.put(collection, id, record).await {
            tracing::warn!(collection, id, error = %e, "remote sync failed; keeping local copy");
        }
    }

    async fn remove(&self, collection: &str, id: &str) {
        if let Err(e) = self.remote.delete(collection, id).await {
            tracing::warn!(collection, id, error = %e, "remote delete failed; keeping local state");
        }
    }
}

#[async_trait]
impl<S: FastingStore> FastingStore for SyncedStore<S> {
    async fn list_presets(&self) -> StoreResult<Vec<FastingPreset>> {
        self.local.list_presets().await
    }

    async fn get_preset(&self, id: &str) -> StoreResult<Option<FastingPreset>> {
        self.local.get_preset(id).await
    }

    async fn create_preset(&self, preset: &FastingPreset) -> StoreResult<()> {
        self.local.create_preset(preset).await?;
        self.push(PRESETS, &preset.id, preset).await;
        Ok(())
    }

    async fn update_preset(
        &self,
        id: &str,
        patch: &PresetPatch,
    ) -> StoreResult<Option<FastingPreset>> {
        let updated = self.local.update_preset(id, patch).await?;
        if let Some(ref preset) = updated {
            self.push(PRESETS, &preset.id, preset).await;
        }
        Ok(updated)
    }

    async fn delete_preset(&self, id: &str) -> StoreResult<bool> {
        let removed = self.local.delete_preset(id).await?;
        if removed {
            self.remove(PRESETS, id).await;
        }
        Ok(removed)
    }

    async fn list_sessions(&self) -> StoreResult<Vec<FastingSession>> {
        self.local.list_sessions().await
    }

    async fn get_session(&self, id: &str) -> StoreResult<Option<FastingSession>> {
        self.local.get_session(id).await
    }

    async fn create_session(&self, session: &FastingSession) -> StoreResult<()> {
        self.local.create_session(session).await?;
        self.push(SESSIONS, &session.id, session).await;
        Ok(())
    }

    async fn update_session(
        &self,
        id: &str,
        patch: &SessionPatch,
    ) -> StoreResult<Option<FastingSession>> {
        let updated = self.local.update_session(id, patch).await?;
        if let Some(ref session) = updated {
            self.push(SESSIONS, &session.id, session).await;
        }
        Ok(updated)
    }

    async fn delete_session(&self, id: &str) -> StoreResult<bool> {
        let removed = self.local.delete_session(id).await?;
        if removed {
            self.remove(SESSIONS, id).await;
        }
        Ok(removed)
    }

    async fn active_session(&self) -> StoreResult<Option<FastingSession>> {
        self.local.active_session().await
    }

    async fn list_eating_windows(&self) -> StoreResult<Vec<EatingWindow>> {
        self.local.list_eating_windows().await
    }

    async fn get_eating_window(&self, id: &str) -> StoreResult<Option<EatingWindow>> {
        self.local.get_eating_window(id).await
    }

    async fn create_eating_window(&self, window: &EatingWindow) -> StoreResult<()> {
        self.local.create_eating_window(window).await?;
        self.push(EATING_WINDOWS, &window.id, window).await;
        Ok(())
    }

    async fn update_eating_window(
        &self,
        id: &str,
        patch: &EatingWindowPatch,
    ) -> StoreResult<Option<EatingWindow>> {
        let updated = self.local.update_eating_window(id, patch).await?;
        if let Some(ref window) = updated {
            self.push(EATING_WINDOWS, &window.id, window).await;
        }
        Ok(updated)
    }

    async fn delete_eating_window(&self, id: &str) -> StoreResult<bool> {
        let removed = self.local.delete_eating_window(id).await?;
        if removed {
            self.remove(EATING_WINDOWS, id).await;
        }
        Ok(removed)
    }

    async fn active_eating_window(&self) -> StoreResult<Option<EatingWindow>> {
        self.local.active_eating_window().await
    }

    async fn notification_state(&self) -> StoreResult<NotificationState> {
        self.local.notification_state().await
    }

    async fn save_notification_state(&self, state: &NotificationState) -> StoreResult<()> {
        self.local.save_notification_state(state).await?;
        self.push(NOTIFICATION_STATE, "current", state).await;
        Ok(())
    }

    async fn fasting_flags(&self, session_id: &str) -> StoreResult<FastingFlags> {
        self.local.fasting_flags(session_id).await
    }

    async fn save_fasting_flags(&self, flags: &FastingFlags) -> StoreResult<()> {
        self.local.save_fasting_flags(flags).await?;
        self.push(FASTING_FLAGS, &flags.session_id, flags).await;
        Ok(())
    }

    async fn push_notification(&self, record: &NotificationRecord) -> StoreResult<()> {
        self.local.push_notification(record).await?;
        self.push(NOTIFICATIONS, &record.id, record).await;
        Ok(())
    }

    async fn list_notifications(&self, limit: usize) -> StoreResult<Vec<NotificationRecord>> {
        self.local.list_notifications(limit).await
    }
}
