//! Fasting records: presets, sessions and eating windows.
//!
//! Timestamps are `DateTime<Utc>` in memory and RFC 3339 on disk/wire.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minutes in the assumed fasting + eating cycle.
pub const CYCLE_MINUTES: u32 = 1440;

/// A named fasting-goal template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastingPreset {
    pub id: String,
    pub name: String,
    pub duration_minutes: u32,
}

impl FastingPreset {
    pub fn new(name: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            duration_minutes,
        }
    }

    /// Eating window that completes a 24h cycle; zero for fasts of a day or more.
    pub fn eating_window_minutes(&self) -> u32 {
        CYCLE_MINUTES.saturating_sub(self.duration_minutes)
    }

    /// Presets seeded into an empty store.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("16:8", 16 * 60),
            Self::new("18:6", 18 * 60),
            Self::new("20:4", 20 * 60),
            Self::new("OMAD", 23 * 60),
        ]
    }
}

/// Partial update for a preset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresetPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<u32>,
}

impl PresetPatch {
    pub fn apply(&self, preset: &mut FastingPreset) {
        if let Some(ref name) = self.name {
            preset.name = name.clone();
        }
        if let Some(minutes) = self.duration_minutes {
            preset.duration_minutes = minutes;
        }
    }
}

/// One fasting attempt. `end_time == None` marks the active fast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastingSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub goal_minutes: u32,
    pub preset_name: String,
    pub stopped_early: bool,
    pub eating_window_minutes: u32,
}

impl FastingSession {
    /// Open a new session from a preset, copying its name and goal by value.
    pub fn start(preset: &FastingPreset, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start_time: now,
            end_time: None,
            goal_minutes: preset.duration_minutes,
            preset_name: preset.name.clone(),
            stopped_early: false,
            eating_window_minutes: preset.eating_window_minutes(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Partial update for a session. Only closing fields are patchable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_early: Option<bool>,
}

impl SessionPatch {
    pub fn close(at: DateTime<Utc>, stopped_early: bool) -> Self {
        Self {
            end_time: Some(at),
            stopped_early: Some(stopped_early),
        }
    }

    pub fn apply(&self, session: &mut FastingSession) {
        if let Some(end) = self.end_time {
            session.end_time = Some(end);
        }
        if let Some(early) = self.stopped_early {
            session.stopped_early = early;
        }
    }
}

/// The period after a fast during which the user eats and must start the
/// next fast by `next_fast_due_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EatingWindow {
    pub id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub expected_duration_minutes: u32,
    pub next_fast_due_time: DateTime<Utc>,
}

impl EatingWindow {
    pub fn open(now: DateTime<Utc>, expected_duration_minutes: u32) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            start_time: now,
            end_time: None,
            expected_duration_minutes,
            next_fast_due_time: now + Duration::minutes(i64::from(expected_duration_minutes)),
        }
    }

    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

/// Partial update for an eating window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EatingWindowPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl EatingWindowPatch {
    pub fn close(at: DateTime<Utc>) -> Self {
        Self { end_time: Some(at) }
    }

    pub fn apply(&self, window: &mut EatingWindow) {
        if let Some(end) = self.end_time {
            window.end_time = Some(end);
        }
    }
}
