//! One-shot reminder milestones and their persisted state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::notify::NotificationKind;

/// Canonical eating-window milestones, in evaluation order.
/// Thresholds are minutes before `next_fast_due_time`; negative means overdue.
pub const EATING_WINDOW_MILESTONES: [(NotificationKind, i64); 7] = [
    (NotificationKind::TwoHoursLeft, 120),
    (NotificationKind::OneHourLeft, 60),
    (NotificationKind::ThirtyMinutesLeft, 30),
    (NotificationKind::WindowEnded, 0),
    (NotificationKind::Overdue15, -15),
    (NotificationKind::Overdue30, -30),
    (NotificationKind::Overdue60, -60),
];

/// Extra fasting time after the goal before the second fasting reminder.
pub const TWO_HOURS_EXTRA_MINUTES: i64 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationMilestone {
    pub kind: NotificationKind,
    pub threshold_minutes: i64,
    pub triggered: bool,
    /// Consumed while disabled in settings; triggered but never sent.
    #[serde(default)]
    pub suppressed: bool,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NotificationMilestone {
    pub fn new(kind: NotificationKind, threshold_minutes: i64) -> Self {
        Self {
            kind,
            threshold_minutes,
            triggered: false,
            suppressed: false,
            timestamp: None,
        }
    }

    /// Due once the remaining minutes reach or pass the threshold.
    pub fn is_due(&self, minutes_remaining: i64) -> bool {
        !self.triggered && minutes_remaining <= self.threshold_minutes
    }

    pub fn mark(&mut self, now: DateTime<Utc>, suppressed: bool) {
        self.triggered = true;
        self.suppressed = suppressed;
        self.timestamp = Some(now);
    }
}

/// Milestone progress for the current eating window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationState {
    pub eating_window_id: Option<String>,
    pub milestones: Vec<NotificationMilestone>,
    pub last_checked: Option<DateTime<Utc>>,
}

impl NotificationState {
    /// Fresh, untriggered milestone set bound to a window.
    pub fn for_window(window_id: impl Into<String>) -> Self {
        Self {
            eating_window_id: Some(window_id.into()),
            milestones: EATING_WINDOW_MILESTONES
                .iter()
                .map(|&(kind, threshold)| NotificationMilestone::new(kind, threshold))
                .collect(),
            last_checked: None,
        }
    }

    /// Bind the state to the active window. Returns true if it was reset.
    pub fn reconcile(&mut self, active_window_id: Option<&str>) -> bool {
        match active_window_id {
            None => {
                let changed = self.eating_window_id.is_some() || !self.milestones.is_empty();
                self.eating_window_id = None;
                self.milestones.clear();
                changed
            }
            Some(id) if self.eating_window_id.as_deref() != Some(id) => {
                let last_checked = self.last_checked;
                *self = Self::for_window(id);
                self.last_checked = last_checked;
                true
            }
            Some(_) => false,
        }
    }
}

/// Fasting-milestone flags for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastingFlags {
    pub session_id: String,
    pub goal_reached: bool,
    pub two_hours_extra: bool,
}

impl FastingFlags {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}
