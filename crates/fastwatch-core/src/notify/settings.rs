//! User-facing switches for each reminder.

use serde::{Deserialize, Serialize};

use super::{ChannelKind, NotificationKind};

/// Eating-window countdown reminders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EatingWindowReminders {
    #[serde(default = "default_true")]
    pub two_hours: bool,
    #[serde(default = "default_true")]
    pub one_hour: bool,
    #[serde(default = "default_true")]
    pub thirty_minutes: bool,
    #[serde(default = "default_true")]
    pub window_ending: bool,
}

/// Escalating reminders once the next fast is late.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverdueReminders {
    #[serde(default = "default_true")]
    pub fifteen_minutes: bool,
    #[serde(default = "default_true")]
    pub thirty_minutes: bool,
    #[serde(default = "default_true")]
    pub one_hour: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FastingMilestoneToggles {
    #[serde(default = "default_true")]
    pub goal_reached: bool,
    #[serde(default = "default_true")]
    pub two_hours_extra: bool,
}

/// Notification configuration.
///
/// A disabled leaf suppresses its milestone at evaluation time; it is not
/// removed from the milestone set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub local_notifications: bool,
    #[serde(default)]
    pub telegram_notifications: bool,
    #[serde(default)]
    pub eating_window_reminders: EatingWindowReminders,
    #[serde(default)]
    pub overdue_reminders: OverdueReminders,
    #[serde(default)]
    pub fasting_milestones: FastingMilestoneToggles,
}

fn default_true() -> bool {
    true
}

impl Default for EatingWindowReminders {
    fn default() -> Self {
        Self {
            two_hours: true,
            one_hour: true,
            thirty_minutes: true,
            window_ending: true,
        }
    }
}

impl Default for OverdueReminders {
    fn default() -> Self {
        Self {
            fifteen_minutes: true,
            thirty_minutes: true,
            one_hour: true,
        }
    }
}

impl Default for FastingMilestoneToggles {
    fn default() -> Self {
        Self {
            goal_reached: true,
            two_hours_extra: true,
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            local_notifications: true,
            telegram_notifications: false,
            eating_window_reminders: EatingWindowReminders::default(),
            overdue_reminders: OverdueReminders::default(),
            fasting_milestones: FastingMilestoneToggles::default(),
        }
    }
}

impl NotificationSettings {
    /// Whether this milestone kind may be sent at all.
    pub fn allows_kind(&self, kind: NotificationKind) -> bool {
        if !self.enabled {
            return false;
        }
        match kind {
            NotificationKind::TwoHoursLeft => self.eating_window_reminders.two_hours,
            NotificationKind::OneHourLeft => self.eating_window_reminders.one_hour,
            NotificationKind::ThirtyMinutesLeft => self.eating_window_reminders.thirty_minutes,
            NotificationKind::WindowEnded => self.eating_window_reminders.window_ending,
            NotificationKind::Overdue15 => self.overdue_reminders.fifteen_minutes,
            NotificationKind::Overdue30 => self.overdue_reminders.thirty_minutes,
            NotificationKind::Overdue60 => self.overdue_reminders.one_hour,
            NotificationKind::GoalReached => self.fasting_milestones.goal_reached,
            NotificationKind::TwoHoursExtra => self.fasting_milestones.two_hours_extra,
        }
    }

    pub fn allows_channel(&self, channel: ChannelKind) -> bool {
        self.enabled
            && match channel {
                ChannelKind::Local => self.local_notifications,
                ChannelKind::Telegram => self.telegram_notifications,
            }
    }
}
