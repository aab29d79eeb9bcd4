//! Notification kinds and delivery channels.
//!
//! Every channel implements [`NotificationChannel`]. The scheduler hands a
//! fired milestone to [`dispatch`], which sends on all channels at once and
//! only reports the outcomes; nothing is retried.

pub mod local;
mod settings;
pub mod telegram;

pub use local::LocalNotifier;
pub use settings::{
    EatingWindowReminders, FastingMilestoneToggles, NotificationSettings, OverdueReminders,
};
pub use telegram::TelegramNotifier;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};

use crate::error::NotifyError;

/// Every reminder the scheduler can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    TwoHoursLeft,
    OneHourLeft,
    ThirtyMinutesLeft,
    WindowEnded,
    #[serde(rename = "overdue_15")]
    Overdue15,
    #[serde(rename = "overdue_30")]
    Overdue30,
    #[serde(rename = "overdue_60")]
    Overdue60,
    GoalReached,
    TwoHoursExtra,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 9] = [
        NotificationKind::TwoHoursLeft,
        NotificationKind::OneHourLeft,
        NotificationKind::ThirtyMinutesLeft,
        NotificationKind::WindowEnded,
        NotificationKind::Overdue15,
        NotificationKind::Overdue30,
        NotificationKind::Overdue60,
        NotificationKind::GoalReached,
        NotificationKind::TwoHoursExtra,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationKind::TwoHoursLeft => "two_hours_left",
            NotificationKind::OneHourLeft => "one_hour_left",
            NotificationKind::ThirtyMinutesLeft => "thirty_minutes_left",
            NotificationKind::WindowEnded => "window_ended",
            NotificationKind::Overdue15 => "overdue_15",
            NotificationKind::Overdue30 => "overdue_30",
            NotificationKind::Overdue60 => "overdue_60",
            NotificationKind::GoalReached => "goal_reached",
            NotificationKind::TwoHoursExtra => "two_hours_extra",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "two_hours_left" => Some(NotificationKind::TwoHoursLeft),
            "one_hour_left" => Some(NotificationKind::OneHourLeft),
            "thirty_minutes_left" => Some(NotificationKind::ThirtyMinutesLeft),
            "window_ended" => Some(NotificationKind::WindowEnded),
            "overdue_15" => Some(NotificationKind::Overdue15),
            "overdue_30" => Some(NotificationKind::Overdue30),
            "overdue_60" => Some(NotificationKind::Overdue60),
            "goal_reached" => Some(NotificationKind::GoalReached),
            "two_hours_extra" => Some(NotificationKind::TwoHoursExtra),
            _ => None,
        }
    }

    /// Human-readable text. `minutes_offset` is minutes until the deadline
    /// for eating-window kinds and minutes past the goal for fasting kinds.
    pub fn message(self, minutes_offset: i64) -> String {
        match self {
            NotificationKind::TwoHoursLeft
            | NotificationKind::OneHourLeft
            | NotificationKind::ThirtyMinutesLeft => format!(
                "Your eating window closes in {}. Plan your last meal.",
                human_minutes(minutes_offset)
            ),
            NotificationKind::WindowEnded => {
                "Your eating window has ended. Time to start your next fast.".to_string()
            }
            NotificationKind::Overdue15
            | NotificationKind::Overdue30
            | NotificationKind::Overdue60 => format!(
                "Your next fast is {} overdue. Start it when you can.",
                human_minutes(minutes_offset.abs())
            ),
            NotificationKind::GoalReached => {
                "Fasting goal reached! Break your fast whenever you are ready.".to_string()
            }
            NotificationKind::TwoHoursExtra => format!(
                "You have fasted {} past your goal.",
                human_minutes(minutes_offset)
            ),
        }
    }
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thin wrapper around the OS keyring for credential storage.
pub mod keyring_store {
    use crate::error::NotifyError;

    const SERVICE: &str = "fastwatch";

    pub fn get(key: &str) -> Result<Option<String>, NotifyError> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.get_password() {
            Ok(pw) => Ok(Some(pw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn set(key: &str, value: &str) -> Result<(), NotifyError> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        entry.set_password(value)?;
        Ok(())
    }

    pub fn delete(key: &str) -> Result<(), NotifyError> {
        let entry = keyring::Entry::new(SERVICE, key)?;
        match entry.delete_credential() {
            Ok(()) => Ok(()),
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn human_minutes(minutes: i64) -> String {
    let minutes = minutes.max(0);
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

/// Which delivery path a channel represents. Gated separately in settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Local,
    Telegram,
}

impl ChannelKind {
    pub fn name(self) -> &'static str {
        match self {
            ChannelKind::Local => "local",
            ChannelKind::Telegram => "telegram",
        }
    }
}

/// One entry in the on-device notification inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub id: String,
    pub kind: NotificationKind,
    pub minutes_offset: i64,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl NotificationRecord {
    pub fn new(kind: NotificationKind, minutes_offset: i64, created_at: DateTime<Utc>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            minutes_offset,
            message: kind.message(minutes_offset),
            created_at,
        }
    }
}

/// A fire-and-forget delivery path.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Deliver one notification. `Ok` means the channel accepted it.
    async fn send(&self, record: &NotificationRecord) -> Result<(), NotifyError>;
}

/// Result of one channel send, kept only for logging and tick reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChannelOutcome {
    pub channel: ChannelKind,
    pub delivered: bool,
}

/// Send on every channel concurrently. A failing channel does not affect
/// the others. Every channel gets the same record, stamped `at`.
pub async fn dispatch(
    channels: &[Arc<dyn NotificationChannel>],
    kind: NotificationKind,
    minutes_offset: i64,
    at: DateTime<Utc>,
) -> Vec<ChannelOutcome> {
    let record = NotificationRecord::new(kind, minutes_offset, at);
    let record = &record;
    let sends = channels.iter().map(|channel| async move {
        let result = channel.send(record).await;
        if let Err(ref e) = result {
            tracing::warn!(
                channel = channel.kind().name(),
                kind = %kind,
                error = %e,
                "notification delivery failed"
            );
        }
        ChannelOutcome {
            channel: channel.kind(),
            delivered: result.is_ok(),
        }
    });
    join_all(sends).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_roundtrip() {
        for kind in NotificationKind::ALL {
            assert_eq!(NotificationKind::from_str_opt(kind.as_str()), Some(kind));
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::Value::String(kind.as_str().to_string())
            );
            let parsed: NotificationKind =
                serde_json::from_value(serde_json::Value::String(kind.as_str().into())).unwrap();
            assert_eq!(parsed, kind);
        }
        assert_eq!(NotificationKind::from_str_opt("bogus"), None);
    }

    #[test]
    fn messages_render_offsets() {
        assert_eq!(
            NotificationKind::OneHourLeft.message(60),
            "Your eating window closes in 1h. Plan your last meal."
        );
        assert!(NotificationKind::Overdue30.message(-31).contains("31m overdue"));
        assert!(NotificationKind::TwoHoursExtra.message(125).contains("2h 5m"));
    }

    struct Unreachable;

    #[async_trait]
    impl NotificationChannel for Unreachable {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Telegram
        }

        async fn send(&self, _record: &NotificationRecord) -> Result<(), NotifyError> {
            Err(NotifyError::Http {
                status: 502,
                body: "bad gateway".into(),
            })
        }
    }

    #[tokio::test]
    async fn failing_channel_does_not_block_others() {
        use crate::storage::{FastingStore, MemoryStore};
        use chrono::TimeZone;

        let store: Arc<dyn FastingStore> = Arc::new(MemoryStore::new());
        let channels: Vec<Arc<dyn NotificationChannel>> = vec![
            Arc::new(Unreachable),
            Arc::new(LocalNotifier::new(store.clone())),
        ];
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();

        let outcomes = dispatch(&channels, NotificationKind::Overdue30, -30, at).await;
        let delivered: Vec<_> = outcomes.iter().map(|o| o.delivered).collect();
        assert_eq!(delivered, vec![false, true]);
        assert_eq!(outcomes[0].channel, ChannelKind::Telegram);

        let inbox = store.list_notifications(10).await.unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::Overdue30);
        assert_eq!(inbox[0].created_at, at);
    }
}
