//! Milestone scheduler.
//!
//! A polling loop that, once per period, re-derives which reminders are due
//! and fires each at most once. Eating-window milestones live in
//! [`NotificationState`], which is bound to one window id and reset when the
//! active window changes. Fasting milestones are tracked per session in
//! [`FastingFlags`].
//!
//! ## Tick order
//!
//! 1. Reconcile the state with the active eating window.
//! 2. Fire due eating-window milestones in canonical order.
//! 3. Persist the eating-window state.
//! 4. Fire due fasting milestones for the active session and save its flags.

mod milestone;

pub use milestone::{
    FastingFlags, NotificationMilestone, NotificationState, EATING_WINDOW_MILESTONES,
    TWO_HOURS_EXTRA_MINUTES,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::SchedulerError;
use crate::fasting::{elapsed_minutes, minutes_until_due};
use crate::notify::{
    dispatch, ChannelOutcome, NotificationChannel, NotificationKind, NotificationSettings,
};
use crate::storage::FastingStore;

/// Default polling period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(60);

/// One milestone consumed during a tick.
#[derive(Debug, Clone, Serialize)]
pub struct FiredMilestone {
    pub kind: NotificationKind,
    pub minutes_offset: i64,
    /// Disabled in settings: consumed without sending.
    pub suppressed: bool,
    pub outcomes: Vec<ChannelOutcome>,
}

/// What a single tick did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TickReport {
    pub eating_window_id: Option<String>,
    pub session_id: Option<String>,
    pub state_reset: bool,
    pub fired: Vec<FiredMilestone>,
}

pub struct MilestoneScheduler {
    store: Arc<dyn FastingStore>,
    channels: Vec<Arc<dyn NotificationChannel>>,
    settings: RwLock<NotificationSettings>,
    running: AtomicBool,
}

impl MilestoneScheduler {
    pub fn new(
        store: Arc<dyn FastingStore>,
        channels: Vec<Arc<dyn NotificationChannel>>,
        settings: NotificationSettings,
    ) -> Self {
        Self {
            store,
            channels,
            settings: RwLock::new(settings),
            running: AtomicBool::new(false),
        }
    }

    /// Replace the settings used by future ticks. Already-consumed
    /// milestones are not revisited.
    pub fn update_settings(&self, settings: NotificationSettings) {
        match self.settings.write() {
            Ok(mut guard) => *guard = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    pub fn settings(&self) -> NotificationSettings {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run one evaluation pass at `now`.
    ///
    /// # Errors
    /// Returns an error only for store failures; channel failures are logged.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, SchedulerError> {
        let settings = self.settings();
        let mut report = TickReport::default();

        // 1. Reconcile window identity.
        let window = self.store.active_eating_window().await?;
        let mut state = self.store.notification_state().await?;
        report.state_reset = state.reconcile(window.as_ref().map(|w| w.id.as_str()));
        if report.state_reset {
            tracing::debug!(window_id = ?state.eating_window_id, "notification state reset");
        }

        // 2. Eating-window milestones.
        if let Some(ref window) = window {
            report.eating_window_id = Some(window.id.clone());
            let minutes_remaining = minutes_until_due(window, now);
            for milestone in state.milestones.iter_mut() {
                if !milestone.is_due(minutes_remaining) {
                    continue;
                }
                let fired = self
                    .fire(&settings, milestone.kind, minutes_remaining, now)
                    .await;
                milestone.mark(now, fired.suppressed);
                report.fired.push(fired);
            }
        }

        // 3. Persist window milestones.
        state.last_checked = Some(now);
        self.store.save_notification_state(&state).await?;

        // 4. Fasting milestones.
        if let Some(session) = self.store.active_session().await? {
            report.session_id = Some(session.id.clone());
            let elapsed = elapsed_minutes(&session, now);
            let goal = i64::from(session.goal_minutes);
            let mut flags = self.store.fasting_flags(&session.id).await?;
            let before = flags.clone();

            if !flags.goal_reached && elapsed >= goal {
                let fired = self
                    .fire(&settings, NotificationKind::GoalReached, elapsed - goal, now)
                    .await;
                report.fired.push(fired);
                flags.goal_reached = true;
            }
            if !flags.two_hours_extra && elapsed >= goal + TWO_HOURS_EXTRA_MINUTES {
                let fired = self
                    .fire(&settings, NotificationKind::TwoHoursExtra, elapsed - goal, now)
                    .await;
                report.fired.push(fired);
                flags.two_hours_extra = true;
            }

            if flags != before {
                self.store.save_fasting_flags(&flags).await?;
            }
        }

        Ok(report)
    }

    async fn fire(
        &self,
        settings: &NotificationSettings,
        kind: NotificationKind,
        minutes_offset: i64,
        now: DateTime<Utc>,
    ) -> FiredMilestone {
        if !settings.allows_kind(kind) {
            tracing::debug!(kind = %kind, "milestone disabled; consumed without sending");
            return FiredMilestone {
                kind,
                minutes_offset,
                suppressed: true,
                outcomes: Vec::new(),
            };
        }

        let channels: Vec<_> = self
            .channels
            .iter()
            .filter(|c| settings.allows_channel(c.kind()))
            .cloned()
            .collect();
        let outcomes = dispatch(&channels, kind, minutes_offset, now).await;
        tracing::info!(
            kind = %kind,
            minutes_offset,
            delivered = outcomes.iter().filter(|o| o.delivered).count(),
            channels = outcomes.len(),
            "milestone fired"
        );
        FiredMilestone {
            kind,
            minutes_offset,
            suppressed: false,
            outcomes,
        }
    }

    /// Start the polling loop on the current tokio runtime.
    ///
    /// # Errors
    /// `ZeroPeriod` for a zero `period`; `AlreadyRunning` if a loop for this
    /// scheduler is still active.
    pub fn spawn(self: &Arc<Self>, period: Duration) -> Result<SchedulerHandle, SchedulerError> {
        if period.is_zero() {
            return Err(SchedulerError::ZeroPeriod);
        }
        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let scheduler = Arc::clone(self);
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            tracing::info!(period_secs = period.as_secs(), "milestone scheduler started");

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        match scheduler.tick(Utc::now()).await {
                            Ok(report) if !report.fired.is_empty() => {
                                tracing::debug!(fired = report.fired.len(), "tick complete");
                            }
                            Ok(_) => {}
                            Err(e) => tracing::error!(error = %e, "scheduler tick failed"),
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        tracing::debug!("milestone scheduler received shutdown signal");
                        break;
                    }
                }
            }

            scheduler.running.store(false, Ordering::SeqCst);
        });

        Ok(SchedulerHandle { shutdown_tx, task })
    }
}

/// Handle to a running scheduler loop.
pub struct SchedulerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Stop the loop and wait for the in-flight tick to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "scheduler task ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{NotifyError, StoreError};
    use crate::fasting::{
        EatingWindow, EatingWindowPatch, FastingEngine, FastingPreset, FastingSession,
        PresetPatch, SessionPatch,
    };
    use crate::notify::{ChannelKind, NotificationRecord};
    use crate::storage::{MemoryStore, StoreResult};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(NotificationKind, i64)>>,
        fail: bool,
    }

    #[async_trait]
    impl NotificationChannel for RecordingChannel {
        fn kind(&self) -> ChannelKind {
            ChannelKind::Local
        }

        async fn send(&self, record: &NotificationRecord) -> Result<(), NotifyError> {
            self.sent
                .lock()
                .unwrap()
                .push((record.kind, record.minutes_offset));
            if self.fail {
                Err(NotifyError::NotConfigured("test"))
            } else {
                Ok(())
            }
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap()
    }

    struct Fixture {
        engine: FastingEngine,
        scheduler: MilestoneScheduler,
        channel: Arc<RecordingChannel>,
        preset: FastingPreset,
    }

    async fn fixture(fail: bool) -> Fixture {
        let store: Arc<dyn FastingStore> = Arc::new(MemoryStore::new());
        let engine = FastingEngine::new(store.clone());
        let preset = engine.create_preset("20:4", 1200).await.unwrap();
        let channel = Arc::new(RecordingChannel {
            fail,
            ..Default::default()
        });
        let scheduler = MilestoneScheduler::new(
            store,
            vec![channel.clone() as Arc<dyn NotificationChannel>],
            NotificationSettings::default(),
        );
        Fixture {
            engine,
            scheduler,
            channel,
            preset,
        }
    }

    fn sent(channel: &RecordingChannel) -> Vec<NotificationKind> {
        channel.sent.lock().unwrap().iter().map(|(k, _)| *k).collect()
    }

    #[tokio::test]
    async fn countdown_fires_in_order_once() {
        let f = fixture(false).await;
        f.engine.start_fast(&f.preset.id, t0()).await.unwrap();
        let stop = t0() + ChronoDuration::hours(20);
        f.engine.stop_fast(stop).await.unwrap();
        let due = stop + ChronoDuration::hours(4);

        f.scheduler.tick(due - ChronoDuration::minutes(121)).await.unwrap();
        assert!(sent(&f.channel).is_empty());

        f.scheduler.tick(due - ChronoDuration::minutes(120)).await.unwrap();
        f.scheduler.tick(due - ChronoDuration::minutes(90)).await.unwrap();
        f.scheduler.tick(due - ChronoDuration::minutes(45)).await.unwrap();
        assert_eq!(
            sent(&f.channel),
            vec![NotificationKind::TwoHoursLeft, NotificationKind::OneHourLeft]
        );

        for _ in 0..5 {
            f.scheduler.tick(due + ChronoDuration::minutes(90)).await.unwrap();
        }
        assert_eq!(
            sent(&f.channel),
            vec![
                NotificationKind::TwoHoursLeft,
                NotificationKind::OneHourLeft,
                NotificationKind::ThirtyMinutesLeft,
                NotificationKind::WindowEnded,
                NotificationKind::Overdue15,
                NotificationKind::Overdue30,
                NotificationKind::Overdue60,
            ]
        );
    }

    #[tokio::test]
    async fn failed_delivery_still_marks_triggered() {
        let f = fixture(true).await;
        f.engine.start_fast(&f.preset.id, t0()).await.unwrap();
        let stop = t0() + ChronoDuration::hours(20);
        f.engine.stop_fast(stop).await.unwrap();
        let due = stop + ChronoDuration::hours(4);

        let report = f.scheduler.tick(due).await.unwrap();
        assert_eq!(report.fired.len(), 4);
        assert!(report.fired.iter().all(|m| !m.outcomes[0].delivered));

        f.scheduler.tick(due).await.unwrap();
        assert_eq!(sent(&f.channel).len(), 4);
    }

    #[tokio::test]
    async fn fasting_milestones_fire_once_per_session() {
        let f = fixture(false).await;
        f.engine.start_fast(&f.preset.id, t0()).await.unwrap();

        f.scheduler.tick(t0() + ChronoDuration::minutes(1199)).await.unwrap();
        assert!(sent(&f.channel).is_empty());

        f.scheduler.tick(t0() + ChronoDuration::minutes(1200)).await.unwrap();
        f.scheduler.tick(t0() + ChronoDuration::minutes(1250)).await.unwrap();
        assert_eq!(sent(&f.channel), vec![NotificationKind::GoalReached]);

        f.scheduler.tick(t0() + ChronoDuration::minutes(1320)).await.unwrap();
        f.scheduler.tick(t0() + ChronoDuration::minutes(1400)).await.unwrap();
        assert_eq!(
            sent(&f.channel),
            vec![NotificationKind::GoalReached, NotificationKind::TwoHoursExtra]
        );
        assert_eq!(f.channel.sent.lock().unwrap()[1].1, 120);
    }

    #[tokio::test]
    async fn disabled_milestone_is_not_fired_after_reenabling() {
        let f = fixture(false).await;
        let mut settings = NotificationSettings::default();
        settings.eating_window_reminders.two_hours = false;
        f.scheduler.update_settings(settings);

        f.engine.start_fast(&f.preset.id, t0()).await.unwrap();
        let stop = t0() + ChronoDuration::hours(20);
        f.engine.stop_fast(stop).await.unwrap();
        let due = stop + ChronoDuration::hours(4);

        let report = f.scheduler.tick(due - ChronoDuration::minutes(100)).await.unwrap();
        assert!(report.fired[0].suppressed);
        assert!(sent(&f.channel).is_empty());

        f.scheduler.update_settings(NotificationSettings::default());
        f.scheduler.tick(due - ChronoDuration::minutes(60)).await.unwrap();
        assert_eq!(sent(&f.channel), vec![NotificationKind::OneHourLeft]);
    }

    #[tokio::test]
    async fn disabled_channel_is_skipped_but_milestone_consumed() {
        let f = fixture(false).await;
        f.scheduler.update_settings(NotificationSettings {
            local_notifications: false,
            ..Default::default()
        });
        f.engine.start_fast(&f.preset.id, t0()).await.unwrap();

        let report = f.scheduler.tick(t0() + ChronoDuration::hours(21)).await.unwrap();
        assert_eq!(report.fired.len(), 1);
        assert!(!report.fired[0].suppressed);
        assert!(report.fired[0].outcomes.is_empty());
        assert!(sent(&f.channel).is_empty());
    }

    #[tokio::test]
    async fn no_window_clears_state() {
        let f = fixture(false).await;
        let report = f.scheduler.tick(t0()).await.unwrap();
        assert!(report.fired.is_empty());
        let state = f.engine.store().notification_state().await.unwrap();
        assert!(state.eating_window_id.is_none());
        assert!(state.milestones.is_empty());
        assert_eq!(state.last_checked, Some(t0()));
    }

    #[tokio::test]
    async fn double_spawn_is_rejected() {
        let f = fixture(false).await;
        let scheduler = Arc::new(f.scheduler);
        let handle = scheduler.spawn(Duration::from_secs(3600)).unwrap();
        assert!(scheduler.is_running());
        assert!(matches!(
            scheduler.spawn(Duration::from_secs(3600)),
            Err(SchedulerError::AlreadyRunning)
        ));
        handle.shutdown().await;
        assert!(!scheduler.is_running());
        scheduler
            .spawn(Duration::from_secs(3600))
            .unwrap()
            .shutdown()
            .await;
    }

    #[tokio::test]
    async fn zero_period_is_rejected() {
        let f = fixture(false).await;
        let scheduler = Arc::new(f.scheduler);
        assert!(matches!(
            scheduler.spawn(Duration::ZERO),
            Err(SchedulerError::ZeroPeriod)
        ));
        assert!(!scheduler.is_running());
    }

    /// Memory store whose reads can be made to fail a set number of times.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryStore,
        window_failures: AtomicUsize,
        session_failures: AtomicUsize,
        window_calls: AtomicUsize,
    }

    fn take_failure(remaining: &AtomicUsize) -> StoreResult<()> {
        match remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)) {
            Ok(_) => Err(StoreError::Remote("connection reset".into())),
            Err(_) => Ok(()),
        }
    }

    #[async_trait]
    impl FastingStore for FlakyStore {
        async fn list_presets(&self) -> StoreResult<Vec<FastingPreset>> {
            self.inner.list_presets().await
        }
        async fn get_preset(&self, id: &str) -> StoreResult<Option<FastingPreset>> {
            self.inner.get_preset(id).await
        }
        async fn create_preset(&self, preset: &FastingPreset) -> StoreResult<()> {
            self.inner.create_preset(preset).await
        }
        async fn update_preset(
            &self,
            id: &str,
            patch: &PresetPatch,
        ) -> StoreResult<Option<FastingPreset>> {
            self.inner.update_preset(id, patch).await
        }
        async fn delete_preset(&self, id: &str) -> StoreResult<bool> {
            self.inner.delete_preset(id).await
        }

        async fn list_sessions(&self) -> StoreResult<Vec<FastingSession>> {
            self.inner.list_sessions().await
        }
        async fn get_session(&self, id: &str) -> StoreResult<Option<FastingSession>> {
            self.inner.get_session(id).await
        }
        async fn create_session(&self, session: &FastingSession) -> StoreResult<()> {
            self.inner.create_session(session).await
        }
        async fn update_session(
            &self,
            id: &str,
            patch: &SessionPatch,
        ) -> StoreResult<Option<FastingSession>> {
            self.inner.update_session(id, patch).await
        }
        async fn delete_session(&self, id: &str) -> StoreResult<bool> {
            self.inner.delete_session(id).await
        }
        async fn active_session(&self) -> StoreResult<Option<FastingSession>> {
            take_failure(&self.session_failures)?;
            self.inner.active_session().await
        }

        async fn list_eating_windows(&self) -> StoreResult<Vec<EatingWindow>> {
            self.inner.list_eating_windows().await
        }
        async fn get_eating_window(&self, id: &str) -> StoreResult<Option<EatingWindow>> {
            self.inner.get_eating_window(id).await
        }
        async fn create_eating_window(&self, window: &EatingWindow) -> StoreResult<()> {
            self.inner.create_eating_window(window).await
        }
        async fn update_eating_window(
            &self,
            id: &str,
            patch: &EatingWindowPatch,
        ) -> StoreResult<Option<EatingWindow>> {
            self.inner.update_eating_window(id, patch).await
        }
        async fn delete_eating_window(&self, id: &str) -> StoreResult<bool> {
            self.inner.delete_eating_window(id).await
        }
        async fn active_eating_window(&self) -> StoreResult<Option<EatingWindow>> {
            self.window_calls.fetch_add(1, Ordering::SeqCst);
            take_failure(&self.window_failures)?;
            self.inner.active_eating_window().await
        }

        async fn notification_state(&self) -> StoreResult<NotificationState> {
            self.inner.notification_state().await
        }
        async fn save_notification_state(&self, state: &NotificationState) -> StoreResult<()> {
            self.inner.save_notification_state(state).await
        }
        async fn fasting_flags(&self, session_id: &str) -> StoreResult<FastingFlags> {
            self.inner.fasting_flags(session_id).await
        }
        async fn save_fasting_flags(&self, flags: &FastingFlags) -> StoreResult<()> {
            self.inner.save_fasting_flags(flags).await
        }

        async fn push_notification(&self, record: &NotificationRecord) -> StoreResult<()> {
            self.inner.push_notification(record).await
        }
        async fn list_notifications(&self, limit: usize) -> StoreResult<Vec<NotificationRecord>> {
            self.inner.list_notifications(limit).await
        }
    }

    async fn flaky_fixture(
        fast_started: DateTime<Utc>,
        fast_stopped: DateTime<Utc>,
    ) -> (Arc<FlakyStore>, Arc<RecordingChannel>, MilestoneScheduler) {
        let store = Arc::new(FlakyStore::default());
        let engine = FastingEngine::new(store.clone());
        let preset = engine.create_preset("20:4", 1200).await.unwrap();
        engine.start_fast(&preset.id, fast_started).await.unwrap();
        engine.stop_fast(fast_stopped).await.unwrap();

        let channel = Arc::new(RecordingChannel::default());
        let scheduler = MilestoneScheduler::new(
            store.clone(),
            vec![channel.clone() as Arc<dyn NotificationChannel>],
            NotificationSettings::default(),
        );
        (store, channel, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn loop_keeps_polling_after_a_failed_tick() {
        // Window due an hour ago, so every window milestone is due.
        let now = Utc::now();
        let (store, channel, scheduler) = flaky_fixture(
            now - ChronoDuration::hours(25),
            now - ChronoDuration::hours(5),
        )
        .await;
        store.window_calls.store(0, Ordering::SeqCst);
        store.window_failures.store(1, Ordering::SeqCst);

        let period = Duration::from_secs(60);
        let scheduler = Arc::new(scheduler);
        let handle = scheduler.spawn(period).unwrap();
        for _ in 0..5 {
            tokio::time::sleep(period).await;
            if !sent(&channel).is_empty() {
                break;
            }
        }
        handle.shutdown().await;

        assert!(store.window_calls.load(Ordering::SeqCst) >= 2);
        assert_eq!(sent(&channel).len(), EATING_WINDOW_MILESTONES.len());
    }

    #[tokio::test]
    async fn window_milestones_survive_a_later_store_failure() {
        let (store, channel, scheduler) =
            flaky_fixture(t0(), t0() + ChronoDuration::hours(20)).await;
        let due = t0() + ChronoDuration::hours(24);

        store.session_failures.store(1, Ordering::SeqCst);
        assert!(scheduler.tick(due).await.is_err());
        assert_eq!(sent(&channel).len(), 4);

        let report = scheduler.tick(due).await.unwrap();
        assert!(report.fired.is_empty());
        assert_eq!(sent(&channel).len(), 4);

        let state = store.notification_state().await.unwrap();
        assert_eq!(state.milestones.iter().filter(|m| m.triggered).count(), 4);
        assert!(state.milestones.iter().all(|m| !m.triggered || m.timestamp == Some(due)));
    }
}
