//! End-to-end fasting lifecycle against the SQLite backend.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use fastwatch_core::fasting::{minutes_until_due, overdue_minutes, PresetPatch};
use fastwatch_core::{
    compute_stats, CurrentState, FastingEngine, FastingError, FastingStore, SqliteStore,
};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()
}

fn open(path: &std::path::Path) -> FastingEngine {
    let store: Arc<dyn FastingStore> = Arc::new(SqliteStore::open(path).unwrap());
    FastingEngine::new(store)
}

#[tokio::test]
async fn test_full_cycle_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("fastwatch.db");

    let engine = open(&db);
    assert_eq!(engine.seed_default_presets().await.unwrap(), 4);
    assert_eq!(engine.seed_default_presets().await.unwrap(), 0);
    let preset = engine.resolve_preset("16:8").await.unwrap();
    assert_eq!(preset.duration_minutes, 960);

    let session = engine.start_fast(&preset.id, t0()).await.unwrap();
    drop(engine);

    // A fresh process sees the same active fast.
    let engine = open(&db);
    let state = engine.current_state(t0() + Duration::hours(3)).await.unwrap();
    assert_eq!(state.session().map(|s| s.id.as_str()), Some(session.id.as_str()));

    let stop = t0() + Duration::hours(16);
    let closed = engine.stop_fast(stop).await.unwrap().unwrap();
    assert!(!closed.stopped_early);
    assert_eq!(closed.end_time, Some(stop));

    let state = engine.current_state(stop + Duration::hours(1)).await.unwrap();
    let CurrentState::Eating(Some(window)) = state else {
        panic!("expected eating state, got {state:?}");
    };
    assert_eq!(window.expected_duration_minutes, 480);
    assert_eq!(window.next_fast_due_time, stop + Duration::hours(8));
    assert_eq!(minutes_until_due(&window, stop + Duration::hours(1)), 420);

    let late = stop + Duration::hours(9);
    let state = engine.current_state(late).await.unwrap();
    assert_eq!(state.label(), "overdue");
    assert_eq!(overdue_minutes(&window, late), 60);

    engine.start_fast(&preset.id, late).await.unwrap();
    let windows = engine.eating_window_history().await.unwrap();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].end_time, Some(late));
    assert!(engine.store().active_eating_window().await.unwrap().is_none());
}

#[tokio::test]
async fn test_second_start_is_rejected_without_writes() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(&dir.path().join("fastwatch.db"));
    let preset = engine.create_preset("18:6", 1080).await.unwrap();

    let first = engine.start_fast(&preset.id, t0()).await.unwrap();
    let err = engine
        .start_fast(&preset.id, t0() + Duration::minutes(5))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        FastingError::SessionAlreadyActive { ref session_id, .. } if *session_id == first.id
    ));
    assert_eq!(engine.store().list_sessions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_early_stop_and_stats() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(&dir.path().join("fastwatch.db"));
    let preset = engine.create_preset("OMAD", 1380).await.unwrap();

    engine.start_fast(&preset.id, t0()).await.unwrap();
    let closed = engine
        .stop_fast(t0() + Duration::hours(10))
        .await
        .unwrap()
        .unwrap();
    assert!(closed.stopped_early);
    assert_eq!(closed.eating_window_minutes, 60);

    let sessions = engine.store().list_sessions().await.unwrap();
    let stats = compute_stats(&sessions, t0() + Duration::hours(11));
    assert_eq!(stats.total_fasts, 1);
    assert_eq!(stats.total_failures, 1);
    assert_eq!(stats.average_duration, 600);
    assert_eq!(stats.current_streak, 0);
}

#[tokio::test]
async fn test_preset_edits_do_not_touch_history() {
    let dir = tempfile::tempdir().unwrap();
    let engine = open(&dir.path().join("fastwatch.db"));
    let preset = engine.create_preset("Custom", 900).await.unwrap();

    engine.start_fast(&preset.id, t0()).await.unwrap();
    engine.stop_fast(t0() + Duration::hours(15)).await.unwrap();

    engine
        .update_preset(
            &preset.id,
            PresetPatch {
                name: Some("Renamed".into()),
                duration_minutes: Some(1000),
            },
        )
        .await
        .unwrap();
    engine.delete_preset(&preset.id).await.unwrap();

    let history = engine.session_history().await.unwrap();
    assert_eq!(history[0].preset_name, "Custom");
    assert_eq!(history[0].goal_minutes, 900);
    assert!(matches!(
        engine.start_fast(&preset.id, t0() + Duration::days(1)).await,
        Err(FastingError::PresetNotFound(_))
    ));
}
