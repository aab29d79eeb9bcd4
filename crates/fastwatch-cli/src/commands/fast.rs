use chrono::Utc;
use clap::Subcommand;
use fastwatch_core::fasting::{
    eating_window_elapsed, eating_window_remaining, elapsed_minutes, minutes_until_due,
    overdue_minutes,
};
use fastwatch_core::CurrentState;
use serde_json::json;

use super::{engine, print_json, CmdResult};

const DEFAULT_PRESET: &str = "16:8";

#[derive(Subcommand)]
pub enum FastAction {
    /// Begin a fast, closing the current eating window
    Start {
        /// Preset id or name
        #[arg(default_value = DEFAULT_PRESET)]
        preset: String,
    },
    /// End the current fast and open an eating window
    Stop,
    /// Print the current state as JSON
    Status,
    /// Close the eating window without starting a fast
    CloseWindow,
    /// Completed fasts, newest first
    History {
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

pub async fn run(action: FastAction) -> CmdResult {
    let (_, engine) = engine().await?;
    let now = Utc::now();

    match action {
        FastAction::Start { preset } => {
            let preset = engine.resolve_preset(&preset).await?;
            let session = engine.start_fast(&preset.id, now).await?;
            print_json(&session)?;
        }
        FastAction::Stop => match engine.stop_fast(now).await? {
            Some(session) => print_json(&session)?,
            None => {
                eprintln!("no active fast");
                std::process::exit(1);
            }
        },
        FastAction::Status => {
            let state = engine.current_state(now).await?;
            let minutes = match &state {
                CurrentState::Fasting(session) => {
                    let elapsed = elapsed_minutes(session, now);
                    json!({
                        "elapsed_minutes": elapsed,
                        "remaining_minutes": (i64::from(session.goal_minutes) - elapsed).max(0),
                    })
                }
                CurrentState::Eating(Some(window)) => json!({
                    "elapsed_minutes": eating_window_elapsed(window, now),
                    "remaining_minutes": eating_window_remaining(window, now),
                    "minutes_until_due": minutes_until_due(window, now),
                }),
                CurrentState::Overdue(window) => json!({
                    "overdue_minutes": overdue_minutes(window, now),
                }),
                CurrentState::Eating(None) => json!({}),
            };
            print_json(&json!({ "current": state, "minutes": minutes }))?;
        }
        FastAction::CloseWindow => match engine.close_eating_window(now).await? {
            Some(window) => print_json(&window)?,
            None => println!("no open eating window"),
        },
        FastAction::History { limit } => {
            let history: Vec<_> = engine
                .session_history()
                .await?
                .into_iter()
                .take(limit)
                .collect();
            print_json(&history)?;
        }
    }
    Ok(())
}
