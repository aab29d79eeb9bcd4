//! Derived fasting state.
//!
//! There is no stored state field: the state is recomputed from the active
//! records and the clock on every call.
//!
//! ```text
//! eating/overdue --start_fast--> fasting --stop_fast--> eating
//! eating --(now >= next_fast_due_time)--> overdue
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{EatingWindow, FastingSession};

/// Projection returned by `FastingEngine::current_state`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "data", rename_all = "lowercase")]
pub enum CurrentState {
    Fasting(FastingSession),
    /// `None` when the user has never fasted; ready to start.
    Eating(Option<EatingWindow>),
    Overdue(EatingWindow),
}

impl CurrentState {
    pub fn label(&self) -> &'static str {
        match self {
            CurrentState::Fasting(_) => "fasting",
            CurrentState::Eating(_) => "eating",
            CurrentState::Overdue(_) => "overdue",
        }
    }

    pub fn session(&self) -> Option<&FastingSession> {
        match self {
            CurrentState::Fasting(session) => Some(session),
            _ => None,
        }
    }

    pub fn eating_window(&self) -> Option<&EatingWindow> {
        match self {
            CurrentState::Eating(window) => window.as_ref(),
            CurrentState::Overdue(window) => Some(window),
            CurrentState::Fasting(_) => None,
        }
    }
}

/// Phase of an active eating window relative to its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowPhase {
    Eating,
    Overdue,
}

pub fn window_phase(window: &EatingWindow, now: DateTime<Utc>) -> WindowPhase {
    if now >= window.next_fast_due_time {
        WindowPhase::Overdue
    } else {
        WindowPhase::Eating
    }
}

/// Combine the active records into a state. An active session wins.
pub fn derive_state(
    session: Option<FastingSession>,
    window: Option<EatingWindow>,
    now: DateTime<Utc>,
) -> CurrentState {
    if let Some(session) = session {
        return CurrentState::Fasting(session);
    }
    match window {
        Some(window) => match window_phase(&window, now) {
            WindowPhase::Overdue => CurrentState::Overdue(window),
            WindowPhase::Eating => CurrentState::Eating(Some(window)),
        },
        None => CurrentState::Eating(None),
    }
}
