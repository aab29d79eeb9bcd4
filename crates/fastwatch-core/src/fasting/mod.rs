mod duration;
mod engine;
mod model;
mod state;

pub use duration::{
    eating_window_elapsed, eating_window_remaining, elapsed_minutes, floor_minutes,
    minutes_until_due, overdue_minutes, session_duration,
};
pub use engine::{FastingEngine, FastingResult};
pub use model::{
    EatingWindow, EatingWindowPatch, FastingPreset, FastingSession, PresetPatch, SessionPatch,
    CYCLE_MINUTES,
};
pub use state::{derive_state, window_phase, CurrentState, WindowPhase};
