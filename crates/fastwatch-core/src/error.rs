//! Core error types for fastwatch-core.
//!
//! Each concern owns a thiserror enum; `CoreError` aggregates them so the
//! CLI can propagate anything with `?`.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for fastwatch-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Fasting engine errors
    #[error("Fasting error: {0}")]
    Fasting(#[from] FastingError),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Notification channel errors
    #[error("Notification error: {0}")]
    Notify(#[from] NotifyError),

    /// Scheduler errors
    #[error("Scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors surfaced by the fasting engine.
///
/// Not-found and conflict variants are raised before any write happens.
#[derive(Error, Debug)]
pub enum FastingError {
    #[error("Preset not found: {0}")]
    PresetNotFound(String),

    #[error("A fasting session is already active (started {started_at})")]
    SessionAlreadyActive {
        session_id: String,
        started_at: chrono::DateTime<chrono::Utc>,
    },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Eating window not found: {0}")]
    EatingWindowNotFound(String),

    #[error("Invalid preset: {0}")]
    InvalidPreset(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Storage-specific errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Failed to open database file
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// A stored value could not be encoded or decoded
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote mirror request failed
    #[error("Remote sync failed: {0}")]
    Remote(String),

    /// Store mutex poisoned by a panicking writer
    #[error("Store lock poisoned")]
    LockPoisoned,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to resolve the data directory
    #[error("Cannot resolve data directory: {0}")]
    DataDir(#[source] std::io::Error),

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown dotted key
    #[error("Unknown config key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Notification dispatch errors. Logged by the scheduler, never retried.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("Channel '{0}' is not configured")]
    NotConfigured(&'static str),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Credential store error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Scheduler lifecycle errors.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Milestone scheduler is already running")]
    AlreadyRunning,

    #[error("Scheduler period must be greater than zero")]
    ZeroPeriod,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::LockPoisoned
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
