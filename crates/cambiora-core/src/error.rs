//! Core error types for cambiora-core.
//!
//! This module defines the error hierarchy using thiserror. Store
//! implementations speak [`DatabaseError`]; the progress engine speaks
//! [`ProgressError`]; everything funnels into [`CoreError`] at the edges.

use std::path::PathBuf;
use thiserror::Error;

use crate::calendar::DateKey;

/// Core error type for cambiora-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Reconciliation and user-action errors
    #[error(transparent)]
    Progress(#[from] ProgressError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A UNIQUE constraint rejected the write
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Errors raised while logging activity or reconciling derived state.
#[derive(Error, Debug)]
pub enum ProgressError {
    /// The subject already has an event on this calendar day.
    #[error("Subject '{subject_id}' is already logged for {day}")]
    DuplicateEvent { subject_id: String, day: DateKey },

    /// A referenced subject or event does not exist.
    #[error("Not found: {what}")]
    NotFound { what: String },

    /// The habit is paused and cannot be logged.
    #[error("Habit '{subject_id}' is inactive")]
    InactiveSubject { subject_id: String },

    /// No milestone is left to assign after the last one completed.
    #[error("Milestone catalog exhausted for subject '{subject_id}'")]
    CatalogExhausted { subject_id: String },

    /// The milestone catalog has no entries at all.
    #[error("Milestone catalog is empty; no track can be created")]
    EmptyCatalog,

    /// The milestone catalog is malformed.
    #[error("Invalid milestone catalog: {0}")]
    InvalidCatalog(String),

    /// The event or derived-state store failed.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] DatabaseError),
}

impl ProgressError {
    /// Message suitable for showing to the end user.
    pub fn user_message(&self) -> String {
        match self {
            ProgressError::DuplicateEvent { .. } => {
                "You've already logged this habit today. You can log it again tomorrow to continue your streak!"
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid date range
    #[error("Invalid date range: {from} is after {to}")]
    InvalidDateRange { from: DateKey, to: DateKey },

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, msg) => match code.code {
                rusqlite::ErrorCode::DatabaseLocked | rusqlite::ErrorCode::DatabaseBusy => {
                    DatabaseError::Locked
                }
                rusqlite::ErrorCode::ConstraintViolation
                    if code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                        || code.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY =>
                {
                    DatabaseError::UniqueViolation(msg.clone().unwrap_or_else(|| code.to_string()))
                }
                _ => DatabaseError::QueryFailed(err.to_string()),
            },
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for ProgressError {
    fn from(err: rusqlite::Error) -> Self {
        ProgressError::StoreUnavailable(err.into())
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(err.into())
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(err: toml::de::Error) -> Self {
        ConfigError::ParseFailed(err.to_string())
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
