//! Core error types for dayflow-core.
//!
//! One umbrella enum (`CoreError`) with domain sub-enums, so callers can
//! match on the broad kind while components raise the precise one.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::id::TaskId;
use crate::task::TaskStatus;

/// Core error type for dayflow-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Field-level constraint violation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A referenced document is missing.
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Report generation found no candidate tasks for the day.
    #[error("no tasks found for {date}")]
    NoTasksForDate { date: NaiveDate },

    /// The dependency graph contains a cycle; `from` depends on `to`
    /// somewhere along it.
    #[error("dependency cycle detected: {from} -> {to}")]
    CycleDetected { from: TaskId, to: TaskId },

    /// Status change outside the allowed transition graph.
    #[error("illegal status transition: {from} -> {to}")]
    IllegalTransition { from: TaskStatus, to: TaskStatus },

    /// Break or task duration below the configured minimum.
    #[error("duration of {minutes} min is below the minimum of {minimum} min")]
    InvalidDuration { minutes: i64, minimum: i64 },

    /// A multi-document write stopped partway through. `applied` lists the
    /// documents already persisted, in write order, so the caller can
    /// resume from `failed`.
    #[error("{operation}: applied {n} of {total} updates before {failed} failed", n = .applied.len())]
    PartialApply {
        operation: &'static str,
        applied: Vec<TaskId>,
        failed: TaskId,
        total: usize,
        #[source]
        source: StorageError,
    },

    /// Underlying store failure; retryable.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Operation exceeded its deadline before committing.
    #[error("operation '{operation}' exceeded its deadline")]
    Timeout { operation: &'static str },

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Invalid value for a named field.
    #[error("invalid value for '{field}': {message}")]
    InvalidValue { field: &'static str, message: String },

    /// End of a time interval precedes its start.
    #[error("invalid time range: end ({end}) precedes start ({start})")]
    InvalidTimeRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// A task may not list itself as a dependency.
    #[error("task may not depend on itself")]
    SelfDependency,

    /// A dependency id does not resolve to a stored task.
    #[error("unknown dependency: {0}")]
    UnknownDependency(TaskId),

    /// A dependency belongs to a different user.
    #[error("dependency {0} belongs to a different user")]
    ForeignDependency(TaskId),

    /// Other tasks still depend on a task being deleted.
    #[error("task is a dependency of {n} other task(s)", n = .dependents.len())]
    HasDependents { dependents: Vec<TaskId> },

    /// Malformed calendar date.
    #[error("invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// Malformed clock time.
    #[error("invalid time '{0}': expected HH:MM")]
    InvalidTime(String),
}

/// Store-level errors. Adapters map their native failures onto these.
#[derive(Error, Debug)]
pub enum StorageError {
    /// The store is unreachable or rejected the operation; retryable.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A document that must exist is missing.
    #[error("document missing: {0}")]
    Missing(String),

    /// Stored data could not be decoded.
    #[error("storage corrupt: {0}")]
    Corrupt(String),
}

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    #[error("failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    #[error("invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Result type alias for CoreError.
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
