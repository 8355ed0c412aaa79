//! Error types for all stores.
//!
//! Every failure is terminal for the call that produced it: the store
//! performs no local recovery, and no state is changed by a failed call.
//! None of these errors are transient. An identifier collision is a
//! logical conflict, so callers must surface it instead of retrying.

use crate::condition::ConditionState;
use crate::types::{Address, Id};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Which kind of record an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    Template,
    Condition,
    Agreement,
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template => write!(f, "template"),
            Self::Condition => write!(f, "condition"),
            Self::Agreement => write!(f, "agreement"),
        }
    }
}

/// Which list failed a length check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LengthField {
    TimeLocks,
    TimeOuts,
    /// Compared against the template's condition types.
    ConditionTypes,
    /// Compared against the configured per-agreement cap.
    MaxConditions,
}

impl std::fmt::Display for LengthField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeLocks => write!(f, "time locks"),
            Self::TimeOuts => write!(f, "time outs"),
            Self::ConditionTypes => write!(f, "template condition types"),
            Self::MaxConditions => write!(f, "max conditions per agreement"),
        }
    }
}

/// Domain errors raised by the template, condition and agreement stores.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("store is already initialized")]
    AlreadyInitialized,

    #[error("store is not initialized")]
    NotInitialized,

    #[error("{entity} id {id} already exists")]
    IdentifierAlreadyExists { entity: Entity, id: Id },

    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: Id },

    #[error("template {0} must exist and be active")]
    TemplateMustExist(Id),

    #[error("length mismatch: {expected} condition ids but {actual} {field}")]
    LengthMismatch {
        field: LengthField,
        expected: usize,
        actual: usize,
    },

    #[error("template condition types must not be empty")]
    EmptyConditionTypes,

    #[error("invalid transition {from} -> {to} for condition {id}")]
    InvalidTransition {
        id: Id,
        from: ConditionState,
        to: ConditionState,
    },

    #[error("{actor} is not authorized to {action}")]
    Unauthorized { actor: Address, action: String },

    #[error("template {0} is already revoked")]
    AlreadyRevoked(Id),

    #[error("invalid time margin for condition {id}: time lock {time_lock} >= time out {time_out}")]
    InvalidTimeMargin {
        id: Id,
        time_lock: u64,
        time_out: u64,
    },

    #[error("snapshot rejected: {0}")]
    SnapshotCorrupted(String),
}

impl StoreError {
    pub fn already_exists(entity: Entity, id: Id) -> Self {
        Self::IdentifierAlreadyExists { entity, id }
    }

    pub fn not_found(entity: Entity, id: Id) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn unauthorized(actor: Address, action: impl Into<String>) -> Self {
        Self::Unauthorized {
            actor,
            action: action.into(),
        }
    }

    pub fn length_mismatch(field: LengthField, expected: usize, actual: usize) -> Self {
        Self::LengthMismatch {
            field,
            expected,
            actual,
        }
    }

    /// Machine-readable code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::AlreadyInitialized => ErrorCode::AlreadyInitialized,
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::IdentifierAlreadyExists { .. } => ErrorCode::IdentifierAlreadyExists,
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::TemplateMustExist(_) => ErrorCode::TemplateMustExist,
            Self::LengthMismatch { .. } => ErrorCode::LengthMismatch,
            Self::EmptyConditionTypes => ErrorCode::EmptyConditionTypes,
            Self::InvalidTransition { .. } => ErrorCode::InvalidTransition,
            Self::Unauthorized { .. } => ErrorCode::Unauthorized,
            Self::AlreadyRevoked(_) => ErrorCode::AlreadyRevoked,
            Self::InvalidTimeMargin { .. } => ErrorCode::InvalidTimeMargin,
            Self::SnapshotCorrupted(_) => ErrorCode::SnapshotCorrupted,
        }
    }

    /// Always false: a rejected call fails the same way when replayed
    /// against the same state.
    pub fn is_retryable(&self) -> bool {
        false
    }
}

/// Standard error codes across all stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AlreadyInitialized,
    NotInitialized,
    IdentifierAlreadyExists,
    NotFound,
    TemplateMustExist,
    LengthMismatch,
    EmptyConditionTypes,
    InvalidTransition,
    Unauthorized,
    AlreadyRevoked,
    InvalidTimeMargin,
    SnapshotCorrupted,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::IdentifierAlreadyExists => "IDENTIFIER_ALREADY_EXISTS",
            Self::NotFound => "NOT_FOUND",
            Self::TemplateMustExist => "TEMPLATE_MUST_EXIST",
            Self::LengthMismatch => "LENGTH_MISMATCH",
            Self::EmptyConditionTypes => "EMPTY_CONDITION_TYPES",
            Self::InvalidTransition => "INVALID_TRANSITION",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::AlreadyRevoked => "ALREADY_REVOKED",
            Self::InvalidTimeMargin => "INVALID_TIME_MARGIN",
            Self::SnapshotCorrupted => "SNAPSHOT_CORRUPTED",
        };
        write!(f, "{}", s)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SnapshotCorrupted(format!("JSON error: {}", e))
    }
}

/// Result type alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Log a rejected mutation.
pub(crate) fn log_rejection(operation: &'static str, sender: &Address, err: &StoreError) {
    tracing::warn!(
        operation,
        sender = %sender,
        code = %err.code(),
        "{}",
        err
    );
}
