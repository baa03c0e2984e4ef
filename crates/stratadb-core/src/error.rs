//! Shared error types for the engine.
//!
//! Two kinds cross the public boundary: [`ValidationError`] (schema-level,
//! raised before any backend call) and [`DataAccessError`] (everything else,
//! carrying the backend cause). Backend client errors ([`StoreError`],
//! [`RestError`]) are wrapped, never surfaced bare.

use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Relational error code for malformed input (e.g. a value that is not a
/// valid identifier). The batch engine must distinguish this class from all
/// other backend errors.
pub const INVALID_INPUT_CODE: &str = "22P02";

///
/// ValidationError
///
/// Schema-level rejection raised before any backend call. Carries the
/// offending attribute (when one is identifiable) and a human-readable
/// reason. Never retried.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("validation failed in {entity}: {reason}")]
pub struct ValidationError {
    pub entity: String,
    pub attribute: Option<String>,
    pub reason: String,
}

impl ValidationError {
    pub fn new(entity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            attribute: None,
            reason: reason.into(),
        }
    }

    /// Rejection pinned to one attribute; the reason must mention the
    /// attribute by name so error messages stay deterministic and testable.
    pub fn attribute(
        entity: impl Into<String>,
        attribute: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            entity: entity.into(),
            attribute: Some(attribute.into()),
            reason: reason.into(),
        }
    }
}

///
/// StoreError
///
/// Failure reported by the key-value entity proxy client.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct StoreError {
    pub kind: StoreErrorKind,
    pub message: String,
}

impl StoreError {
    pub fn new(kind: StoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Conflict, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StoreErrorKind::Unavailable, message)
    }
}

///
/// StoreErrorKind
///

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StoreErrorKind {
    /// Conditional write failed (item already exists).
    Conflict,
    /// Target item does not exist.
    NotFound,
    /// The store could not be reached or refused the call.
    Unavailable,
}

///
/// RestError
///
/// Failure half of the relational `{data, error}` response envelope.
/// Optionally chains a cause; [`RestError::is_invalid_input`] walks the
/// chain looking for the malformed-input code.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize, ThisError)]
#[error("{message}")]
pub struct RestError {
    pub code: Option<String>,
    pub message: String,
    pub cause: Option<Box<RestError>>,
}

impl RestError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
            cause: None,
        }
    }

    #[must_use]
    pub fn caused_by(mut self, cause: Self) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Shorthand for the malformed-input error class.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::with_code(INVALID_INPUT_CODE, message)
    }

    /// True when this error, or any error in its cause chain, carries the
    /// malformed-input code.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        let mut current = Some(self);
        while let Some(err) = current {
            if err.code.as_deref() == Some(INVALID_INPUT_CODE) {
                return true;
            }
            current = err.cause.as_deref();
        }
        false
    }
}

///
/// BackendError
/// Union of the two backend client error shapes.
///

#[derive(Clone, Debug, ThisError)]
pub enum BackendError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Rest(#[from] RestError),
}

impl BackendError {
    /// True for the relational malformed-input class; always false for the
    /// key-value store, which has no equivalent condition.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Self::Rest(err) => err.is_invalid_input(),
            Self::Store(_) => false,
        }
    }
}

///
/// DataAccessError
///
/// Public error for all collection operations. Single-item operations fail
/// whole with one of these; only batch operations define partial-success
/// result shapes.
///

#[derive(Debug, ThisError)]
pub enum DataAccessError {
    /// Schema-level rejection; nothing reached the backend.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The call shape itself is unusable (missing keys, unknown index,
    /// unknown accessor, unresolvable registry entry).
    #[error("failed to {action} [{entity}]: {reason}")]
    Query {
        entity: String,
        action: String,
        reason: String,
    },

    /// A backend call failed; the original cause is preserved.
    #[error("failed to {action} [{entity}]")]
    Backend {
        entity: String,
        action: String,
        #[source]
        source: BackendError,
    },
}

impl DataAccessError {
    pub fn query(
        entity: impl Into<String>,
        action: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Query {
            entity: entity.into(),
            action: action.into(),
            reason: reason.into(),
        }
    }

    pub fn backend(
        entity: impl Into<String>,
        action: impl Into<String>,
        source: impl Into<BackendError>,
    ) -> Self {
        Self::Backend {
            entity: entity.into(),
            action: action.into(),
            source: source.into(),
        }
    }

    /// True when the underlying cause is the relational malformed-input
    /// class.
    #[must_use]
    pub fn is_invalid_input(&self) -> bool {
        match self {
            Self::Backend { source, .. } => source.is_invalid_input(),
            Self::Validation(_) | Self::Query { .. } => false,
        }
    }
}
