//! Caller-facing error taxonomy.
//!
//! Every operation of the conference backend returns [`ConferenceError`]. The
//! variants map one-to-one onto the outcomes a transport layer distinguishes
//! (see [`ErrorKind`]); infrastructure failures keep their source error.

use crate::cache::CacheError;
use crate::key::{Kind, ParseReferenceError, Reference};
use crate::store::StoreError;
use crate::task_queue::TaskQueueError;
use thiserror::Error;

/// Result alias used throughout the conference crates.
pub type Result<T> = std::result::Result<T, ConferenceError>;

/// Coarse classification of a [`ConferenceError`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed input.
    BadRequest,
    /// No authenticated caller.
    Unauthorized,
    /// Authenticated caller may not touch this record.
    Forbidden,
    /// Referenced record does not exist.
    NotFound,
    /// Request conflicts with current state.
    Conflict,
    /// Temporary failure; retrying later may succeed.
    Transient,
    /// Backend failure.
    Internal,
}

/// Errors returned by conference operations.
#[derive(Error, Debug)]
pub enum ConferenceError {
    /// Input failed validation.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The operation requires an authenticated caller.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The caller is authenticated but not allowed to perform the operation.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A referenced record does not exist (or is not of the expected kind).
    #[error("No {kind} found with key: {reference}")]
    NotFound {
        /// Expected kind.
        kind: Kind,
        /// Reference the caller supplied.
        reference: Reference,
    },

    /// The request contradicts current state (already registered, sold out, ...).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transaction contention did not clear within the retry budget.
    #[error("Transaction failed after {attempts} attempts: {reason}")]
    Transient {
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        reason: String,
    },

    /// Entity store failure.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Cache failure.
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    /// Task queue failure.
    #[error("Task queue error: {0}")]
    TaskQueue(#[from] TaskQueueError),
}

impl ConferenceError {
    /// Shorthand for a `NotFound` error.
    #[must_use]
    pub fn not_found(kind: Kind, reference: impl Into<Reference>) -> Self {
        Self::NotFound {
            kind,
            reference: reference.into(),
        }
    }

    /// Classify the error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::BadRequest(_) => ErrorKind::BadRequest,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Transient { .. } => ErrorKind::Transient,
            Self::Store(_) | Self::Cache(_) | Self::TaskQueue(_) => ErrorKind::Internal,
        }
    }

    /// True when the error is optimistic-concurrency contention that a fresh
    /// transaction attempt may clear.
    #[must_use]
    pub const fn is_contention(&self) -> bool {
        matches!(self, Self::Store(error) if error.is_conflict())
    }
}

impl From<ParseReferenceError> for ConferenceError {
    fn from(error: ParseReferenceError) -> Self {
        Self::BadRequest(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::key::EntityKey;
    use crate::store::{Precondition, Version};

    #[test]
    fn contention_is_only_store_conflicts() {
        let conflict = ConferenceError::from(StoreError::ConcurrencyConflict {
            key: EntityKey::root(Kind::Speaker, "s"),
            expected: Precondition::At(Version::FIRST),
            actual: None,
        });
        assert!(conflict.is_contention());
        assert_eq!(conflict.kind(), ErrorKind::Internal);

        let database = ConferenceError::from(StoreError::Database("down".into()));
        assert!(!database.is_contention());
        assert!(!ConferenceError::Conflict("x".into()).is_contention());
    }

    #[test]
    fn malformed_reference_is_bad_request() {
        let error: ConferenceError = "%%%".parse::<Reference>().unwrap_err().into();
        assert_eq!(error.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn not_found_message_names_kind() {
        let error = ConferenceError::not_found(Kind::Conference, Reference::new("abc"));
        assert_eq!(error.to_string(), "No Conference found with key: abc");
    }
}
