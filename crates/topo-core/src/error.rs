//! Error types for the graph engine
//!
//! [`TopoError`] follows the failure taxonomy the engine reports to callers:
//! - validation failures abort only the affected row or attribute
//! - missing references are dropped by the synchronizer, never surfaced from it
//! - integrity vetoes abort a deletion before anything is removed
//! - store failures and cancellations are fatal to the current operation

use std::fmt;
use topo_model::{InstId, KindId, ModelError};
use topo_store::StoreError;

/// Main engine error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TopoError {
    /// Input is malformed or incomplete
    #[error("validation failed: {0}")]
    Validation(String),

    /// Referenced instance does not exist
    #[error("reference not found: {kind} {inst_id}")]
    ReferenceNotFound {
        /// Kind searched
        kind: KindId,
        /// Missing instance id
        inst_id: InstId,
    },

    /// Deletion would orphan dependent infrastructure
    #[error("deletion blocked: {reason}")]
    IntegrityBlocked {
        /// Why the deletion was vetoed
        reason: String,
    },

    /// Record store failure
    #[error("store error: {0}")]
    Store(StoreError),

    /// Item already exists
    #[error("duplicate item: {0}")]
    Duplicate(String),

    /// Kind is not registered in the model
    #[error("object kind not found: {0}")]
    KindNotFound(KindId),

    /// Mainline recursion revisited an instance or exceeded the depth bound
    #[error("cyclic mainline hierarchy at {kind} {inst_id}")]
    CyclicHierarchy {
        /// Kind of the offending instance
        kind: KindId,
        /// Offending instance
        inst_id: InstId,
    },

    /// Caller cancelled or a deadline expired
    #[error("operation cancelled: {reason}")]
    Cancelled {
        /// What stopped the operation
        reason: CancelReason,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),

    /// Record does not have the expected shape
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

/// Why an operation was cancelled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Cancellation token fired
    Requested,
    /// Absolute deadline passed
    DeadlineExpired,
    /// A single store call exceeded its timeout
    CallTimeout,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requested => "cancellation requested",
            Self::DeadlineExpired => "deadline expired",
            Self::CallTimeout => "store call timed out",
        })
    }
}

impl From<StoreError> for TopoError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(what) => Self::Duplicate(what),
            other => Self::Store(other),
        }
    }
}

impl TopoError {
    /// Create cancellation error
    #[inline]
    #[must_use]
    pub fn cancelled(reason: CancelReason) -> Self {
        Self::Cancelled { reason }
    }

    /// Create integrity veto
    #[inline]
    pub fn blocked(reason: impl Into<String>) -> Self {
        Self::IntegrityBlocked {
            reason: reason.into(),
        }
    }

    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::Cancelled { reason } => *reason == CancelReason::CallTimeout,
            _ => false,
        }
    }

    /// Whether a batch row failing with this error counts as an error
    ///
    /// Duplicates are skipped rows, not failures.
    #[inline]
    #[must_use]
    pub fn is_fatal_for_batch_row(&self) -> bool {
        !matches!(self, Self::Duplicate(_))
    }

    /// Whether the error must stop a whole batch
    #[inline]
    #[must_use]
    pub fn aborts_batch(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_duplicates_become_duplicates() {
        let err: TopoError = StoreError::Duplicate("edge".into()).into();
        assert_eq!(err, TopoError::Duplicate("edge".into()));
        assert!(!err.is_fatal_for_batch_row());

        let err: TopoError = StoreError::Unavailable("down".into()).into();
        assert!(err.is_retryable());
        assert!(err.is_fatal_for_batch_row());
    }

    #[test]
    fn only_cancellation_aborts_batches() {
        assert!(TopoError::cancelled(CancelReason::Requested).aborts_batch());
        assert!(!TopoError::Validation("x".into()).aborts_batch());
    }
}
