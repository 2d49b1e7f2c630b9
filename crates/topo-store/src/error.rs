//! Store errors

/// Errors returned by store backends
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Backend could not be reached or failed the call
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Record or edge already exists
    #[error("duplicate item: {0}")]
    Duplicate(String),

    /// Condition uses an operator the backend cannot evaluate
    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// Condition operand has the wrong shape for its operator
    #[error("invalid condition: {0}")]
    InvalidCondition(String),

    /// Record cannot be stored as given
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Snapshot could not be read or decoded
    #[error("snapshot error: {0}")]
    Snapshot(String),
}

impl StoreError {
    /// Check if error is transient
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<topo_model::ModelError> for StoreError {
    fn from(err: topo_model::ModelError) -> Self {
        Self::InvalidRecord(err.to_string())
    }
}
