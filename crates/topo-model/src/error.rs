//! Model-level errors

/// Errors raised while converting or interpreting model values
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Value has a different tag than the one requested
    #[error("type mismatch: expected {expected}, found {found}")]
    TypeMismatch {
        /// Requested tag
        expected: &'static str,
        /// Actual tag
        found: &'static str,
    },

    /// Record does not carry the requested field
    #[error("missing field: {0}")]
    MissingField(String),

    /// Token of an encoded reference list is not an integer id
    #[error("malformed reference `{token}`: not an integer id")]
    MalformedReference {
        /// Offending token
        token: String,
    },

    /// Operator string is not recognised
    #[error("unknown condition operator: {0}")]
    UnknownOperator(String),
}
