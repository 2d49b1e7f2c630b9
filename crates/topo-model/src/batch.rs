//! Batch import results

use serde::{Deserialize, Serialize};

/// Outcome of a batch create/update
///
/// Failures are reported per row; one bad row never aborts the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Create failures, formatted `row {index}: {message}`
    #[serde(rename = "error", default)]
    pub errors: Vec<String>,
    /// Row indexes that were created, updated, or already existed
    #[serde(default)]
    pub success: Vec<String>,
    /// Update failures, formatted `row {index}: {message}`
    #[serde(rename = "update_error", default)]
    pub update_errors: Vec<String>,
}

impl BatchResult {
    /// Record a create failure for `row`
    pub fn record_error(&mut self, row: usize, message: impl std::fmt::Display) {
        self.errors.push(format!("row {row}: {message}"));
    }

    /// Record a successful row
    pub fn record_success(&mut self, row: usize) {
        self.success.push(row.to_string());
    }

    /// Record an update failure for `row`
    pub fn record_update_error(&mut self, row: usize, message: impl std::fmt::Display) {
        self.update_errors.push(format!("row {row}: {message}"));
    }

    /// Whether every row succeeded
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.update_errors.is_empty()
    }
}
