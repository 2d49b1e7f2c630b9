//! Audit entries for instance mutations

use crate::ids::{InstId, KindId, OwnerId};
use crate::value::Record;
use serde::{Deserialize, Serialize};

/// Kind of mutation audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Instance created
    Create,
    /// Instance updated
    Update,
    /// Instance removed
    Delete,
}

/// One audited mutation of one instance
///
/// `before` is absent for creates, `after` for deletes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// What happened
    pub action: AuditAction,
    /// Kind of the instance
    #[serde(rename = "bk_obj_id")]
    pub kind: KindId,
    /// Instance id
    #[serde(rename = "bk_inst_id")]
    pub inst_id: InstId,
    /// Owning account
    #[serde(rename = "bk_supplier_account")]
    pub owner: OwnerId,
    /// Correlation id of the request that made the change
    pub request_id: String,
    /// Record before the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<Record>,
    /// Record after the change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<Record>,
}

impl AuditEntry {
    /// Create entry without snapshots
    #[must_use]
    pub fn new(
        action: AuditAction,
        kind: impl Into<KindId>,
        inst_id: InstId,
        owner: OwnerId,
        request_id: impl Into<String>,
    ) -> Self {
        Self {
            action,
            kind: kind.into(),
            inst_id,
            owner,
            request_id: request_id.into(),
            before: None,
            after: None,
        }
    }

    /// With the record as it was
    #[inline]
    #[must_use]
    pub fn with_before(mut self, record: Option<Record>) -> Self {
        self.before = record;
        self
    }

    /// With the record as it is now
    #[inline]
    #[must_use]
    pub fn with_after(mut self, record: Option<Record>) -> Self {
        self.after = record;
        self
    }
}
