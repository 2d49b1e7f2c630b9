//! Consumed store interfaces
//!
//! The engine reaches all durable state through these traits. Each call is a
//! suspension point; nothing is cached between calls.

use crate::error::StoreError;
use async_trait::async_trait;
use topo_model::{
    AssociationDef, Attribute, AuditEntry, Condition, Edge, InstId, InstResult, ObjectKind,
    QueryInput, Record,
};

/// Filtered access to instance records
///
/// Implementations route `kind` to its origin table (see
/// [`ObjectKind::object_type`]); they do not add the kind filter for common
/// kinds, callers put it in the condition.
#[async_trait]
pub trait InstanceStore: Send + Sync {
    /// Query records; `count` is the number of matches before pagination
    async fn search(&self, kind: &ObjectKind, query: &QueryInput) -> Result<InstResult, StoreError>;

    /// Insert a record, assigning the kind's id field when absent
    async fn create(&self, kind: &ObjectKind, record: Record) -> Result<InstId, StoreError>;

    /// Merge `data` into every matching record, returning the match count
    async fn update(
        &self,
        kind: &ObjectKind,
        data: &Record,
        condition: &Condition,
    ) -> Result<u64, StoreError>;

    /// Remove every matching record, returning the removal count
    async fn delete(&self, kind: &ObjectKind, condition: &Condition) -> Result<u64, StoreError>;
}

/// Association edge index
#[async_trait]
pub trait EdgeStore: Send + Sync {
    /// Persist an edge; `Duplicate` when the identity tuple already exists
    async fn create(&self, edge: Edge) -> Result<(), StoreError>;

    /// Remove every matching edge
    async fn delete(&self, condition: &Condition) -> Result<u64, StoreError>;

    /// Edges matching the condition
    async fn search(&self, condition: &Condition) -> Result<Vec<Edge>, StoreError>;
}

/// Read-only view of the model layer
#[async_trait]
pub trait ModelCatalog: Send + Sync {
    /// Kind by identifier
    async fn find_kind(&self, kind_id: &str) -> Result<Option<ObjectKind>, StoreError>;

    /// Attributes declared on a kind
    async fn attributes(&self, kind_id: &str) -> Result<Vec<Attribute>, StoreError>;

    /// Association definitions whose source is `kind_id`
    async fn associations(&self, kind_id: &str) -> Result<Vec<AssociationDef>, StoreError>;

    /// Association definitions whose target is `kind_id`
    async fn associations_to(&self, kind_id: &str) -> Result<Vec<AssociationDef>, StoreError>;
}

/// Host-to-container binding lookup
#[async_trait]
pub trait HostBindings: Send + Sync {
    /// Whether any host is bound to one of the given instances of `kind_id`
    async fn has_binding(&self, kind_id: &str, inst_ids: &[InstId]) -> Result<bool, StoreError>;
}

/// Receiver of mutation audit entries
///
/// Persistence format is up to the implementation.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Record one committed mutation
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError>;
}
