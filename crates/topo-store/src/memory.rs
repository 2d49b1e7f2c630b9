//! In-memory store backend
//!
//! [`MemoryStore`] implements every store trait over process-local tables.
//! Instance rows are held per origin table in a `DashMap`; edges, model
//! definitions, host bindings and the audit log sit behind `parking_lot`
//! locks. No guard is ever held across an `.await`.

use crate::error::StoreError;
use crate::filter::matches;
use crate::traits::{AuditSink, EdgeStore, HostBindings, InstanceStore, ModelCatalog};
use async_trait::async_trait;
use dashmap::DashMap;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicI64, Ordering as AtomicOrdering};
use std::time::Duration;
use topo_model::fields::KIND_MODULE;
use topo_model::{
    AssociationDef, AttrValue, Attribute, AuditEntry, Condition, Edge, InstId, InstResult, KindId,
    ObjectKind, Page, QueryInput, Record,
};
use tracing::{debug, trace};

/// A host bound to a host-bearing container instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostBinding {
    /// Bound host
    #[serde(rename = "bk_host_id")]
    pub host_id: InstId,
    /// Kind of the bearing instance
    #[serde(rename = "bk_obj_id", default = "default_bearer_kind")]
    pub bearer_kind: KindId,
    /// Bearing instance
    #[serde(rename = "bk_inst_id")]
    pub bearer_id: InstId,
}

fn default_bearer_kind() -> KindId {
    KindId::new(KIND_MODULE)
}

impl HostBinding {
    /// Bind `host_id` to module `module_id`
    #[must_use]
    pub fn module(host_id: InstId, module_id: InstId) -> Self {
        Self {
            host_id,
            bearer_kind: default_bearer_kind(),
            bearer_id: module_id,
        }
    }
}

/// In-memory implementation of all store traits
#[derive(Debug)]
pub struct MemoryStore {
    /// Origin table name -> rows in insertion order
    tables: DashMap<String, Vec<Record>>,
    next_id: AtomicI64,
    edges: RwLock<Vec<Edge>>,
    kinds: RwLock<IndexMap<KindId, ObjectKind>>,
    attributes: RwLock<Vec<Attribute>>,
    associations: RwLock<Vec<AssociationDef>>,
    bindings: RwLock<Vec<HostBinding>>,
    audit: RwLock<Vec<AuditEntry>>,
    /// Artificial delay applied to every trait call
    latency: Option<Duration>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            next_id: AtomicI64::new(1),
            edges: RwLock::new(Vec::new()),
            kinds: RwLock::new(IndexMap::new()),
            attributes: RwLock::new(Vec::new()),
            associations: RwLock::new(Vec::new()),
            bindings: RwLock::new(Vec::new()),
            audit: RwLock::new(Vec::new()),
            latency: None,
        }
    }

    /// With a delay before every store call
    #[inline]
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Register a kind
    pub fn register_kind(&self, kind: ObjectKind) {
        self.kinds.write().insert(kind.id.clone(), kind);
    }

    /// Registered kind by identifier
    #[must_use]
    pub fn kind(&self, kind_id: &str) -> Option<ObjectKind> {
        self.kinds.read().get(kind_id).cloned()
    }

    /// Register an attribute
    pub fn add_attribute(&self, attribute: Attribute) {
        self.attributes.write().push(attribute);
    }

    /// Register an association definition
    pub fn add_association(&self, def: AssociationDef) {
        let mut defs = self.associations.write();
        if !defs.contains(&def) {
            defs.push(def);
        }
    }

    /// Bind a host to a bearing instance
    pub fn bind_host(&self, binding: HostBinding) {
        self.bindings.write().push(binding);
    }

    /// Audit entries recorded so far, oldest first
    #[must_use]
    pub fn audit_log(&self) -> Vec<AuditEntry> {
        self.audit.read().clone()
    }

    /// Remove every binding of `host_id`
    pub fn unbind_host(&self, host_id: InstId) {
        self.bindings.write().retain(|b| b.host_id != host_id);
    }

    /// Insert a record synchronously, assigning an id when absent
    ///
    /// # Errors
    /// `Duplicate` when the id is already taken in the kind's table,
    /// `InvalidRecord` when the id field is not an integer
    pub fn insert(&self, kind: &ObjectKind, mut record: Record) -> Result<InstId, StoreError> {
        let id = match record.get(&kind.inst_id_field) {
            Some(value) => {
                let id = value.as_i64()?;
                self.next_id
                    .fetch_max(id.saturating_add(1), AtomicOrdering::SeqCst);
                id
            }
            None => {
                let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
                record.set(kind.inst_id_field.clone(), id);
                id
            }
        };

        let mut rows = self.tables.entry(kind.object_type().to_string()).or_default();
        let taken = rows
            .iter()
            .any(|row| row.get(&kind.inst_id_field) == Some(&AttrValue::Int(id)));
        if taken {
            return Err(StoreError::Duplicate(format!(
                "{} {}={id}",
                kind.id, kind.inst_id_field
            )));
        }
        rows.push(record);
        trace!(kind = %kind.id, id, "row inserted");
        Ok(id)
    }

    /// Snapshot of all rows in a table
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .get(table)
            .map(|rows| rows.value().clone())
            .unwrap_or_default()
    }

    /// Snapshot of all edges
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        self.edges.read().clone()
    }

    /// Insert an edge synchronously
    ///
    /// # Errors
    /// `Duplicate` when the identity tuple already exists
    pub fn insert_edge(&self, edge: Edge) -> Result<(), StoreError> {
        let mut edges = self.edges.write();
        if edges.iter().any(|e| e.key() == edge.key()) {
            return Err(StoreError::Duplicate(format!(
                "edge {}:{} -> {}:{}",
                edge.obj_id, edge.inst_id, edge.asst_obj_id, edge.asst_inst_id
            )));
        }
        edges.push(edge);
        Ok(())
    }

    async fn delay(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn select(&self, table: &str, condition: &Condition) -> Result<Vec<Record>, StoreError> {
        let Some(rows) = self.tables.get(table) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        for row in rows.iter() {
            if matches(row, condition)? {
                out.push(row.clone());
            }
        }
        Ok(out)
    }
}

/// Evaluate the condition over every row before anything is mutated
fn match_mask(rows: &[Record], condition: &Condition) -> Result<Vec<bool>, StoreError> {
    rows.iter().map(|row| matches(row, condition)).collect()
}

fn remove_hits<T>(items: &mut Vec<T>, hits: Vec<bool>) -> u64 {
    let removed = hits.iter().filter(|hit| **hit).count() as u64;
    let mut hits = hits.into_iter();
    items.retain(|_| !hits.next().unwrap_or(false));
    removed
}

fn sort_rows(rows: &mut [Record], page: &Page) {
    let Some((field, descending)) = page.sort_key() else {
        return;
    };
    rows.sort_by(|a, b| {
        let ord = match (a.get(field), b.get(field)) {
            (Some(x), Some(y)) => x.compare(y).unwrap_or(Ordering::Equal),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };
        if descending {
            ord.reverse()
        } else {
            ord
        }
    });
}

#[async_trait]
impl InstanceStore for MemoryStore {
    async fn search(&self, kind: &ObjectKind, query: &QueryInput) -> Result<InstResult, StoreError> {
        self.delay().await;
        let mut rows = self.select(kind.object_type(), &query.condition)?;
        sort_rows(&mut rows, &query.page);

        let count = rows.len() as u64;
        let limit = query.page.limit.unwrap_or(usize::MAX);
        let info = rows
            .into_iter()
            .skip(query.page.start)
            .take(limit)
            .map(|row| row.project(&query.fields))
            .collect();
        debug!(kind = %kind.id, count, "instance search");
        Ok(InstResult { count, info })
    }

    async fn create(&self, kind: &ObjectKind, record: Record) -> Result<InstId, StoreError> {
        self.delay().await;
        self.insert(kind, record)
    }

    async fn update(
        &self,
        kind: &ObjectKind,
        data: &Record,
        condition: &Condition,
    ) -> Result<u64, StoreError> {
        self.delay().await;
        let Some(mut rows) = self.tables.get_mut(kind.object_type()) else {
            return Ok(0);
        };
        let hits = match_mask(&rows, condition)?;
        let mut updated = 0;
        for (row, hit) in rows.iter_mut().zip(hits) {
            if hit {
                row.merge(data);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete(&self, kind: &ObjectKind, condition: &Condition) -> Result<u64, StoreError> {
        self.delay().await;
        let Some(mut rows) = self.tables.get_mut(kind.object_type()) else {
            return Ok(0);
        };
        let hits = match_mask(&rows, condition)?;
        Ok(remove_hits(&mut rows, hits))
    }
}

#[async_trait]
impl EdgeStore for MemoryStore {
    async fn create(&self, edge: Edge) -> Result<(), StoreError> {
        self.delay().await;
        self.insert_edge(edge)
    }

    async fn delete(&self, condition: &Condition) -> Result<u64, StoreError> {
        self.delay().await;
        let mut edges = self.edges.write();
        let rows: Vec<Record> = edges.iter().map(Edge::to_record).collect();
        let hits = match_mask(&rows, condition)?;
        Ok(remove_hits(&mut edges, hits))
    }

    async fn search(&self, condition: &Condition) -> Result<Vec<Edge>, StoreError> {
        self.delay().await;
        let edges = self.edges.read();
        let mut out = Vec::new();
        for edge in edges.iter() {
            if matches(&edge.to_record(), condition)? {
                out.push(edge.clone());
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl ModelCatalog for MemoryStore {
    async fn find_kind(&self, kind_id: &str) -> Result<Option<ObjectKind>, StoreError> {
        self.delay().await;
        Ok(self.kind(kind_id))
    }

    async fn attributes(&self, kind_id: &str) -> Result<Vec<Attribute>, StoreError> {
        self.delay().await;
        Ok(self
            .attributes
            .read()
            .iter()
            .filter(|a| a.kind_id.as_str() == kind_id)
            .cloned()
            .collect())
    }

    async fn associations(&self, kind_id: &str) -> Result<Vec<AssociationDef>, StoreError> {
        self.delay().await;
        Ok(self
            .associations
            .read()
            .iter()
            .filter(|d| d.object_id.as_str() == kind_id)
            .cloned()
            .collect())
    }

    async fn associations_to(&self, kind_id: &str) -> Result<Vec<AssociationDef>, StoreError> {
        self.delay().await;
        Ok(self
            .associations
            .read()
            .iter()
            .filter(|d| d.asst_obj_id.as_str() == kind_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HostBindings for MemoryStore {
    async fn has_binding(&self, kind_id: &str, inst_ids: &[InstId]) -> Result<bool, StoreError> {
        self.delay().await;
        Ok(self
            .bindings
            .read()
            .iter()
            .any(|b| b.bearer_kind.as_str() == kind_id && inst_ids.contains(&b.bearer_id)))
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn record(&self, entry: AuditEntry) -> Result<(), StoreError> {
        self.delay().await;
        trace!(kind = %entry.kind, inst_id = entry.inst_id, action = ?entry.action, "audit entry recorded");
        self.audit.write().push(entry);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use topo_model::{OwnerId, Page};

    fn rack() -> ObjectKind {
        ObjectKind::common("rack", "Rack")
    }

    fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        store.register_kind(rack());
        for name in ["r-03", "r-01", "r-02"] {
            store
                .insert(&rack(), Record::new().with("bk_obj_id", "rack").with("bk_inst_name", name))
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn search_counts_before_pagination() {
        let store = seeded();
        let query = QueryInput::new(Condition::new().eq("bk_obj_id", "rack"))
            .with_page(Page::default().with_sort("bk_inst_name").with_limit(2))
            .with_fields(vec!["bk_inst_name".into()]);
        let result = InstanceStore::search(&store, &rack(), &query).await.unwrap();
        assert_eq!(result.count, 3);
        assert_eq!(result.info.len(), 2);
        assert_eq!(result.info[0], Record::new().with("bk_inst_name", "r-01"));
    }

    #[tokio::test]
    async fn explicit_ids_are_unique_per_table() {
        let store = MemoryStore::new();
        let id = store.insert(&rack(), Record::new().with("bk_inst_id", 40)).unwrap();
        assert_eq!(id, 40);
        assert!(matches!(
            store.insert(&rack(), Record::new().with("bk_inst_id", 40)),
            Err(StoreError::Duplicate(_))
        ));
        assert_eq!(store.insert(&rack(), Record::new()).unwrap(), 41);
    }

    #[tokio::test]
    async fn update_merges_matching_rows() {
        let store = seeded();
        let n = InstanceStore::update(
            &store,
            &rack(),
            &Record::new().with("height", 42),
            &Condition::new().eq("bk_inst_name", "r-02"),
        )
        .await
        .unwrap();
        assert_eq!(n, 1);
        let rows = store.rows("object");
        assert!(rows.iter().any(|r| r.get("height") == Some(&AttrValue::Int(42))));
    }

    #[tokio::test]
    async fn duplicate_edges_are_rejected() {
        let store = MemoryStore::new();
        let edge = Edge::new("rack", 1, "switch", 7, OwnerId::default());
        EdgeStore::create(&store, edge.clone()).await.unwrap();
        assert!(matches!(
            EdgeStore::create(&store, edge).await,
            Err(StoreError::Duplicate(_))
        ));

        let removed = EdgeStore::delete(&store, &Condition::new().eq("bk_inst_id", 1))
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.edges().is_empty());
    }

    #[tokio::test]
    async fn host_bindings_by_bearer() {
        let store = MemoryStore::new();
        store.bind_host(HostBinding::module(100, 5));
        assert!(store.has_binding("module", &[4, 5]).await.unwrap());
        assert!(!store.has_binding("module", &[4]).await.unwrap());
        store.unbind_host(100);
        assert!(!store.has_binding("module", &[5]).await.unwrap());
    }

    #[tokio::test]
    async fn catalog_filters_by_direction() {
        let store = MemoryStore::new();
        store.add_association(AssociationDef::new("rack", "switches", "switch"));
        store.add_association(AssociationDef::mainline("set", "module"));
        assert_eq!(store.associations("rack").await.unwrap().len(), 1);
        assert_eq!(store.associations_to("module").await.unwrap().len(), 1);
        assert!(store.associations_to("rack").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn audit_entries_keep_order() {
        use topo_model::AuditAction;

        let store = MemoryStore::new();
        for (action, id) in [(AuditAction::Create, 1), (AuditAction::Delete, 1)] {
            store
                .record(AuditEntry::new(action, "rack", id, OwnerId::default(), "req"))
                .await
                .unwrap();
        }
        let actions: Vec<_> = store.audit_log().iter().map(|e| e.action).collect();
        assert_eq!(actions, vec![AuditAction::Create, AuditAction::Delete]);
    }
}
