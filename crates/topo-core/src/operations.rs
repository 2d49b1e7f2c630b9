//! Instance operations
//!
//! Create, update, delete and batch import on top of the synchronizer and the
//! deletion checker. Every save holds the instance lock across association
//! synchronisation and the record write; deletions run every veto before the
//! first removal. A create whose synchronisation fails is rolled back.
//!
//! Each committed mutation is reported to the [`AuditSink`] with before and
//! after snapshots. Audit failures are logged, never surfaced: the mutation
//! has already happened.

use crate::config::TopoConfig;
use crate::context::CallContext;
use crate::deletion::{Deletability, DeletionChecker, RemovalEntry};
use crate::error::TopoError;
use crate::finder::{base_condition, instance_condition, record_id, InstanceFinder};
use crate::locks::{InstanceGuard, InstanceLocks};
use crate::synchronizer::{parse_association_values, AssociationSynchronizer, SyncReport};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use topo_model::fields::{ASST_INST_ID, ASST_OBJ_ID, INST_ID, OBJ_ID, OWNER_ID};
use topo_model::{
    AttrValue, Attribute, AuditAction, AuditEntry, BatchResult, Condition, InstId, KindId,
    ObjectKind, OwnerId, QueryInput, Record,
};
use topo_store::{AuditSink, EdgeStore, InstanceStore, ModelCatalog};
use tracing::{debug, error, info, warn};

/// Which instances an update or view applies to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstSelector {
    /// One instance by id
    Id(InstId),
    /// Every instance matching a condition
    Condition(Condition),
}

impl InstSelector {
    /// Condition selecting the instances within `ctx`'s scope
    #[must_use]
    pub fn to_condition(&self, ctx: &CallContext, kind: &ObjectKind) -> Condition {
        match self {
            Self::Id(id) => instance_condition(kind, ctx.owner(), *id),
            Self::Condition(cond) => {
                let mut scoped = base_condition(kind, ctx.owner());
                scoped.extend(cond.clauses().iter().cloned());
                scoped
            }
        }
    }
}

impl From<InstId> for InstSelector {
    fn from(value: InstId) -> Self {
        Self::Id(value)
    }
}

impl From<Condition> for InstSelector {
    fn from(value: Condition) -> Self {
        Self::Condition(value)
    }
}

/// Create, update, delete and batch import of instances
pub struct InstanceOperations {
    instances: Arc<dyn InstanceStore>,
    edges: Arc<dyn EdgeStore>,
    catalog: Arc<dyn ModelCatalog>,
    audit: Arc<dyn AuditSink>,
    finder: Arc<InstanceFinder>,
    synchronizer: Arc<AssociationSynchronizer>,
    checker: Arc<DeletionChecker>,
    locks: Arc<InstanceLocks>,
    reject_referenced_delete: bool,
}

impl InstanceOperations {
    /// Create operations over the assembled components
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: &TopoConfig,
        instances: Arc<dyn InstanceStore>,
        edges: Arc<dyn EdgeStore>,
        catalog: Arc<dyn ModelCatalog>,
        audit: Arc<dyn AuditSink>,
        finder: Arc<InstanceFinder>,
        synchronizer: Arc<AssociationSynchronizer>,
        checker: Arc<DeletionChecker>,
        locks: Arc<InstanceLocks>,
    ) -> Self {
        Self {
            instances,
            edges,
            catalog,
            audit,
            finder,
            synchronizer,
            checker,
            locks,
            reject_referenced_delete: config.reject_referenced_delete,
        }
    }

    /// Create one instance and synchronise its associations
    ///
    /// # Errors
    /// - `Validation` for a missing required attribute or a malformed
    ///   reference list, before anything is written
    /// - `Duplicate` when the name is taken within kind and owner
    /// - store failures and cancellation; once the record is written, these
    ///   remove it and its edges again before returning
    pub async fn create_inst(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        mut data: Record,
    ) -> Result<InstId, TopoError> {
        ctx.check()?;
        data.set(OWNER_ID, ctx.owner().as_str());
        if kind.is_common() {
            data.set(OBJ_ID, kind.id.as_str());
        }

        let attributes = self.attributes(ctx, kind).await?;
        check_required(&attributes, &data, self.synchronizer.delimiter())?;
        self.check_unique_name(ctx, kind, &data, &[]).await?;
        parse_association_values(&attributes, &data, self.synchronizer.delimiter())?;

        let inst_id = ctx
            .guard("create_instance", self.instances.create(kind, data.clone()))
            .await?;
        data.set(kind.inst_id_field.clone(), inst_id);

        let guard = match self.locks.lock(ctx, &kind.id, inst_id).await {
            Ok(guard) => guard,
            Err(err) => {
                self.rollback_create(ctx, kind, inst_id).await;
                return Err(err);
            }
        };
        let report = match self.sync_and_persist(ctx, &guard, kind, &mut data).await {
            Ok(report) => report,
            Err(err) => {
                self.rollback_create(ctx, kind, inst_id).await;
                drop(guard);
                self.locks.prune();
                return Err(err);
            }
        };
        drop(guard);
        self.locks.prune();

        let entry = audit_entry(ctx, AuditAction::Create, &kind.id, inst_id)
            .with_after(Some(data));
        self.commit_audit(ctx, entry).await;

        info!(
            kind = %kind.id,
            inst_id,
            request_id = %ctx.request_id(),
            dropped = report.dropped(),
            "instance created"
        );
        Ok(inst_id)
    }

    /// Merge `data` into every selected instance and resynchronise
    ///
    /// Returns the number of instances updated.
    ///
    /// # Errors
    /// - `Validation` when `data` changes an identity field, blanks a
    ///   required attribute or carries a malformed reference list
    /// - `Duplicate` when the new name is taken
    /// - store failures and cancellation
    pub async fn update_inst(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        data: Record,
        selector: &InstSelector,
    ) -> Result<u64, TopoError> {
        ctx.check()?;
        for field in [kind.inst_id_field.as_str(), OBJ_ID, OWNER_ID] {
            if data.contains(field) {
                return Err(TopoError::Validation(format!("{field} cannot be updated")));
            }
        }

        let attributes = self.attributes(ctx, kind).await?;
        for attribute in attributes.iter().filter(|a| a.is_required) {
            if data.get(&attribute.property_id).is_some_and(AttrValue::is_blank) {
                return Err(TopoError::Validation(format!(
                    "required attribute {} cannot be emptied",
                    attribute.property_id
                )));
            }
        }
        parse_association_values(&attributes, &data, self.synchronizer.delimiter())?;

        let query = QueryInput::new(selector.to_condition(ctx, kind))
            .with_fields(vec![kind.inst_id_field.clone()]);
        let matched = self
            .finder
            .find_origin(ctx, kind, &query)
            .await?
            .info
            .iter()
            .map(|row| record_id(kind, row))
            .collect::<Result<Vec<_>, _>>()?;
        self.check_unique_name(ctx, kind, &data, &matched).await?;

        let mut updated = 0;
        for inst_id in matched {
            let guard = self.locks.lock(ctx, &kind.id, inst_id).await?;
            let Some(mut record) = self.finder.find_one(ctx, kind, inst_id).await? else {
                debug!(kind = %kind.id, inst_id, "instance vanished before update");
                continue;
            };
            let before = record.clone();
            record.merge(&data);
            let report = self.synchronizer.sync(ctx, &guard, kind, &mut record).await?;

            let mut changes = data.clone();
            changes.merge(&report.rewritten(self.synchronizer.delimiter()));
            let cond = instance_condition(kind, ctx.owner(), inst_id);
            updated += ctx
                .guard("update_instance", self.instances.update(kind, &changes, &cond))
                .await?;
            drop(guard);

            let entry = audit_entry(ctx, AuditAction::Update, &kind.id, inst_id)
                .with_before(Some(before))
                .with_after(Some(record));
            self.commit_audit(ctx, entry).await;
            info!(kind = %kind.id, inst_id, request_id = %ctx.request_id(), "instance updated");
        }
        self.locks.prune();
        Ok(updated)
    }

    /// Delete every instance matching `condition` together with its
    /// mainline subtree
    ///
    /// Returns what was removed, in pre-order per matched instance.
    ///
    /// # Errors
    /// - `IntegrityBlocked` when a host-bearing instance in some subtree
    ///   still has bound hosts, or (if configured) an instance is still
    ///   referenced from outside the removal set; nothing is removed
    /// - `CyclicHierarchy`, store failures and cancellation
    pub async fn delete_inst(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        condition: &Condition,
    ) -> Result<Vec<RemovalEntry>, TopoError> {
        ctx.check()?;
        let query = QueryInput::new(InstSelector::Condition(condition.clone()).to_condition(ctx, kind))
            .with_fields(vec![kind.inst_id_field.clone()]);
        let matched = self.finder.find_origin(ctx, kind, &query).await?;

        let mut removals: IndexSet<RemovalEntry> = IndexSet::new();
        for row in &matched.info {
            let inst_id = record_id(kind, row)?;
            match self.checker.check_deletable(ctx, kind, inst_id).await? {
                Deletability::Deletable { removals: subtree } => removals.extend(subtree),
                Deletability::Blocked {
                    kind: bearer,
                    inst_id: bearer_id,
                } => {
                    return Err(TopoError::blocked(format!(
                        "{bearer} {bearer_id} under {} {inst_id} still has bound hosts",
                        kind.id
                    )));
                }
            }
        }
        if self.reject_referenced_delete {
            self.check_unreferenced(ctx, &removals).await?;
        }

        // Children first so an interrupted run never strands a subtree
        for entry in removals.iter().rev() {
            self.remove(ctx, entry).await?;
        }
        self.locks.prune();

        info!(
            kind = %kind.id,
            matched = matched.info.len(),
            removed = removals.len(),
            request_id = %ctx.request_id(),
            "instances deleted"
        );
        Ok(removals.into_iter().collect())
    }

    /// Delete instances by id
    ///
    /// # Errors
    /// As [`InstanceOperations::delete_inst`]
    pub async fn delete_inst_by_ids(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        ids: &[InstId],
    ) -> Result<Vec<RemovalEntry>, TopoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cond = Condition::new().is_in(kind.inst_id_field.clone(), ids.iter().copied());
        self.delete_inst(ctx, kind, &cond).await
    }

    /// Import column-mapped rows
    ///
    /// Rows carrying the kind's id field update that instance; all others
    /// are created. A failing row never stops the batch; only cancellation
    /// does.
    ///
    /// # Errors
    /// `Cancelled` when the context expires mid-batch
    pub async fn create_inst_batch(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        rows: Vec<Record>,
    ) -> Result<BatchResult, TopoError> {
        let mut result = BatchResult::default();
        for (index, mut row) in rows.into_iter().enumerate() {
            if let Some(raw_id) = row.remove(&kind.inst_id_field) {
                let outcome = match raw_id.as_i64() {
                    Ok(inst_id) => self.update_inst(ctx, kind, row, &InstSelector::Id(inst_id)).await,
                    Err(err) => Err(err.into()),
                };
                match outcome {
                    Ok(0) => result.record_update_error(index, "instance not found"),
                    Ok(_) => result.record_success(index),
                    Err(err) if err.aborts_batch() => return Err(err),
                    Err(err) => result.record_update_error(index, err),
                }
                continue;
            }

            match self.create_inst(ctx, kind, row).await {
                Ok(_) => result.record_success(index),
                Err(err) if err.aborts_batch() => return Err(err),
                Err(err) if !err.is_fatal_for_batch_row() => {
                    debug!(kind = %kind.id, row = index, error = %err, "batch row already exists");
                    result.record_success(index);
                }
                Err(err) => result.record_error(index, err),
            }
        }

        if !result.is_clean() {
            warn!(
                kind = %kind.id,
                errors = result.errors.len(),
                update_errors = result.update_errors.len(),
                "batch finished with failed rows"
            );
        }
        Ok(result)
    }

    /// Lock, read and resynchronise one instance, persisting rewritten values
    ///
    /// # Errors
    /// `ReferenceNotFound` when the instance does not exist; otherwise as
    /// [`AssociationSynchronizer::sync`]
    pub async fn sync_inst(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        inst_id: InstId,
    ) -> Result<SyncReport, TopoError> {
        let guard = self.locks.lock(ctx, &kind.id, inst_id).await?;
        let outcome = match self.finder.find_one(ctx, kind, inst_id).await {
            Ok(Some(mut record)) => self.sync_and_persist(ctx, &guard, kind, &mut record).await,
            Ok(None) => Err(TopoError::ReferenceNotFound {
                kind: kind.id.clone(),
                inst_id,
            }),
            Err(err) => Err(err),
        };
        drop(guard);
        self.locks.prune();
        outcome
    }

    /// Synchronise `record` and write back its rewritten association values
    async fn sync_and_persist(
        &self,
        ctx: &CallContext,
        guard: &InstanceGuard,
        kind: &ObjectKind,
        record: &mut Record,
    ) -> Result<SyncReport, TopoError> {
        let report = self.synchronizer.sync(ctx, guard, kind, record).await?;
        if !report.attributes.is_empty() {
            let rewritten = report.rewritten(self.synchronizer.delimiter());
            let cond = instance_condition(kind, ctx.owner(), guard.inst_id());
            ctx.guard("update_instance", self.instances.update(kind, &rewritten, &cond))
                .await?;
        }
        Ok(report)
    }

    /// Remove a freshly created record and whatever edges it already has
    ///
    /// Runs detached from the request so a cancelled create is still undone.
    async fn rollback_create(&self, ctx: &CallContext, kind: &ObjectKind, inst_id: InstId) {
        let ctx = ctx.detached();
        let edges = ctx
            .guard(
                "delete_edges",
                self.edges.delete(&outgoing_edges(&kind.id, inst_id, ctx.owner())),
            )
            .await;
        let cond = instance_condition(kind, ctx.owner(), inst_id);
        let record = ctx
            .guard("delete_instance", self.instances.delete(kind, &cond))
            .await;
        match (edges, record) {
            (Ok(edges), Ok(_)) => {
                warn!(kind = %kind.id, inst_id, edges, "create rolled back");
            }
            (Err(err), _) | (_, Err(err)) => {
                error!(kind = %kind.id, inst_id, error = %err, "create rollback incomplete");
            }
        }
    }

    /// Report a committed mutation, even if the request was cancelled since
    async fn commit_audit(&self, ctx: &CallContext, entry: AuditEntry) {
        let (kind, inst_id, action) = (entry.kind.clone(), entry.inst_id, entry.action);
        let ctx = ctx.detached();
        if let Err(err) = ctx.guard("record_audit", self.audit.record(entry)).await {
            warn!(kind = %kind, inst_id, action = ?action, error = %err, "audit entry lost");
        }
    }

    async fn attributes(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
    ) -> Result<Vec<Attribute>, TopoError> {
        ctx.guard("search_attributes", self.catalog.attributes(kind.id.as_str()))
            .await
    }

    /// Reject a name already used by an instance outside `own`
    async fn check_unique_name(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        data: &Record,
        own: &[InstId],
    ) -> Result<(), TopoError> {
        let Some(name) = data.get(&kind.inst_name_field) else {
            return Ok(());
        };
        if own.len() > 1 {
            return Err(TopoError::Duplicate(format!(
                "{} {} would be shared by {} instances",
                kind.id,
                kind.inst_name_field,
                own.len()
            )));
        }
        let cond = base_condition(kind, ctx.owner()).eq(kind.inst_name_field.clone(), name.clone());
        let query = QueryInput::new(cond).with_fields(vec![kind.inst_id_field.clone()]);
        for row in self.finder.find_origin(ctx, kind, &query).await?.info {
            if !own.contains(&record_id(kind, &row)?) {
                return Err(TopoError::Duplicate(format!(
                    "{} {} already used",
                    kind.id, kind.inst_name_field
                )));
            }
        }
        Ok(())
    }

    async fn check_unreferenced(
        &self,
        ctx: &CallContext,
        removals: &IndexSet<RemovalEntry>,
    ) -> Result<(), TopoError> {
        for entry in removals {
            let incoming = incoming_edges(&entry.kind, entry.inst_id, ctx.owner());
            let edges = ctx.guard("search_edges", self.edges.search(&incoming)).await?;
            let outside = edges.iter().find(|edge| {
                !removals.contains(&RemovalEntry {
                    kind: edge.obj_id.clone(),
                    inst_id: edge.inst_id,
                })
            });
            if let Some(edge) = outside {
                warn!(
                    kind = %entry.kind,
                    inst_id = entry.inst_id,
                    source = %edge.obj_id,
                    source_id = edge.inst_id,
                    "deletion vetoed by incoming association"
                );
                return Err(TopoError::blocked(format!(
                    "{} {} is referenced by {} {}",
                    entry.kind, entry.inst_id, edge.obj_id, edge.inst_id
                )));
            }
        }
        Ok(())
    }

    async fn remove(&self, ctx: &CallContext, entry: &RemovalEntry) -> Result<(), TopoError> {
        let kind = self.finder.kind(ctx, entry.kind.as_str()).await?;
        let guard = self.locks.lock(ctx, &entry.kind, entry.inst_id).await?;
        let before = self.finder.find_one(ctx, &kind, entry.inst_id).await?;

        let incoming = incoming_edges(&entry.kind, entry.inst_id, ctx.owner());
        let outgoing = outgoing_edges(&entry.kind, entry.inst_id, ctx.owner());
        let dropped_in = ctx.guard("delete_edges", self.edges.delete(&incoming)).await?;
        let dropped_out = ctx.guard("delete_edges", self.edges.delete(&outgoing)).await?;

        let cond = instance_condition(&kind, ctx.owner(), entry.inst_id);
        ctx.guard("delete_instance", self.instances.delete(&kind, &cond))
            .await?;
        drop(guard);

        let audit = audit_entry(ctx, AuditAction::Delete, &entry.kind, entry.inst_id)
            .with_before(before);
        self.commit_audit(ctx, audit).await;
        debug!(
            kind = %entry.kind,
            inst_id = entry.inst_id,
            edges = dropped_in + dropped_out,
            "instance removed"
        );
        Ok(())
    }
}

fn audit_entry(
    ctx: &CallContext,
    action: AuditAction,
    kind: &KindId,
    inst_id: InstId,
) -> AuditEntry {
    AuditEntry::new(
        action,
        kind.clone(),
        inst_id,
        ctx.owner().clone(),
        ctx.request_id().to_string(),
    )
}

/// Edges pointing at one instance
fn incoming_edges(kind: &KindId, inst_id: InstId, owner: &OwnerId) -> Condition {
    Condition::new()
        .eq(ASST_OBJ_ID, kind.as_str())
        .eq(ASST_INST_ID, inst_id)
        .eq(OWNER_ID, owner.as_str())
}

/// Edges leaving one instance
fn outgoing_edges(kind: &KindId, inst_id: InstId, owner: &OwnerId) -> Condition {
    Condition::new()
        .eq(OBJ_ID, kind.as_str())
        .eq(INST_ID, inst_id)
        .eq(OWNER_ID, owner.as_str())
}

/// Required attributes must be present and non-blank
fn check_required(
    attributes: &[Attribute],
    data: &Record,
    delimiter: &str,
) -> Result<(), TopoError> {
    for attribute in attributes.iter().filter(|a| a.is_required) {
        let value = data.get(&attribute.property_id);
        if attribute.is_association() {
            let empty = match value {
                None => true,
                Some(value) => topo_model::reference_ids(value, delimiter)
                    .map(|ids| ids.is_empty())
                    .unwrap_or(false),
            };
            if empty {
                return Err(TopoError::Validation(format!(
                    "missing required association target: {}",
                    attribute.property_id
                )));
            }
        } else if value.map_or(true, AttrValue::is_blank) {
            return Err(TopoError::Validation(format!(
                "missing required attribute: {}",
                attribute.property_id
            )));
        }
    }
    Ok(())
}
