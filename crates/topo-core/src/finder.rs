//! Base instance lookup with association-field expansion
//!
//! Every engine read goes through [`InstanceFinder`]. Besides routing the
//! query to the kind's origin table it replaces the raw value of each
//! association-typed attribute with resolved [`InstNameAsst`] descriptors.

use crate::context::CallContext;
use crate::error::TopoError;
use indexmap::IndexSet;
use std::collections::HashMap;
use std::sync::Arc;
use topo_model::fields::{OBJ_ID, OWNER_ID};
use topo_model::{
    reference_ids, AttrValue, Condition, InstId, InstNameAsst, InstResult, KindId, ObjectKind,
    OwnerId, QueryInput, Record,
};
use topo_store::{InstanceStore, ModelCatalog};
use tracing::debug;

/// Owner scope plus, for common kinds, the kind filter of the shared table
#[must_use]
pub fn base_condition(kind: &ObjectKind, owner: &OwnerId) -> Condition {
    let cond = Condition::new().eq(OWNER_ID, owner.as_str());
    if kind.is_common() {
        cond.eq(OBJ_ID, kind.id.as_str())
    } else {
        cond
    }
}

/// Condition selecting one instance of `kind` within `owner`
#[must_use]
pub fn instance_condition(kind: &ObjectKind, owner: &OwnerId, inst_id: InstId) -> Condition {
    base_condition(kind, owner).eq(kind.inst_id_field.clone(), inst_id)
}

/// Instance id of a stored record
///
/// # Errors
/// `Model` when the id field is missing or not an integer
pub fn record_id(kind: &ObjectKind, record: &Record) -> Result<InstId, TopoError> {
    Ok(record.int(&kind.inst_id_field)?)
}

/// Display name of a stored record; non-string names are rendered
#[must_use]
pub fn record_name(kind: &ObjectKind, record: &Record) -> String {
    match record.get(&kind.inst_name_field) {
        Some(AttrValue::Str(name)) => name.clone(),
        Some(AttrValue::Int(n)) => n.to_string(),
        Some(AttrValue::Float(n)) => n.to_string(),
        _ => String::new(),
    }
}

/// Descriptor of a stored record
///
/// # Errors
/// `Model` when the id field is missing or not an integer
pub fn descriptor(kind: &ObjectKind, record: &Record) -> Result<InstNameAsst, TopoError> {
    Ok(InstNameAsst::new(
        kind,
        record_id(kind, record)?,
        record_name(kind, record),
    ))
}

/// Base instance lookup
pub struct InstanceFinder {
    instances: Arc<dyn InstanceStore>,
    catalog: Arc<dyn ModelCatalog>,
    delimiter: String,
}

impl InstanceFinder {
    /// Create finder over the given collaborators
    #[must_use]
    pub fn new(
        instances: Arc<dyn InstanceStore>,
        catalog: Arc<dyn ModelCatalog>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self {
            instances,
            catalog,
            delimiter: delimiter.into(),
        }
    }

    /// Resolve a kind from the model
    ///
    /// # Errors
    /// `KindNotFound` when the kind is not registered
    pub async fn kind(&self, ctx: &CallContext, kind_id: &str) -> Result<ObjectKind, TopoError> {
        ctx.guard("find_kind", self.catalog.find_kind(kind_id))
            .await?
            .ok_or_else(|| TopoError::KindNotFound(KindId::new(kind_id)))
    }

    /// Raw query against the kind's origin table, without expansion
    ///
    /// # Errors
    /// Store failures and cancellation
    pub async fn find_origin(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        query: &QueryInput,
    ) -> Result<InstResult, TopoError> {
        ctx.guard("search_instances", self.instances.search(kind, query))
            .await
    }

    /// Query with association-field expansion
    ///
    /// With `detail` each descriptor also carries the full target record.
    ///
    /// # Errors
    /// Store failures, cancellation, and `Validation` when a stored
    /// reference list is malformed
    pub async fn find(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        query: &QueryInput,
        detail: bool,
    ) -> Result<InstResult, TopoError> {
        let mut result = self.find_origin(ctx, kind, query).await?;
        if result.info.is_empty() {
            return Ok(result);
        }

        let defs = ctx
            .guard("search_associations", self.catalog.associations(kind.id.as_str()))
            .await?;
        for def in defs.iter().filter(|d| !d.is_pseudo()) {
            let attr = def.object_att_id.as_str();

            // Parse every row first so targets are fetched in one query
            let mut per_row: Vec<Option<Vec<InstId>>> = Vec::with_capacity(result.info.len());
            let mut wanted = IndexSet::new();
            for row in &result.info {
                match row.get(attr) {
                    Some(value) => {
                        let ids = reference_ids(value, &self.delimiter)
                            .map_err(|e| TopoError::Validation(format!("{attr}: {e}")))?;
                        wanted.extend(ids.iter().copied());
                        per_row.push(Some(ids));
                    }
                    None => per_row.push(None),
                }
            }
            if per_row.iter().all(Option::is_none) {
                continue;
            }

            let target = self.kind(ctx, def.asst_obj_id.as_str()).await?;
            let resolved = self.resolve(ctx, &target, &wanted, detail).await?;
            debug!(
                kind = %kind.id,
                attr,
                target = %target.id,
                wanted = wanted.len(),
                resolved = resolved.len(),
                "association field expanded"
            );

            for (row, ids) in result.info.iter_mut().zip(per_row) {
                let Some(ids) = ids else { continue };
                let refs: Vec<InstNameAsst> = ids
                    .iter()
                    .filter_map(|id| resolved.get(id).cloned())
                    .collect();
                row.set(attr, refs);
            }
        }
        Ok(result)
    }

    async fn resolve(
        &self,
        ctx: &CallContext,
        target: &ObjectKind,
        ids: &IndexSet<InstId>,
        detail: bool,
    ) -> Result<HashMap<InstId, InstNameAsst>, TopoError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let cond = base_condition(target, ctx.owner())
            .is_in(target.inst_id_field.clone(), ids.iter().copied());
        let rows = self.find_origin(ctx, target, &QueryInput::new(cond)).await?;

        let mut resolved = HashMap::with_capacity(rows.info.len());
        for row in rows.info {
            let mut desc = descriptor(target, &row)?;
            if detail {
                desc = desc.with_detail(row);
            }
            resolved.insert(desc.inst_id, desc);
        }
        Ok(resolved)
    }

    /// Instances of `kind` with the given ids, in store order, unexpanded
    ///
    /// # Errors
    /// Store failures and cancellation
    pub async fn find_by_ids(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        ids: &[InstId],
    ) -> Result<Vec<Record>, TopoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let cond = base_condition(kind, ctx.owner())
            .is_in(kind.inst_id_field.clone(), ids.iter().copied());
        Ok(self.find_origin(ctx, kind, &QueryInput::new(cond)).await?.info)
    }

    /// One instance of `kind`, unexpanded
    ///
    /// # Errors
    /// Store failures and cancellation
    pub async fn find_one(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        inst_id: InstId,
    ) -> Result<Option<Record>, TopoError> {
        let query = QueryInput::new(instance_condition(kind, ctx.owner(), inst_id));
        Ok(self.find_origin(ctx, kind, &query).await?.info.into_iter().next())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_model::fields::INST_ID;

    #[test]
    fn common_kinds_are_filtered_by_kind() {
        let owner = OwnerId::default();
        let rack = ObjectKind::common("rack", "Rack");
        assert!(base_condition(&rack, &owner).has_field(OBJ_ID));
        assert!(!base_condition(&ObjectKind::module(), &owner).has_field(OBJ_ID));
        assert!(instance_condition(&rack, &owner, 3).has_field(INST_ID));
    }

    #[test]
    fn names_render_non_strings() {
        let host = ObjectKind::host();
        let row = Record::new().with("bk_host_id", 9).with("bk_host_innerip", "10.0.0.9");
        let desc = descriptor(&host, &row).unwrap();
        assert_eq!(desc.inst_id, 9);
        assert_eq!(desc.inst_name, "10.0.0.9");

        let rack = ObjectKind::common("rack", "Rack");
        assert_eq!(record_name(&rack, &Record::new().with("bk_inst_name", 12)), "12");
    }
}
