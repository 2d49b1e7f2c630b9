//! Association edge synchronisation
//!
//! Reconciles the edge set of one instance with the reference lists encoded
//! in its association-typed attributes. For every target kind the edges of
//! the `(kind, instance, target kind)` triple are deleted outright and
//! rebuilt from the ids that still resolve, across every attribute pointing
//! at that kind; each attribute value is then rewritten to exactly its
//! surviving ids.
//!
//! Callers hold the instance's [`InstanceGuard`] for the whole call, which
//! serialises concurrent saves of the same instance.

use crate::context::CallContext;
use crate::error::TopoError;
use crate::finder::{record_id, InstanceFinder};
use crate::locks::InstanceGuard;
use crate::validator::ReferenceValidator;
use indexmap::{IndexMap, IndexSet};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use topo_model::fields::{ASST_OBJ_ID, INST_ID, OBJ_ID, OWNER_ID};
use topo_model::{
    encode_reference_ids, reference_ids, AssociationDef, AttrValue, Attribute, Condition, Edge,
    InstId, KindId, ObjectKind, Record,
};
use topo_store::{EdgeStore, ModelCatalog};
use tracing::{debug, info, warn};

/// Outcome for one association-typed attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeSync {
    /// Attribute name
    pub attribute: String,
    /// Target kind
    pub target: KindId,
    /// Ids that now have edges
    pub kept: Vec<InstId>,
    /// Ids dropped because they did not resolve
    pub dropped: Vec<InstId>,
}

/// Outcome of one synchronisation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Per-attribute results, grouped by target kind in declaration order
    pub attributes: Vec<AttributeSync>,
}

impl SyncReport {
    /// Total number of dropped references
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.attributes.iter().map(|a| a.dropped.len()).sum()
    }

    /// Record holding the rewritten attribute values
    #[must_use]
    pub fn rewritten(&self, delimiter: &str) -> Record {
        self.attributes
            .iter()
            .map(|a| {
                (
                    a.attribute.clone(),
                    AttrValue::from(encode_reference_ids(&a.kept, delimiter)),
                )
            })
            .collect()
    }
}

struct Planned<'a> {
    attribute: &'a Attribute,
    def: &'a AssociationDef,
    ids: Vec<InstId>,
}

/// Parse every association-typed attribute present in `record`
///
/// Returns `(attribute, ids)` pairs with duplicates removed, first
/// occurrence kept.
///
/// # Errors
/// `Validation` naming the attribute when a value is malformed
pub fn parse_association_values<'a>(
    attributes: &'a [Attribute],
    record: &Record,
    delimiter: &str,
) -> Result<Vec<(&'a Attribute, Vec<InstId>)>, TopoError> {
    let mut parsed = Vec::new();
    for attribute in attributes.iter().filter(|a| a.is_association()) {
        let Some(value) = record.get(&attribute.property_id) else {
            continue;
        };
        let ids: IndexSet<InstId> = reference_ids(value, delimiter)
            .map_err(|e| TopoError::Validation(format!("{}: {e}", attribute.property_id)))?
            .into_iter()
            .collect();
        parsed.push((attribute, ids.into_iter().collect()));
    }
    Ok(parsed)
}

/// Keeps association edges consistent with encoded reference lists
pub struct AssociationSynchronizer {
    catalog: Arc<dyn ModelCatalog>,
    edges: Arc<dyn EdgeStore>,
    validator: Arc<ReferenceValidator>,
    finder: Arc<InstanceFinder>,
    delimiter: String,
}

impl AssociationSynchronizer {
    /// Create synchronizer over the given collaborators
    #[must_use]
    pub fn new(
        catalog: Arc<dyn ModelCatalog>,
        edges: Arc<dyn EdgeStore>,
        validator: Arc<ReferenceValidator>,
        finder: Arc<InstanceFinder>,
        delimiter: impl Into<String>,
    ) -> Self {
        Self {
            catalog,
            edges,
            validator,
            finder,
            delimiter: delimiter.into(),
        }
    }

    /// Delimiter used when rewriting attribute values
    #[inline]
    #[must_use]
    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    /// Synchronise the edges of `record` and rewrite its association values
    ///
    /// `record` must carry the instance id. Only the in-memory record is
    /// rewritten; persisting it is the caller's job, still under `guard`.
    ///
    /// # Errors
    /// - `Validation` for malformed reference lists (nothing is written) or a
    ///   guard that does not cover the instance
    /// - `KindNotFound` when a definition targets an unknown kind
    /// - store failures and cancellation, which may leave the triple being
    ///   processed with a partial edge set
    pub async fn sync(
        &self,
        ctx: &CallContext,
        guard: &InstanceGuard,
        kind: &ObjectKind,
        record: &mut Record,
    ) -> Result<SyncReport, TopoError> {
        let inst_id = record_id(kind, record)?;
        if !guard.covers(&kind.id, inst_id) {
            return Err(TopoError::Validation(format!(
                "lock on {} {} does not cover {} {inst_id}",
                guard.kind(),
                guard.inst_id(),
                kind.id
            )));
        }

        let attributes = ctx
            .guard("search_attributes", self.catalog.attributes(kind.id.as_str()))
            .await?;
        let defs = ctx
            .guard("search_associations", self.catalog.associations(kind.id.as_str()))
            .await?;

        // Parse everything before the first write
        let plan: Vec<Planned<'_>> = parse_association_values(&attributes, record, &self.delimiter)?
            .into_iter()
            .filter_map(|(attribute, ids)| {
                defs.iter()
                    .find(|d| !d.is_pseudo() && d.object_att_id == attribute.property_id)
                    .map(|def| Planned { attribute, def, ids })
            })
            .collect();

        // Attributes sharing a target kind share one edge set
        let mut groups: IndexMap<KindId, Vec<Planned<'_>>> = IndexMap::new();
        for planned in plan {
            groups
                .entry(planned.def.asst_obj_id.clone())
                .or_default()
                .push(planned);
        }

        let mut report = SyncReport::default();
        for (target_id, members) in &groups {
            let outcomes = self.sync_target(ctx, kind, inst_id, target_id, members).await?;
            for outcome in outcomes {
                record.set(
                    outcome.attribute.clone(),
                    encode_reference_ids(&outcome.kept, &self.delimiter),
                );
                report.attributes.push(outcome);
            }
        }

        if report.dropped() > 0 {
            info!(
                kind = %kind.id,
                inst_id,
                dropped = report.dropped(),
                "association sync dropped invalid references"
            );
        }
        Ok(report)
    }

    /// Rebuild the edges from one instance to one target kind
    ///
    /// The edge set becomes the union of the validated ids of every member
    /// attribute; an id listed by two attributes gets one edge.
    async fn sync_target(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        inst_id: InstId,
        target_id: &KindId,
        members: &[Planned<'_>],
    ) -> Result<Vec<AttributeSync>, TopoError> {
        let target = self.finder.kind(ctx, target_id.as_str()).await?;

        let triple = Condition::new()
            .eq(OBJ_ID, kind.id.as_str())
            .eq(INST_ID, inst_id)
            .eq(ASST_OBJ_ID, target.id.as_str())
            .eq(OWNER_ID, ctx.owner().as_str());
        let removed = ctx.guard("delete_edges", self.edges.delete(&triple)).await?;

        let mut linked: HashSet<InstId> = HashSet::new();
        let mut outcomes = Vec::with_capacity(members.len());
        for planned in members {
            let mut kept = Vec::with_capacity(planned.ids.len());
            let mut dropped = Vec::new();
            for &asst_id in &planned.ids {
                if linked.contains(&asst_id) {
                    kept.push(asst_id);
                    continue;
                }
                match self.validator.is_valid(ctx, &target, asst_id).await {
                    Ok(()) => {}
                    Err(TopoError::ReferenceNotFound { .. }) => {
                        warn!(
                            kind = %kind.id,
                            inst_id,
                            attribute = %planned.attribute.property_id,
                            target = %target.id,
                            asst_id,
                            "dropping reference to missing instance"
                        );
                        dropped.push(asst_id);
                        continue;
                    }
                    Err(other) => return Err(other),
                }

                let edge = Edge::new(
                    kind.id.clone(),
                    inst_id,
                    target.id.clone(),
                    asst_id,
                    ctx.owner().clone(),
                );
                ctx.guard("create_edge", self.edges.create(edge)).await?;
                linked.insert(asst_id);
                kept.push(asst_id);
            }
            outcomes.push(AttributeSync {
                attribute: planned.attribute.property_id.clone(),
                target: target.id.clone(),
                kept,
                dropped,
            });
        }

        debug!(
            kind = %kind.id,
            inst_id,
            target = %target.id,
            attributes = members.len(),
            removed,
            created = linked.len(),
            "association edges rebuilt"
        );
        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_model::PropertyType;

    fn attrs() -> Vec<Attribute> {
        vec![
            Attribute::new("rack", "height", PropertyType::Int),
            Attribute::new("rack", "switches", PropertyType::MultiAsst),
            Attribute::new("rack", "owner_team", PropertyType::SingleAsst),
        ]
    }

    #[test]
    fn parse_dedupes_and_skips_absent() {
        let attributes = attrs();
        let record = Record::new().with("height", 4).with("switches", "7,9,7");
        let parsed = parse_association_values(&attributes, &record, ",").unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].0.property_id, "switches");
        assert_eq!(parsed[0].1, vec![7, 9]);
    }

    #[test]
    fn parse_names_the_bad_attribute() {
        let attributes = attrs();
        let record = Record::new().with("switches", "7,x");
        let err = parse_association_values(&attributes, &record, ",").unwrap_err();
        assert!(matches!(err, TopoError::Validation(msg) if msg.starts_with("switches")));
    }

    #[test]
    fn report_rewrites_kept_ids() {
        let report = SyncReport {
            attributes: vec![AttributeSync {
                attribute: "switches".into(),
                target: KindId::new("switch"),
                kept: vec![1, 2],
                dropped: vec![999],
            }],
        };
        assert_eq!(report.dropped(), 1);
        assert_eq!(
            report.rewritten(","),
            Record::new().with("switches", "1,2")
        );
    }
}
