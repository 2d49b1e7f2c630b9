//! Cross-kind association queries
//!
//! Answers "instances of kind T associated with instances of kind F that
//! match C" over a flat store. Each foreign kind contributes the set of
//! target ids reachable through edges from its matching instances; the sets
//! are unioned and applied as a membership filter on the target query.

use crate::context::CallContext;
use crate::error::TopoError;
use crate::finder::{base_condition, record_id, InstanceFinder};
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use topo_model::fields::{ASST_INST_ID, ASST_OBJ_ID, OBJ_ID, OWNER_ID};
use topo_model::{Clause, Condition, InstId, InstResult, KindId, ObjectKind, Page, QueryInput};
use topo_store::EdgeStore;
use tracing::debug;

/// Multi-kind query input
///
/// `condition` maps a kind to the clauses its instances must satisfy. The
/// entry for the target kind filters targets directly; every other entry is
/// a foreign constraint.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationQuery {
    /// Clauses per kind
    pub condition: IndexMap<KindId, Vec<Clause>>,
    /// Projection per kind; only the target kind's entry is used
    pub fields: IndexMap<KindId, Vec<String>>,
    /// Pagination and sort of the target query
    pub page: Page,
}

impl AssociationQuery {
    /// Create empty query
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With clauses for one kind
    #[inline]
    #[must_use]
    pub fn with_condition(mut self, kind: impl Into<KindId>, clauses: Vec<Clause>) -> Self {
        self.condition.entry(kind.into()).or_default().extend(clauses);
        self
    }

    /// With projection for one kind
    #[inline]
    #[must_use]
    pub fn with_fields(mut self, kind: impl Into<KindId>, fields: Vec<String>) -> Self {
        self.fields.insert(kind.into(), fields);
        self
    }

    /// With page
    #[inline]
    #[must_use]
    pub fn with_page(mut self, page: Page) -> Self {
        self.page = page;
        self
    }
}

/// Resolves multi-kind conditions to target instances
pub struct AssociationQueryResolver {
    edges: Arc<dyn EdgeStore>,
    finder: Arc<InstanceFinder>,
}

impl AssociationQueryResolver {
    /// Create resolver
    #[must_use]
    pub fn new(edges: Arc<dyn EdgeStore>, finder: Arc<InstanceFinder>) -> Self {
        Self { edges, finder }
    }

    /// Target instances satisfying every clause of `query`
    ///
    /// A foreign constraint that matches nothing matches no targets.
    ///
    /// # Errors
    /// `KindNotFound` for an unregistered foreign kind; store failures and
    /// cancellation
    pub async fn resolve(
        &self,
        ctx: &CallContext,
        target: &ObjectKind,
        query: &AssociationQuery,
    ) -> Result<InstResult, TopoError> {
        let mut cond = base_condition(target, ctx.owner());
        let mut candidates: IndexSet<InstId> = IndexSet::new();
        let mut foreign = 0usize;

        for (kind_id, clauses) in &query.condition {
            if *kind_id == target.id {
                cond.extend(clauses.iter().cloned());
                continue;
            }
            foreign += 1;
            let kind = self.finder.kind(ctx, kind_id.as_str()).await?;
            let reached = self.targets_via(ctx, target, &kind, clauses).await?;
            candidates.extend(reached);
        }

        if foreign > 0 {
            // Empty candidates still filter, matching nothing
            cond = cond.is_in(target.inst_id_field.clone(), candidates.iter().copied());
        }
        debug!(
            target = %target.id,
            foreign,
            candidates = candidates.len(),
            "association query planned"
        );

        let mut input = QueryInput::new(cond).with_page(query.page.clone());
        if let Some(fields) = query.fields.get(&target.id) {
            input = input.with_fields(fields.clone());
        }
        self.finder.find(ctx, target, &input, false).await
    }

    /// Target ids linked by edges to foreign instances matching `clauses`
    async fn targets_via(
        &self,
        ctx: &CallContext,
        target: &ObjectKind,
        foreign: &ObjectKind,
        clauses: &[Clause],
    ) -> Result<Vec<InstId>, TopoError> {
        let mut cond = base_condition(foreign, ctx.owner());
        cond.extend(clauses.iter().cloned());
        let query = QueryInput::new(cond).with_fields(vec![foreign.inst_id_field.clone()]);
        let rows = self.finder.find_origin(ctx, foreign, &query).await?;
        let ids = rows
            .info
            .iter()
            .map(|row| record_id(foreign, row))
            .collect::<Result<Vec<_>, _>>()?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let edge_cond = Condition::new()
            .eq(ASST_OBJ_ID, foreign.id.as_str())
            .eq(OBJ_ID, target.id.as_str())
            .eq(OWNER_ID, ctx.owner().as_str())
            .is_in(ASST_INST_ID, ids.iter().copied());
        let edges = ctx.guard("search_edges", self.edges.search(&edge_cond)).await?;
        debug!(
            target = %target.id,
            foreign = %foreign.id,
            matched = ids.len(),
            edges = edges.len(),
            "foreign constraint resolved"
        );
        Ok(edges.into_iter().map(|e| e.inst_id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_model::Operator;

    #[test]
    fn query_deserializes_from_kind_map() {
        let query: AssociationQuery = serde_json::from_str(
            r#"{
                "condition": {
                    "rack": [{"field": "height", "operator": "$gte", "value": 4}],
                    "switch": [{"field": "bk_inst_name", "operator": "$eq", "value": "sw-1"}]
                },
                "fields": {"rack": ["bk_inst_id"]},
                "page": {"limit": 10}
            }"#,
        )
        .unwrap();
        assert_eq!(query.condition.len(), 2);
        assert_eq!(query.condition["rack"][0].operator, Operator::Gte);
        assert_eq!(query.page.limit, Some(10));
        assert_eq!(query.fields.get("rack").map(Vec::len), Some(1));
    }
}
