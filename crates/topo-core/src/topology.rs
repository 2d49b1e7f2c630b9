//! Topology views
//!
//! Groups an instance's direct neighbours by kind. Children are mainline
//! children plus targets of outgoing association edges; parents are the
//! mainline parent plus owners of incoming edges. Groups appear in order of
//! first discovery.

use crate::context::CallContext;
use crate::error::TopoError;
use crate::finder::{base_condition, descriptor, InstanceFinder};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use topo_model::fields::{ASST_INST_ID, ASST_OBJ_ID, INST_ID, OBJ_ID, OWNER_ID, PARENT_ID};
use topo_model::{Condition, InstId, InstNameAsst, KindId, ObjectKind, QueryInput, Record};
use topo_store::{EdgeStore, ModelCatalog};
use tracing::debug;

/// Neighbours of one kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopoInstGroup {
    /// Neighbour kind
    #[serde(rename = "bk_obj_id")]
    pub kind_id: KindId,
    /// Kind display name
    #[serde(rename = "bk_obj_name")]
    pub kind_name: String,
    /// Kind icon
    #[serde(rename = "bk_obj_icon")]
    pub kind_icon: String,
    /// Number of neighbours of this kind
    pub count: usize,
    /// Neighbour descriptors
    pub children: Vec<InstNameAsst>,
}

impl TopoInstGroup {
    fn new(kind: &ObjectKind) -> Self {
        Self {
            kind_id: kind.id.clone(),
            kind_name: kind.name.clone(),
            kind_icon: kind.icon.clone(),
            count: 0,
            children: Vec::new(),
        }
    }
}

/// Combined view of one instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstTopo {
    /// Parent groups
    pub prev: Vec<TopoInstGroup>,
    /// The instance itself
    pub curr: InstNameAsst,
    /// Child groups
    pub next: Vec<TopoInstGroup>,
}

#[derive(Default)]
struct Grouper {
    groups: IndexMap<KindId, TopoInstGroup>,
}

impl Grouper {
    fn add(&mut self, kind: &ObjectKind, rows: &[Record]) -> Result<(), TopoError> {
        if rows.is_empty() {
            return Ok(());
        }
        let group = self
            .groups
            .entry(kind.id.clone())
            .or_insert_with(|| TopoInstGroup::new(kind));
        for row in rows {
            let desc = descriptor(kind, row)?;
            if !group.children.iter().any(|c| c.inst_id == desc.inst_id) {
                group.children.push(desc);
            }
        }
        group.count = group.children.len();
        Ok(())
    }

    fn finish(self) -> Vec<TopoInstGroup> {
        self.groups.into_values().collect()
    }
}

/// Builds parent, child and combined neighbour views
pub struct TopologyBuilder {
    catalog: Arc<dyn ModelCatalog>,
    edges: Arc<dyn EdgeStore>,
    finder: Arc<InstanceFinder>,
}

impl TopologyBuilder {
    /// Create builder
    #[must_use]
    pub fn new(
        catalog: Arc<dyn ModelCatalog>,
        edges: Arc<dyn EdgeStore>,
        finder: Arc<InstanceFinder>,
    ) -> Self {
        Self {
            catalog,
            edges,
            finder,
        }
    }

    /// Children of one instance grouped by kind
    ///
    /// # Errors
    /// Store failures and cancellation
    pub async fn child_view(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        inst_id: InstId,
    ) -> Result<Vec<TopoInstGroup>, TopoError> {
        let mut grouper = Grouper::default();

        let defs = ctx
            .guard("search_associations", self.catalog.associations(kind.id.as_str()))
            .await?;
        for def in defs.iter().filter(|d| d.is_mainline()) {
            let child = self.finder.kind(ctx, def.asst_obj_id.as_str()).await?;
            let cond = base_condition(&child, ctx.owner()).eq(PARENT_ID, inst_id);
            let rows = self.finder.find_origin(ctx, &child, &QueryInput::new(cond)).await?;
            grouper.add(&child, &rows.info)?;
        }

        let outgoing = Condition::new()
            .eq(OBJ_ID, kind.id.as_str())
            .eq(INST_ID, inst_id)
            .eq(OWNER_ID, ctx.owner().as_str());
        let edges = ctx.guard("search_edges", self.edges.search(&outgoing)).await?;
        let mut targets: IndexMap<KindId, Vec<InstId>> = IndexMap::new();
        for edge in edges {
            targets.entry(edge.asst_obj_id).or_default().push(edge.asst_inst_id);
        }
        self.add_neighbours(ctx, &mut grouper, targets).await?;

        let groups = grouper.finish();
        debug!(kind = %kind.id, inst_id, groups = groups.len(), "child view built");
        Ok(groups)
    }

    /// Parents of one instance grouped by kind
    ///
    /// An instance that does not exist has no parents.
    ///
    /// # Errors
    /// Store failures and cancellation
    pub async fn parent_view(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        inst_id: InstId,
    ) -> Result<Vec<TopoInstGroup>, TopoError> {
        let mut grouper = Grouper::default();
        let Some(record) = self.finder.find_one(ctx, kind, inst_id).await? else {
            return Ok(Vec::new());
        };

        if let Some(parent_id) = record.get(PARENT_ID).and_then(|v| v.as_i64().ok()) {
            let defs = ctx
                .guard(
                    "search_associations",
                    self.catalog.associations_to(kind.id.as_str()),
                )
                .await?;
            for def in defs.iter().filter(|d| d.is_mainline()) {
                let parent = self.finder.kind(ctx, def.object_id.as_str()).await?;
                let rows = self.finder.find_by_ids(ctx, &parent, &[parent_id]).await?;
                grouper.add(&parent, &rows)?;
            }
        }

        let incoming = Condition::new()
            .eq(ASST_OBJ_ID, kind.id.as_str())
            .eq(ASST_INST_ID, inst_id)
            .eq(OWNER_ID, ctx.owner().as_str());
        let edges = ctx.guard("search_edges", self.edges.search(&incoming)).await?;
        let mut sources: IndexMap<KindId, Vec<InstId>> = IndexMap::new();
        for edge in edges {
            sources.entry(edge.obj_id).or_default().push(edge.inst_id);
        }
        self.add_neighbours(ctx, &mut grouper, sources).await?;

        let groups = grouper.finish();
        debug!(kind = %kind.id, inst_id, groups = groups.len(), "parent view built");
        Ok(groups)
    }

    /// Parent view, descriptor and child view of every instance matched
    ///
    /// # Errors
    /// Store failures and cancellation
    pub async fn combined_view(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        query: &QueryInput,
    ) -> Result<Vec<InstTopo>, TopoError> {
        let matched = self.finder.find_origin(ctx, kind, query).await?;
        let mut views = Vec::with_capacity(matched.info.len());
        for row in &matched.info {
            let curr = descriptor(kind, row)?;
            let (prev, next) = futures::try_join!(
                self.parent_view(ctx, kind, curr.inst_id),
                self.child_view(ctx, kind, curr.inst_id),
            )?;
            views.push(InstTopo { prev, curr, next });
        }
        Ok(views)
    }

    async fn add_neighbours(
        &self,
        ctx: &CallContext,
        grouper: &mut Grouper,
        by_kind: IndexMap<KindId, Vec<InstId>>,
    ) -> Result<(), TopoError> {
        for (kind_id, ids) in by_kind {
            let kind = self.finder.kind(ctx, kind_id.as_str()).await?;
            let rows = self.finder.find_by_ids(ctx, &kind, &ids).await?;
            grouper.add(&kind, &rows)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grouper_counts_distinct_neighbours() {
        let switch = ObjectKind::common("switch", "Switch");
        let rows = vec![
            Record::new().with("bk_inst_id", 1).with("bk_inst_name", "a"),
            Record::new().with("bk_inst_id", 2).with("bk_inst_name", "b"),
            Record::new().with("bk_inst_id", 1).with("bk_inst_name", "a"),
        ];
        let mut grouper = Grouper::default();
        grouper.add(&switch, &rows).unwrap();
        grouper.add(&ObjectKind::common("rack", "Rack"), &[]).unwrap();

        let groups = grouper.finish();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].count, 2);
        assert_eq!(groups[0].kind_name, "Switch");
    }
}
