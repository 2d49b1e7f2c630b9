//! Deletion safety over the mainline hierarchy
//!
//! Walks the mainline subtree under a candidate instance, pre-order, and
//! reports either the full removal list or the first host-bearing instance
//! that still has bound hosts. A veto blocks the whole deletion, not only the
//! offending subtree.
//!
//! The check is best effort: a host bound after the check but before the
//! removal is not detected.

use crate::context::CallContext;
use crate::error::TopoError;
use crate::finder::{base_condition, record_id, InstanceFinder};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use topo_model::fields::PARENT_ID;
use topo_model::{InstId, KindId, ObjectKind, QueryInput};
use topo_store::{HostBindings, ModelCatalog};
use tracing::{debug, warn};

/// One instance scheduled for removal
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RemovalEntry {
    /// Kind of the instance
    pub kind: KindId,
    /// Instance id
    pub inst_id: InstId,
}

/// Result of a deletion safety check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Deletability {
    /// Safe to delete; entries in pre-order, candidate first
    Deletable {
        /// Instances to remove
        removals: Vec<RemovalEntry>,
    },
    /// A host-bearing instance in the subtree still has bound hosts
    Blocked {
        /// Kind of the bearing instance
        kind: KindId,
        /// Bearing instance
        inst_id: InstId,
    },
}

impl Deletability {
    /// Whether the deletion is vetoed
    #[inline]
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, Self::Blocked { .. })
    }
}

/// Recursive host-binding check over mainline children
pub struct DeletionChecker {
    catalog: Arc<dyn ModelCatalog>,
    bindings: Arc<dyn HostBindings>,
    finder: Arc<InstanceFinder>,
    host_bearing_kind: KindId,
    max_depth: usize,
}

impl DeletionChecker {
    /// Create checker
    #[must_use]
    pub fn new(
        catalog: Arc<dyn ModelCatalog>,
        bindings: Arc<dyn HostBindings>,
        finder: Arc<InstanceFinder>,
        host_bearing_kind: KindId,
        max_depth: usize,
    ) -> Self {
        Self {
            catalog,
            bindings,
            finder,
            host_bearing_kind,
            max_depth,
        }
    }

    /// Check whether `inst_id` of `kind` and its mainline subtree can go
    ///
    /// # Errors
    /// `CyclicHierarchy` when an instance is reached twice or the subtree is
    /// deeper than the configured bound; store failures and cancellation
    pub async fn check_deletable(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        inst_id: InstId,
    ) -> Result<Deletability, TopoError> {
        let mut kinds: HashMap<KindId, ObjectKind> = HashMap::new();
        kinds.insert(kind.id.clone(), kind.clone());

        let mut removals = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![(kind.id.clone(), inst_id, 0usize)];

        while let Some((kind_id, id, depth)) = stack.pop() {
            ctx.check()?;
            if depth > self.max_depth || !visited.insert((kind_id.clone(), id)) {
                warn!(kind = %kind_id, inst_id = id, depth, "mainline cycle detected");
                return Err(TopoError::CyclicHierarchy { kind: kind_id, inst_id: id });
            }
            let current = self.kind_of(ctx, &mut kinds, &kind_id).await?;

            if self.bears_hosts(&current) {
                let bound = ctx
                    .guard(
                        "has_host_binding",
                        self.bindings.has_binding(current.id.as_str(), &[id]),
                    )
                    .await?;
                if bound {
                    warn!(kind = %kind_id, inst_id = id, "deletion vetoed by bound hosts");
                    return Ok(Deletability::Blocked { kind: kind_id, inst_id: id });
                }
            }
            removals.push(RemovalEntry {
                kind: kind_id.clone(),
                inst_id: id,
            });

            let children = self.mainline_children(ctx, &mut kinds, &current, id).await?;
            // Reverse so the first child is visited next
            for (child_kind, child_id) in children.into_iter().rev() {
                stack.push((child_kind, child_id, depth + 1));
            }
        }

        debug!(kind = %kind.id, inst_id, removals = removals.len(), "deletion check passed");
        Ok(Deletability::Deletable { removals })
    }

    fn bears_hosts(&self, kind: &ObjectKind) -> bool {
        !kind.is_common() && kind.id == self.host_bearing_kind
    }

    async fn kind_of(
        &self,
        ctx: &CallContext,
        cache: &mut HashMap<KindId, ObjectKind>,
        kind_id: &KindId,
    ) -> Result<ObjectKind, TopoError> {
        if let Some(kind) = cache.get(kind_id) {
            return Ok(kind.clone());
        }
        let kind = self.finder.kind(ctx, kind_id.as_str()).await?;
        cache.insert(kind_id.clone(), kind.clone());
        Ok(kind)
    }

    /// Direct mainline children, grouped by child kind in definition order
    async fn mainline_children(
        &self,
        ctx: &CallContext,
        kinds: &mut HashMap<KindId, ObjectKind>,
        parent: &ObjectKind,
        parent_id: InstId,
    ) -> Result<Vec<(KindId, InstId)>, TopoError> {
        let defs = ctx
            .guard("search_associations", self.catalog.associations(parent.id.as_str()))
            .await?;

        let mut children = Vec::new();
        for def in defs.iter().filter(|d| d.is_mainline()) {
            let child = self.kind_of(ctx, kinds, &def.asst_obj_id).await?;
            let cond = base_condition(&child, ctx.owner()).eq(PARENT_ID, parent_id);
            let query = QueryInput::new(cond).with_fields(vec![child.inst_id_field.clone()]);
            let rows = self.finder.find_origin(ctx, &child, &query).await?;
            for row in &rows.info {
                children.push((child.id.clone(), record_id(&child, row)?));
            }
        }
        Ok(children)
    }
}
