//! Engine assembly
//!
//! [`TopoEngine`] wires every component once from a [`TopoConfig`] and the
//! five store collaborators. Components only see the narrow interfaces they
//! need and are never rewired afterwards.

use crate::config::TopoConfig;
use crate::context::CallContext;
use crate::deletion::{Deletability, DeletionChecker, RemovalEntry};
use crate::error::TopoError;
use crate::finder::{base_condition, InstanceFinder};
use crate::locks::InstanceLocks;
use crate::operations::{InstSelector, InstanceOperations};
use crate::resolver::{AssociationQuery, AssociationQueryResolver};
use crate::synchronizer::{AssociationSynchronizer, SyncReport};
use crate::topology::{InstTopo, TopoInstGroup, TopologyBuilder};
use crate::validator::ReferenceValidator;
use std::sync::Arc;
use topo_model::{BatchResult, Condition, InstId, InstResult, ObjectKind, QueryInput, Record};
use topo_store::{AuditSink, EdgeStore, HostBindings, InstanceStore, ModelCatalog};
use tracing::info;

/// External collaborators of the engine
#[derive(Clone)]
pub struct Collaborators {
    /// Instance records
    pub instances: Arc<dyn InstanceStore>,
    /// Association edges
    pub edges: Arc<dyn EdgeStore>,
    /// Model layer
    pub catalog: Arc<dyn ModelCatalog>,
    /// Host bindings
    pub bindings: Arc<dyn HostBindings>,
    /// Mutation audit trail
    pub audit: Arc<dyn AuditSink>,
}

impl Collaborators {
    /// Use one backend for every collaborator
    pub fn from_shared<S>(store: Arc<S>) -> Self
    where
        S: InstanceStore + EdgeStore + ModelCatalog + HostBindings + AuditSink + 'static,
    {
        Self {
            instances: store.clone(),
            edges: store.clone(),
            catalog: store.clone(),
            bindings: store.clone(),
            audit: store,
        }
    }
}

/// Instance/association graph engine
pub struct TopoEngine {
    config: TopoConfig,
    finder: Arc<InstanceFinder>,
    checker: Arc<DeletionChecker>,
    topology: TopologyBuilder,
    resolver: AssociationQueryResolver,
    operations: InstanceOperations,
}

impl TopoEngine {
    /// Assemble the engine
    ///
    /// # Errors
    /// `Config` when the configuration is invalid
    pub fn new(config: TopoConfig, stores: Collaborators) -> Result<Self, TopoError> {
        config.validate()?;
        let delimiter = config.reference_delimiter.clone();

        let finder = Arc::new(InstanceFinder::new(
            stores.instances.clone(),
            stores.catalog.clone(),
            delimiter.clone(),
        ));
        let validator = Arc::new(ReferenceValidator::new(stores.instances.clone()));
        let synchronizer = Arc::new(AssociationSynchronizer::new(
            stores.catalog.clone(),
            stores.edges.clone(),
            validator,
            finder.clone(),
            delimiter,
        ));
        let checker = Arc::new(DeletionChecker::new(
            stores.catalog.clone(),
            stores.bindings.clone(),
            finder.clone(),
            config.host_bearing_kind.clone(),
            config.max_hierarchy_depth,
        ));
        let topology = TopologyBuilder::new(
            stores.catalog.clone(),
            stores.edges.clone(),
            finder.clone(),
        );
        let resolver = AssociationQueryResolver::new(stores.edges.clone(), finder.clone());
        let operations = InstanceOperations::new(
            &config,
            stores.instances,
            stores.edges,
            stores.catalog,
            stores.audit,
            finder.clone(),
            synchronizer,
            checker.clone(),
            Arc::new(InstanceLocks::new()),
        );

        info!(
            owner = %config.default_owner,
            host_bearing_kind = %config.host_bearing_kind,
            max_depth = config.max_hierarchy_depth,
            "topograph engine ready"
        );
        Ok(Self {
            config,
            finder,
            checker,
            topology,
            resolver,
            operations,
        })
    }

    /// Active configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &TopoConfig {
        &self.config
    }

    /// Fresh context scoped to the default owner with the configured call
    /// timeout
    #[must_use]
    pub fn context(&self) -> CallContext {
        CallContext::new(self.config.default_owner.clone())
            .with_call_timeout(self.config.store_call_timeout())
    }

    /// Resolve a kind
    ///
    /// # Errors
    /// `KindNotFound` when it is not registered
    pub async fn kind(&self, ctx: &CallContext, kind_id: &str) -> Result<ObjectKind, TopoError> {
        self.finder.kind(ctx, kind_id).await
    }

    /// Base instance lookup with association-field expansion
    ///
    /// # Errors
    /// See [`InstanceFinder::find`]
    pub async fn find_inst(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        query: &QueryInput,
        detail: bool,
    ) -> Result<InstResult, TopoError> {
        let mut scoped = query.clone();
        let mut cond = base_condition(kind, ctx.owner());
        cond.extend(query.condition.clauses().iter().cloned());
        scoped.condition = cond;
        self.finder.find(ctx, kind, &scoped, detail).await
    }

    /// See [`InstanceOperations::create_inst`]
    ///
    /// # Errors
    /// As the delegate
    pub async fn create_inst(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        data: Record,
    ) -> Result<InstId, TopoError> {
        self.operations.create_inst(ctx, kind, data).await
    }

    /// See [`InstanceOperations::update_inst`]
    ///
    /// # Errors
    /// As the delegate
    pub async fn update_inst(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        data: Record,
        selector: &InstSelector,
    ) -> Result<u64, TopoError> {
        self.operations.update_inst(ctx, kind, data, selector).await
    }

    /// See [`InstanceOperations::delete_inst`]
    ///
    /// # Errors
    /// As the delegate
    pub async fn delete_inst(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        condition: &Condition,
    ) -> Result<Vec<RemovalEntry>, TopoError> {
        self.operations.delete_inst(ctx, kind, condition).await
    }

    /// See [`InstanceOperations::delete_inst_by_ids`]
    ///
    /// # Errors
    /// As the delegate
    pub async fn delete_inst_by_ids(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        ids: &[InstId],
    ) -> Result<Vec<RemovalEntry>, TopoError> {
        self.operations.delete_inst_by_ids(ctx, kind, ids).await
    }

    /// See [`InstanceOperations::create_inst_batch`]
    ///
    /// # Errors
    /// As the delegate
    pub async fn create_inst_batch(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        rows: Vec<Record>,
    ) -> Result<BatchResult, TopoError> {
        self.operations.create_inst_batch(ctx, kind, rows).await
    }

    /// Resynchronise the association edges of one instance
    ///
    /// # Errors
    /// See [`InstanceOperations::sync_inst`]
    pub async fn sync_inst(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        inst_id: InstId,
    ) -> Result<SyncReport, TopoError> {
        self.operations.sync_inst(ctx, kind, inst_id).await
    }

    /// Deletion safety check without removing anything
    ///
    /// # Errors
    /// See [`DeletionChecker::check_deletable`]
    pub async fn check_deletable(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        inst_id: InstId,
    ) -> Result<Deletability, TopoError> {
        self.checker.check_deletable(ctx, kind, inst_id).await
    }

    /// Child groups of one instance
    ///
    /// # Errors
    /// See [`TopologyBuilder::child_view`]
    pub async fn child_topo(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        inst_id: InstId,
    ) -> Result<Vec<TopoInstGroup>, TopoError> {
        self.topology.child_view(ctx, kind, inst_id).await
    }

    /// Parent groups of one instance
    ///
    /// # Errors
    /// See [`TopologyBuilder::parent_view`]
    pub async fn parent_topo(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        inst_id: InstId,
    ) -> Result<Vec<TopoInstGroup>, TopoError> {
        self.topology.parent_view(ctx, kind, inst_id).await
    }

    /// Combined views of every selected instance, in match order
    ///
    /// # Errors
    /// See [`TopologyBuilder::combined_view`]
    pub async fn inst_topo(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        selector: &InstSelector,
    ) -> Result<Vec<InstTopo>, TopoError> {
        let query = QueryInput::new(selector.to_condition(ctx, kind));
        self.topology.combined_view(ctx, kind, &query).await
    }

    /// Cross-kind association query
    ///
    /// # Errors
    /// See [`AssociationQueryResolver::resolve`]
    pub async fn find_by_association(
        &self,
        ctx: &CallContext,
        target: &ObjectKind,
        query: &AssociationQuery,
    ) -> Result<InstResult, TopoError> {
        self.resolver.resolve(ctx, target, query).await
    }
}
