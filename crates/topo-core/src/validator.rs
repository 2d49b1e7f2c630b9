//! Reference validation

use crate::context::CallContext;
use crate::error::TopoError;
use crate::finder::instance_condition;
use std::sync::Arc;
use topo_model::{InstId, ObjectKind, Page, QueryInput};
use topo_store::InstanceStore;

/// Confirms that a referenced instance exists before an edge may point at it
pub struct ReferenceValidator {
    instances: Arc<dyn InstanceStore>,
}

impl ReferenceValidator {
    /// Create validator over the instance store
    #[must_use]
    pub fn new(instances: Arc<dyn InstanceStore>) -> Self {
        Self { instances }
    }

    /// Check that `inst_id` exists for `kind` within the caller's scope
    ///
    /// # Errors
    /// `ReferenceNotFound` when nothing matches; store failures and
    /// cancellation otherwise
    pub async fn is_valid(
        &self,
        ctx: &CallContext,
        kind: &ObjectKind,
        inst_id: InstId,
    ) -> Result<(), TopoError> {
        let query = QueryInput::new(instance_condition(kind, ctx.owner(), inst_id))
            .with_fields(vec![kind.inst_id_field.clone()])
            .with_page(Page::default().with_limit(1));
        let found = ctx
            .guard("validate_reference", self.instances.search(kind, &query))
            .await?;
        if found.count > 0 {
            Ok(())
        } else {
            Err(TopoError::ReferenceNotFound {
                kind: kind.id.clone(),
                inst_id,
            })
        }
    }
}
