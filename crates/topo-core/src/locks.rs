//! Per-instance exclusive locks
//!
//! Saves of one instance are serialised: the lock is held across the whole
//! delete-then-recreate edge synchronisation and the record write. Locks are
//! process-local; instances written by other processes are not covered.

use crate::context::CallContext;
use crate::error::TopoError;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use topo_model::{InstId, KindId};
use tracing::trace;

type Slot = Arc<Mutex<()>>;

/// Lock table keyed by kind and instance id
#[derive(Debug, Default)]
pub struct InstanceLocks {
    slots: DashMap<(KindId, InstId), Slot>,
}

/// Proof that the holder has exclusive write access to one instance
#[derive(Debug)]
pub struct InstanceGuard {
    kind: KindId,
    inst_id: InstId,
    _guard: OwnedMutexGuard<()>,
}

impl InstanceGuard {
    /// Locked kind
    #[inline]
    #[must_use]
    pub fn kind(&self) -> &KindId {
        &self.kind
    }

    /// Locked instance
    #[inline]
    #[must_use]
    pub fn inst_id(&self) -> InstId {
        self.inst_id
    }

    /// Whether this guard covers `kind`/`inst_id`
    #[inline]
    #[must_use]
    pub fn covers(&self, kind: &KindId, inst_id: InstId) -> bool {
        &self.kind == kind && self.inst_id == inst_id
    }
}

impl InstanceLocks {
    /// Create empty lock table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to one instance
    ///
    /// # Errors
    /// `Cancelled` when the context expires while waiting
    pub async fn lock(
        &self,
        ctx: &CallContext,
        kind: &KindId,
        inst_id: InstId,
    ) -> Result<InstanceGuard, TopoError> {
        let slot: Slot = self
            .slots
            .entry((kind.clone(), inst_id))
            .or_default()
            .value()
            .clone();
        let guard = ctx.run(slot.lock_owned()).await?;
        trace!(kind = %kind, inst_id, "instance locked");
        Ok(InstanceGuard {
            kind: kind.clone(),
            inst_id,
            _guard: guard,
        })
    }

    /// Drop slots nobody holds or waits on
    pub fn prune(&self) {
        self.slots.retain(|_, slot| Arc::strong_count(slot) > 1);
    }

    /// Number of tracked slots
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no slot is tracked
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_instance_is_exclusive() {
        let locks = Arc::new(InstanceLocks::new());
        let ctx = CallContext::default();
        let kind = KindId::new("rack");

        let first = locks.lock(&ctx, &kind, 1).await.unwrap();
        let waiter = {
            let locks = Arc::clone(&locks);
            let ctx = ctx.clone();
            let kind = kind.clone();
            tokio::spawn(async move { locks.lock(&ctx, &kind, 1).await.map(|g| g.inst_id()) })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        // A different instance is not blocked
        let other = locks.lock(&ctx, &kind, 2).await.unwrap();
        assert!(other.covers(&kind, 2));

        drop(first);
        assert_eq!(waiter.await.unwrap(), Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_honours_deadline() {
        let locks = InstanceLocks::new();
        let kind = KindId::new("rack");
        let _held = locks.lock(&CallContext::default(), &kind, 7).await.unwrap();

        let ctx = CallContext::default().with_budget(Duration::from_millis(20));
        assert!(matches!(
            locks.lock(&ctx, &kind, 7).await,
            Err(TopoError::Cancelled { .. })
        ));
    }

    #[tokio::test]
    async fn prune_keeps_held_slots() {
        let locks = InstanceLocks::new();
        let ctx = CallContext::default();
        let kind = KindId::new("rack");
        let held = locks.lock(&ctx, &kind, 1).await.unwrap();
        drop(locks.lock(&ctx, &kind, 2).await.unwrap());

        locks.prune();
        assert_eq!(locks.len(), 1);
        drop(held);
        locks.prune();
        assert!(locks.is_empty());
    }
}
