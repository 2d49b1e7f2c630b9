//! Store failures, deadlines and cancellation

use async_trait::async_trait;
use mockall::mock;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use topo_core::prelude::*;
use topo_core::CancelReason;
use topo_model::{Condition, Edge, InstId, InstResult, ObjectKind, QueryInput, Record};
use topo_store::{EdgeStore, InstanceStore, MemoryStore, StoreError};
use topo_test_utils::{edge_targets, ids, rack, seeded_store, shared_store, switch};

mock! {
    pub Instances {}

    #[async_trait]
    impl InstanceStore for Instances {
        async fn search(&self, kind: &ObjectKind, query: &QueryInput) -> Result<InstResult, StoreError>;
        async fn create(&self, kind: &ObjectKind, record: Record) -> Result<InstId, StoreError>;
        async fn update(&self, kind: &ObjectKind, data: &Record, condition: &Condition) -> Result<u64, StoreError>;
        async fn delete(&self, kind: &ObjectKind, condition: &Condition) -> Result<u64, StoreError>;
    }
}

mock! {
    pub Edges {}

    #[async_trait]
    impl EdgeStore for Edges {
        async fn create(&self, edge: Edge) -> Result<(), StoreError>;
        async fn delete(&self, condition: &Condition) -> Result<u64, StoreError>;
        async fn search(&self, condition: &Condition) -> Result<Vec<Edge>, StoreError>;
    }
}

fn engine(store: Arc<MemoryStore>) -> TopoEngine {
    TopoEngine::new(TopoConfig::default(), Collaborators::from_shared(store)).unwrap()
}

#[tokio::test]
async fn test_store_failure_surfaces_from_lookup() {
    let mut instances = MockInstances::new();
    instances
        .expect_search()
        .returning(|_, _| Err(StoreError::Unavailable("connection refused".into())));

    let store = shared_store();
    let collaborators = Collaborators {
        instances: Arc::new(instances),
        ..Collaborators::from_shared(store)
    };
    let engine = TopoEngine::new(TopoConfig::default(), collaborators).unwrap();
    let ctx = engine.context();

    let err = engine
        .find_inst(&ctx, &rack(), &QueryInput::default(), false)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        TopoError::Store(StoreError::Unavailable("connection refused".into()))
    );
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_edge_store_failure_aborts_create() {
    let mut edges = MockEdges::new();
    edges.expect_delete().returning(|_| Ok(0));
    edges.expect_search().returning(|_| Ok(Vec::new()));
    edges
        .expect_create()
        .times(1)
        .returning(|_| Err(StoreError::Unavailable("edge index offline".into())));

    let store = shared_store();
    let collaborators = Collaborators {
        edges: Arc::new(edges),
        ..Collaborators::from_shared(store)
    };
    let engine = TopoEngine::new(TopoConfig::default(), collaborators).unwrap();
    let ctx = engine.context();

    let err = engine
        .create_inst(
            &ctx,
            &rack(),
            Record::new().with("bk_inst_name", "rack-z").with("switches", "1,2"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, TopoError::Store(StoreError::Unavailable(_))));
}

#[tokio::test]
async fn test_batch_aborts_on_store_outage_per_row_only() {
    let mut edges = MockEdges::new();
    edges.expect_delete().returning(|_| Ok(0));
    edges.expect_search().returning(|_| Ok(Vec::new()));
    edges
        .expect_create()
        .returning(|_| Err(StoreError::Unavailable("edge index offline".into())));

    let collaborators = Collaborators {
        edges: Arc::new(edges),
        ..Collaborators::from_shared(shared_store())
    };
    let engine = TopoEngine::new(TopoConfig::default(), collaborators).unwrap();
    let ctx = engine.context();

    let rows = vec![
        Record::new().with("bk_inst_name", "rack-p").with("switches", "1"),
        Record::new().with("bk_inst_name", "rack-q"),
    ];
    let result = engine.create_inst_batch(&ctx, &rack(), rows).await.unwrap();
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].starts_with("row 0: store error"));
    assert_eq!(result.success, vec!["1".to_string()]);
}

#[tokio::test]
async fn test_failed_create_is_rolled_back_and_retry_succeeds() {
    let store = shared_store();
    let before = store.rows("object").len();

    let mut edges = MockEdges::new();
    edges.expect_delete().returning(|_| Ok(0));
    edges.expect_search().returning(|_| Ok(Vec::new()));
    edges
        .expect_create()
        .returning(|_| Err(StoreError::Unavailable("down".into())));
    let collaborators = Collaborators {
        edges: Arc::new(edges),
        ..Collaborators::from_shared(store.clone())
    };
    let broken = TopoEngine::new(TopoConfig::default(), collaborators).unwrap();
    let ctx = broken.context();

    let rows = || vec![Record::new().with("bk_inst_name", "rack-p").with("switches", "1,999")];
    let result = broken.create_inst_batch(&ctx, &rack(), rows()).await.unwrap();
    assert_eq!(
        result.errors,
        vec!["row 0: store error: store unavailable: down".to_string()]
    );
    assert_eq!(store.rows("object").len(), before);
    assert!(store.audit_log().is_empty());

    let healthy = engine(store.clone());
    let ctx = healthy.context();
    let result = healthy.create_inst_batch(&ctx, &rack(), rows()).await.unwrap();
    assert!(result.errors.is_empty());
    assert_eq!(result.success, vec!["0".to_string()]);

    let row = store
        .rows("object")
        .into_iter()
        .find(|r| r.string("bk_inst_name").ok() == Some("rack-p"))
        .unwrap();
    assert_eq!(row.string("switches").unwrap(), "1");
    let id = row.int("bk_inst_id").unwrap();
    assert_eq!(edge_targets(&store, &rack(), id, &switch()), vec![ids::SWITCH_1]);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_create_leaves_nothing_behind() {
    let store = Arc::new(seeded_store().with_latency(Duration::from_millis(20)));
    let before = store.rows("object").len();
    let engine = engine(store.clone());
    let token = CancellationToken::new();
    let ctx = engine.context().with_cancellation(token.clone());

    let rack_obj = rack();
    let create = engine.create_inst(
        &ctx,
        &rack_obj,
        Record::new().with("bk_inst_name", "rack-c").with("switches", "1,7"),
    );
    let cancel = async {
        // Past the record write, inside edge synchronisation
        tokio::time::sleep(Duration::from_millis(150)).await;
        token.cancel();
    };
    let (outcome, ()) = tokio::join!(create, cancel);

    assert_eq!(outcome, Err(TopoError::cancelled(CancelReason::Requested)));
    assert_eq!(store.rows("object").len(), before);
    assert_eq!(store.edges().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_cancels_deletion_check() {
    let store = Arc::new(seeded_store().with_latency(Duration::from_secs(1)));
    let engine = engine(store);
    let ctx = engine.context().with_budget(Duration::from_millis(2500));

    let err = engine
        .check_deletable(&ctx, &ObjectKind::biz(), ids::BIZ)
        .await
        .unwrap_err();
    assert_eq!(err, TopoError::cancelled(CancelReason::DeadlineExpired));
}

#[tokio::test(start_paused = true)]
async fn test_call_timeout_cancels_slow_store() {
    let store = Arc::new(seeded_store().with_latency(Duration::from_secs(5)));
    let config = TopoConfig::default().with_store_call_timeout(Duration::from_millis(200));
    let engine = TopoEngine::new(config, Collaborators::from_shared(store)).unwrap();
    let ctx = engine.context();

    let err = engine.kind(&ctx, "rack").await.unwrap_err();
    assert_eq!(err, TopoError::cancelled(CancelReason::CallTimeout));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_cancelled_batch_stops() {
    let engine = engine(shared_store());
    let token = CancellationToken::new();
    let ctx = engine.context().with_cancellation(token.clone());
    token.cancel();

    let rows = vec![Record::new().with("bk_inst_name", "rack-late")];
    let err = engine
        .create_inst_batch(&ctx, &rack(), rows)
        .await
        .unwrap_err();
    assert_eq!(err, TopoError::cancelled(CancelReason::Requested));
}
