//! Topology view tests

use pretty_assertions::assert_eq;
use std::sync::Arc;
use topo_core::prelude::*;
use topo_model::{Condition, ObjectKind};
use topo_store::MemoryStore;
use topo_test_utils::{ids, pdu, rack, shared_store, switch};

fn engine(store: Arc<MemoryStore>) -> TopoEngine {
    TopoEngine::new(TopoConfig::default(), Collaborators::from_shared(store)).unwrap()
}

fn summary(groups: &[TopoInstGroup]) -> Vec<(String, usize, Vec<i64>)> {
    groups
        .iter()
        .map(|g| {
            (
                g.kind_id.to_string(),
                g.count,
                g.children.iter().map(|c| c.inst_id).collect(),
            )
        })
        .collect()
}

#[tokio::test]
async fn test_child_view_groups_by_kind() {
    let engine = engine(shared_store());
    let ctx = engine.context();

    let groups = engine.child_topo(&ctx, &rack(), ids::RACK_A).await.unwrap();
    assert_eq!(
        summary(&groups),
        vec![
            ("switch".to_string(), 3, vec![1, 7, 9]),
            ("pdu".to_string(), 1, vec![ids::PDU]),
        ]
    );
    assert_eq!(groups[0].kind_name, switch().name);
    assert_eq!(groups[0].kind_icon, "icon-cc-switch");
    assert_eq!(groups[1].children[0].inst_name, "pdu-30");
}

#[tokio::test]
async fn test_combined_view_next_equals_child_view() {
    let engine = engine(shared_store());
    let ctx = engine.context();

    let children = engine.child_topo(&ctx, &rack(), ids::RACK_A).await.unwrap();
    let views = engine
        .inst_topo(&ctx, &rack(), &InstSelector::Id(ids::RACK_A))
        .await
        .unwrap();

    assert_eq!(views.len(), 1);
    assert_eq!(views[0].next, children);
    assert_eq!(views[0].curr.inst_id, ids::RACK_A);
    assert_eq!(views[0].curr.inst_name, "rack-a");
    assert!(views[0].prev.is_empty());
}

#[tokio::test]
async fn test_mainline_children_and_parent() {
    let engine = engine(shared_store());
    let ctx = engine.context();

    let children = engine
        .child_topo(&ctx, &ObjectKind::set(), ids::SET_WEB)
        .await
        .unwrap();
    assert_eq!(
        summary(&children),
        vec![(
            "module".to_string(),
            2,
            vec![ids::MODULE_NGINX, ids::MODULE_PHP]
        )]
    );

    let parents = engine
        .parent_topo(&ctx, &ObjectKind::module(), ids::MODULE_MYSQL)
        .await
        .unwrap();
    assert_eq!(
        summary(&parents),
        vec![("set".to_string(), 1, vec![ids::SET_DB])]
    );
    assert_eq!(parents[0].children[0].inst_name, "db");
}

#[tokio::test]
async fn test_parent_view_follows_incoming_edges() {
    let engine = engine(shared_store());
    let ctx = engine.context();

    let parents = engine.parent_topo(&ctx, &pdu(), ids::PDU).await.unwrap();
    assert_eq!(
        summary(&parents),
        vec![("rack".to_string(), 1, vec![ids::RACK_A])]
    );
}

#[tokio::test]
async fn test_isolated_instance_has_empty_views() {
    let engine = engine(shared_store());
    let ctx = engine.context();

    assert!(engine
        .child_topo(&ctx, &rack(), ids::RACK_B)
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .parent_topo(&ctx, &rack(), ids::RACK_B)
        .await
        .unwrap()
        .is_empty());
    assert!(engine
        .parent_topo(&ctx, &rack(), 4040)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_combined_view_per_match_in_order() {
    let engine = engine(shared_store());
    let ctx = engine.context();

    let selector = InstSelector::Condition(Condition::new().is_in("bk_set_id", [ids::SET_WEB, ids::SET_DB]));
    let views = engine
        .inst_topo(&ctx, &ObjectKind::set(), &selector)
        .await
        .unwrap();

    let current: Vec<i64> = views.iter().map(|v| v.curr.inst_id).collect();
    assert_eq!(current, vec![ids::SET_WEB, ids::SET_DB]);
    for view in &views {
        assert_eq!(view.prev.len(), 1);
        assert_eq!(view.prev[0].children[0].inst_id, ids::BIZ);
    }
    assert_eq!(views[1].next[0].count, 1);
}
