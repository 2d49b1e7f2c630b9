//! Cross-kind association query and lookup expansion tests

use pretty_assertions::assert_eq;
use std::sync::Arc;
use topo_core::prelude::*;
use topo_model::{AttrValue, Clause, Operator, QueryInput, Record};
use topo_store::MemoryStore;
use topo_test_utils::{ids, rack, shared_store, switch};

fn engine(store: Arc<MemoryStore>) -> TopoEngine {
    TopoEngine::new(TopoConfig::default(), Collaborators::from_shared(store)).unwrap()
}

fn rack_ids(result: &topo_model::InstResult) -> Vec<i64> {
    result
        .info
        .iter()
        .map(|r| r.int("bk_inst_id").unwrap())
        .collect()
}

#[tokio::test]
async fn test_foreign_constraint_selects_associated_targets() {
    let engine = engine(shared_store());
    let ctx = engine.context();

    let query = AssociationQuery::new().with_condition(
        "switch",
        vec![Clause::new("bk_inst_name", Operator::Eq, "sw-7")],
    );
    let result = engine
        .find_by_association(&ctx, &rack(), &query)
        .await
        .unwrap();
    assert_eq!(result.count, 1);
    assert_eq!(rack_ids(&result), vec![ids::RACK_A]);
}

#[tokio::test]
async fn test_empty_foreign_match_excludes_everything() {
    let engine = engine(shared_store());
    let ctx = engine.context();

    let query = AssociationQuery::new().with_condition(
        "switch",
        vec![Clause::new("bk_inst_name", Operator::Eq, "no-such-switch")],
    );
    let result = engine
        .find_by_association(&ctx, &rack(), &query)
        .await
        .unwrap();
    assert_eq!(result.count, 0);
    assert!(result.info.is_empty());

    // Matching a switch nobody references also excludes everything
    let query = AssociationQuery::new().with_condition(
        "switch",
        vec![Clause::new("bk_inst_id", Operator::Eq, ids::SWITCH_2)],
    );
    let result = engine
        .find_by_association(&ctx, &rack(), &query)
        .await
        .unwrap();
    assert_eq!(result.count, 0);
}

#[tokio::test]
async fn test_target_clauses_apply_alongside_candidates() {
    let engine = engine(shared_store());
    let ctx = engine.context();

    let query = AssociationQuery::new()
        .with_condition("rack", vec![Clause::new("height", Operator::Gte, 40)])
        .with_condition("pdu", vec![Clause::new("bk_inst_name", Operator::Like, "^pdu")]);
    let result = engine
        .find_by_association(&ctx, &rack(), &query)
        .await
        .unwrap();
    assert_eq!(rack_ids(&result), vec![ids::RACK_A]);

    let query = AssociationQuery::new()
        .with_condition("rack", vec![Clause::new("height", Operator::Lt, 40)])
        .with_condition("pdu", vec![Clause::new("bk_inst_name", Operator::Like, "^pdu")]);
    let result = engine
        .find_by_association(&ctx, &rack(), &query)
        .await
        .unwrap();
    assert_eq!(result.count, 0);
}

#[tokio::test]
async fn test_target_only_query_is_plain_lookup() {
    let engine = engine(shared_store());
    let ctx = engine.context();

    let query = AssociationQuery::new()
        .with_condition("rack", Vec::new())
        .with_fields("rack", vec!["bk_inst_id".to_string(), "bk_inst_name".to_string()]);
    let result = engine
        .find_by_association(&ctx, &rack(), &query)
        .await
        .unwrap();
    assert_eq!(rack_ids(&result), vec![ids::RACK_A, ids::RACK_B]);
    assert!(result.info.iter().all(|r| r.len() == 2));
}

#[tokio::test]
async fn test_unknown_foreign_kind_is_reported() {
    let engine = engine(shared_store());
    let ctx = engine.context();

    let query = AssociationQuery::new().with_condition("ghost", Vec::new());
    let err = engine
        .find_by_association(&ctx, &rack(), &query)
        .await
        .unwrap_err();
    assert_eq!(err, TopoError::KindNotFound("ghost".into()));
}

#[tokio::test]
async fn test_detail_round_trip() {
    let store = shared_store();
    let engine = engine(store);
    let ctx = engine.context();

    let id = engine
        .create_inst(
            &ctx,
            &rack(),
            Record::new().with("bk_inst_name", "rack-rt").with("switches", "7,9"),
        )
        .await
        .unwrap();

    let query = QueryInput::new(topo_model::Condition::new().eq("bk_inst_id", id));
    let detailed = engine.find_inst(&ctx, &rack(), &query, true).await.unwrap();
    let refs = detailed.info[0].get("switches").unwrap().as_refs().unwrap();
    assert_eq!(refs.len(), 2);
    assert_eq!(refs[0].inst_id, ids::SWITCH_7);
    assert_eq!(refs[0].inst_name, "sw-7");
    assert_eq!(refs[1].inst_id, ids::SWITCH_9);
    assert_eq!(refs[1].inst_name, "sw-9");
    assert_eq!(refs[0].kind_id, switch().id);
    let detail = refs[0].inst_detail.as_ref().unwrap();
    assert_eq!(detail.string("bk_inst_name").unwrap(), "sw-7");

    let plain = engine.find_inst(&ctx, &rack(), &query, false).await.unwrap();
    let refs = plain.info[0].get("switches").unwrap().as_refs().unwrap();
    assert_eq!(refs.len(), 2);
    assert!(refs.iter().all(|r| r.inst_detail.is_none()));
}

#[tokio::test]
async fn test_expansion_omits_missing_targets() {
    let store = shared_store();
    let rack_kind = rack();
    store
        .insert(
            &rack_kind,
            Record::new()
                .with("bk_obj_id", "rack")
                .with("bk_inst_id", 77)
                .with("bk_inst_name", "stale")
                .with("bk_supplier_account", "0")
                .with("switches", "1,555"),
        )
        .unwrap();
    let engine = engine(store);
    let ctx = engine.context();

    let query = QueryInput::new(topo_model::Condition::new().eq("bk_inst_id", 77));
    let result = engine.find_inst(&ctx, &rack_kind, &query, false).await.unwrap();
    let value = result.info[0].get("switches").unwrap();
    assert!(matches!(value, AttrValue::Refs(refs) if refs.len() == 1 && refs[0].inst_id == 1));
}
