//! Testing utilities for the topograph workspace
//!
//! A seeded [`MemoryStore`] shared by the engine's integration tests:
//!
//! ```text
//! biz 1 "blueking"
//! ├── set 10 "web"
//! │   ├── module 100 "nginx"
//! │   └── module 101 "php"
//! └── set 11 "db"
//!     └── module 110 "mysql"   <- host 1000 bound
//!
//! rack 20 "rack-a"  switches=1,7,9  pdu=30
//! rack 21 "rack-b"
//! switch 1, 2, 7, 9    pdu 30
//! ```

#![allow(missing_docs)]

use std::sync::Arc;
use topo_model::fields::{OBJ_ID, OWNER_ID, PARENT_ID};
use topo_model::{
    AssociationDef, Attribute, Edge, InstId, ObjectKind, OwnerId, PropertyType, Record,
};
use topo_store::{HostBinding, MemoryStore};

pub mod ids {
    use topo_model::InstId;

    pub const BIZ: InstId = 1;
    pub const SET_WEB: InstId = 10;
    pub const SET_DB: InstId = 11;
    pub const MODULE_NGINX: InstId = 100;
    pub const MODULE_PHP: InstId = 101;
    pub const MODULE_MYSQL: InstId = 110;
    pub const HOST: InstId = 1000;
    pub const RACK_A: InstId = 20;
    pub const RACK_B: InstId = 21;
    pub const SWITCH_1: InstId = 1;
    pub const SWITCH_2: InstId = 2;
    pub const SWITCH_7: InstId = 7;
    pub const SWITCH_9: InstId = 9;
    pub const PDU: InstId = 30;
}

pub fn rack() -> ObjectKind {
    ObjectKind::common("rack", "Rack").with_icon("icon-cc-rack")
}

pub fn switch() -> ObjectKind {
    ObjectKind::common("switch", "Switch").with_icon("icon-cc-switch")
}

pub fn pdu() -> ObjectKind {
    ObjectKind::common("pdu", "PDU")
}

fn owned(record: Record) -> Record {
    record.with(OWNER_ID, OwnerId::default().as_str())
}

fn common(kind: &ObjectKind, id: InstId, name: &str) -> Record {
    owned(
        Record::new()
            .with(OBJ_ID, kind.id.as_str())
            .with(kind.inst_id_field.clone(), id)
            .with(kind.inst_name_field.clone(), name),
    )
}

fn builtin(kind: &ObjectKind, id: InstId, name: &str, parent: Option<InstId>) -> Record {
    let record = owned(
        Record::new()
            .with(kind.inst_id_field.clone(), id)
            .with(kind.inst_name_field.clone(), name),
    );
    match parent {
        Some(parent) => record.with(PARENT_ID, parent),
        None => record,
    }
}

/// Kinds, attributes and association definitions without instances
pub fn model_store() -> MemoryStore {
    let store = MemoryStore::new();
    for kind in [
        ObjectKind::biz(),
        ObjectKind::set(),
        ObjectKind::module(),
        ObjectKind::host(),
        rack(),
        switch(),
        pdu(),
    ] {
        store.register_kind(kind);
    }

    store.add_association(AssociationDef::mainline("biz", "set"));
    store.add_association(AssociationDef::mainline("set", "module"));
    store.add_association(AssociationDef::new("rack", "switches", "switch"));
    store.add_association(AssociationDef::new("rack", "pdu", "pdu"));

    store.add_attribute(Attribute::new("rack", "bk_inst_name", PropertyType::SingleChar).required());
    store.add_attribute(Attribute::new("rack", "switches", PropertyType::MultiAsst));
    store.add_attribute(Attribute::new("rack", "pdu", PropertyType::SingleAsst));
    store.add_attribute(Attribute::new("rack", "height", PropertyType::Int));
    store.add_attribute(Attribute::new("switch", "bk_inst_name", PropertyType::SingleChar).required());
    store.add_attribute(Attribute::new("pdu", "bk_inst_name", PropertyType::SingleChar).required());
    store
}

/// The fixture tree described in the crate docs
pub fn seeded_store() -> MemoryStore {
    let store = model_store();
    let (biz, set, module, host) = (
        ObjectKind::biz(),
        ObjectKind::set(),
        ObjectKind::module(),
        ObjectKind::host(),
    );

    let rows = [
        (&biz, builtin(&biz, ids::BIZ, "blueking", None)),
        (&set, builtin(&set, ids::SET_WEB, "web", Some(ids::BIZ))),
        (&set, builtin(&set, ids::SET_DB, "db", Some(ids::BIZ))),
        (&module, builtin(&module, ids::MODULE_NGINX, "nginx", Some(ids::SET_WEB))),
        (&module, builtin(&module, ids::MODULE_PHP, "php", Some(ids::SET_WEB))),
        (&module, builtin(&module, ids::MODULE_MYSQL, "mysql", Some(ids::SET_DB))),
        (&host, builtin(&host, ids::HOST, "10.0.0.1", None)),
    ];
    for (kind, record) in rows {
        store.insert(kind, record).expect("seed builtin row");
    }
    store.bind_host(HostBinding::module(ids::HOST, ids::MODULE_MYSQL));

    let (switch, pdu, rack) = (switch(), pdu(), rack());
    for (id, name) in [
        (ids::SWITCH_1, "sw-1"),
        (ids::SWITCH_2, "sw-2"),
        (ids::SWITCH_7, "sw-7"),
        (ids::SWITCH_9, "sw-9"),
    ] {
        store.insert(&switch, common(&switch, id, name)).expect("seed switch");
    }
    store.insert(&pdu, common(&pdu, ids::PDU, "pdu-30")).expect("seed pdu");
    store
        .insert(
            &rack,
            common(&rack, ids::RACK_A, "rack-a")
                .with("switches", "1,7,9")
                .with("pdu", "30")
                .with("height", 42),
        )
        .expect("seed rack");
    store
        .insert(&rack, common(&rack, ids::RACK_B, "rack-b"))
        .expect("seed rack");

    for target in [ids::SWITCH_1, ids::SWITCH_7, ids::SWITCH_9] {
        store
            .insert_edge(edge(&rack, ids::RACK_A, &switch, target))
            .expect("seed edge");
    }
    store
        .insert_edge(edge(&rack, ids::RACK_A, &pdu, ids::PDU))
        .expect("seed edge");
    store
}

/// Seeded store behind an `Arc`
pub fn shared_store() -> Arc<MemoryStore> {
    Arc::new(seeded_store())
}

/// Edge in the default owner scope
pub fn edge(kind: &ObjectKind, inst_id: InstId, target: &ObjectKind, asst_id: InstId) -> Edge {
    Edge::new(
        kind.id.clone(),
        inst_id,
        target.id.clone(),
        asst_id,
        OwnerId::default(),
    )
}

/// Sorted target ids of the edges leaving one instance towards `target`
pub fn edge_targets(
    store: &MemoryStore,
    kind: &ObjectKind,
    inst_id: InstId,
    target: &ObjectKind,
) -> Vec<InstId> {
    let mut ids: Vec<InstId> = store
        .edges()
        .into_iter()
        .filter(|e| e.obj_id == kind.id && e.inst_id == inst_id && e.asst_obj_id == target.id)
        .map(|e| e.asst_inst_id)
        .collect();
    ids.sort_unstable();
    ids
}

/// Route engine logs to the test harness; safe to call repeatedly
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
