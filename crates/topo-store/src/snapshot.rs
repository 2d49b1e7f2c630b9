//! JSON snapshots for seeding a [`MemoryStore`]

use crate::error::StoreError;
use crate::memory::{HostBinding, MemoryStore};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::Path;
use topo_model::fields::{OBJ_ID, OWNER_ID};
use topo_model::{AssociationDef, Attribute, Edge, KindId, ObjectKind, OwnerId, Record};
use tracing::info;

/// Serialized content of a store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemorySnapshot {
    /// Kinds
    #[serde(default)]
    pub kinds: Vec<ObjectKind>,
    /// Attributes
    #[serde(default)]
    pub attributes: Vec<Attribute>,
    /// Association definitions
    #[serde(default)]
    pub associations: Vec<AssociationDef>,
    /// Instance rows per kind
    #[serde(default)]
    pub instances: IndexMap<KindId, Vec<Record>>,
    /// Edges
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Host bindings
    #[serde(default)]
    pub host_bindings: Vec<HostBinding>,
}

impl MemorySnapshot {
    /// Parse from JSON text
    ///
    /// # Errors
    /// `Snapshot` when the text is not a valid snapshot
    pub fn from_json(text: &str) -> Result<Self, StoreError> {
        serde_json::from_str(text).map_err(|e| StoreError::Snapshot(e.to_string()))
    }

    /// Read from a JSON file
    ///
    /// # Errors
    /// `Snapshot` when the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Snapshot(format!("{}: {e}", path.display())))?;
        Self::from_json(&text)
    }
}

impl MemoryStore {
    /// Build a store from a snapshot
    ///
    /// Rows of common kinds get their kind field stamped; rows without an
    /// owner get the default one.
    ///
    /// # Errors
    /// `Snapshot` when instances reference an unknown kind, `Duplicate` on
    /// repeated ids or edges
    pub fn from_snapshot(snapshot: MemorySnapshot) -> Result<Self, StoreError> {
        let store = Self::new();
        for kind in snapshot.kinds {
            store.register_kind(kind);
        }
        for attribute in snapshot.attributes {
            store.add_attribute(attribute);
        }
        for def in snapshot.associations {
            store.add_association(def);
        }

        let mut rows = 0usize;
        for (kind_id, records) in snapshot.instances {
            let kind = store
                .kind(kind_id.as_str())
                .ok_or_else(|| StoreError::Snapshot(format!("unknown kind `{kind_id}`")))?;
            for mut record in records {
                if kind.is_common() && !record.contains(OBJ_ID) {
                    record.set(OBJ_ID, kind.id.as_str());
                }
                if !record.contains(OWNER_ID) {
                    record.set(OWNER_ID, OwnerId::default().as_str());
                }
                store.insert(&kind, record)?;
                rows += 1;
            }
        }

        let edges = snapshot.edges.len();
        for edge in snapshot.edges {
            store.insert_edge(edge)?;
        }
        for binding in snapshot.host_bindings {
            store.bind_host(binding);
        }
        info!(rows, edges, "snapshot loaded");
        Ok(store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SNAPSHOT: &str = r#"{
        "kinds": [
            {"id": "rack", "name": "Rack", "inst_id_field": "bk_inst_id", "inst_name_field": "bk_inst_name"}
        ],
        "instances": {
            "rack": [{"bk_inst_id": 3, "bk_inst_name": "r-03"}]
        },
        "edges": [
            {"bk_obj_id": "rack", "bk_inst_id": 3, "bk_asst_obj_id": "switch", "bk_asst_inst_id": 9}
        ],
        "host_bindings": [{"bk_host_id": 1, "bk_inst_id": 2}]
    }"#;

    #[test]
    fn snapshot_rows_are_stamped() {
        let store = MemoryStore::from_snapshot(MemorySnapshot::from_json(SNAPSHOT).unwrap()).unwrap();
        let rows = store.rows("object");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].string("bk_obj_id"), Ok("rack"));
        assert_eq!(rows[0].string("bk_supplier_account"), Ok("0"));
        assert_eq!(store.edges().len(), 1);
    }

    #[test]
    fn snapshot_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SNAPSHOT.as_bytes()).unwrap();
        let snapshot = MemorySnapshot::load(file.path()).unwrap();
        assert_eq!(snapshot.kinds.len(), 1);
        assert_eq!(snapshot.host_bindings[0].bearer_kind.as_str(), "module");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let snapshot = MemorySnapshot::from_json(r#"{"instances": {"ghost": [{}]}}"#).unwrap();
        assert!(matches!(
            MemoryStore::from_snapshot(snapshot),
            Err(StoreError::Snapshot(_))
        ));
    }
}
