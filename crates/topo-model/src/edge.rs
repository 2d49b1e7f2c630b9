//! Persisted association edges

use crate::fields::{ASST_INST_ID, ASST_OBJ_ID, INST_ID, OBJ_ID, OWNER_ID};
use crate::ids::{InstId, KindId, OwnerId};
use crate::value::Record;
use serde::{Deserialize, Serialize};

/// Directed association from a source instance to a target instance
///
/// Unique per `(obj_id, inst_id, asst_obj_id, asst_inst_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    /// Source kind
    #[serde(rename = "bk_obj_id")]
    pub obj_id: KindId,
    /// Source instance
    #[serde(rename = "bk_inst_id")]
    pub inst_id: InstId,
    /// Target kind
    #[serde(rename = "bk_asst_obj_id")]
    pub asst_obj_id: KindId,
    /// Target instance
    #[serde(rename = "bk_asst_inst_id")]
    pub asst_inst_id: InstId,
    /// Owning account
    #[serde(rename = "bk_supplier_account", default)]
    pub owner: OwnerId,
}

impl Edge {
    /// Create new edge
    #[must_use]
    pub fn new(
        obj_id: impl Into<KindId>,
        inst_id: InstId,
        asst_obj_id: impl Into<KindId>,
        asst_inst_id: InstId,
        owner: OwnerId,
    ) -> Self {
        Self {
            obj_id: obj_id.into(),
            inst_id,
            asst_obj_id: asst_obj_id.into(),
            asst_inst_id,
            owner,
        }
    }

    /// Identity tuple used for uniqueness
    #[must_use]
    pub fn key(&self) -> (&str, InstId, &str, InstId) {
        (
            self.obj_id.as_str(),
            self.inst_id,
            self.asst_obj_id.as_str(),
            self.asst_inst_id,
        )
    }

    /// Flat row form, as matched by conditions
    #[must_use]
    pub fn to_record(&self) -> Record {
        Record::new()
            .with(OBJ_ID, self.obj_id.as_str())
            .with(INST_ID, self.inst_id)
            .with(ASST_OBJ_ID, self.asst_obj_id.as_str())
            .with(ASST_INST_ID, self.asst_inst_id)
            .with(OWNER_ID, self.owner.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_uses_wire_field_names() {
        let edge = Edge::new("rack", 1, "switch", 7, OwnerId::default());
        let row = edge.to_record();
        assert_eq!(row.string("bk_obj_id"), Ok("rack"));
        assert_eq!(row.int("bk_asst_inst_id"), Ok(7));

        let json = serde_json::to_value(&edge).unwrap();
        assert_eq!(json["bk_asst_obj_id"], "switch");
    }
}
