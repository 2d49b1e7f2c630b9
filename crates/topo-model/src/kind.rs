//! Object kinds, attributes and association definitions

use crate::fields::{
    CHILD_ATTR, COMMON_OBJECT_TABLE, INST_ID, INST_NAME, KIND_BIZ, KIND_HOST, KIND_MODULE,
    KIND_SET, PARENT_ATTR,
};
use crate::ids::KindId;
use serde::{Deserialize, Serialize};

/// Type of manageable entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectKind {
    /// Kind identifier
    pub id: KindId,
    /// Display name
    pub name: String,
    /// Icon reference
    #[serde(default)]
    pub icon: String,
    /// Built-in ("non-common") kind with its own table
    #[serde(default)]
    pub builtin: bool,
    /// Field holding the instance id
    pub inst_id_field: String,
    /// Field holding the instance name
    pub inst_name_field: String,
}

impl ObjectKind {
    /// User-defined kind stored in the shared object table
    #[must_use]
    pub fn common(id: impl Into<KindId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: "icon-cc-default".to_string(),
            builtin: false,
            inst_id_field: INST_ID.to_string(),
            inst_name_field: INST_NAME.to_string(),
        }
    }

    /// Built-in kind with dedicated id and name fields
    #[must_use]
    pub fn builtin(
        id: impl Into<KindId>,
        name: impl Into<String>,
        inst_id_field: impl Into<String>,
        inst_name_field: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            icon: String::new(),
            builtin: true,
            inst_id_field: inst_id_field.into(),
            inst_name_field: inst_name_field.into(),
        }
    }

    /// With icon
    #[inline]
    #[must_use]
    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    /// Built-in business kind
    #[must_use]
    pub fn biz() -> Self {
        Self::builtin(KIND_BIZ, "Business", "bk_biz_id", "bk_biz_name").with_icon("icon-cc-business")
    }

    /// Built-in set kind
    #[must_use]
    pub fn set() -> Self {
        Self::builtin(KIND_SET, "Set", "bk_set_id", "bk_set_name").with_icon("icon-cc-set")
    }

    /// Built-in module kind
    #[must_use]
    pub fn module() -> Self {
        Self::builtin(KIND_MODULE, "Module", "bk_module_id", "bk_module_name")
            .with_icon("icon-cc-module")
    }

    /// Built-in host kind
    #[must_use]
    pub fn host() -> Self {
        Self::builtin(KIND_HOST, "Host", "bk_host_id", "bk_host_innerip").with_icon("icon-cc-host")
    }

    /// User-defined kind
    #[inline]
    #[must_use]
    pub fn is_common(&self) -> bool {
        !self.builtin
    }

    /// Table the kind's instances live in
    #[inline]
    #[must_use]
    pub fn object_type(&self) -> &str {
        if self.builtin {
            self.id.as_str()
        } else {
            COMMON_OBJECT_TABLE
        }
    }
}

/// Attribute property types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyType {
    /// Short string
    SingleChar,
    /// Long string
    LongChar,
    /// Integer
    Int,
    /// Float
    Float,
    /// Enumeration
    Enum,
    /// Date
    Date,
    /// Time
    Time,
    /// User reference
    User,
    /// Boolean
    Bool,
    /// Single-target association
    SingleAsst,
    /// Multi-target association
    MultiAsst,
}

/// Attribute declared on a kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    /// Owning kind
    pub kind_id: KindId,
    /// Attribute (field) name
    pub property_id: String,
    /// Display name
    #[serde(default)]
    pub property_name: String,
    /// Property type
    pub property_type: PropertyType,
    /// Must be present and non-empty on create
    #[serde(default)]
    pub is_required: bool,
}

impl Attribute {
    /// Create new attribute
    #[must_use]
    pub fn new(
        kind_id: impl Into<KindId>,
        property_id: impl Into<String>,
        property_type: PropertyType,
    ) -> Self {
        let property_id = property_id.into();
        Self {
            kind_id: kind_id.into(),
            property_name: property_id.clone(),
            property_id,
            property_type,
            is_required: false,
        }
    }

    /// Mark as required
    #[inline]
    #[must_use]
    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    /// Whether the attribute encodes references to another kind
    #[inline]
    #[must_use]
    pub fn is_association(&self) -> bool {
        matches!(
            self.property_type,
            PropertyType::SingleAsst | PropertyType::MultiAsst
        )
    }
}

/// Declares that `object_att_id` on `object_id` references `asst_obj_id`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssociationDef {
    /// Source kind
    #[serde(rename = "bk_obj_id")]
    pub object_id: KindId,
    /// Source attribute
    #[serde(rename = "bk_object_att_id")]
    pub object_att_id: String,
    /// Target kind
    #[serde(rename = "bk_asst_obj_id")]
    pub asst_obj_id: KindId,
}

impl AssociationDef {
    /// Create new association definition
    #[must_use]
    pub fn new(
        object_id: impl Into<KindId>,
        object_att_id: impl Into<String>,
        asst_obj_id: impl Into<KindId>,
    ) -> Self {
        Self {
            object_id: object_id.into(),
            object_att_id: object_att_id.into(),
            asst_obj_id: asst_obj_id.into(),
        }
    }

    /// Mainline containment from `parent` to `child`
    #[must_use]
    pub fn mainline(parent: impl Into<KindId>, child: impl Into<KindId>) -> Self {
        Self::new(parent, CHILD_ATTR, child)
    }

    /// Declares a mainline child kind
    #[inline]
    #[must_use]
    pub fn is_mainline(&self) -> bool {
        self.object_att_id == CHILD_ATTR
    }

    /// Mainline pseudo attribute (never expanded, never synchronised)
    #[inline]
    #[must_use]
    pub fn is_pseudo(&self) -> bool {
        self.object_att_id == CHILD_ATTR || self.object_att_id == PARENT_ATTR
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_kinds_share_object_table() {
        let rack = ObjectKind::common("rack", "Rack");
        assert!(rack.is_common());
        assert_eq!(rack.object_type(), "object");
        assert_eq!(rack.inst_id_field, "bk_inst_id");

        let module = ObjectKind::module();
        assert!(!module.is_common());
        assert_eq!(module.object_type(), "module");
        assert_eq!(module.inst_id_field, "bk_module_id");
    }

    #[test]
    fn association_attribute_types() {
        assert!(Attribute::new("rack", "switches", PropertyType::MultiAsst).is_association());
        assert!(!Attribute::new("rack", "height", PropertyType::Int).is_association());
    }

    #[test]
    fn mainline_defs_are_pseudo() {
        let def = AssociationDef::mainline("set", "module");
        assert!(def.is_mainline());
        assert!(def.is_pseudo());
        assert!(!AssociationDef::new("rack", "switches", "switch").is_pseudo());
    }

    #[test]
    fn property_type_wire_names() {
        let json = serde_json::to_string(&PropertyType::MultiAsst).unwrap();
        assert_eq!(json, "\"multiasst\"");
    }
}
