//! Well-known field names and built-in kind identifiers

/// Kind identifier field carried by every common-kind instance and every edge
pub const OBJ_ID: &str = "bk_obj_id";

/// Owning-account scope field
pub const OWNER_ID: &str = "bk_supplier_account";

/// Instance id field of common kinds, and source instance of an edge
pub const INST_ID: &str = "bk_inst_id";

/// Instance name field of common kinds
pub const INST_NAME: &str = "bk_inst_name";

/// Target kind of an edge
pub const ASST_OBJ_ID: &str = "bk_asst_obj_id";

/// Target instance of an edge
pub const ASST_INST_ID: &str = "bk_asst_inst_id";

/// Mainline parent pointer stored on the child record
pub const PARENT_ID: &str = "bk_parent_id";

/// Pseudo attribute declaring a mainline child kind
pub const CHILD_ATTR: &str = "bk_childid";

/// Pseudo attribute declaring a mainline parent kind
pub const PARENT_ATTR: &str = "bk_parentid";

/// Table shared by all common (user-defined) kinds
pub const COMMON_OBJECT_TABLE: &str = "object";

/// Default delimiter of encoded reference-id lists
pub const DEFAULT_REFERENCE_DELIMITER: &str = ",";

/// Built-in business kind
pub const KIND_BIZ: &str = "biz";

/// Built-in set kind
pub const KIND_SET: &str = "set";

/// Built-in module kind (the host-bearing leaf of the mainline)
pub const KIND_MODULE: &str = "module";

/// Built-in host kind
pub const KIND_HOST: &str = "host";
