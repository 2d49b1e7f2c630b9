//! Topograph Model
//!
//! Typed data model for a configuration-management graph.
//!
//! # Overview
//!
//! The model provides:
//! - **ObjectKind**: a type of manageable entity, built-in or user-defined
//! - **Record**: an instance's attribute map of tagged [`AttrValue`]s
//! - **AssociationDef**: declares that an attribute of a kind references another kind
//! - **Edge**: a persisted association between two concrete instances
//! - **Condition / QueryInput**: the uniform filter shape used for instances and edges
//! - **AuditEntry**: before/after snapshots of one instance mutation
//!
//! # Example
//!
//! ```rust
//! use topo_model::{parse_reference_ids, AttrValue, Condition, Record};
//!
//! let record = Record::new()
//!     .with("bk_inst_name", "rack-01")
//!     .with("switches", "7,9");
//!
//! let ids = parse_reference_ids(record.string("switches").unwrap(), ",").unwrap();
//! assert_eq!(ids, vec![7, 9]);
//!
//! let cond = Condition::new().eq("bk_obj_id", "rack").is_in("bk_inst_id", ids);
//! assert_eq!(cond.len(), 2);
//! # let _ = AttrValue::Null;
//! ```

#![warn(missing_docs)]

pub mod audit;
pub mod batch;
pub mod condition;
pub mod edge;
pub mod error;
pub mod fields;
pub mod ids;
pub mod kind;
pub mod refs;
pub mod value;

// Re-exports
pub use audit::{AuditAction, AuditEntry};
pub use batch::BatchResult;
pub use condition::{Clause, Condition, InstResult, Operator, Page, QueryInput};
pub use edge::Edge;
pub use error::ModelError;
pub use ids::{InstId, KindId, OwnerId};
pub use kind::{AssociationDef, Attribute, ObjectKind, PropertyType};
pub use refs::{encode_reference_ids, parse_reference_ids, reference_ids, InstNameAsst};
pub use value::{AttrValue, Record};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for model operations
    pub use crate::{
        AssociationDef, AttrValue, Attribute, Clause, Condition, Edge, InstId, InstNameAsst,
        KindId, ModelError, ObjectKind, Operator, OwnerId, Page, PropertyType, QueryInput, Record,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
