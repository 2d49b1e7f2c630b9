//! Topograph Core
//!
//! Instance/association graph engine over a flat record store.
//!
//! # Overview
//!
//! - **AssociationSynchronizer**: keeps edges in agreement with the reference
//!   lists encoded on instances (delete-then-recreate per target kind)
//! - **DeletionChecker**: walks the mainline subtree and vetoes deletions
//!   that would orphan bound hosts
//! - **TopologyBuilder**: parent, child and combined neighbour views
//! - **AssociationQueryResolver**: "instances of T associated with F matching C"
//! - **InstanceOperations**: create, update, delete and batch import
//!
//! Every store call runs under a [`CallContext`] carrying the owner scope,
//! a cancellation token and an optional deadline. Saves of the same
//! instance are serialised by [`InstanceLocks`].
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use topo_core::{Collaborators, TopoConfig, TopoEngine};
//! use topo_store::MemoryStore;
//!
//! # async fn example() -> Result<(), topo_core::TopoError> {
//! let store = Arc::new(MemoryStore::new());
//! let engine = TopoEngine::new(TopoConfig::new(), Collaborators::from_shared(store))?;
//!
//! let ctx = engine.context();
//! let module = engine.kind(&ctx, "module").await?;
//! let verdict = engine.check_deletable(&ctx, &module, 42).await?;
//! println!("blocked: {}", verdict.is_blocked());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod config;
pub mod context;
pub mod deletion;
pub mod engine;
pub mod error;
pub mod finder;
pub mod locks;
pub mod operations;
pub mod resolver;
pub mod synchronizer;
pub mod topology;
pub mod validator;

// Re-exports
pub use config::{LoggingConfig, TopoConfig};
pub use context::CallContext;
pub use deletion::{Deletability, DeletionChecker, RemovalEntry};
pub use engine::{Collaborators, TopoEngine};
pub use error::{CancelReason, TopoError};
pub use finder::InstanceFinder;
pub use locks::{InstanceGuard, InstanceLocks};
pub use operations::{InstSelector, InstanceOperations};
pub use resolver::{AssociationQuery, AssociationQueryResolver};
pub use synchronizer::{AssociationSynchronizer, AttributeSync, SyncReport};
pub use topology::{InstTopo, TopoInstGroup, TopologyBuilder};
pub use validator::ReferenceValidator;

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for driving the engine
    pub use crate::{
        AssociationQuery, CallContext, Collaborators, Deletability, InstSelector, InstTopo,
        RemovalEntry, TopoConfig, TopoEngine, TopoError, TopoInstGroup,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
