//! Topograph Store
//!
//! Store interfaces consumed by the graph engine, plus an in-memory backend.
//!
//! # Overview
//!
//! - [`InstanceStore`]: filtered search/create/update/delete over instance tables
//! - [`EdgeStore`]: the association edge index
//! - [`ModelCatalog`]: kinds, attributes and association definitions
//! - [`HostBindings`]: whether hosts are bound to container instances
//! - [`AuditSink`]: receives before/after snapshots of every mutation
//! - [`MemoryStore`]: all five over process-local tables, seedable from a
//!   [`MemorySnapshot`]

#![warn(missing_docs)]

pub mod error;
pub mod filter;
pub mod memory;
pub mod snapshot;
pub mod traits;

// Re-exports
pub use error::StoreError;
pub use memory::{HostBinding, MemoryStore};
pub use snapshot::MemorySnapshot;
pub use traits::{AuditSink, EdgeStore, HostBindings, InstanceStore, ModelCatalog};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
