//! # Lineage Core
//!
//! Temporal versioning and lifecycle engine for Lineage.
//!
//! Lineage keeps every configuration an entity has ever had as an immutable
//! version with a validity window, anchored between two stable proxy
//! vertices, so that the graph can be queried as it was at any instant.
//!
//! This crate provides:
//! - The temporal model (versions, proxies, version edges, expiry)
//! - The lifecycle engine (onboard, demote/promote/rewire, resume)
//! - Time-travel queries (as-of, history, snapshot)
//! - The tenant partition guard
//! - Integrity verification
//!
//! ## Design Principles
//!
//! - Exactly one current version per entity; windows never overlap
//! - The only in-place mutation is demoting the current version, via
//!   compare-and-swap on its store revision
//! - Every other write uses a deterministic key and is safe to repeat
//! - Lineage never deletes; historical versions carry a TTL deadline and the
//!   store removes them
//! - Every read and write is confined to one tenant partition
//!
//! ## Example
//!
//! ```rust
//! use lineage_codec::Value;
//! use lineage_core::{ChangeRequest, EntityKey, EntityKind, Lineage, Onboarding, Timestamp};
//!
//! let lineage = Lineage::open_in_memory(&[EntityKind::device()]).unwrap();
//! let acme = lineage.scope("acme");
//! let e1 = EntityKey::new("E1");
//! let device = EntityKind::device();
//!
//! lineage.onboard(&acme, Onboarding::new(
//!     device.clone(), e1.clone(), Value::record([("config", "A")]), Timestamp::from_millis(0),
//! )).unwrap();
//! lineage.change_configuration(&acme, ChangeRequest::new(
//!     device.clone(), e1.clone(), Value::record([("config", "B")]), Timestamp::from_millis(10),
//! )).unwrap();
//!
//! let history = lineage.history(&acme, &device, &e1).unwrap();
//! assert_eq!(history.len(), 2);
//! assert!(history[1].is_current());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod guard;
mod lifecycle;
mod lineage;
mod query;
pub mod schema;
pub mod temporal;
mod types;
mod verify;

pub use config::{EngineConfig, RetryPolicy, TenantPolicy};
pub use error::{Conflict, CoreError, CoreResult, VersionConflict};
pub use guard::{GuardedStore, TenantScope};
pub use lifecycle::{
    version_key, ChangeRequest, LifecycleEngine, Onboarding, ResumeToken, Transition,
    TransitionPlan,
};
pub use lineage::Lineage;
pub use query::{Snapshot, SnapshotRequest, TimeTravel};
pub use temporal::{CoreVersionRecord, Expiry, Lifecycle, ProxyVertex, VersionEdge, VertexRole};
pub use types::{EntityKey, EntityKind, RecordKey, TenantKey, Timestamp};
pub use verify::{verify_tenant, IntegrityIssue, IntegrityReport, Severity};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
