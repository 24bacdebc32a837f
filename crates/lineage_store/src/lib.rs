//! # Lineage Store
//!
//! The document store boundary Lineage runs on.
//!
//! Lineage does not implement a storage engine. It consumes a store that
//! offers partitioned document collections, key-addressed reads and writes,
//! per-document compare-and-swap, equality lookups served by declared
//! indexes, and (outside Lineage's control) TTL-based expiry of documents
//! carrying a deadline field.
//!
//! ## Design Principles
//!
//! - Every operation is scoped to one collection and one partition
//! - The only atomic write is a single-document compare-and-swap
//! - Stores never interpret document bodies beyond indexed field equality
//! - Must be `Send + Sync` for concurrent access
//!
//! ## Available Stores
//!
//! - [`InMemoryStore`] - For tests, tools and benchmarks
//! - [`FaultyStore`] - Wrapper that injects failures and hooks
//!
//! ## Example
//!
//! ```rust
//! use lineage_codec::Value;
//! use lineage_store::{Filter, InMemoryStore, PartitionKey, RecordStore};
//!
//! let store = InMemoryStore::new();
//! store.ensure_collection("device").unwrap();
//! let tenant = PartitionKey::new("acme");
//! store.insert("device", &tenant, "E1", Value::record([("os", "linux")])).unwrap();
//!
//! let found = store.find("device", &tenant, &Filter::all().eq("os", "linux")).unwrap();
//! assert_eq!(found.len(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod document;
mod error;
mod faulty;
mod memory;
mod store;

pub use document::{CollectionDocument, Document, Filter, IndexSpec, PartitionKey, Revision};
pub use error::{StoreError, StoreResult};
pub use faulty::{FaultyStore, StoreHook, StoreOp};
pub use memory::{InMemoryStore, StoreStats};
pub use store::RecordStore;
