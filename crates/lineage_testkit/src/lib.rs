//! # Lineage Testkit
//!
//! Test utilities for Lineage.
//!
//! This crate provides:
//! - Fixtures wrapping a `Lineage` over a fault-injectable in-memory store
//! - Ready-made scenarios (the device walk-through, populated fleets)
//! - JSON scripts of onboardings and changes
//! - Property-based test generators using proptest
//! - Stress testing utilities
//!
//! ## Usage
//!
//! ```rust
//! use lineage_testkit::prelude::*;
//!
//! let t = TestLineage::memory();
//! t.onboard("acme", "E1", "A", 0);
//! t.change("acme", "E1", "B", 10);
//! assert_eq!(t.history_of("acme", "E1").len(), 2);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod script;
pub mod stress;

pub use lineage_store::{FaultyStore, StoreOp};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::script::*;
    pub use crate::stress::*;
    pub use lineage_store::{FaultyStore, StoreOp};
}

pub use fixtures::*;
pub use generators::*;
pub use script::*;
pub use stress::*;
