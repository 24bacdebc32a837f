//! The temporal model: versioned records, proxies and version edges.
//!
//! An entity is three kinds of vertex. Two proxies (`ProxyIn`, `ProxyOut`)
//! are created once and never change; any number of core records carry the
//! entity's attributes over disjoint, contiguous validity windows. Version
//! edges join each core record to both proxies.
//!
//! ```text
//!   ProxyIn ──▶ Core(t0..t1) ──▶ ProxyOut
//!      │                            ▲
//!      └──────▶ Core(t1..∞) ────────┘
//! ```

mod document;
mod edge;
mod record;
mod vertex;

pub use document::{
    current_filter, decode_expiry, edge_filter, encode_expiry, entity_filter, fields,
    RecordDocument, OPEN_ENDED,
};
pub use edge::{edge_key, VersionEdge};
pub use record::{is_current, ttl_deadline_for, validate, CoreVersionRecord, Expiry, Lifecycle};
pub use vertex::{ProxyVertex, VertexKind, VertexRef, VertexRole};
