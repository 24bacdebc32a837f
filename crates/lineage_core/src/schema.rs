//! Collection layout and provisioning.
//!
//! Each kind `k` owns three collections: `k_in` and `k_out` for proxies and
//! `k` for core records. Every version edge of every kind lives in the single
//! `version` collection, tagged with `fromKind`/`toKind`.

use crate::error::CoreResult;
use crate::temporal::{fields, VertexRole};
use crate::types::EntityKind;
use lineage_store::{IndexSpec, RecordStore};
use std::collections::BTreeSet;

/// The unified edge collection.
pub const VERSION_EDGES: &str = "version";

/// Returns the collection holding vertices of `kind` in `role`.
pub fn collection_for(kind: &EntityKind, role: VertexRole) -> String {
    match role {
        VertexRole::ProxyIn => format!("{kind}_in"),
        VertexRole::Core => kind.to_string(),
        VertexRole::ProxyOut => format!("{kind}_out"),
    }
}

/// Index serving current-version lookups.
pub fn current_index(kind: &EntityKind) -> IndexSpec {
    IndexSpec::new(
        collection_for(kind, VertexRole::Core),
        [fields::ENTITY, fields::EXPIRES_AT],
    )
}

/// Index serving edge lookups by kind tag.
pub fn edge_index() -> IndexSpec {
    IndexSpec::new(VERSION_EDGES, [fields::FROM_KIND, fields::TO_KIND])
}

/// Declares the collections and indexes for `kinds`. Idempotent.
///
/// # Errors
///
/// Returns a store error if any declaration fails.
pub fn provision(store: &dyn RecordStore, kinds: &[EntityKind]) -> CoreResult<()> {
    store.ensure_collection(VERSION_EDGES)?;
    store.ensure_index(&edge_index())?;
    for kind in kinds {
        for role in [VertexRole::ProxyIn, VertexRole::Core, VertexRole::ProxyOut] {
            store.ensure_collection(&collection_for(kind, role))?;
        }
        store.ensure_index(&current_index(kind))?;
        tracing::debug!(target: "lineage::schema", %kind, "Provisioned kind");
    }
    Ok(())
}

/// Finds the kinds whose three collections all exist.
///
/// # Errors
///
/// Returns a store error if collections cannot be listed.
pub fn discover_kinds(store: &dyn RecordStore) -> CoreResult<Vec<EntityKind>> {
    let names: BTreeSet<String> = store.collections()?.into_iter().collect();
    Ok(names
        .iter()
        .filter_map(|name| EntityKind::new(name.as_str()).ok())
        .filter(|kind| {
            names.contains(&collection_for(kind, VertexRole::ProxyIn))
                && names.contains(&collection_for(kind, VertexRole::ProxyOut))
        })
        .collect())
}
