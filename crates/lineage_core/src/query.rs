//! Time-travel queries.
//!
//! Every query is a pure read with an explicit instant `Q`. A version is
//! valid at `Q` when `createdAt <= Q < expiresAt`; `Q = None` means "now"
//! and is answered from the current-version index instead of the clock.
//! Queries take no locks and never wait for transitions.

use crate::error::{CoreError, CoreResult, VersionConflict};
use crate::guard::{GuardedStore, TenantScope};
use crate::schema::{collection_for, VERSION_EDGES};
use crate::temporal::{
    current_filter, edge_filter, entity_filter, CoreVersionRecord, VersionEdge, VertexKind,
    VertexRole,
};
use crate::types::{EntityKey, EntityKind, RecordKey, Timestamp};
use lineage_store::RecordStore;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A request for the state of several kinds at one instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRequest {
    /// Kinds to include.
    pub kinds: Vec<EntityKind>,
    /// The instant; `None` for the current state.
    pub at: Option<Timestamp>,
}

impl SnapshotRequest {
    /// Requests the current state of `kinds`.
    pub fn current(kinds: Vec<EntityKind>) -> Self {
        Self { kinds, at: None }
    }

    /// Requests the state of `kinds` at `at`.
    pub fn at(kinds: Vec<EntityKind>, at: Timestamp) -> Self {
        Self { kinds, at: Some(at) }
    }
}

/// The versions valid at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// The queried instant.
    pub at: Option<Timestamp>,
    /// One record per entity, ordered by kind then entity.
    pub records: Vec<CoreVersionRecord>,
    /// Edges whose core record had already been removed by TTL.
    pub skipped_edges: usize,
}

impl Snapshot {
    /// Finds the record of an entity.
    pub fn get(&self, kind: &EntityKind, entity: &EntityKey) -> Option<&CoreVersionRecord> {
        self.records
            .iter()
            .find(|r| &r.kind == kind && &r.entity == entity)
    }

    /// Number of entities in the snapshot.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no entity had a valid version.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Read-only query engine.
pub struct TimeTravel {
    store: Arc<dyn RecordStore>,
}

impl TimeTravel {
    /// Creates a query engine over a provisioned store.
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Returns the version of an entity valid at `at`.
    ///
    /// Returns `Ok(None)` if no version covers the instant, including
    /// instants before the entity existed and versions already removed by
    /// TTL.
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousVersions` if more than one version covers `at`, and
    /// `MultipleCurrentVersions` for `at = None` with more than one current
    /// version. Neither is ever resolved by picking one.
    pub fn as_of(
        &self,
        scope: &TenantScope,
        kind: &EntityKind,
        entity: &EntityKey,
        at: Option<Timestamp>,
    ) -> CoreResult<Option<CoreVersionRecord>> {
        let guard = GuardedStore::new(&*self.store, scope);
        let collection = collection_for(kind, VertexRole::Core);

        let mut matches: Vec<CoreVersionRecord> = match at {
            None => guard
                .load_all::<CoreVersionRecord>(&collection, &current_filter(entity))?
                .into_iter()
                .map(|(r, _)| r)
                .collect(),
            Some(q) => guard
                .load_all::<CoreVersionRecord>(&collection, &entity_filter(entity))?
                .into_iter()
                .map(|(r, _)| r)
                .filter(|r| r.contains(q))
                .collect(),
        };

        if matches.len() > 1 {
            let keys: Vec<RecordKey> = matches.into_iter().map(|r| r.key).collect();
            tracing::error!(
                target: "lineage::query",
                %entity,
                at = ?at,
                count = keys.len(),
                "Overlapping versions"
            );
            return Err(match at {
                None => CoreError::MultipleCurrentVersions {
                    entity: entity.clone(),
                    keys,
                },
                Some(_) => CoreError::AmbiguousVersions {
                    at,
                    conflicts: vec![VersionConflict {
                        entity: entity.clone(),
                        keys,
                    }],
                },
            });
        }
        Ok(matches.pop())
    }

    /// Returns the current version of an entity.
    ///
    /// # Errors
    ///
    /// See [`TimeTravel::as_of`].
    pub fn current(
        &self,
        scope: &TenantScope,
        kind: &EntityKind,
        entity: &EntityKey,
    ) -> CoreResult<Option<CoreVersionRecord>> {
        self.as_of(scope, kind, entity, None)
    }

    /// Returns every retained version of an entity, oldest first.
    ///
    /// # Errors
    ///
    /// Returns guard, store or mapping errors.
    pub fn history(
        &self,
        scope: &TenantScope,
        kind: &EntityKind,
        entity: &EntityKey,
    ) -> CoreResult<Vec<CoreVersionRecord>> {
        let guard = GuardedStore::new(&*self.store, scope);
        let collection = collection_for(kind, VertexRole::Core);
        let mut versions: Vec<CoreVersionRecord> = guard
            .load_all::<CoreVersionRecord>(&collection, &entity_filter(entity))?
            .into_iter()
            .map(|(r, _)| r)
            .collect();
        versions.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.key.cmp(&b.key))
        });
        Ok(versions)
    }

    /// Returns the version of every entity of the requested kinds valid at
    /// the requested instant.
    ///
    /// Walks the `ProxyIn → Core` edges of each kind and resolves their core
    /// endpoints. Edges whose core record is gone are counted and skipped.
    ///
    /// # Errors
    ///
    /// Returns `AmbiguousVersions` listing every entity with more than one
    /// valid version.
    pub fn snapshot(&self, scope: &TenantScope, request: &SnapshotRequest) -> CoreResult<Snapshot> {
        let guard = GuardedStore::new(&*self.store, scope);
        let mut by_entity: BTreeMap<(EntityKind, EntityKey), Vec<CoreVersionRecord>> =
            BTreeMap::new();
        let mut skipped_edges = 0;

        for kind in &request.kinds {
            let filter = edge_filter(
                &VertexKind::new(kind.clone(), VertexRole::ProxyIn),
                &VertexKind::new(kind.clone(), VertexRole::Core),
            );
            let edges = guard.load_all::<VersionEdge>(VERSION_EDGES, &filter)?;
            let mut seen = BTreeSet::new();
            for (edge, _) in edges {
                let core = edge.core_ref();
                if !seen.insert(core.key.clone()) {
                    continue;
                }
                let Some((record, _)) =
                    guard.load::<CoreVersionRecord>(&core.collection, core.key.as_str())?
                else {
                    tracing::debug!(
                        target: "lineage::query",
                        edge = %edge.key,
                        core = %core,
                        "Skipping edge to removed version"
                    );
                    skipped_edges += 1;
                    continue;
                };
                let valid = match request.at {
                    None => record.is_current(),
                    Some(q) => record.contains(q),
                };
                if valid {
                    by_entity
                        .entry((record.kind.clone(), record.entity.clone()))
                        .or_default()
                        .push(record);
                }
            }
        }

        let conflicts: Vec<VersionConflict> = by_entity
            .iter()
            .filter(|(_, records)| records.len() > 1)
            .map(|((_, entity), records)| VersionConflict {
                entity: entity.clone(),
                keys: records.iter().map(|r| r.key.clone()).collect(),
            })
            .collect();
        if !conflicts.is_empty() {
            tracing::error!(
                target: "lineage::query",
                tenant = %scope.tenant(),
                entities = conflicts.len(),
                "Snapshot found overlapping versions"
            );
            return Err(CoreError::AmbiguousVersions {
                at: request.at,
                conflicts,
            });
        }

        let records: Vec<CoreVersionRecord> = by_entity.into_values().flatten().collect();
        tracing::debug!(
            target: "lineage::query",
            tenant = %scope.tenant(),
            entities = records.len(),
            skipped_edges,
            "Snapshot built"
        );
        Ok(Snapshot {
            at: request.at,
            records,
            skipped_edges,
        })
    }
}

impl std::fmt::Debug for TimeTravel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimeTravel").finish_non_exhaustive()
    }
}
