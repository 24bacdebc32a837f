//! The main entry point.

use crate::config::EngineConfig;
use crate::error::CoreResult;
use crate::guard::{GuardedStore, TenantScope};
use crate::lifecycle::{ChangeRequest, LifecycleEngine, Onboarding, ResumeToken, Transition};
use crate::query::{Snapshot, SnapshotRequest, TimeTravel};
use crate::schema;
use crate::temporal::CoreVersionRecord;
use crate::types::{EntityKey, EntityKind, Timestamp};
use crate::verify::{verify_tenant, IntegrityReport};
use lineage_store::{InMemoryStore, RecordStore};
use std::sync::Arc;

/// A provisioned store with its lifecycle and query engines.
///
/// `Lineage` is `Send + Sync`; share it through an `Arc`.
///
/// # Example
///
/// ```rust
/// use lineage_codec::Value;
/// use lineage_core::{ChangeRequest, EntityKey, EntityKind, Lineage, Onboarding, Timestamp};
///
/// let lineage = Lineage::open_in_memory(&[EntityKind::device()]).unwrap();
/// let acme = lineage.scope("acme");
/// let e1 = EntityKey::new("E1");
///
/// lineage.onboard(&acme, Onboarding::new(
///     EntityKind::device(), e1.clone(), Value::record([("config", "A")]), Timestamp::from_millis(0),
/// )).unwrap();
/// lineage.change_configuration(&acme, ChangeRequest::new(
///     EntityKind::device(), e1.clone(), Value::record([("config", "B")]), Timestamp::from_millis(10),
/// )).unwrap();
///
/// let then = lineage.as_of(&acme, &EntityKind::device(), &e1, Some(Timestamp::from_millis(5))).unwrap();
/// assert_eq!(then.unwrap().attributes, Value::record([("config", "A")]));
/// ```
pub struct Lineage {
    store: Arc<dyn RecordStore>,
    kinds: Vec<EntityKind>,
    engine: LifecycleEngine,
    time_travel: TimeTravel,
}

impl Lineage {
    /// Provisions `kinds` on `store` and builds the engines.
    ///
    /// # Errors
    ///
    /// Returns a store error if provisioning fails.
    pub fn open(
        store: Arc<dyn RecordStore>,
        config: EngineConfig,
        kinds: &[EntityKind],
    ) -> CoreResult<Self> {
        schema::provision(&*store, kinds)?;
        tracing::info!(
            target: "lineage::core",
            kinds = kinds.len(),
            retention = ?config.default_retention,
            "Lineage opened"
        );
        Ok(Self {
            engine: LifecycleEngine::new(Arc::clone(&store), config),
            time_travel: TimeTravel::new(Arc::clone(&store)),
            kinds: kinds.to_vec(),
            store,
        })
    }

    /// Opens over a fresh in-memory store with default configuration.
    ///
    /// # Errors
    ///
    /// Returns a store error if provisioning fails.
    pub fn open_in_memory(kinds: &[EntityKind]) -> CoreResult<Self> {
        Self::open(Arc::new(InMemoryStore::new()), EngineConfig::default(), kinds)
    }

    /// Returns a scope for `tenant`.
    pub fn scope(&self, tenant: &str) -> TenantScope {
        TenantScope::new(tenant)
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    /// Returns the provisioned kinds.
    pub fn kinds(&self) -> &[EntityKind] {
        &self.kinds
    }

    /// Returns the lifecycle engine.
    pub fn engine(&self) -> &LifecycleEngine {
        &self.engine
    }

    /// Returns the query engine.
    pub fn time_travel(&self) -> &TimeTravel {
        &self.time_travel
    }

    /// Creates an entity. See [`LifecycleEngine::onboard`].
    ///
    /// # Errors
    ///
    /// See [`LifecycleEngine::onboard`].
    pub fn onboard(
        &self,
        scope: &TenantScope,
        request: Onboarding,
    ) -> CoreResult<CoreVersionRecord> {
        self.engine.onboard(scope, request)
    }

    /// Changes an entity's configuration.
    ///
    /// # Errors
    ///
    /// See [`LifecycleEngine::change_configuration`].
    pub fn change_configuration(
        &self,
        scope: &TenantScope,
        request: ChangeRequest,
    ) -> CoreResult<Transition> {
        self.engine.change_configuration(scope, request)
    }

    /// Finishes an interrupted transition.
    ///
    /// # Errors
    ///
    /// See [`LifecycleEngine::resume`].
    pub fn resume(&self, scope: &TenantScope, token: &ResumeToken) -> CoreResult<Transition> {
        self.engine.resume(scope, token)
    }

    /// Returns the version valid at `at` (`None` for now).
    ///
    /// # Errors
    ///
    /// See [`TimeTravel::as_of`].
    pub fn as_of(
        &self,
        scope: &TenantScope,
        kind: &EntityKind,
        entity: &EntityKey,
        at: Option<Timestamp>,
    ) -> CoreResult<Option<CoreVersionRecord>> {
        self.time_travel.as_of(scope, kind, entity, at)
    }

    /// Returns every retained version, oldest first.
    ///
    /// # Errors
    ///
    /// See [`TimeTravel::history`].
    pub fn history(
        &self,
        scope: &TenantScope,
        kind: &EntityKind,
        entity: &EntityKey,
    ) -> CoreResult<Vec<CoreVersionRecord>> {
        self.time_travel.history(scope, kind, entity)
    }

    /// Returns the state of several kinds at one instant.
    ///
    /// # Errors
    ///
    /// See [`TimeTravel::snapshot`].
    pub fn snapshot(&self, scope: &TenantScope, request: &SnapshotRequest) -> CoreResult<Snapshot> {
        self.time_travel.snapshot(scope, request)
    }

    /// Verifies every provisioned kind of the scope's tenant.
    ///
    /// # Errors
    ///
    /// See [`verify_tenant`].
    pub fn verify(&self, scope: &TenantScope) -> CoreResult<IntegrityReport> {
        verify_tenant(&GuardedStore::new(&*self.store, scope), &self.kinds)
    }
}

impl std::fmt::Debug for Lineage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lineage")
            .field("kinds", &self.kinds)
            .field("engine", &self.engine)
            .finish_non_exhaustive()
    }
}
