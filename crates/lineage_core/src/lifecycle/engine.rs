//! The lifecycle transition engine.

use crate::config::EngineConfig;
use crate::error::{Conflict, CoreError, CoreResult};
use crate::guard::{GuardedStore, TenantScope};
use crate::lifecycle::saga::{
    version_key, ChangeRequest, Onboarding, ResumeToken, Transition, TransitionPlan,
};
use crate::schema::{collection_for, VERSION_EDGES};
use crate::temporal::{
    current_filter, edge_key, entity_filter, validate, CoreVersionRecord, Expiry, ProxyVertex,
    RecordDocument, VersionEdge, VertexRef, VertexRole,
};
use crate::types::{EntityKey, EntityKind};
use lineage_store::{RecordStore, Revision, StoreError};
use std::sync::Arc;

/// Drives entities through their lifecycle.
///
/// A configuration change is a two-step saga over single-document writes:
///
/// 1. **Demote** the current version with a compare-and-swap on its store
///    revision. This is the only in-place mutation Lineage performs and the
///    point where concurrent changes are serialized.
/// 2. **Promote** the successor and **rewire** the proxies to it with two new
///    edges. Every key written here is derived from `(entity, at)`, so the
///    step can be repeated until it succeeds.
///
/// If step 2 keeps failing the engine returns
/// [`CoreError::PartialTransition`]; [`LifecycleEngine::resume`] finishes the
/// job later.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use lineage_codec::Value;
/// use lineage_core::{
///     schema, ChangeRequest, EngineConfig, EntityKey, EntityKind, LifecycleEngine, Onboarding,
///     TenantScope, Timestamp,
/// };
/// use lineage_store::InMemoryStore;
///
/// let store = Arc::new(InMemoryStore::new());
/// schema::provision(&*store, &[EntityKind::device()]).unwrap();
/// let engine = LifecycleEngine::new(store, EngineConfig::default());
/// let scope = TenantScope::new("acme");
/// let e1 = EntityKey::new("E1");
///
/// engine.onboard(&scope, Onboarding::new(
///     EntityKind::device(), e1.clone(), Value::record([("config", "A")]), Timestamp::from_millis(0),
/// )).unwrap();
/// let t = engine.change_configuration(&scope, ChangeRequest::new(
///     EntityKind::device(), e1, Value::record([("config", "B")]), Timestamp::from_millis(10),
/// )).unwrap();
/// assert_eq!(t.new_key().as_str(), "E1@10");
/// ```
pub struct LifecycleEngine {
    store: Arc<dyn RecordStore>,
    config: EngineConfig,
}

impl LifecycleEngine {
    /// Creates an engine over a provisioned store.
    pub fn new(store: Arc<dyn RecordStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Creates an entity: both proxies, the first version and its edges.
    ///
    /// Repeating an onboarding that already completed (or failed halfway)
    /// with the same request succeeds and returns the same record.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyOnboarded` if the entity has any other version,
    /// `InvalidTemporalRecord` if the attributes are not a map, and store or
    /// guard errors.
    pub fn onboard(
        &self,
        scope: &TenantScope,
        request: Onboarding,
    ) -> CoreResult<CoreVersionRecord> {
        let guard = GuardedStore::new(&*self.store, scope);
        let Onboarding {
            kind,
            entity,
            attributes,
            at,
        } = request;
        let first = CoreVersionRecord::current(
            version_key(&entity, at),
            entity.clone(),
            kind.clone(),
            scope.tenant().clone(),
            attributes,
            at,
        );
        validate(&first)?;

        let existing =
            guard.load_all::<CoreVersionRecord>(&first.collection(), &entity_filter(&entity))?;
        if existing.iter().any(|(record, _)| record.key != first.key) {
            return Err(CoreError::AlreadyOnboarded { entity });
        }

        let already = |e: CoreError| match e {
            CoreError::ConcurrentModification {
                conflict: Conflict::KeyTaken { .. },
                ..
            } => CoreError::AlreadyOnboarded {
                entity: entity.clone(),
            },
            other => other,
        };
        let proxy_in = ProxyVertex::inbound(&entity, &kind, scope.tenant());
        let proxy_out = ProxyVertex::outbound(&entity, &kind, scope.tenant());
        guard.insert_once(&proxy_in, &entity).map_err(already)?;
        guard.insert_once(&proxy_out, &entity).map_err(already)?;
        guard.insert_once(&first, &entity).map_err(already)?;
        rewire(&guard, &proxy_in, &first, &proxy_out)?;

        tracing::info!(
            target: "lineage::lifecycle",
            tenant = %scope.tenant(),
            %kind,
            %entity,
            key = %first.key,
            "Entity onboarded"
        );
        Ok(first)
    }

    /// Returns the current version of an entity with its store revision.
    ///
    /// # Errors
    ///
    /// Returns `NoCurrentVersion`, `MultipleCurrentVersions`,
    /// `EntityNotFound`, or `ConcurrentModification` while a promotion or
    /// onboarding is pending. A version counts as current only once both of
    /// its edges are written.
    pub fn current(
        &self,
        scope: &TenantScope,
        kind: &EntityKind,
        entity: &EntityKey,
    ) -> CoreResult<(CoreVersionRecord, Revision)> {
        let guard = GuardedStore::new(&*self.store, scope);
        locate_current(&guard, kind, entity)
    }

    /// Validates a change and builds the documents it will write.
    ///
    /// Reads the store but never writes it.
    ///
    /// # Errors
    ///
    /// Returns everything [`LifecycleEngine::current`] does, plus
    /// `ConcurrentModification` if the request names a stale expected
    /// version and `InvalidTemporalRecord` if the change does not fall after
    /// the current version's start.
    pub fn plan(&self, scope: &TenantScope, request: &ChangeRequest) -> CoreResult<TransitionPlan> {
        let guard = GuardedStore::new(&*self.store, scope);
        let (observed, observed_revision) = locate_current(&guard, &request.kind, &request.entity)?;

        if let Some(expected) = &request.expected_current {
            if expected != &observed.key {
                tracing::warn!(
                    target: "lineage::lifecycle",
                    entity = %request.entity,
                    expected = %expected,
                    found = %observed.key,
                    "Current version moved"
                );
                return Err(CoreError::concurrent(
                    &request.entity,
                    Conflict::StaleCurrent {
                        expected: expected.clone(),
                        found: observed.key,
                    },
                ));
            }
        }

        let retention = request
            .retention
            .unwrap_or_else(|| self.config.retention_for(scope.tenant()));
        let successor = CoreVersionRecord::current(
            version_key(&request.entity, request.at),
            request.entity.clone(),
            request.kind.clone(),
            scope.tenant().clone(),
            request.attributes.clone(),
            request.at,
        );
        validate(&successor)?;
        let demoted = observed.demoted(request.at, retention, successor.key.clone())?;

        tracing::debug!(
            target: "lineage::lifecycle",
            entity = %request.entity,
            observed = %observed.key,
            revision = %observed_revision,
            successor = %successor.key,
            ?retention,
            "Transition planned"
        );
        Ok(TransitionPlan {
            observed,
            observed_revision,
            demoted,
            successor,
        })
    }

    /// Executes a plan: demote, then promote and rewire.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentModification` if another transition demoted the
    /// observed version first; nothing is written in that case. Returns
    /// `PartialTransition` if the demotion succeeded but promotion failed
    /// after every retry.
    pub fn execute(&self, scope: &TenantScope, plan: &TransitionPlan) -> CoreResult<Transition> {
        scope.check(&plan.successor.tenant, "execute transition")?;
        let guard = GuardedStore::new(&*self.store, scope);

        match guard.update(&plan.demoted, plan.observed_revision) {
            Ok(revision) => tracing::debug!(
                target: "lineage::lifecycle",
                key = %plan.demoted.key,
                %revision,
                "Version demoted"
            ),
            Err(CoreError::Store(
                StoreError::RevisionMismatch { .. } | StoreError::NotFound { .. },
            )) => {
                tracing::warn!(
                    target: "lineage::lifecycle",
                    entity = %plan.observed.entity,
                    observed = %plan.observed.key,
                    "Lost demotion race"
                );
                return Err(CoreError::concurrent(
                    &plan.observed.entity,
                    Conflict::LostRace {
                        observed: plan.observed.key.clone(),
                    },
                ));
            }
            Err(e) => return Err(e),
        }

        let token = plan.resume_token();
        self.finish(&guard, plan.demoted.clone(), token)
    }

    /// Plans and executes a configuration change.
    ///
    /// # Errors
    ///
    /// See [`LifecycleEngine::plan`] and [`LifecycleEngine::execute`].
    pub fn change_configuration(
        &self,
        scope: &TenantScope,
        request: ChangeRequest,
    ) -> CoreResult<Transition> {
        let plan = self.plan(scope, &request)?;
        self.execute(scope, &plan)
    }

    /// Finishes an interrupted transition.
    ///
    /// Re-runs promote and rewire only, writing whichever of the successor
    /// and its edges is missing. Safe to call repeatedly, including after
    /// the transition completed and the successor was itself demoted; the
    /// returned `current` is then the successor as stored.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentModification` if the demoted version no longer
    /// matches the token, and `PartialTransition` (with the same token) if
    /// promotion fails again.
    pub fn resume(&self, scope: &TenantScope, token: &ResumeToken) -> CoreResult<Transition> {
        scope.check(&token.tenant, "resume transition")?;
        let guard = GuardedStore::new(&*self.store, scope);
        let collection = collection_for(&token.kind, VertexRole::Core);

        let demoted = match guard.load::<CoreVersionRecord>(&collection, token.demoted.as_str())? {
            Some((record, _))
                if record.superseded_by.as_ref() == Some(&token.successor)
                    && record.expires_at == Expiry::At(token.at) =>
            {
                record
            }
            _ => {
                return Err(CoreError::concurrent(
                    &token.entity,
                    Conflict::ResumeMismatch {
                        demoted: token.demoted.clone(),
                    },
                ))
            }
        };

        tracing::info!(
            target: "lineage::lifecycle",
            entity = %token.entity,
            successor = %token.successor,
            "Resuming transition"
        );
        self.finish(&guard, demoted, token.clone())
    }

    fn finish(
        &self,
        guard: &GuardedStore<'_>,
        previous: CoreVersionRecord,
        token: ResumeToken,
    ) -> CoreResult<Transition> {
        match self.promote_with_retry(guard, &token) {
            Ok((current, attempts)) => {
                tracing::info!(
                    target: "lineage::lifecycle",
                    tenant = %token.tenant,
                    entity = %token.entity,
                    previous = %previous.key,
                    current = %current.key,
                    attempts,
                    "Transition complete"
                );
                Ok(Transition {
                    previous,
                    current,
                    at: token.at,
                    attempts,
                })
            }
            Err(source) => {
                tracing::error!(
                    target: "lineage::lifecycle",
                    tenant = %token.tenant,
                    entity = %token.entity,
                    demoted = %token.demoted,
                    successor = %token.successor,
                    error = %source,
                    "Transition interrupted after demotion"
                );
                Err(CoreError::PartialTransition {
                    token: Box::new(token),
                    source: Box::new(source),
                })
            }
        }
    }

    fn promote_with_retry(
        &self,
        guard: &GuardedStore<'_>,
        token: &ResumeToken,
    ) -> CoreResult<(CoreVersionRecord, u32)> {
        let retry = &self.config.retry;
        let max_attempts = retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match promote(guard, token) {
                Ok(record) => return Ok((record, attempt)),
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    attempt += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    tracing::warn!(
                        target: "lineage::lifecycle",
                        entity = %token.entity,
                        attempt,
                        ?delay,
                        error = %e,
                        "Retrying promotion"
                    );
                    if !delay.is_zero() {
                        std::thread::sleep(delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl std::fmt::Debug for LifecycleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleEngine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn locate_current(
    guard: &GuardedStore<'_>,
    kind: &EntityKind,
    entity: &EntityKey,
) -> CoreResult<(CoreVersionRecord, Revision)> {
    let collection = collection_for(kind, VertexRole::Core);
    let mut found = guard.load_all::<CoreVersionRecord>(&collection, &current_filter(entity))?;
    if found.len() > 1 {
        let keys: Vec<_> = found.into_iter().map(|(r, _)| r.key).collect();
        tracing::error!(
            target: "lineage::lifecycle",
            %entity,
            count = keys.len(),
            "Multiple current versions"
        );
        return Err(CoreError::MultipleCurrentVersions {
            entity: entity.clone(),
            keys,
        });
    }
    match found.pop() {
        Some((current, revision)) => {
            ensure_linked(guard, &current)?;
            Ok((current, revision))
        }
        None => Err(explain_missing_current(guard, kind, entity)?),
    }
}

/// Rejects a current version whose proxies are not yet rewired to it.
fn ensure_linked(guard: &GuardedStore<'_>, current: &CoreVersionRecord) -> CoreResult<()> {
    let collection = collection_for(&current.kind, VertexRole::Core);
    let core_ref = VertexRef::new(collection.clone(), current.key.clone());
    let mut linked = true;
    for role in [VertexRole::ProxyIn, VertexRole::ProxyOut] {
        let key = edge_key(&core_ref, role);
        linked &= guard.get(VERSION_EDGES, key.as_str())?.is_some();
    }
    if linked {
        return Ok(());
    }

    let predecessor = guard
        .load_all::<CoreVersionRecord>(&collection, &entity_filter(&current.entity))?
        .into_iter()
        .map(|(record, _)| record)
        .find(|record| record.superseded_by.as_ref() == Some(&current.key));
    tracing::warn!(
        target: "lineage::lifecycle",
        entity = %current.entity,
        key = %current.key,
        "Current version is not linked"
    );
    let conflict = match predecessor {
        Some(demoted) => Conflict::PromotionPending {
            demoted: demoted.key,
            successor: current.key.clone(),
        },
        None => Conflict::OnboardingPending {
            first: current.key.clone(),
        },
    };
    Err(CoreError::concurrent(&current.entity, conflict))
}

/// Distinguishes an unknown entity, an interrupted promotion and a plain
/// missing current version.
fn explain_missing_current(
    guard: &GuardedStore<'_>,
    kind: &EntityKind,
    entity: &EntityKey,
) -> CoreResult<CoreError> {
    let collection = collection_for(kind, VertexRole::Core);
    let versions = guard.load_all::<CoreVersionRecord>(&collection, &entity_filter(entity))?;
    let Some((latest, _)) = versions.iter().max_by_key(|(r, _)| r.created_at) else {
        let proxy = guard.get(&collection_for(kind, VertexRole::ProxyIn), entity.as_str())?;
        return Ok(if proxy.is_some() {
            CoreError::NoCurrentVersion {
                entity: entity.clone(),
            }
        } else {
            CoreError::EntityNotFound {
                entity: entity.clone(),
            }
        });
    };

    if let Some(successor) = &latest.superseded_by {
        if !versions.iter().any(|(r, _)| &r.key == successor) {
            tracing::warn!(
                target: "lineage::lifecycle",
                %entity,
                demoted = %latest.key,
                %successor,
                "Promotion pending"
            );
            return Ok(CoreError::concurrent(
                entity,
                Conflict::PromotionPending {
                    demoted: latest.key.clone(),
                    successor: successor.clone(),
                },
            ));
        }
    }
    Ok(CoreError::NoCurrentVersion {
        entity: entity.clone(),
    })
}

fn load_proxies(
    guard: &GuardedStore<'_>,
    kind: &EntityKind,
    entity: &EntityKey,
) -> CoreResult<(ProxyVertex, ProxyVertex)> {
    let load = |role| -> CoreResult<ProxyVertex> {
        guard
            .load::<ProxyVertex>(&collection_for(kind, role), entity.as_str())?
            .map(|(proxy, _)| proxy)
            .ok_or_else(|| CoreError::EntityNotFound {
                entity: entity.clone(),
            })
    };
    Ok((load(VertexRole::ProxyIn)?, load(VertexRole::ProxyOut)?))
}

fn promote(guard: &GuardedStore<'_>, token: &ResumeToken) -> CoreResult<CoreVersionRecord> {
    let successor = token.successor_record();
    validate(&successor)?;
    let (proxy_in, proxy_out) = load_proxies(guard, &token.kind, &token.entity)?;

    // A successor written earlier may have been demoted since.
    let stored = guard.load::<CoreVersionRecord>(&successor.collection(), successor.key.as_str())?;
    let promoted = match stored {
        Some((stored, _)) if same_version(&stored, &successor) => stored,
        Some(_) => {
            return Err(CoreError::concurrent(
                &token.entity,
                Conflict::KeyTaken {
                    key: successor.key.clone(),
                },
            ))
        }
        None => {
            guard.insert_once(&successor, &token.entity)?;
            tracing::debug!(target: "lineage::lifecycle", key = %successor.key, "Version promoted");
            successor
        }
    };
    rewire(guard, &proxy_in, &promoted, &proxy_out)?;
    Ok(promoted)
}

/// Compares the parts of a version that its demotion leaves untouched.
fn same_version(stored: &CoreVersionRecord, expected: &CoreVersionRecord) -> bool {
    stored.entity == expected.entity
        && stored.kind == expected.kind
        && stored.tenant == expected.tenant
        && stored.created_at == expected.created_at
        && stored.attributes == expected.attributes
}

fn rewire(
    guard: &GuardedStore<'_>,
    proxy_in: &ProxyVertex,
    core: &CoreVersionRecord,
    proxy_out: &ProxyVertex,
) -> CoreResult<()> {
    let inbound = VersionEdge::inbound(proxy_in, core)?;
    guard.link(&inbound, proxy_in, core)?;
    let outbound = VersionEdge::outbound(core, proxy_out)?;
    guard.link(&outbound, core, proxy_out)?;
    tracing::debug!(target: "lineage::lifecycle", key = %core.key, "Proxies rewired");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::schema;
    use crate::types::{RecordKey, Timestamp};
    use lineage_codec::Value;
    use lineage_store::{FaultyStore, InMemoryStore, StoreOp};
    use std::time::Duration;

    fn engine_over(store: Arc<dyn RecordStore>, retry: RetryPolicy) -> LifecycleEngine {
        schema::provision(&*store, &[EntityKind::device()]).unwrap();
        LifecycleEngine::new(
            store,
            EngineConfig::default()
                .with_default_retention(Duration::from_millis(30))
                .with_retry(retry),
        )
    }

    fn onboard(engine: &LifecycleEngine, scope: &TenantScope) -> CoreVersionRecord {
        engine
            .onboard(
                scope,
                Onboarding::new(
                    EntityKind::device(),
                    EntityKey::new("E1"),
                    Value::record([("config", "A")]),
                    Timestamp::from_millis(0),
                ),
            )
            .unwrap()
    }

    fn change(config: &str, at: i64) -> ChangeRequest {
        ChangeRequest::new(
            EntityKind::device(),
            EntityKey::new("E1"),
            Value::record([("config", config)]),
            Timestamp::from_millis(at),
        )
    }

    #[test]
    fn onboard_writes_five_documents() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine_over(store.clone(), RetryPolicy::default());
        let scope = TenantScope::new("acme");
        let first = onboard(&engine, &scope);
        assert_eq!(first.key.as_str(), "E1@0");
        assert_eq!(store.document_count(), 5);

        // Same request again is a no-op.
        onboard(&engine, &scope);
        assert_eq!(store.document_count(), 5);
    }

    #[test]
    fn onboard_rejects_existing_history() {
        let engine = engine_over(Arc::new(InMemoryStore::new()), RetryPolicy::default());
        let scope = TenantScope::new("acme");
        onboard(&engine, &scope);
        let err = engine
            .onboard(
                &scope,
                Onboarding::new(
                    EntityKind::device(),
                    EntityKey::new("E1"),
                    Value::record([("config", "Z")]),
                    Timestamp::from_millis(5),
                ),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyOnboarded { .. }));
    }

    #[test]
    fn change_demotes_and_promotes() {
        let engine = engine_over(Arc::new(InMemoryStore::new()), RetryPolicy::default());
        let scope = TenantScope::new("acme");
        onboard(&engine, &scope);

        let t = engine.change_configuration(&scope, change("B", 10)).unwrap();
        assert_eq!(t.previous.key.as_str(), "E1@0");
        assert_eq!(t.previous.expires_at, Expiry::At(Timestamp::from_millis(10)));
        assert_eq!(t.previous.ttl_deadline, Some(Timestamp::from_millis(40)));
        assert_eq!(t.previous.superseded_by, Some(RecordKey::new("E1@10")));
        assert_eq!(t.new_key().as_str(), "E1@10");
        assert_eq!(t.attempts, 1);

        let (current, _) = engine
            .current(&scope, &EntityKind::device(), &EntityKey::new("E1"))
            .unwrap();
        assert_eq!(current, t.current);
    }

    #[test]
    fn change_of_unknown_entity() {
        let engine = engine_over(Arc::new(InMemoryStore::new()), RetryPolicy::default());
        let err = engine
            .change_configuration(&TenantScope::new("acme"), change("B", 10))
            .unwrap_err();
        assert!(matches!(err, CoreError::EntityNotFound { .. }));
    }

    #[test]
    fn change_not_after_current_start_is_invalid() {
        let engine = engine_over(Arc::new(InMemoryStore::new()), RetryPolicy::default());
        let scope = TenantScope::new("acme");
        onboard(&engine, &scope);
        let err = engine.change_configuration(&scope, change("B", 0)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemporalRecord { .. }));
    }

    #[test]
    fn stale_expected_key_is_rejected_before_writing() {
        let engine = engine_over(Arc::new(InMemoryStore::new()), RetryPolicy::default());
        let scope = TenantScope::new("acme");
        onboard(&engine, &scope);
        let err = engine
            .change_configuration(&scope, change("B", 10).expecting(RecordKey::new("E1@5")))
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::ConcurrentModification {
                conflict: Conflict::StaleCurrent { .. },
                ..
            }
        ));
        let (current, revision) = engine
            .current(&scope, &EntityKind::device(), &EntityKey::new("E1"))
            .unwrap();
        assert_eq!(current.key.as_str(), "E1@0");
        assert_eq!(revision, Revision::INITIAL);
    }

    #[test]
    fn transient_promotion_failure_is_retried() {
        let faulty = Arc::new(FaultyStore::new(Arc::new(InMemoryStore::new())));
        let engine = engine_over(
            faulty.clone(),
            RetryPolicy::new(3).with_initial_delay(Duration::ZERO),
        );
        let scope = TenantScope::new("acme");
        onboard(&engine, &scope);

        faulty.fail_in(StoreOp::Insert, "version", 2);
        let t = engine.change_configuration(&scope, change("B", 10)).unwrap();
        assert_eq!(t.attempts, 3);
    }

    #[test]
    fn exhausted_retries_yield_resume_token() {
        let faulty = Arc::new(FaultyStore::new(Arc::new(InMemoryStore::new())));
        let engine = engine_over(faulty.clone(), RetryPolicy::no_retry());
        let scope = TenantScope::new("acme");
        onboard(&engine, &scope);

        faulty.fail_in(StoreOp::Insert, "device", 1);
        let err = engine.change_configuration(&scope, change("B", 10)).unwrap_err();
        let token = err.resume_token().cloned().unwrap();
        assert_eq!(token.successor.as_str(), "E1@10");

        let t = engine.resume(&scope, &token).unwrap();
        assert_eq!(t.current.key, token.successor);
        assert_eq!(t.previous.key, token.demoted);

        // Completed transitions resume to the same result.
        assert_eq!(engine.resume(&scope, &token).unwrap().current, t.current);
    }

    #[test]
    fn unlinked_successor_blocks_next_change() {
        let faulty = Arc::new(FaultyStore::new(Arc::new(InMemoryStore::new())));
        let engine = engine_over(faulty.clone(), RetryPolicy::no_retry());
        let scope = TenantScope::new("acme");
        onboard(&engine, &scope);

        faulty.fail_in(StoreOp::Insert, "version", 1);
        let token = engine
            .change_configuration(&scope, change("B", 10))
            .unwrap_err()
            .resume_token()
            .cloned()
            .unwrap();

        let err = engine.plan(&scope, &change("C", 20)).unwrap_err();
        assert!(matches!(
            err,
            CoreError::ConcurrentModification {
                conflict: Conflict::PromotionPending { ref demoted, ref successor },
                ..
            } if demoted.as_str() == "E1@0" && successor.as_str() == "E1@10"
        ));

        engine.resume(&scope, &token).unwrap();
        let t = engine.change_configuration(&scope, change("C", 20)).unwrap();
        assert_eq!(t.previous.key.as_str(), "E1@10");
    }

    #[test]
    fn resume_links_successor_demoted_since() {
        let faulty = Arc::new(FaultyStore::new(Arc::new(InMemoryStore::new())));
        let engine = engine_over(faulty.clone(), RetryPolicy::no_retry());
        let scope = TenantScope::new("acme");
        onboard(&engine, &scope);

        faulty.fail_in(StoreOp::Insert, "version", 1);
        let token = engine
            .change_configuration(&scope, change("B", 10))
            .unwrap_err()
            .resume_token()
            .cloned()
            .unwrap();

        // A writer that read E1@10 before its edges were checked demotes it.
        let guard = GuardedStore::new(&*faulty, &scope);
        let (observed, observed_revision) = guard
            .load::<CoreVersionRecord>("device", "E1@10")
            .unwrap()
            .unwrap();
        let at = Timestamp::from_millis(20);
        let successor = CoreVersionRecord::current(
            RecordKey::new("E1@20"),
            EntityKey::new("E1"),
            EntityKind::device(),
            scope.tenant().clone(),
            Value::record([("config", "C")]),
            at,
        );
        let plan = TransitionPlan {
            demoted: observed
                .demoted(at, Duration::from_millis(30), successor.key.clone())
                .unwrap(),
            observed,
            observed_revision,
            successor,
        };
        engine.execute(&scope, &plan).unwrap();

        let t = engine.resume(&scope, &token).unwrap();
        assert_eq!(t.current.key.as_str(), "E1@10");
        assert_eq!(t.current.expires_at, Expiry::At(at));

        let report = crate::verify::verify_tenant(&guard, &[EntityKind::device()]).unwrap();
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.edges, 6);
    }
}
