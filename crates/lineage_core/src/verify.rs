//! Tenant integrity verification.
//!
//! Re-checks every invariant the engine maintains by reading all of a
//! tenant's documents. Violations are collected, never repaired.

use crate::error::CoreResult;
use crate::guard::{GuardedStore, TenantScope};
use crate::schema::{collection_for, VERSION_EDGES};
use crate::temporal::{
    edge_filter, validate, CoreVersionRecord, Expiry, ProxyVertex, RecordDocument, VersionEdge,
    VertexKind, VertexRole,
};
use crate::types::{EntityKey, EntityKind, RecordKey, TenantKey};
use lineage_store::{Document, Filter};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// How serious an issue is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    /// Expected after TTL expiry or mid-transition; worth a look.
    Warning,
    /// An invariant is broken.
    Error,
}

/// One integrity violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityIssue {
    /// A document could not be decoded.
    Malformed {
        /// Collection name.
        collection: String,
        /// Document key.
        key: String,
        /// Decoder message.
        reason: String,
    },
    /// A record's window or TTL fields are invalid.
    InvalidRecord {
        /// Record key.
        key: RecordKey,
        /// Validation message.
        reason: String,
    },
    /// An entity has no current version.
    NoCurrentVersion {
        /// Entity kind.
        kind: EntityKind,
        /// Entity key.
        entity: EntityKey,
    },
    /// An entity has more than one current version.
    MultipleCurrentVersions {
        /// Entity kind.
        kind: EntityKind,
        /// Entity key.
        entity: EntityKey,
        /// Keys of the current versions.
        keys: Vec<RecordKey>,
    },
    /// A demotion completed but its successor was never written.
    PromotionPending {
        /// Entity kind.
        kind: EntityKind,
        /// Entity key.
        entity: EntityKey,
        /// The demoted version.
        demoted: RecordKey,
        /// The missing successor.
        successor: RecordKey,
    },
    /// Two consecutive versions overlap.
    OverlappingWindows {
        /// Entity key.
        entity: EntityKey,
        /// The earlier version.
        earlier: RecordKey,
        /// The later version.
        later: RecordKey,
    },
    /// Two consecutive versions leave a gap between them.
    WindowGap {
        /// Entity key.
        entity: EntityKey,
        /// The earlier version.
        earlier: RecordKey,
        /// The later version.
        later: RecordKey,
    },
    /// An entity has versions but lacks a proxy.
    MissingProxy {
        /// Entity kind.
        kind: EntityKind,
        /// Entity key.
        entity: EntityKey,
        /// The missing role.
        role: VertexRole,
    },
    /// A version lacks one of its two edges.
    MissingEdge {
        /// The version.
        core: RecordKey,
        /// The proxy the edge should join.
        role: VertexRole,
    },
    /// An edge points at a vertex that does not exist.
    DanglingEdge {
        /// Edge key.
        edge: RecordKey,
        /// The missing endpoint.
        endpoint: String,
        /// True if the missing endpoint is a core record.
        core_endpoint: bool,
    },
}

impl IntegrityIssue {
    /// Returns the issue's severity.
    ///
    /// Gaps and edges to missing cores are what TTL removal leaves behind;
    /// everything else is an error.
    pub fn severity(&self) -> Severity {
        match self {
            Self::WindowGap { .. }
            | Self::DanglingEdge {
                core_endpoint: true,
                ..
            } => Severity::Warning,
            _ => Severity::Error,
        }
    }
}

impl fmt::Display for IntegrityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed {
                collection,
                key,
                reason,
            } => write!(f, "malformed {collection}/{key}: {reason}"),
            Self::InvalidRecord { key, reason } => write!(f, "invalid record {key}: {reason}"),
            Self::NoCurrentVersion { kind, entity } => {
                write!(f, "{kind} {entity} has no current version")
            }
            Self::MultipleCurrentVersions { kind, entity, keys } => {
                let keys: Vec<&str> = keys.iter().map(RecordKey::as_str).collect();
                write!(
                    f,
                    "{kind} {entity} has {} current versions: {}",
                    keys.len(),
                    keys.join(", ")
                )
            }
            Self::PromotionPending {
                kind,
                entity,
                demoted,
                successor,
            } => write!(
                f,
                "{kind} {entity}: {demoted} demoted but {successor} missing"
            ),
            Self::OverlappingWindows {
                entity,
                earlier,
                later,
            } => write!(f, "{entity}: {earlier} overlaps {later}"),
            Self::WindowGap {
                entity,
                earlier,
                later,
            } => write!(f, "{entity}: gap between {earlier} and {later}"),
            Self::MissingProxy { kind, entity, role } => {
                write!(f, "{kind} {entity} lacks its {role:?} proxy")
            }
            Self::MissingEdge { core, role } => write!(f, "{core} lacks its {role:?} edge"),
            Self::DanglingEdge { edge, endpoint, .. } => {
                write!(f, "edge {edge} points at missing {endpoint}")
            }
        }
    }
}

/// Result of verifying one tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityReport {
    /// The verified tenant.
    pub tenant: TenantKey,
    /// Entities examined.
    pub entities: usize,
    /// Core records examined.
    pub records: usize,
    /// Edges examined.
    pub edges: usize,
    /// Everything found.
    pub issues: Vec<IntegrityIssue>,
}

impl IntegrityReport {
    /// Returns true if there are no error-severity issues.
    pub fn is_ok(&self) -> bool {
        self.errors().next().is_none()
    }

    /// Error-severity issues.
    pub fn errors(&self) -> impl Iterator<Item = &IntegrityIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity() == Severity::Error)
    }

    /// Warning-severity issues.
    pub fn warnings(&self) -> impl Iterator<Item = &IntegrityIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity() == Severity::Warning)
    }
}

/// Verifies every entity of `kinds` in the scope's tenant.
///
/// # Errors
///
/// Returns a store or guard error if documents cannot be read. Malformed
/// documents are reported as issues, not errors.
pub fn verify_tenant(
    guard: &GuardedStore<'_>,
    kinds: &[EntityKind],
) -> CoreResult<IntegrityReport> {
    let scope: &TenantScope = guard.scope();
    let mut report = IntegrityReport {
        tenant: scope.tenant().clone(),
        entities: 0,
        records: 0,
        edges: 0,
        issues: Vec::new(),
    };

    for kind in kinds {
        verify_kind(guard, kind, &mut report)?;
    }

    tracing::info!(
        target: "lineage::verify",
        tenant = %report.tenant,
        entities = report.entities,
        records = report.records,
        edges = report.edges,
        errors = report.errors().count(),
        warnings = report.warnings().count(),
        "Tenant verified"
    );
    Ok(report)
}

fn decode_all<R: RecordDocument>(
    collection: &str,
    docs: &[Document],
    issues: &mut Vec<IntegrityIssue>,
) -> Vec<R> {
    docs.iter()
        .filter_map(|doc| match R::from_document(collection, doc) {
            Ok(record) => Some(record),
            Err(e) => {
                issues.push(IntegrityIssue::Malformed {
                    collection: collection.to_string(),
                    key: doc.key.clone(),
                    reason: e.to_string(),
                });
                None
            }
        })
        .collect()
}

fn verify_kind(
    guard: &GuardedStore<'_>,
    kind: &EntityKind,
    report: &mut IntegrityReport,
) -> CoreResult<()> {
    let core_collection = collection_for(kind, VertexRole::Core);
    let in_collection = collection_for(kind, VertexRole::ProxyIn);
    let out_collection = collection_for(kind, VertexRole::ProxyOut);

    let cores: Vec<CoreVersionRecord> = decode_all(
        &core_collection,
        &guard.find(&core_collection, &Filter::all())?,
        &mut report.issues,
    );
    let proxies_in: BTreeSet<EntityKey> = decode_all::<ProxyVertex>(
        &in_collection,
        &guard.find(&in_collection, &Filter::all())?,
        &mut report.issues,
    )
    .into_iter()
    .map(|p| p.entity)
    .collect();
    let proxies_out: BTreeSet<EntityKey> = decode_all::<ProxyVertex>(
        &out_collection,
        &guard.find(&out_collection, &Filter::all())?,
        &mut report.issues,
    )
    .into_iter()
    .map(|p| p.entity)
    .collect();

    report.records += cores.len();
    let core_keys: BTreeSet<RecordKey> = cores.iter().map(|r| r.key.clone()).collect();

    let mut by_entity: BTreeMap<EntityKey, Vec<&CoreVersionRecord>> = BTreeMap::new();
    for record in &cores {
        if let Err(e) = validate(record) {
            report.issues.push(IntegrityIssue::InvalidRecord {
                key: record.key.clone(),
                reason: e.to_string(),
            });
        }
        by_entity.entry(record.entity.clone()).or_default().push(record);
    }
    for entity in proxies_in.iter().chain(&proxies_out) {
        by_entity.entry(entity.clone()).or_default();
    }
    report.entities += by_entity.len();

    for (entity, mut versions) in by_entity {
        versions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.key.cmp(&b.key)));
        for (role, proxies) in [
            (VertexRole::ProxyIn, &proxies_in),
            (VertexRole::ProxyOut, &proxies_out),
        ] {
            if !proxies.contains(&entity) {
                report.issues.push(IntegrityIssue::MissingProxy {
                    kind: kind.clone(),
                    entity: entity.clone(),
                    role,
                });
            }
        }
        check_versions(kind, &entity, &versions, &core_keys, &mut report.issues);
    }

    verify_edges(guard, kind, &cores, report)
}

fn check_versions(
    kind: &EntityKind,
    entity: &EntityKey,
    versions: &[&CoreVersionRecord],
    core_keys: &BTreeSet<RecordKey>,
    issues: &mut Vec<IntegrityIssue>,
) {
    let current: Vec<RecordKey> = versions
        .iter()
        .filter(|r| r.is_current())
        .map(|r| r.key.clone())
        .collect();
    match current.len() {
        1 => {}
        0 => {
            let pending = versions.last().and_then(|latest| {
                latest
                    .superseded_by
                    .as_ref()
                    .filter(|s| !core_keys.contains(*s))
                    .map(|s| (latest.key.clone(), s.clone()))
            });
            issues.push(match pending {
                Some((demoted, successor)) => IntegrityIssue::PromotionPending {
                    kind: kind.clone(),
                    entity: entity.clone(),
                    demoted,
                    successor,
                },
                None => IntegrityIssue::NoCurrentVersion {
                    kind: kind.clone(),
                    entity: entity.clone(),
                },
            });
        }
        _ => issues.push(IntegrityIssue::MultipleCurrentVersions {
            kind: kind.clone(),
            entity: entity.clone(),
            keys: current,
        }),
    }

    for pair in versions.windows(2) {
        let (earlier, later) = (pair[0], pair[1]);
        let issue = match earlier.expires_at {
            Expiry::Never => Some(IntegrityIssue::OverlappingWindows {
                entity: entity.clone(),
                earlier: earlier.key.clone(),
                later: later.key.clone(),
            }),
            Expiry::At(end) if end > later.created_at => Some(IntegrityIssue::OverlappingWindows {
                entity: entity.clone(),
                earlier: earlier.key.clone(),
                later: later.key.clone(),
            }),
            Expiry::At(end) if end < later.created_at => Some(IntegrityIssue::WindowGap {
                entity: entity.clone(),
                earlier: earlier.key.clone(),
                later: later.key.clone(),
            }),
            Expiry::At(_) => None,
        };
        issues.extend(issue);
    }
}

fn verify_edges(
    guard: &GuardedStore<'_>,
    kind: &EntityKind,
    cores: &[CoreVersionRecord],
    report: &mut IntegrityReport,
) -> CoreResult<()> {
    let core_kind = VertexKind::new(kind.clone(), VertexRole::Core);
    for proxy_role in [VertexRole::ProxyIn, VertexRole::ProxyOut] {
        let proxy_kind = VertexKind::new(kind.clone(), proxy_role);
        let filter = match proxy_role {
            VertexRole::ProxyOut => edge_filter(&core_kind, &proxy_kind),
            _ => edge_filter(&proxy_kind, &core_kind),
        };
        let edges: Vec<VersionEdge> = decode_all(
            VERSION_EDGES,
            &guard.find(VERSION_EDGES, &filter)?,
            &mut report.issues,
        );
        report.edges += edges.len();

        let mut linked = BTreeSet::new();
        for edge in &edges {
            for (endpoint, is_core) in [
                (&edge.from, edge.from_kind.role == VertexRole::Core),
                (&edge.to, edge.to_kind.role == VertexRole::Core),
            ] {
                if guard.get(&endpoint.collection, endpoint.key.as_str())?.is_none() {
                    report.issues.push(IntegrityIssue::DanglingEdge {
                        edge: edge.key.clone(),
                        endpoint: endpoint.to_string(),
                        core_endpoint: is_core,
                    });
                }
            }
            linked.insert(edge.core_ref().key.clone());
        }

        for core in cores {
            if !linked.contains(&core.key) {
                report.issues.push(IntegrityIssue::MissingEdge {
                    core: core.key.clone(),
                    role: proxy_role,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::lifecycle::{ChangeRequest, LifecycleEngine, Onboarding};
    use crate::schema;
    use crate::types::Timestamp;
    use lineage_codec::Value;
    use lineage_store::{InMemoryStore, RecordStore};
    use std::sync::Arc;

    fn populated() -> (Arc<InMemoryStore>, TenantScope) {
        let store = Arc::new(InMemoryStore::new());
        schema::provision(&*store, &[EntityKind::device()]).unwrap();
        let engine = LifecycleEngine::new(store.clone(), EngineConfig::default());
        let scope = TenantScope::new("acme");
        let e1 = EntityKey::new("E1");
        engine
            .onboard(
                &scope,
                Onboarding::new(
                    EntityKind::device(),
                    e1.clone(),
                    Value::record([("config", "A")]),
                    Timestamp::from_millis(0),
                ),
            )
            .unwrap();
        for (i, at) in [10, 20].into_iter().enumerate() {
            engine
                .change_configuration(
                    &scope,
                    ChangeRequest::new(
                        EntityKind::device(),
                        e1.clone(),
                        Value::record([("rev", i as i64)]),
                        Timestamp::from_millis(at),
                    ),
                )
                .unwrap();
        }
        (store, scope)
    }

    fn verify(store: &InMemoryStore, scope: &TenantScope) -> IntegrityReport {
        verify_tenant(&GuardedStore::new(store, scope), &[EntityKind::device()]).unwrap()
    }

    #[test]
    fn healthy_tenant_has_no_issues() {
        let (store, scope) = populated();
        let report = verify(&store, &scope);
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.entities, 1);
        assert_eq!(report.records, 3);
        assert_eq!(report.edges, 6);
    }

    #[test]
    fn ttl_removal_leaves_warnings_only() {
        let (store, scope) = populated();
        store.remove("device", scope.partition(), "E1@0").unwrap();
        let report = verify(&store, &scope);
        assert!(report.is_ok(), "{:?}", report.issues);
        assert_eq!(report.warnings().count(), 2);
    }

    #[test]
    fn second_current_version_is_an_error() {
        let (store, scope) = populated();
        let rogue = CoreVersionRecord::current(
            RecordKey::new("E1@rogue"),
            EntityKey::new("E1"),
            EntityKind::device(),
            scope.tenant().clone(),
            Value::empty_map(),
            Timestamp::from_millis(25),
        );
        store
            .insert("device", scope.partition(), "E1@rogue", rogue.to_body())
            .unwrap();

        let report = verify(&store, &scope);
        assert!(!report.is_ok());
        assert!(report
            .errors()
            .any(|i| matches!(i, IntegrityIssue::MultipleCurrentVersions { keys, .. } if keys.len() == 2)));
        assert!(report
            .errors()
            .any(|i| matches!(i, IntegrityIssue::OverlappingWindows { .. })));
        assert!(report
            .errors()
            .any(|i| matches!(i, IntegrityIssue::MissingEdge { .. })));
    }

    #[test]
    fn malformed_document_is_reported() {
        let (store, scope) = populated();
        store
            .insert(
                "device",
                scope.partition(),
                "junk",
                Value::record([("tenant", "acme")]),
            )
            .unwrap();
        let report = verify(&store, &scope);
        assert!(report
            .errors()
            .any(|i| matches!(i, IntegrityIssue::Malformed { key, .. } if key == "junk")));
    }
}
