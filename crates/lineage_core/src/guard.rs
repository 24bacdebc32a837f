//! Tenant partition guard.
//!
//! Every store access made by the engine goes through a [`GuardedStore`]
//! bound to one [`TenantScope`]. Reads check that returned documents belong
//! to the scope; writes check that the record's tenant is the scope's; edges
//! additionally check both endpoints.

use crate::error::{Conflict, CoreError, CoreResult};
use crate::temporal::{RecordDocument, VersionEdge};
use crate::types::TenantKey;
use lineage_store::{Document, Filter, PartitionKey, RecordStore, Revision, StoreError};

/// The tenant a request runs as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantScope {
    tenant: TenantKey,
    partition: PartitionKey,
}

impl TenantScope {
    /// Creates a scope for `tenant`.
    pub fn new(tenant: impl Into<TenantKey>) -> Self {
        let tenant = tenant.into();
        let partition = tenant.as_partition();
        Self { tenant, partition }
    }

    /// Returns the tenant.
    pub fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    /// Returns the store partition.
    pub fn partition(&self) -> &PartitionKey {
        &self.partition
    }

    /// Fails unless `tenant` is this scope's tenant.
    ///
    /// # Errors
    ///
    /// Returns `TenantIsolationViolation`.
    pub fn check(&self, tenant: &TenantKey, context: &str) -> CoreResult<()> {
        if tenant == &self.tenant {
            return Ok(());
        }
        Err(self.violation(tenant.as_str(), context))
    }

    fn check_partition(&self, partition: &PartitionKey, context: &str) -> CoreResult<()> {
        if partition == &self.partition {
            return Ok(());
        }
        Err(self.violation(partition.as_str(), context))
    }

    fn violation(&self, found: &str, context: &str) -> CoreError {
        tracing::error!(
            target: "lineage::guard",
            scope = %self.tenant,
            found,
            context,
            "Tenant isolation violation"
        );
        CoreError::TenantIsolationViolation {
            scope: self.tenant.to_string(),
            found: found.to_string(),
            context: context.to_string(),
        }
    }
}

impl From<TenantKey> for TenantScope {
    fn from(tenant: TenantKey) -> Self {
        Self::new(tenant)
    }
}

/// A store view confined to one tenant.
pub struct GuardedStore<'a> {
    store: &'a dyn RecordStore,
    scope: &'a TenantScope,
}

impl<'a> GuardedStore<'a> {
    /// Binds a store to a scope.
    pub fn new(store: &'a dyn RecordStore, scope: &'a TenantScope) -> Self {
        Self { store, scope }
    }

    /// Returns the scope.
    pub fn scope(&self) -> &TenantScope {
        self.scope
    }

    /// Reads a raw document.
    ///
    /// # Errors
    ///
    /// Returns `TenantIsolationViolation` if the store answers from another
    /// partition, or a store error.
    pub fn get(&self, collection: &str, key: &str) -> CoreResult<Option<Document>> {
        let doc = self.store.get(collection, self.scope.partition(), key)?;
        if let Some(doc) = &doc {
            self.scope
                .check_partition(&doc.partition, &format!("read {collection}/{key}"))?;
        }
        Ok(doc)
    }

    /// Finds raw documents.
    ///
    /// # Errors
    ///
    /// Same as [`GuardedStore::get`].
    pub fn find(&self, collection: &str, filter: &Filter) -> CoreResult<Vec<Document>> {
        let docs = self.store.find(collection, self.scope.partition(), filter)?;
        for doc in &docs {
            self.scope
                .check_partition(&doc.partition, &format!("find {collection}"))?;
        }
        Ok(docs)
    }

    /// Reads and decodes a record with its revision.
    ///
    /// # Errors
    ///
    /// Returns guard, store or mapping errors.
    pub fn load<R: RecordDocument>(
        &self,
        collection: &str,
        key: &str,
    ) -> CoreResult<Option<(R, Revision)>> {
        self.get(collection, key)?
            .map(|doc| -> CoreResult<(R, Revision)> {
                Ok((R::from_document(collection, &doc)?, doc.revision))
            })
            .transpose()
    }

    /// Finds and decodes records.
    ///
    /// # Errors
    ///
    /// Returns guard, store or mapping errors.
    pub fn load_all<R: RecordDocument>(
        &self,
        collection: &str,
        filter: &Filter,
    ) -> CoreResult<Vec<(R, Revision)>> {
        self.find(collection, filter)?
            .iter()
            .map(|doc| -> CoreResult<(R, Revision)> {
                Ok((R::from_document(collection, doc)?, doc.revision))
            })
            .collect()
    }

    /// Inserts a new record.
    ///
    /// # Errors
    ///
    /// Returns `TenantIsolationViolation` if the record belongs to another
    /// tenant, or a store error (including `DuplicateKey`).
    pub fn insert<R: RecordDocument>(&self, record: &R) -> CoreResult<Revision> {
        let collection = record.collection();
        self.scope.check(
            record.tenant(),
            &format!("write {collection}/{}", record.record_key()),
        )?;
        Ok(self.store.insert(
            &collection,
            self.scope.partition(),
            record.record_key().as_str(),
            record.to_body(),
        )?)
    }

    /// Inserts a record, accepting an identical document already in place.
    ///
    /// Makes deterministic-key writes safe to repeat.
    ///
    /// # Errors
    ///
    /// Returns `ConcurrentModification` if the key holds a different
    /// document, plus anything [`GuardedStore::insert`] returns.
    pub fn insert_once<R: RecordDocument + PartialEq>(
        &self,
        record: &R,
        entity: &crate::types::EntityKey,
    ) -> CoreResult<Revision> {
        match self.insert(record) {
            Err(CoreError::Store(StoreError::DuplicateKey { .. })) => {
                let collection = record.collection();
                match self.load::<R>(&collection, record.record_key().as_str())? {
                    Some((existing, revision)) if &existing == record => {
                        tracing::debug!(
                            target: "lineage::guard",
                            collection = %collection,
                            key = %record.record_key(),
                            "Record already written"
                        );
                        Ok(revision)
                    }
                    _ => Err(CoreError::concurrent(
                        entity,
                        Conflict::KeyTaken {
                            key: record.record_key().clone(),
                        },
                    )),
                }
            }
            other => other,
        }
    }

    /// Inserts an edge after checking both endpoints.
    ///
    /// # Errors
    ///
    /// Returns `TenantIsolationViolation` if the edge or either endpoint
    /// belongs to another tenant, `InvalidIdentifier` if the endpoints are
    /// not the ones the edge references, plus anything
    /// [`GuardedStore::insert_once`] returns.
    pub fn link<F: RecordDocument, T: RecordDocument>(
        &self,
        edge: &VersionEdge,
        from: &F,
        to: &T,
    ) -> CoreResult<Revision> {
        let context = format!("link {}", edge.key);
        self.scope.check(&edge.tenant, &context)?;
        self.scope.check(from.tenant(), &context)?;
        self.scope.check(to.tenant(), &context)?;
        if edge.from.key != *from.record_key() || edge.to.key != *to.record_key() {
            return Err(CoreError::invalid_identifier(
                edge.key.as_str(),
                "edge endpoints do not match the given vertices",
            ));
        }
        self.insert_once(edge, &edge.entity)
    }

    /// Replaces a record if its revision is still `expected`.
    ///
    /// # Errors
    ///
    /// Returns `TenantIsolationViolation` if the record belongs to another
    /// tenant, or a store error (including `RevisionMismatch`).
    pub fn update<R: RecordDocument>(&self, record: &R, expected: Revision) -> CoreResult<Revision> {
        let collection = record.collection();
        self.scope.check(
            record.tenant(),
            &format!("update {collection}/{}", record.record_key()),
        )?;
        Ok(self.store.update(
            &collection,
            self.scope.partition(),
            record.record_key().as_str(),
            expected,
            record.to_body(),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema;
    use crate::temporal::{CoreVersionRecord, ProxyVertex};
    use crate::types::{EntityKey, EntityKind, RecordKey, Timestamp};
    use lineage_codec::Value;
    use lineage_store::InMemoryStore;

    fn setup() -> InMemoryStore {
        let store = InMemoryStore::new();
        schema::provision(&store, &[EntityKind::device()]).unwrap();
        store
    }

    fn core(tenant: &str, attrs: &str) -> CoreVersionRecord {
        CoreVersionRecord::current(
            RecordKey::new("E1@0"),
            EntityKey::new("E1"),
            EntityKind::device(),
            TenantKey::new(tenant),
            Value::record([("config", attrs)]),
            Timestamp::from_millis(0),
        )
    }

    #[test]
    fn write_outside_scope_is_rejected() {
        let store = setup();
        let scope = TenantScope::new("acme");
        let guarded = GuardedStore::new(&store, &scope);
        let err = guarded.insert(&core("globex", "A")).unwrap_err();
        assert!(matches!(err, CoreError::TenantIsolationViolation { .. }));
        assert_eq!(store.document_count(), 0);
    }

    #[test]
    fn reads_stay_in_partition() {
        let store = setup();
        let acme = TenantScope::new("acme");
        let globex = TenantScope::new("globex");
        GuardedStore::new(&store, &acme)
            .insert(&core("acme", "A"))
            .unwrap();

        let loaded: Option<(CoreVersionRecord, Revision)> = GuardedStore::new(&store, &globex)
            .load("device", "E1@0")
            .unwrap();
        assert!(loaded.is_none());

        let (record, revision) = GuardedStore::new(&store, &acme)
            .load::<CoreVersionRecord>("device", "E1@0")
            .unwrap()
            .unwrap();
        assert_eq!(record, core("acme", "A"));
        assert_eq!(revision, Revision::INITIAL);
    }

    #[test]
    fn insert_once_accepts_identical_document() {
        let store = setup();
        let scope = TenantScope::new("acme");
        let guarded = GuardedStore::new(&store, &scope);
        let record = core("acme", "A");
        guarded.insert_once(&record, &record.entity).unwrap();
        guarded.insert_once(&record, &record.entity).unwrap();

        let err = guarded
            .insert_once(&core("acme", "B"), &record.entity)
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::ConcurrentModification {
                conflict: Conflict::KeyTaken { .. },
                ..
            }
        ));
    }

    #[test]
    fn link_checks_endpoint_tenants() {
        let store = setup();
        let scope = TenantScope::new("acme");
        let guarded = GuardedStore::new(&store, &scope);
        let record = core("acme", "A");
        let pin = ProxyVertex::inbound(&record.entity, &record.kind, &record.tenant);
        let edge = VersionEdge::inbound(&pin, &record).unwrap();

        let foreign = ProxyVertex::inbound(&record.entity, &record.kind, &TenantKey::new("globex"));
        let err = guarded.link(&edge, &foreign, &record).unwrap_err();
        assert!(matches!(err, CoreError::TenantIsolationViolation { .. }));

        guarded.link(&edge, &pin, &record).unwrap();
    }
}
