//! In-memory record store.

use crate::document::{CollectionDocument, Document, Filter, IndexSpec, PartitionKey, Revision};
use crate::error::{StoreError, StoreResult};
use crate::store::RecordStore;
use lineage_codec::Value;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

/// An in-memory record store.
///
/// This store keeps every collection in memory and is suitable for:
/// - Unit and integration tests
/// - The CLI, which loads and saves dumps
/// - Benchmarks
///
/// It has no TTL sweeper: documents stay until [`InMemoryStore::remove`] is
/// called explicitly, which tests use to stand in for the backing store's
/// expiry mechanism.
///
/// # Thread Safety
///
/// A single `RwLock` guards all collections, so each operation is atomic
/// with respect to every other. Compare-and-swap updates rely on this.
///
/// # Example
///
/// ```rust
/// use lineage_codec::Value;
/// use lineage_store::{InMemoryStore, PartitionKey, RecordStore};
///
/// let store = InMemoryStore::new();
/// store.ensure_collection("device").unwrap();
/// let tenant = PartitionKey::new("acme");
/// store.insert("device", &tenant, "E1", Value::record([("os", "linux")])).unwrap();
/// assert!(store.get("device", &tenant, "E1").unwrap().is_some());
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStore {
    collections: RwLock<BTreeMap<String, CollectionData>>,
    index_lookups: AtomicU64,
    partition_scans: AtomicU64,
}

#[derive(Debug, Default)]
struct CollectionData {
    docs: BTreeMap<(PartitionKey, String), Stored>,
    indexes: Vec<Index>,
}

#[derive(Debug, Clone)]
struct Stored {
    revision: Revision,
    body: Value,
}

#[derive(Debug)]
struct Index {
    fields: Vec<String>,
    entries: BTreeMap<(PartitionKey, Vec<Value>), BTreeSet<String>>,
}

impl Index {
    fn new(fields: Vec<String>) -> Self {
        Self {
            fields,
            entries: BTreeMap::new(),
        }
    }

    fn values_of(&self, body: &Value) -> Vec<Value> {
        self.fields
            .iter()
            .map(|f| body.get(f).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn add(&mut self, partition: &PartitionKey, key: &str, body: &Value) {
        self.entries
            .entry((partition.clone(), self.values_of(body)))
            .or_default()
            .insert(key.to_string());
    }

    fn remove(&mut self, partition: &PartitionKey, key: &str, body: &Value) {
        let bucket = (partition.clone(), self.values_of(body));
        if let Some(keys) = self.entries.get_mut(&bucket) {
            keys.remove(key);
            if keys.is_empty() {
                self.entries.remove(&bucket);
            }
        }
    }

    /// Leading index values pinned by the filter.
    fn prefix(&self, filter: &Filter) -> Vec<Value> {
        self.fields
            .iter()
            .map_while(|f| filter.value_for(f).cloned())
            .collect()
    }

    fn lookup(&self, partition: &PartitionKey, prefix: Vec<Value>) -> BTreeSet<String> {
        self.entries
            .range((partition.clone(), prefix.clone())..)
            .take_while(|((p, values), _)| p == partition && values.starts_with(&prefix))
            .flat_map(|(_, keys)| keys.iter().cloned())
            .collect()
    }
}

impl CollectionData {
    fn partition_keys(&self, partition: &PartitionKey) -> BTreeSet<String> {
        self.docs
            .range((partition.clone(), String::new())..)
            .take_while(|((p, _), _)| p == partition)
            .map(|((_, k), _)| k.clone())
            .collect()
    }
}

/// Counters describing how lookups were served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Lookups answered from a secondary index.
    pub index_lookups: u64,
    /// Lookups that scanned a whole partition.
    pub partition_scans: u64,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns lookup counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            index_lookups: self.index_lookups.load(Ordering::Relaxed),
            partition_scans: self.partition_scans.load(Ordering::Relaxed),
        }
    }

    /// Total number of documents across all collections.
    pub fn document_count(&self) -> usize {
        self.collections.read().values().map(|c| c.docs.len()).sum()
    }

    /// Removes a document, bypassing revision checks.
    ///
    /// Lineage itself never deletes; this stands in for the backing store's
    /// TTL expiry in tests and tools.
    pub fn remove(
        &self,
        collection: &str,
        partition: &PartitionKey,
        key: &str,
    ) -> StoreResult<Option<Document>> {
        let mut collections = self.collections.write();
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| not_found_collection(collection))?;
        let Some(stored) = data.docs.remove(&(partition.clone(), key.to_string())) else {
            return Ok(None);
        };
        for index in &mut data.indexes {
            index.remove(partition, key, &stored.body);
        }
        Ok(Some(Document {
            key: key.to_string(),
            partition: partition.clone(),
            revision: stored.revision,
            body: stored.body,
        }))
    }

    /// Loads exported documents, declaring collections as needed.
    ///
    /// Revisions are preserved. Indexes must be re-declared afterwards.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if a document already exists.
    pub fn import(&self, documents: Vec<CollectionDocument>) -> StoreResult<()> {
        let mut collections = self.collections.write();
        for CollectionDocument { collection, document } in documents {
            let data = collections.entry(collection.clone()).or_default();
            let slot = (document.partition.clone(), document.key.clone());
            if data.docs.contains_key(&slot) {
                return Err(StoreError::DuplicateKey {
                    collection,
                    partition: document.partition.to_string(),
                    key: document.key,
                });
            }
            for index in &mut data.indexes {
                index.add(&document.partition, &document.key, &document.body);
            }
            data.docs.insert(
                slot,
                Stored {
                    revision: document.revision,
                    body: document.body,
                },
            );
        }
        Ok(())
    }
}

fn not_found_collection(collection: &str) -> StoreError {
    StoreError::CollectionNotFound {
        collection: collection.to_string(),
    }
}

impl RecordStore for InMemoryStore {
    fn ensure_collection(&self, collection: &str) -> StoreResult<()> {
        self.collections
            .write()
            .entry(collection.to_string())
            .or_default();
        Ok(())
    }

    fn ensure_index(&self, spec: &IndexSpec) -> StoreResult<()> {
        let mut collections = self.collections.write();
        let data = collections
            .get_mut(&spec.collection)
            .ok_or_else(|| not_found_collection(&spec.collection))?;
        if data.indexes.iter().any(|i| i.fields == spec.fields) {
            return Ok(());
        }
        let mut index = Index::new(spec.fields.clone());
        for ((partition, key), stored) in &data.docs {
            index.add(partition, key, &stored.body);
        }
        tracing::debug!(
            target: "lineage::store",
            collection = %spec.collection,
            fields = ?spec.fields,
            "Index built"
        );
        data.indexes.push(index);
        Ok(())
    }

    fn collections(&self) -> StoreResult<Vec<String>> {
        Ok(self.collections.read().keys().cloned().collect())
    }

    fn get(
        &self,
        collection: &str,
        partition: &PartitionKey,
        key: &str,
    ) -> StoreResult<Option<Document>> {
        let collections = self.collections.read();
        let data = collections
            .get(collection)
            .ok_or_else(|| not_found_collection(collection))?;
        Ok(data
            .docs
            .get(&(partition.clone(), key.to_string()))
            .map(|stored| Document {
                key: key.to_string(),
                partition: partition.clone(),
                revision: stored.revision,
                body: stored.body.clone(),
            }))
    }

    fn insert(
        &self,
        collection: &str,
        partition: &PartitionKey,
        key: &str,
        body: Value,
    ) -> StoreResult<Revision> {
        let mut collections = self.collections.write();
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| not_found_collection(collection))?;
        let slot = (partition.clone(), key.to_string());
        if data.docs.contains_key(&slot) {
            return Err(StoreError::DuplicateKey {
                collection: collection.to_string(),
                partition: partition.to_string(),
                key: key.to_string(),
            });
        }
        for index in &mut data.indexes {
            index.add(partition, key, &body);
        }
        data.docs.insert(
            slot,
            Stored {
                revision: Revision::INITIAL,
                body,
            },
        );
        Ok(Revision::INITIAL)
    }

    fn update(
        &self,
        collection: &str,
        partition: &PartitionKey,
        key: &str,
        expected: Revision,
        body: Value,
    ) -> StoreResult<Revision> {
        let mut collections = self.collections.write();
        let data = collections
            .get_mut(collection)
            .ok_or_else(|| not_found_collection(collection))?;
        let slot = (partition.clone(), key.to_string());
        let Some(stored) = data.docs.get_mut(&slot) else {
            return Err(StoreError::NotFound {
                collection: collection.to_string(),
                partition: partition.to_string(),
                key: key.to_string(),
            });
        };
        if stored.revision != expected {
            return Err(StoreError::RevisionMismatch {
                collection: collection.to_string(),
                key: key.to_string(),
                expected,
                actual: stored.revision,
            });
        }
        let previous = std::mem::replace(&mut stored.body, body);
        stored.revision = stored.revision.next();
        let revision = stored.revision;
        let current = stored.body.clone();
        for index in &mut data.indexes {
            index.remove(partition, key, &previous);
            index.add(partition, key, &current);
        }
        Ok(revision)
    }

    fn find(
        &self,
        collection: &str,
        partition: &PartitionKey,
        filter: &Filter,
    ) -> StoreResult<Vec<Document>> {
        let collections = self.collections.read();
        let data = collections
            .get(collection)
            .ok_or_else(|| not_found_collection(collection))?;

        let best = data
            .indexes
            .iter()
            .map(|index| (index, index.prefix(filter)))
            .filter(|(_, prefix)| !prefix.is_empty())
            .max_by_key(|(_, prefix)| prefix.len());

        let keys = match best {
            Some((index, prefix)) => {
                self.index_lookups.fetch_add(1, Ordering::Relaxed);
                index.lookup(partition, prefix)
            }
            None => {
                self.partition_scans.fetch_add(1, Ordering::Relaxed);
                data.partition_keys(partition)
            }
        };

        Ok(keys
            .into_iter()
            .filter_map(|key| {
                let stored = data.docs.get(&(partition.clone(), key.clone()))?;
                filter.matches(&stored.body).then(|| Document {
                    key,
                    partition: partition.clone(),
                    revision: stored.revision,
                    body: stored.body.clone(),
                })
            })
            .collect())
    }

    fn export(&self) -> StoreResult<Vec<CollectionDocument>> {
        let collections = self.collections.read();
        Ok(collections
            .iter()
            .flat_map(|(name, data)| {
                data.docs
                    .iter()
                    .map(move |((partition, key), stored)| CollectionDocument {
                        collection: name.clone(),
                        document: Document {
                            key: key.clone(),
                            partition: partition.clone(),
                            revision: stored.revision,
                            body: stored.body.clone(),
                        },
                    })
            })
            .collect())
    }
}
