//! Fault-injecting store wrapper.
//!
//! Wraps any [`RecordStore`] and fails selected operations with
//! [`StoreError::Unavailable`], so that partial-failure paths can be driven
//! deterministically. Hooks can also run just before an operation reaches
//! the inner store, which lets tests interleave concurrent callers at an
//! exact point.

use crate::document::{CollectionDocument, Document, Filter, IndexSpec, PartitionKey, Revision};
use crate::error::{StoreError, StoreResult};
use crate::store::RecordStore;
use lineage_codec::Value;
use parking_lot::Mutex;
use std::sync::Arc;

/// Store operations a fault or hook can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    /// `get`
    Get,
    /// `insert`
    Insert,
    /// `update`
    Update,
    /// `find`
    Find,
}

/// Callback run before an operation; receives the collection and key
/// (empty for `find`).
pub type StoreHook = Box<dyn Fn(&str, &str) + Send + Sync>;

#[derive(Debug)]
struct FaultRule {
    op: StoreOp,
    collection: Option<String>,
    skip: usize,
    remaining: usize,
}

/// A store that injects failures into a wrapped store.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use lineage_codec::Value;
/// use lineage_store::{FaultyStore, InMemoryStore, PartitionKey, RecordStore, StoreOp};
///
/// let store = FaultyStore::new(Arc::new(InMemoryStore::new()));
/// store.ensure_collection("device").unwrap();
/// store.fail_next(StoreOp::Insert, 1);
///
/// let tenant = PartitionKey::new("acme");
/// assert!(store.insert("device", &tenant, "E1", Value::empty_map()).is_err());
/// assert!(store.insert("device", &tenant, "E1", Value::empty_map()).is_ok());
/// ```
pub struct FaultyStore {
    inner: Arc<dyn RecordStore>,
    rules: Mutex<Vec<FaultRule>>,
    hooks: Mutex<Vec<(StoreOp, Arc<StoreHook>)>>,
}

impl FaultyStore {
    /// Wraps a store with no faults armed.
    pub fn new(inner: Arc<dyn RecordStore>) -> Self {
        Self {
            inner,
            rules: Mutex::new(Vec::new()),
            hooks: Mutex::new(Vec::new()),
        }
    }

    /// Fails the next `count` calls of `op`.
    pub fn fail_next(&self, op: StoreOp, count: usize) {
        self.fail_after(op, 0, count);
    }

    /// Lets `skip` calls of `op` through, then fails the next `count`.
    pub fn fail_after(&self, op: StoreOp, skip: usize, count: usize) {
        self.rules.lock().push(FaultRule {
            op,
            collection: None,
            skip,
            remaining: count,
        });
    }

    /// Fails the next `count` calls of `op` against one collection.
    pub fn fail_in(&self, op: StoreOp, collection: &str, count: usize) {
        self.rules.lock().push(FaultRule {
            op,
            collection: Some(collection.to_string()),
            skip: 0,
            remaining: count,
        });
    }

    /// Registers a hook run before every call of `op`.
    pub fn on(&self, op: StoreOp, hook: StoreHook) {
        self.hooks.lock().push((op, Arc::new(hook)));
    }

    /// Disarms all faults and hooks.
    pub fn clear(&self) {
        self.rules.lock().clear();
        self.hooks.lock().clear();
    }

    fn before(&self, op: StoreOp, collection: &str, key: &str) -> StoreResult<()> {
        // Hooks may block; never hold a lock while running them.
        let hooks: Vec<Arc<StoreHook>> = self
            .hooks
            .lock()
            .iter()
            .filter(|(o, _)| *o == op)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for hook in hooks {
            (**hook)(collection, key);
        }

        let mut rules = self.rules.lock();
        let rule = rules.iter_mut().find(|r| {
            r.op == op
                && r.remaining > 0
                && r.collection.as_deref().map_or(true, |c| c == collection)
        });
        if let Some(rule) = rule {
            if rule.skip > 0 {
                rule.skip -= 1;
            } else {
                rule.remaining -= 1;
                tracing::debug!(
                    target: "lineage::store",
                    ?op,
                    collection,
                    key,
                    "Injected store fault"
                );
                return Err(StoreError::Unavailable(format!(
                    "injected {op:?} fault on {collection}"
                )));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for FaultyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultyStore")
            .field("armed_rules", &self.rules.lock().len())
            .finish_non_exhaustive()
    }
}

impl RecordStore for FaultyStore {
    fn ensure_collection(&self, collection: &str) -> StoreResult<()> {
        self.inner.ensure_collection(collection)
    }

    fn ensure_index(&self, spec: &IndexSpec) -> StoreResult<()> {
        self.inner.ensure_index(spec)
    }

    fn collections(&self) -> StoreResult<Vec<String>> {
        self.inner.collections()
    }

    fn get(
        &self,
        collection: &str,
        partition: &PartitionKey,
        key: &str,
    ) -> StoreResult<Option<Document>> {
        self.before(StoreOp::Get, collection, key)?;
        self.inner.get(collection, partition, key)
    }

    fn insert(
        &self,
        collection: &str,
        partition: &PartitionKey,
        key: &str,
        body: Value,
    ) -> StoreResult<Revision> {
        self.before(StoreOp::Insert, collection, key)?;
        self.inner.insert(collection, partition, key, body)
    }

    fn update(
        &self,
        collection: &str,
        partition: &PartitionKey,
        key: &str,
        expected: Revision,
        body: Value,
    ) -> StoreResult<Revision> {
        self.before(StoreOp::Update, collection, key)?;
        self.inner.update(collection, partition, key, expected, body)
    }

    fn find(
        &self,
        collection: &str,
        partition: &PartitionKey,
        filter: &Filter,
    ) -> StoreResult<Vec<Document>> {
        self.before(StoreOp::Find, collection, "")?;
        self.inner.find(collection, partition, filter)
    }

    fn export(&self) -> StoreResult<Vec<CollectionDocument>> {
        self.inner.export()
    }
}
