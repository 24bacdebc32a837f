//! Record store trait definition.

use crate::document::{CollectionDocument, Document, Filter, IndexSpec, PartitionKey, Revision};
use crate::error::StoreResult;
use lineage_codec::Value;

/// The document store Lineage runs on.
///
/// Stores are **partitioned document collections**. Every operation names a
/// collection and a partition; a store never returns a document from a
/// partition other than the one requested.
///
/// # Invariants
///
/// - `insert` fails with `DuplicateKey` rather than overwriting
/// - `update` is atomic per document and succeeds only if the stored
///   revision equals `expected`; there are no cross-document transactions
/// - Documents are never deleted by Lineage. Stores that implement TTL
///   expiry may remove documents carrying a deadline field, and must keep
///   documents that lack one
/// - Implementations must be `Send + Sync` for concurrent access
///
/// # Implementors
///
/// - [`super::InMemoryStore`] - For tests, tools and benchmarks
/// - [`super::FaultyStore`] - Fault-injecting wrapper for failure-path tests
pub trait RecordStore: Send + Sync {
    /// Declares a collection. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot provision the collection.
    fn ensure_collection(&self, collection: &str) -> StoreResult<()>;

    /// Declares a secondary index. Idempotent; builds over existing documents.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` if the collection was never declared.
    fn ensure_index(&self, spec: &IndexSpec) -> StoreResult<()>;

    /// Lists declared collections in name order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn collections(&self) -> StoreResult<Vec<String>>;

    /// Reads a document by key.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` for undeclared collections.
    fn get(
        &self,
        collection: &str,
        partition: &PartitionKey,
        key: &str,
    ) -> StoreResult<Option<Document>>;

    /// Inserts a new document at [`Revision::INITIAL`].
    ///
    /// # Errors
    ///
    /// Returns `DuplicateKey` if the key is taken in this partition.
    fn insert(
        &self,
        collection: &str,
        partition: &PartitionKey,
        key: &str,
        body: Value,
    ) -> StoreResult<Revision>;

    /// Replaces a document body if its revision is still `expected`.
    ///
    /// Returns the new revision.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the document is gone and `RevisionMismatch` if
    /// someone else updated it first.
    fn update(
        &self,
        collection: &str,
        partition: &PartitionKey,
        key: &str,
        expected: Revision,
        body: Value,
    ) -> StoreResult<Revision>;

    /// Returns every document in the partition matching `filter`, in key order.
    ///
    /// Implementations should serve the lookup from a declared index whose
    /// leading fields are constrained by the filter.
    ///
    /// # Errors
    ///
    /// Returns `CollectionNotFound` for undeclared collections.
    fn find(
        &self,
        collection: &str,
        partition: &PartitionKey,
        filter: &Filter,
    ) -> StoreResult<Vec<Document>>;

    /// Exports every document of every collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unavailable.
    fn export(&self) -> StoreResult<Vec<CollectionDocument>>;
}
