//! Error types for store operations.

use crate::document::Revision;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur during store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The collection has not been provisioned.
    #[error("collection not found: {collection}")]
    CollectionNotFound {
        /// Name of the missing collection.
        collection: String,
    },

    /// A document with the same key already exists in the partition.
    #[error("duplicate key {key} in {collection}/{partition}")]
    DuplicateKey {
        /// Collection name.
        collection: String,
        /// Partition key.
        partition: String,
        /// Document key.
        key: String,
    },

    /// The document does not exist in the partition.
    #[error("document {key} not found in {collection}/{partition}")]
    NotFound {
        /// Collection name.
        collection: String,
        /// Partition key.
        partition: String,
        /// Document key.
        key: String,
    },

    /// A compare-and-swap update observed a different revision.
    #[error("revision mismatch on {collection}/{key}: expected {expected}, found {actual}")]
    RevisionMismatch {
        /// Collection name.
        collection: String,
        /// Document key.
        key: String,
        /// Revision the caller expected.
        expected: Revision,
        /// Revision currently stored.
        actual: Revision,
    },

    /// The store rejected the request for a transient reason.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Returns true if repeating the same request may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}
