//! Document, partition and filter types.

use lineage_codec::Value;
use std::fmt;

/// The partition attribute every document carries.
///
/// Stores shard by this key; two documents in different partitions never
/// share an index bucket or a scan range.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Creates a partition key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-document revision, bumped on every update.
///
/// Compare-and-swap updates name the revision they read; this is the only
/// atomicity the store provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Revision(pub u64);

impl Revision {
    /// Revision assigned on insert.
    pub const INITIAL: Self = Self(1);

    /// Returns the next revision.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "rev:{}", self.0)
    }
}

/// A stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Key, unique within `(collection, partition)`.
    pub key: String,
    /// Partition the document lives in.
    pub partition: PartitionKey,
    /// Current revision.
    pub revision: Revision,
    /// Document body; always a map.
    pub body: Value,
}

impl Document {
    /// Reads a body field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

/// A conjunction of field equality predicates.
///
/// A missing field compares equal to [`Value::Null`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    clauses: Vec<(String, Value)>,
}

impl Filter {
    /// Matches every document in the partition.
    pub fn all() -> Self {
        Self::default()
    }

    /// Adds an equality clause.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.clauses.push((field.into(), value.into()));
        self
    }

    /// Returns the clauses.
    pub fn clauses(&self) -> &[(String, Value)] {
        &self.clauses
    }

    /// Returns the value required for `field`, if constrained.
    pub fn value_for(&self, field: &str) -> Option<&Value> {
        self.clauses
            .iter()
            .find(|(f, _)| f == field)
            .map(|(_, v)| v)
    }

    /// Tests a document body against every clause.
    pub fn matches(&self, body: &Value) -> bool {
        self.clauses
            .iter()
            .all(|(field, want)| body.get(field).unwrap_or(&Value::Null) == want)
    }
}

/// A declared secondary index over an ordered list of body fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Collection the index belongs to.
    pub collection: String,
    /// Indexed fields, most selective first.
    pub fields: Vec<String>,
}

impl IndexSpec {
    /// Creates an index spec.
    pub fn new<I, S>(collection: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            collection: collection.into(),
            fields: fields.into_iter().map(Into::into).collect(),
        }
    }
}

/// A document tagged with its collection, as produced by export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionDocument {
    /// Collection name.
    pub collection: String,
    /// The document.
    pub document: Document,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_treats_missing_field_as_null() {
        let body = Value::record([("entity", "E1")]);
        assert!(Filter::all().eq("entity", "E1").matches(&body));
        assert!(Filter::all().eq("ttlDeadline", Value::Null).matches(&body));
        assert!(!Filter::all().eq("entity", "E2").matches(&body));
    }

    #[test]
    fn revision_next() {
        assert_eq!(Revision::INITIAL.next(), Revision(2));
        assert_eq!(Revision(7).to_string(), "rev:7");
    }
}
