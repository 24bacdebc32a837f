//! Dump files.
//!
//! A dump is a canonical CBOR array with one map per stored document:
//! `{collection, key, partition, revision, body}`.

use lineage_codec::{from_cbor, to_canonical_cbor, CodecError, Value};
use lineage_store::{
    CollectionDocument, Document, InMemoryStore, PartitionKey, RecordStore, Revision, StoreError,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Errors reading or writing dumps.
#[derive(Debug, Error)]
pub enum DumpError {
    /// File I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The CBOR could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The store rejected the documents.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An entry does not have the expected shape.
    #[error("malformed dump entry {index}: {reason}")]
    Malformed {
        /// Position in the dump.
        index: usize,
        /// What is wrong.
        reason: String,
    },
}

fn entry(doc: &CollectionDocument) -> Result<Value, DumpError> {
    let revision = i64::try_from(doc.document.revision.0).map_err(|_| DumpError::Malformed {
        index: 0,
        reason: format!("revision {} out of range", doc.document.revision),
    })?;
    Ok(Value::record([
        ("collection", Value::from(doc.collection.as_str())),
        ("key", Value::from(doc.document.key.as_str())),
        ("partition", Value::from(doc.document.partition.as_str())),
        ("revision", Value::Integer(revision)),
        ("body", doc.document.body.clone()),
    ]))
}

fn text(value: &Value, field: &str, index: usize) -> Result<String, DumpError> {
    value
        .get(field)
        .and_then(Value::as_text)
        .map(str::to_string)
        .ok_or_else(|| DumpError::Malformed {
            index,
            reason: format!("missing text field {field}"),
        })
}

/// Encodes documents as a dump.
pub fn encode(documents: &[CollectionDocument]) -> Result<Vec<u8>, DumpError> {
    let entries = documents.iter().map(entry).collect::<Result<Vec<_>, _>>()?;
    Ok(to_canonical_cbor(&Value::Array(entries))?)
}

/// Decodes a dump.
pub fn decode(bytes: &[u8]) -> Result<Vec<CollectionDocument>, DumpError> {
    let value = from_cbor(bytes)?;
    let entries = value.as_array().ok_or(DumpError::Malformed {
        index: 0,
        reason: "dump is not an array".to_string(),
    })?;
    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let revision = entry
                .get("revision")
                .and_then(Value::as_integer)
                .and_then(|r| u64::try_from(r).ok())
                .ok_or_else(|| DumpError::Malformed {
                    index,
                    reason: "missing revision".to_string(),
                })?;
            let body = entry.get("body").cloned().ok_or_else(|| DumpError::Malformed {
                index,
                reason: "missing body".to_string(),
            })?;
            Ok(CollectionDocument {
                collection: text(entry, "collection", index)?,
                document: Document {
                    key: text(entry, "key", index)?,
                    partition: PartitionKey::new(text(entry, "partition", index)?),
                    revision: Revision(revision),
                    body,
                },
            })
        })
        .collect()
}

/// Writes every document of `store` to `path`, returning the count.
pub fn save(store: &dyn RecordStore, path: &Path) -> Result<usize, DumpError> {
    let documents = store.export()?;
    std::fs::write(path, encode(&documents)?)?;
    tracing::info!(
        target: "lineage::cli",
        path = %path.display(),
        documents = documents.len(),
        "Dump written"
    );
    Ok(documents.len())
}

/// Loads a dump into a fresh in-memory store.
pub fn load(path: &Path) -> Result<Arc<InMemoryStore>, DumpError> {
    let documents = decode(&std::fs::read(path)?)?;
    let store = Arc::new(InMemoryStore::new());
    store.import(documents)?;
    Ok(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.ensure_collection("device").unwrap();
        let acme = PartitionKey::new("acme");
        store
            .insert("device", &acme, "E1@0", Value::record([("entity", "E1")]))
            .unwrap();
        store
            .update(
                "device",
                &acme,
                "E1@0",
                Revision::INITIAL,
                Value::record([("entity", "E1"), ("config", "B")]),
            )
            .unwrap();
        store
    }

    #[test]
    fn save_then_load_preserves_documents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lineage.cbor");
        let store = sample();

        assert_eq!(save(&store, &path).unwrap(), 1);
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.export().unwrap(), store.export().unwrap());
    }

    #[test]
    fn truncated_dump_is_rejected() {
        let bytes = encode(&sample().export().unwrap()).unwrap();
        assert!(decode(&bytes[..bytes.len() - 3]).is_err());
    }

    #[test]
    fn entries_need_every_field() {
        let bytes = to_canonical_cbor(&Value::Array(vec![Value::record([("key", "E1@0")])]))
            .unwrap();
        assert!(matches!(
            decode(&bytes),
            Err(DumpError::Malformed { index: 0, .. })
        ));
    }
}
