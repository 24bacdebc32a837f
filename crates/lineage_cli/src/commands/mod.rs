//! CLI command implementations.

pub mod as_of;
pub mod dump;
pub mod history;
pub mod scenario;
pub mod snapshot;
pub mod verify;

use lineage_core::{
    schema, CoreVersionRecord, EngineConfig, EntityKind, Expiry, Lineage, Timestamp,
};
use serde::Serialize;
use std::path::Path;

/// Loads an engine configuration, or the default when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    match path {
        Some(path) => {
            let json = std::fs::read_to_string(path)?;
            Ok(EngineConfig::from_json(&json)?)
        }
        None => Ok(EngineConfig::default()),
    }
}

/// Opens a lineage over the documents of a dump.
pub fn open_dump(
    path: &Path,
    config: EngineConfig,
) -> Result<Lineage, Box<dyn std::error::Error>> {
    let store = dump::load(path)?;
    let kinds = schema::discover_kinds(&*store)?;
    tracing::debug!(
        target: "lineage::cli",
        path = %path.display(),
        documents = store.document_count(),
        kinds = kinds.len(),
        "Dump loaded"
    );
    Ok(Lineage::open(store, config, &kinds)?)
}

/// Parses an optional instant.
pub fn parse_instant(at: Option<&str>) -> Result<Option<Timestamp>, Box<dyn std::error::Error>> {
    Ok(at.map(Timestamp::parse).transpose()?)
}

/// Parses a kind name.
pub fn parse_kind(kind: &str) -> Result<EntityKind, Box<dyn std::error::Error>> {
    Ok(EntityKind::new(kind)?)
}

/// A version as printed in JSON output.
#[derive(Debug, Serialize)]
pub struct VersionView {
    /// Record key.
    pub key: String,
    /// Entity key.
    pub entity: String,
    /// Entity kind.
    pub kind: String,
    /// Owning tenant.
    pub tenant: String,
    /// Attributes, rendered.
    pub attributes: String,
    /// Window start.
    pub created_at: String,
    /// Window end, absent while current.
    pub expires_at: Option<String>,
    /// TTL deadline, absent while current.
    pub ttl_deadline: Option<String>,
    /// Successor key.
    pub superseded_by: Option<String>,
}

impl From<&CoreVersionRecord> for VersionView {
    fn from(record: &CoreVersionRecord) -> Self {
        Self {
            key: record.key.to_string(),
            entity: record.entity.to_string(),
            kind: record.kind.to_string(),
            tenant: record.tenant.to_string(),
            attributes: record.attributes.to_string(),
            created_at: record.created_at.to_string(),
            expires_at: match record.expires_at {
                Expiry::Never => None,
                Expiry::At(at) => Some(at.to_string()),
            },
            ttl_deadline: record.ttl_deadline.map(|t| t.to_string()),
            superseded_by: record.superseded_by.as_ref().map(ToString::to_string),
        }
    }
}

/// Prints one version as a text line.
pub fn print_version(record: &CoreVersionRecord) {
    let ttl = record
        .ttl_deadline
        .map(|t| format!(" ttl={t}"))
        .unwrap_or_default();
    println!(
        "{}  [{}, {}){}  {}",
        record.key, record.created_at, record.expires_at, ttl, record.attributes
    );
}

/// Prints versions in the requested format.
pub fn print_versions(
    records: &[CoreVersionRecord],
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        "json" => {
            let views: Vec<VersionView> = records.iter().map(VersionView::from).collect();
            println!("{}", serde_json::to_string_pretty(&views)?);
        }
        "text" => records.iter().for_each(print_version),
        other => return Err(format!("Unknown format: {other}").into()),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_loads_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"default_retention_ms": 30}"#).unwrap();
        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.default_retention, std::time::Duration::from_millis(30));
        assert_eq!(load_config(None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn instants_parse_both_forms() {
        assert_eq!(
            parse_instant(Some("10")).unwrap(),
            Some(Timestamp::from_millis(10))
        );
        assert_eq!(
            parse_instant(Some("1970-01-01T00:00:00.010Z")).unwrap(),
            Some(Timestamp::from_millis(10))
        );
        assert_eq!(parse_instant(None).unwrap(), None);
        assert!(parse_instant(Some("yesterday")).is_err());
    }
}
