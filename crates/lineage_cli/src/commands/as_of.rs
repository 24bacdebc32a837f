//! As-of command implementation.

use super::{open_dump, parse_instant, parse_kind, print_versions};
use lineage_core::{EngineConfig, EntityKey};
use std::path::Path;

/// Runs the as-of command.
pub fn run(
    dump: &Path,
    config: EngineConfig,
    tenant: &str,
    kind: &str,
    entity: &str,
    at: Option<&str>,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let lineage = open_dump(dump, config)?;
    let kind = parse_kind(kind)?;
    let at = parse_instant(at)?;
    let found = lineage.as_of(&lineage.scope(tenant), &kind, &EntityKey::new(entity), at)?;

    match found {
        Some(record) => print_versions(&[record], format),
        None => {
            let when = at.map_or_else(|| "now".to_string(), |t| t.to_string());
            Err(format!("No version of {kind} {entity} valid at {when}").into())
        }
    }
}
