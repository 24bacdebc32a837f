//! History command implementation.

use super::{open_dump, parse_kind, print_versions};
use lineage_core::{EngineConfig, EntityKey};
use std::path::Path;

/// Runs the history command.
pub fn run(
    dump: &Path,
    config: EngineConfig,
    tenant: &str,
    kind: &str,
    entity: &str,
    format: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let lineage = open_dump(dump, config)?;
    let kind = parse_kind(kind)?;
    let history = lineage.history(&lineage.scope(tenant), &kind, &EntityKey::new(entity))?;
    if history.is_empty() {
        return Err(format!("No versions of {kind} {entity} in tenant {tenant}").into());
    }
    print_versions(&history, format)
}
