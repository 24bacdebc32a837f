//! Snapshot command implementation.

use super::{open_dump, parse_instant, parse_kind};
use lineage_core::{EngineConfig, SnapshotRequest};
use std::path::Path;

/// Runs the snapshot command.
pub fn run(
    dump: &Path,
    config: EngineConfig,
    tenant: &str,
    kinds: Option<&str>,
    at: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let lineage = open_dump(dump, config)?;
    let kinds = match kinds {
        Some(list) => list
            .split(',')
            .map(|k| parse_kind(k.trim()))
            .collect::<Result<Vec<_>, _>>()?,
        None => lineage.kinds().to_vec(),
    };
    let request = match parse_instant(at)? {
        Some(at) => SnapshotRequest::at(kinds, at),
        None => SnapshotRequest::current(kinds),
    };

    let snapshot = lineage.snapshot(&lineage.scope(tenant), &request)?;
    match snapshot.at {
        Some(at) => println!("Snapshot of {tenant} at {at}"),
        None => println!("Current snapshot of {tenant}"),
    }
    for record in &snapshot.records {
        println!(
            "{} {}: {} {}",
            record.kind, record.entity, record.key, record.attributes
        );
    }
    println!("{} entities", snapshot.len());
    if snapshot.skipped_edges > 0 {
        println!("{} edges pointed at removed versions", snapshot.skipped_edges);
    }
    Ok(())
}
