//! Scenario command implementation.
//!
//! Runs the device walk-through against a fresh in-memory store: tenant
//! `acme` onboards `E1` with config `A` at 0 and changes it to `B` at 10.

use super::{dump, print_version};
use lineage_codec::Value;
use lineage_core::{
    ChangeRequest, EngineConfig, EntityKey, EntityKind, Lineage, Onboarding, Timestamp,
};
use lineage_store::InMemoryStore;
use std::path::Path;
use std::sync::Arc;

/// Instants the walk-through queries.
const PROBES: [i64; 4] = [0, 5, 10, 15];

/// Runs the scenario command.
pub fn run(config: EngineConfig, out: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(InMemoryStore::new());
    let lineage = Lineage::open(store.clone(), config, &[EntityKind::device()])?;
    let acme = lineage.scope("acme");
    let device = EntityKind::device();
    let e1 = EntityKey::new("E1");

    let first = lineage.onboard(
        &acme,
        Onboarding::new(
            device.clone(),
            e1.clone(),
            Value::record([("config", "A")]),
            Timestamp::from_millis(0),
        ),
    )?;
    println!("Onboarded {}", first.key);

    let transition = lineage.change_configuration(
        &acme,
        ChangeRequest::new(
            device.clone(),
            e1.clone(),
            Value::record([("config", "B")]),
            Timestamp::from_millis(10),
        ),
    )?;
    println!(
        "Changed {} -> {} at {}",
        transition.previous.key, transition.current.key, transition.at
    );

    println!();
    println!("History:");
    for record in lineage.history(&acme, &device, &e1)? {
        print_version(&record);
    }

    println!();
    for probe in PROBES {
        let at = Timestamp::from_millis(probe);
        match lineage.as_of(&acme, &device, &e1, Some(at))? {
            Some(record) => println!("as of {probe}: {} {}", record.key, record.attributes),
            None => println!("as of {probe}: none"),
        }
    }

    let report = lineage.verify(&acme)?;
    println!();
    println!(
        "Verified: {} records, {} edges, {} issues",
        report.records,
        report.edges,
        report.issues.len()
    );

    if let Some(out) = out {
        let count = dump::save(&*store, out)?;
        println!("Wrote {count} documents to {}", out.display());
    }
    Ok(())
}
