//! Verify command implementation.

use super::open_dump;
use lineage_core::{EngineConfig, IntegrityReport, Lineage, Severity};
use std::collections::BTreeSet;
use std::path::Path;

/// Runs the verify command.
pub fn run(
    dump: &Path,
    config: EngineConfig,
    tenant: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    println!("Verifying dump at {:?}", dump);
    println!();

    let lineage = open_dump(dump, config)?;
    let reports = verify_all(&lineage, tenant)?;
    for report in &reports {
        print_report(report);
    }

    println!();
    if reports.iter().all(IntegrityReport::is_ok) {
        println!("✓ Verification passed");
        Ok(())
    } else {
        println!("✗ Verification failed");
        Err("Verification failed".into())
    }
}

/// Verifies one tenant, or every tenant that owns a document.
pub fn verify_all(
    lineage: &Lineage,
    tenant: Option<&str>,
) -> Result<Vec<IntegrityReport>, Box<dyn std::error::Error>> {
    let tenants: BTreeSet<String> = match tenant {
        Some(tenant) => BTreeSet::from([tenant.to_string()]),
        None => lineage
            .store()
            .export()?
            .into_iter()
            .map(|d| d.document.partition.as_str().to_string())
            .collect(),
    };
    tenants
        .iter()
        .map(|t| lineage.verify(&lineage.scope(t)).map_err(Into::into))
        .collect()
}

fn print_report(report: &IntegrityReport) {
    println!(
        "Tenant {}: {} entities, {} records, {} edges",
        report.tenant, report.entities, report.records, report.edges
    );
    for issue in &report.issues {
        let label = match issue.severity() {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        println!("  {label}: {issue}");
    }
}
