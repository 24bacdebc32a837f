//! Test fixtures and lineage helpers.
//!
//! Provides convenience functions for setting up a `Lineage` and common
//! test scenarios.

use lineage_codec::Value;
use lineage_core::{
    ChangeRequest, CoreVersionRecord, EngineConfig, EntityKey, EntityKind, Lineage, Onboarding,
    TenantScope, Timestamp, Transition,
};
use lineage_store::{FaultyStore, InMemoryStore};
use std::sync::Arc;

/// Shorthand for a millisecond timestamp.
pub fn ts(ms: i64) -> Timestamp {
    Timestamp::from_millis(ms)
}

/// Attributes holding a single `config` field.
pub fn config(value: &str) -> Value {
    Value::record([("config", value)])
}

/// The kinds every fixture provisions.
pub fn default_kinds() -> Vec<EntityKind> {
    vec![EntityKind::device(), EntityKind::software()]
}

/// A `Lineage` over an in-memory store, with fault injection available.
///
/// Faults are armed through [`TestLineage::faults`]; with none armed the
/// wrapper passes every call through.
pub struct TestLineage {
    /// The lineage instance.
    pub lineage: Lineage,
    /// The backing store.
    pub memory: Arc<InMemoryStore>,
    /// The fault-injecting wrapper the lineage writes through.
    pub faults: Arc<FaultyStore>,
}

impl TestLineage {
    /// Creates a fixture with default configuration.
    pub fn memory() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Creates a fixture with the given configuration.
    pub fn with_config(config: EngineConfig) -> Self {
        let memory = Arc::new(InMemoryStore::new());
        let faults = Arc::new(FaultyStore::new(memory.clone()));
        let lineage = Lineage::open(faults.clone(), config, &default_kinds())
            .expect("Failed to open lineage");
        Self {
            lineage,
            memory,
            faults,
        }
    }

    /// Onboards a device with `config` attributes.
    pub fn onboard(&self, tenant: &str, entity: &str, value: &str, at: i64) -> CoreVersionRecord {
        self.lineage
            .onboard(
                &TenantScope::new(tenant),
                Onboarding::new(
                    EntityKind::device(),
                    EntityKey::new(entity),
                    config(value),
                    ts(at),
                ),
            )
            .expect("Failed to onboard")
    }

    /// Changes a device's `config` attributes.
    pub fn change(&self, tenant: &str, entity: &str, value: &str, at: i64) -> Transition {
        self.lineage
            .change_configuration(
                &TenantScope::new(tenant),
                ChangeRequest::new(
                    EntityKind::device(),
                    EntityKey::new(entity),
                    config(value),
                    ts(at),
                ),
            )
            .expect("Failed to change configuration")
    }

    /// Returns a device's full history.
    pub fn history_of(&self, tenant: &str, entity: &str) -> Vec<CoreVersionRecord> {
        self.lineage
            .history(
                &TenantScope::new(tenant),
                &EntityKind::device(),
                &EntityKey::new(entity),
            )
            .expect("Failed to read history")
    }

    /// Returns the device version valid at `at`, or the current one.
    pub fn as_of(&self, tenant: &str, entity: &str, at: Option<i64>) -> Option<CoreVersionRecord> {
        self.lineage
            .as_of(
                &TenantScope::new(tenant),
                &EntityKind::device(),
                &EntityKey::new(entity),
                at.map(ts),
            )
            .expect("Failed to query")
    }

    /// Asserts that the tenant verifies without errors.
    pub fn assert_consistent(&self, tenant: &str) {
        let report = self
            .lineage
            .verify(&TenantScope::new(tenant))
            .expect("Failed to verify");
        assert!(report.is_ok(), "{tenant}: {:?}", report.issues);
    }
}

impl std::ops::Deref for TestLineage {
    type Target = Lineage;

    fn deref(&self) -> &Self::Target {
        &self.lineage
    }
}

/// Runs a test with a fresh in-memory lineage.
pub fn with_lineage<F, R>(f: F) -> R
where
    F: FnOnce(&TestLineage) -> R,
{
    let t = TestLineage::memory();
    f(&t)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;
    use std::time::Duration;

    /// The device walk-through: tenant `acme`, entity `E1` onboarded with
    /// config `A` at 0 and changed to `B` at 10, with a 30ms retention.
    pub fn device_walkthrough() -> TestLineage {
        let t = TestLineage::with_config(
            EngineConfig::default().with_default_retention(Duration::from_millis(30)),
        );
        t.onboard("acme", "E1", "A", 0);
        t.change("acme", "E1", "B", 10);
        t
    }

    /// Onboards `entities` devices per tenant and changes each one
    /// `changes` times, 10ms apart.
    pub fn fleet(tenants: &[&str], entities: usize, changes: usize) -> TestLineage {
        let t = TestLineage::memory();
        for tenant in tenants {
            for e in 0..entities {
                let entity = format!("E{e}");
                t.onboard(tenant, &entity, "v0", 0);
                for step in 1..=changes {
                    let at = i64::try_from(step * 10).expect("change count fits in i64");
                    t.change(tenant, &entity, &format!("v{step}"), at);
                }
            }
        }
        t
    }
}
