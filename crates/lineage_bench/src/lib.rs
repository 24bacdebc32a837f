//! Benchmark utilities.

use lineage_codec::Value;
use lineage_core::{
    ChangeRequest, EntityKey, EntityKind, Lineage, Onboarding, TenantScope, Timestamp,
};
use rand::Rng;

/// Tenant every benchmark writes to.
pub const TENANT: &str = "bench";

/// Generates an attribute map with `fields` random integer fields.
pub fn random_attributes(fields: usize) -> Value {
    let mut rng = rand::thread_rng();
    Value::record((0..fields).map(|i| (format!("f{i}"), Value::Integer(rng.gen()))))
}

/// Key of the `i`th benchmark entity.
pub fn entity(i: usize) -> EntityKey {
    EntityKey::new(format!("B{i}"))
}

/// Opens a lineage with `entities` devices, each changed `depth` times at
/// instants `10, 20, ..`.
pub fn lineage_with_history(entities: usize, depth: usize) -> Lineage {
    let lineage = Lineage::open_in_memory(&[EntityKind::device()]).unwrap();
    let scope = TenantScope::new(TENANT);
    for e in 0..entities {
        lineage
            .onboard(
                &scope,
                Onboarding::new(
                    EntityKind::device(),
                    entity(e),
                    random_attributes(4),
                    Timestamp::from_millis(0),
                ),
            )
            .unwrap();
        for step in 1..=depth {
            lineage
                .change_configuration(
                    &scope,
                    ChangeRequest::new(
                        EntityKind::device(),
                        entity(e),
                        random_attributes(4),
                        Timestamp::from_millis(step as i64 * 10),
                    ),
                )
                .unwrap();
        }
    }
    lineage
}
