//! Property-based test generators using proptest.
//!
//! Provides strategies for generating identifiers, attribute maps and
//! change schedules that a lineage will accept.

use lineage_codec::Value;
use lineage_core::{EntityKey, TenantKey, Timestamp};
use proptest::prelude::*;

/// Strategy for generating tenant keys.
pub fn tenant_strategy() -> impl Strategy<Value = TenantKey> {
    prop::string::string_regex("[a-z][a-z0-9]{2,11}")
        .expect("Invalid regex")
        .prop_map(TenantKey::new)
}

/// Strategy for generating entity keys.
pub fn entity_key_strategy() -> impl Strategy<Value = EntityKey> {
    prop::string::string_regex("[A-Z][A-Za-z0-9]{0,15}")
        .expect("Invalid regex")
        .prop_map(EntityKey::new)
}

/// Strategy for generating a single scalar attribute value.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        "[a-zA-Z0-9 ._-]{0,24}".prop_map(Value::Text),
        Just(Value::Null),
    ]
}

/// Strategy for generating attribute maps with text keys.
pub fn attributes_strategy() -> impl Strategy<Value = Value> {
    prop::collection::vec(
        (
            prop::string::string_regex("[a-z][a-z_]{0,11}").expect("Invalid regex"),
            scalar_strategy(),
        ),
        0..6,
    )
    .prop_map(Value::record)
}

/// Strategy for an onboarding instant followed by up to `max_changes`
/// strictly later change instants.
pub fn change_schedule_strategy(max_changes: usize) -> impl Strategy<Value = Vec<Timestamp>> {
    (
        0i64..1_000_000,
        prop::collection::vec(1i64..10_000, 0..=max_changes),
    )
        .prop_map(|(start, gaps)| {
            let mut at = start;
            let mut schedule = vec![Timestamp::from_millis(at)];
            for gap in gaps {
                at += gap;
                schedule.push(Timestamp::from_millis(at));
            }
            schedule
        })
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
