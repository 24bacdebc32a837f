//! Property tests over generated change histories.

use lineage_codec::Value;
use lineage_core::{
    ChangeRequest, EntityKind, Expiry, Lineage, Onboarding, TenantScope, Timestamp,
};
use lineage_testkit::prelude::*;
use proptest::prelude::*;

fn build_history(
    tenant: &TenantScope,
    entity: &lineage_core::EntityKey,
    schedule: &[Timestamp],
    attrs: &[Value],
) -> Lineage {
    let lineage = Lineage::open_in_memory(&[EntityKind::device()]).unwrap();
    lineage
        .onboard(
            tenant,
            Onboarding::new(EntityKind::device(), entity.clone(), attrs[0].clone(), schedule[0]),
        )
        .unwrap();
    for (i, at) in schedule.iter().enumerate().skip(1) {
        lineage
            .change_configuration(
                tenant,
                ChangeRequest::new(
                    EntityKind::device(),
                    entity.clone(),
                    attrs[i % attrs.len()].clone(),
                    *at,
                ),
            )
            .unwrap();
    }
    lineage
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn n_changes_yield_contiguous_windows(
        tenant in tenant_strategy(),
        entity in entity_key_strategy(),
        schedule in change_schedule_strategy(6),
        attrs in prop::collection::vec(attributes_strategy(), 1..4),
    ) {
        let scope = TenantScope::new(tenant);
        let lineage = build_history(&scope, &entity, &schedule, &attrs);
        let history = lineage.history(&scope, &EntityKind::device(), &entity).unwrap();

        prop_assert_eq!(history.len(), schedule.len());
        prop_assert_eq!(history.iter().filter(|r| r.is_current()).count(), 1);
        for (record, at) in history.iter().zip(&schedule) {
            prop_assert_eq!(record.created_at, *at);
        }
        for pair in history.windows(2) {
            prop_assert_eq!(pair[0].expires_at, Expiry::At(pair[1].created_at));
            prop_assert!(pair[0].ttl_deadline.is_some());
        }
        prop_assert!(lineage.verify(&scope).unwrap().issues.is_empty());
    }

    #[test]
    fn as_of_returns_the_containing_window(
        schedule in change_schedule_strategy(6),
        probes in prop::collection::vec(0i64..2_000_000, 1..16),
    ) {
        let scope = TenantScope::new("acme");
        let entity = lineage_core::EntityKey::new("E1");
        let attrs: Vec<Value> = (0..schedule.len()).map(|i| config(&format!("v{i}"))).collect();
        let lineage = build_history(&scope, &entity, &schedule, &attrs);

        for probe in probes {
            let q = ts(probe);
            let expected = schedule.iter().rposition(|at| *at <= q);
            let found = lineage
                .as_of(&scope, &EntityKind::device(), &entity, Some(q))
                .unwrap();
            prop_assert_eq!(
                found.map(|r| r.attributes),
                expected.map(|i| attrs[i].clone())
            );
        }
    }
}
