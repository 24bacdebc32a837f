//! Lifecycle transition benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lineage_bench::{entity, lineage_with_history, random_attributes, TENANT};
use lineage_core::{
    ChangeRequest, EntityKey, EntityKind, Lineage, Onboarding, TenantScope, Timestamp,
};

/// Benchmark onboarding new entities.
fn bench_onboard(c: &mut Criterion) {
    let mut group = c.benchmark_group("onboard");
    group.throughput(Throughput::Elements(1));
    group.bench_function("device", |b| {
        let lineage = Lineage::open_in_memory(&[EntityKind::device()]).unwrap();
        let scope = TenantScope::new(TENANT);
        b.iter(|| {
            lineage
                .onboard(
                    &scope,
                    Onboarding::new(
                        EntityKind::device(),
                        EntityKey::generate(),
                        black_box(random_attributes(4)),
                        Timestamp::from_millis(0),
                    ),
                )
                .unwrap();
        });
    });
    group.finish();
}

/// Benchmark configuration changes against tenants of growing size.
fn bench_change_configuration(c: &mut Criterion) {
    let mut group = c.benchmark_group("change_configuration");

    for entities in [1, 100, 1000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(entities),
            entities,
            |b, &entities| {
                let lineage = lineage_with_history(entities, 0);
                let scope = TenantScope::new(TENANT);
                let mut at = 0i64;
                b.iter(|| {
                    at += 1;
                    lineage
                        .change_configuration(
                            &scope,
                            ChangeRequest::new(
                                EntityKind::device(),
                                entity(0),
                                black_box(random_attributes(4)),
                                Timestamp::from_millis(at),
                            ),
                        )
                        .unwrap();
                });
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_onboard, bench_change_configuration);
criterion_main!(benches);
