//! Concurrent configuration changes against the same entity.

use lineage_codec::Value;
use lineage_core::{
    ChangeRequest, Conflict, CoreError, CoreResult, EngineConfig, EntityKey, EntityKind, Lineage,
    Onboarding, RecordKey, TenantScope, Timestamp, Transition,
};
use lineage_store::{FaultyStore, InMemoryStore, StoreOp};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;

fn t(ms: i64) -> Timestamp {
    Timestamp::from_millis(ms)
}

fn config(v: &str) -> Value {
    Value::record([("config", v)])
}

fn request(entity: &str, v: &str, at: i64) -> ChangeRequest {
    ChangeRequest::new(EntityKind::device(), EntityKey::new(entity), config(v), t(at))
}

fn onboarded(lineage: &Lineage, scope: &TenantScope, entity: &str) {
    lineage
        .onboard(
            scope,
            Onboarding::new(EntityKind::device(), EntityKey::new(entity), config("A"), t(0)),
        )
        .unwrap();
}

fn assert_single_current(lineage: &Lineage, scope: &TenantScope, entity: &str) {
    let history = lineage
        .history(scope, &EntityKind::device(), &EntityKey::new(entity))
        .unwrap();
    assert_eq!(history.iter().filter(|r| r.is_current()).count(), 1);
    assert_eq!(history.len(), 2, "loser must not promote");
}

#[test]
fn interleaved_plans_yield_one_winner() {
    let lineage = Lineage::open_in_memory(&[EntityKind::device()]).unwrap();
    let acme = lineage.scope("acme");
    onboarded(&lineage, &acme, "E1");

    let first = lineage.engine().plan(&acme, &request("E1", "B", 10)).unwrap();
    let second = lineage.engine().plan(&acme, &request("E1", "C", 11)).unwrap();
    assert_eq!(first.observed().key, second.observed().key);

    lineage.engine().execute(&acme, &first).unwrap();
    let err = lineage.engine().execute(&acme, &second).unwrap_err();
    assert!(matches!(
        err,
        CoreError::ConcurrentModification {
            conflict: Conflict::LostRace { .. },
            ..
        }
    ));
    assert!(err.is_retryable());
    assert_single_current(&lineage, &acme, "E1");
}

#[test]
fn simultaneous_executions_yield_one_winner() {
    let lineage = Arc::new(Lineage::open_in_memory(&[EntityKind::device()]).unwrap());
    let acme = lineage.scope("acme");
    onboarded(&lineage, &acme, "E1");
    let barrier = Arc::new(Barrier::new(2));

    let handles: Vec<_> = [("B", 10), ("C", 11)]
        .into_iter()
        .map(|(v, at)| {
            let lineage = Arc::clone(&lineage);
            let barrier = Arc::clone(&barrier);
            let scope = acme.clone();
            thread::spawn(move || -> CoreResult<Transition> {
                let plan = lineage.engine().plan(&scope, &request("E1", v, at))?;
                barrier.wait();
                lineage.engine().execute(&scope, &plan)
            })
        })
        .collect();
    let results: Vec<CoreResult<Transition>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(CoreError::ConcurrentModification { .. })))
            .count(),
        1
    );
    assert_single_current(&lineage, &acme, "E1");
}

#[test]
fn racing_changes_with_expected_key() {
    let lineage = Arc::new(Lineage::open_in_memory(&[EntityKind::device()]).unwrap());
    let acme = lineage.scope("acme");
    let entities: Vec<String> = (0..16).map(|i| format!("E{i}")).collect();
    for entity in &entities {
        onboarded(&lineage, &acme, entity);
    }

    for entity in &entities {
        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = [("B", 10), ("C", 11)]
            .into_iter()
            .map(|(v, at)| {
                let lineage = Arc::clone(&lineage);
                let barrier = Arc::clone(&barrier);
                let scope = acme.clone();
                let req = request(entity, v, at).expecting(RecordKey::new(format!("{entity}@0")));
                thread::spawn(move || {
                    barrier.wait();
                    lineage.change_configuration(&scope, req)
                })
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "{entity}");
        assert!(
            results
                .iter()
                .all(|r| matches!(r, Ok(_) | Err(CoreError::ConcurrentModification { .. }))),
            "{entity}: {results:?}"
        );
        assert_single_current(&lineage, &acme, entity);
    }
}

#[test]
fn change_during_pending_promotion_is_rejected() {
    let faulty = Arc::new(FaultyStore::new(Arc::new(InMemoryStore::new())));
    let lineage = Arc::new(
        Lineage::open(faulty.clone(), EngineConfig::default(), &[EntityKind::device()]).unwrap(),
    );
    let acme = lineage.scope("acme");
    onboarded(&lineage, &acme, "E1");

    // Between the demotion and the promotion of E1@10, a second caller tries
    // its own change.
    let observed: Arc<Mutex<Option<CoreResult<Transition>>>> = Arc::new(Mutex::new(None));
    let fired = Arc::new(AtomicBool::new(false));
    {
        let lineage = Arc::clone(&lineage);
        let observed = Arc::clone(&observed);
        let scope = acme.clone();
        faulty.on(
            StoreOp::Insert,
            Box::new(move |collection, key| {
                if collection == "device" && key == "E1@10" && !fired.swap(true, Ordering::SeqCst)
                {
                    let result = lineage.change_configuration(&scope, request("E1", "C", 11));
                    *observed.lock().unwrap() = Some(result);
                }
            }),
        );
    }

    let winner = lineage
        .change_configuration(&acme, request("E1", "B", 10))
        .unwrap();
    assert_eq!(winner.new_key().as_str(), "E1@10");

    let loser = observed.lock().unwrap().take().unwrap();
    assert!(matches!(
        loser,
        Err(CoreError::ConcurrentModification {
            conflict: Conflict::PromotionPending { .. },
            ..
        })
    ));
    faulty.clear();
    assert_single_current(&lineage, &acme, "E1");
}

#[test]
fn different_entities_change_in_parallel() {
    let lineage = Arc::new(Lineage::open_in_memory(&[EntityKind::device()]).unwrap());
    let acme = lineage.scope("acme");
    for i in 0..8 {
        onboarded(&lineage, &acme, &format!("E{i}"));
    }

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let lineage = Arc::clone(&lineage);
            let scope = acme.clone();
            thread::spawn(move || {
                for step in 1..=5 {
                    lineage
                        .change_configuration(
                            &scope,
                            request(&format!("E{i}"), &format!("v{step}"), step * 10),
                        )
                        .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    for i in 0..8 {
        let history = lineage
            .history(&acme, &EntityKind::device(), &EntityKey::new(format!("E{i}")))
            .unwrap();
        assert_eq!(history.len(), 6);
    }
    assert!(lineage.verify(&acme).unwrap().issues.is_empty());
}
