//! Partial transitions and their resumption.

use lineage_codec::Value;
use lineage_core::{
    ChangeRequest, Conflict, CoreError, EngineConfig, EntityKey, EntityKind, IntegrityIssue,
    Lineage, Onboarding, RetryPolicy, SnapshotRequest, Timestamp,
};
use lineage_store::{FaultyStore, InMemoryStore, StoreError, StoreOp};
use std::sync::Arc;
use std::time::Duration;

fn t(ms: i64) -> Timestamp {
    Timestamp::from_millis(ms)
}

fn request(v: &str, at: i64) -> ChangeRequest {
    ChangeRequest::new(
        EntityKind::device(),
        EntityKey::new("E1"),
        Value::record([("config", v)]),
        t(at),
    )
}

fn open(retry: RetryPolicy) -> (Arc<FaultyStore>, Lineage) {
    let faulty = Arc::new(FaultyStore::new(Arc::new(InMemoryStore::new())));
    let lineage = Lineage::open(
        faulty.clone(),
        EngineConfig::default().with_retry(retry),
        &[EntityKind::device()],
    )
    .unwrap();
    lineage
        .onboard(
            &lineage.scope("acme"),
            Onboarding::new(
                EntityKind::device(),
                EntityKey::new("E1"),
                Value::record([("config", "A")]),
                t(0),
            ),
        )
        .unwrap();
    (faulty, lineage)
}

fn quick_retry(attempts: u32) -> RetryPolicy {
    RetryPolicy::new(attempts).with_initial_delay(Duration::ZERO)
}

#[test]
fn failed_promotion_leaves_pending_transition() {
    let (faulty, lineage) = open(quick_retry(2));
    let acme = lineage.scope("acme");
    faulty.fail_in(StoreOp::Insert, "device", 5);

    let err = lineage.change_configuration(&acme, request("B", 10)).unwrap_err();
    let CoreError::PartialTransition { token, source } = err else {
        panic!("expected a partial transition, got {err:?}");
    };
    assert!(source.is_transient());
    assert_eq!(token.demoted.as_str(), "E1@0");
    assert_eq!(token.successor.as_str(), "E1@10");

    // No current version while the promotion is pending.
    let device = EntityKind::device();
    let e1 = EntityKey::new("E1");
    assert_eq!(lineage.as_of(&acme, &device, &e1, None).unwrap(), None);
    let err = lineage.change_configuration(&acme, request("C", 20)).unwrap_err();
    assert!(matches!(
        err,
        CoreError::ConcurrentModification {
            conflict: Conflict::PromotionPending { .. },
            ..
        }
    ));
    let report = lineage.verify(&acme).unwrap();
    assert!(report
        .issues
        .iter()
        .any(|i| matches!(i, IntegrityIssue::PromotionPending { .. })));

    faulty.clear();
    let transition = lineage.resume(&acme, &token).unwrap();
    assert_eq!(transition.current.key.as_str(), "E1@10");
    assert_eq!(transition.at, t(10));

    assert!(lineage.verify(&acme).unwrap().issues.is_empty());
    lineage.change_configuration(&acme, request("C", 20)).unwrap();
    assert_eq!(lineage.history(&acme, &device, &e1).unwrap().len(), 3);
}

#[test]
fn failed_rewire_is_completed_by_resume() {
    let (faulty, lineage) = open(RetryPolicy::no_retry());
    let acme = lineage.scope("acme");
    // Inbound edge succeeds, outbound edge fails.
    faulty.fail_after(StoreOp::Insert, 2, 1);

    let err = lineage.change_configuration(&acme, request("B", 10)).unwrap_err();
    let token = err.resume_token().cloned().unwrap();

    let report = lineage.verify(&acme).unwrap();
    assert!(report
        .errors()
        .any(|i| matches!(i, IntegrityIssue::MissingEdge { .. })));

    lineage.resume(&acme, &token).unwrap();
    let report = lineage.verify(&acme).unwrap();
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert_eq!(report.edges, 4);
}

#[test]
fn unfinished_rewire_blocks_later_changes_until_resumed() {
    let (faulty, lineage) = open(RetryPolicy::no_retry());
    let acme = lineage.scope("acme");
    let device = EntityKind::device();
    let e1 = EntityKey::new("E1");
    // The successor is written but its inbound edge is not.
    faulty.fail_in(StoreOp::Insert, "version", 1);
    let token = lineage
        .change_configuration(&acme, request("B", 10))
        .unwrap_err()
        .resume_token()
        .cloned()
        .unwrap();

    let err = lineage.change_configuration(&acme, request("C", 20)).unwrap_err();
    assert!(matches!(
        err,
        CoreError::ConcurrentModification {
            conflict: Conflict::PromotionPending { .. },
            ..
        }
    ));
    assert_eq!(lineage.history(&acme, &device, &e1).unwrap().len(), 2);

    lineage.resume(&acme, &token).unwrap();
    lineage.change_configuration(&acme, request("C", 20)).unwrap();

    let at_15 = lineage.as_of(&acme, &device, &e1, Some(t(15))).unwrap().unwrap();
    assert_eq!(at_15.key.as_str(), "E1@10");
    let snapshot = lineage
        .snapshot(&acme, &SnapshotRequest::at(vec![device.clone()], t(15)))
        .unwrap();
    assert_eq!(snapshot.get(&device, &e1), Some(&at_15));

    let report = lineage.verify(&acme).unwrap();
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert_eq!(report.edges, 6);
}

#[test]
fn unfinished_onboarding_is_completed_by_repeating_it() {
    let faulty = Arc::new(FaultyStore::new(Arc::new(InMemoryStore::new())));
    let lineage = Lineage::open(faulty.clone(), EngineConfig::default(), &[EntityKind::device()])
        .unwrap();
    let acme = lineage.scope("acme");
    let onboarding = Onboarding::new(
        EntityKind::device(),
        EntityKey::new("E1"),
        Value::record([("config", "A")]),
        t(0),
    );
    faulty.fail_in(StoreOp::Insert, "version", 1);
    assert!(lineage.onboard(&acme, onboarding.clone()).is_err());

    let err = lineage.change_configuration(&acme, request("B", 10)).unwrap_err();
    assert!(matches!(
        err,
        CoreError::ConcurrentModification {
            conflict: Conflict::OnboardingPending { .. },
            ..
        }
    ));

    lineage.onboard(&acme, onboarding).unwrap();
    lineage.change_configuration(&acme, request("B", 10)).unwrap();
    assert!(lineage.verify(&acme).unwrap().issues.is_empty());
}

#[test]
fn resume_is_idempotent() {
    let (faulty, lineage) = open(RetryPolicy::no_retry());
    let acme = lineage.scope("acme");
    faulty.fail_in(StoreOp::Insert, "version", 1);
    let token = lineage
        .change_configuration(&acme, request("B", 10))
        .unwrap_err()
        .resume_token()
        .cloned()
        .unwrap();

    let first = lineage.resume(&acme, &token).unwrap();
    let second = lineage.resume(&acme, &token).unwrap();
    assert_eq!(first.current, second.current);
    assert_eq!(first.previous, second.previous);
    assert!(lineage.verify(&acme).unwrap().issues.is_empty());
}

#[test]
fn resume_fails_again_with_same_token() {
    let (faulty, lineage) = open(quick_retry(2));
    let acme = lineage.scope("acme");
    faulty.fail_in(StoreOp::Insert, "device", 10);
    let token = lineage
        .change_configuration(&acme, request("B", 10))
        .unwrap_err()
        .resume_token()
        .cloned()
        .unwrap();

    let again = lineage.resume(&acme, &token).unwrap_err();
    assert_eq!(again.resume_token(), Some(&token));
}

#[test]
fn forged_token_is_rejected() {
    let (faulty, lineage) = open(RetryPolicy::no_retry());
    let acme = lineage.scope("acme");
    faulty.fail_in(StoreOp::Insert, "device", 1);
    let mut token = lineage
        .change_configuration(&acme, request("B", 10))
        .unwrap_err()
        .resume_token()
        .cloned()
        .unwrap();
    token.at = t(11);

    let err = lineage.resume(&acme, &token).unwrap_err();
    assert!(matches!(
        err,
        CoreError::ConcurrentModification {
            conflict: Conflict::ResumeMismatch { .. },
            ..
        }
    ));
}

#[test]
fn failed_demotion_changes_nothing() {
    let (faulty, lineage) = open(RetryPolicy::default());
    let acme = lineage.scope("acme");
    faulty.fail_next(StoreOp::Update, 1);

    let err = lineage.change_configuration(&acme, request("B", 10)).unwrap_err();
    assert!(matches!(
        err,
        CoreError::Store(StoreError::Unavailable(_))
    ));
    assert!(err.resume_token().is_none());

    let current = lineage
        .as_of(&acme, &EntityKind::device(), &EntityKey::new("E1"), None)
        .unwrap()
        .unwrap();
    assert_eq!(current.key.as_str(), "E1@0");
    lineage.change_configuration(&acme, request("B", 10)).unwrap();
}
