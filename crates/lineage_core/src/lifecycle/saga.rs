//! Requests, plans and results of lifecycle transitions.

use crate::temporal::CoreVersionRecord;
use crate::types::{EntityKey, EntityKind, RecordKey, TenantKey, Timestamp};
use lineage_codec::Value;
use lineage_store::Revision;
use std::time::Duration;

/// Derives the key of the version created for `entity` at `at`.
///
/// Deterministic so that a retried promotion writes the same key.
pub fn version_key(entity: &EntityKey, at: Timestamp) -> RecordKey {
    RecordKey::new(format!("{entity}@{}", at.as_millis()))
}

/// First version of a new entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Onboarding {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity key.
    pub entity: EntityKey,
    /// Initial attributes; must be a map.
    pub attributes: Value,
    /// Start of the first validity window.
    pub at: Timestamp,
}

impl Onboarding {
    /// Creates an onboarding request.
    pub fn new(kind: EntityKind, entity: EntityKey, attributes: Value, at: Timestamp) -> Self {
        Self {
            kind,
            entity,
            attributes,
            at,
        }
    }
}

/// A configuration change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeRequest {
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity key.
    pub entity: EntityKey,
    /// Attributes of the new version; must be a map.
    pub attributes: Value,
    /// Instant of the change.
    pub at: Timestamp,
    /// Retention for the demoted version; the tenant policy if unset.
    pub retention: Option<Duration>,
    /// Key the caller believes is current; the change fails if it is not.
    pub expected_current: Option<RecordKey>,
}

impl ChangeRequest {
    /// Creates a change request.
    pub fn new(kind: EntityKind, entity: EntityKey, attributes: Value, at: Timestamp) -> Self {
        Self {
            kind,
            entity,
            attributes,
            at,
            retention: None,
            expected_current: None,
        }
    }

    /// Overrides the retention of the demoted version.
    #[must_use]
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = Some(retention);
        self
    }

    /// Requires `key` to be the current version.
    #[must_use]
    pub fn expecting(mut self, key: RecordKey) -> Self {
        self.expected_current = Some(key);
        self
    }
}

/// A validated transition, ready to execute.
///
/// Holds the exact documents the transition will write. Nothing has touched
/// the store yet.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub(crate) observed: CoreVersionRecord,
    pub(crate) observed_revision: Revision,
    pub(crate) demoted: CoreVersionRecord,
    pub(crate) successor: CoreVersionRecord,
}

impl TransitionPlan {
    /// The current version as read.
    pub fn observed(&self) -> &CoreVersionRecord {
        &self.observed
    }

    /// The store revision the demotion will compare against.
    pub fn observed_revision(&self) -> Revision {
        self.observed_revision
    }

    /// The observed version after demotion.
    pub fn demoted(&self) -> &CoreVersionRecord {
        &self.demoted
    }

    /// The version that will become current.
    pub fn successor(&self) -> &CoreVersionRecord {
        &self.successor
    }

    pub(crate) fn resume_token(&self) -> ResumeToken {
        ResumeToken {
            tenant: self.successor.tenant.clone(),
            kind: self.successor.kind.clone(),
            entity: self.successor.entity.clone(),
            demoted: self.demoted.key.clone(),
            successor: self.successor.key.clone(),
            attributes: self.successor.attributes.clone(),
            at: self.successor.created_at,
        }
    }
}

/// Everything needed to finish an interrupted transition.
///
/// Carried by `PartialTransition`. Resuming re-runs only the promote and
/// rewire steps; the demotion already happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeToken {
    /// Owning tenant.
    pub tenant: TenantKey,
    /// Entity kind.
    pub kind: EntityKind,
    /// Entity key.
    pub entity: EntityKey,
    /// The version that was demoted.
    pub demoted: RecordKey,
    /// The version still to be written.
    pub successor: RecordKey,
    /// Attributes of the successor.
    pub attributes: Value,
    /// Instant of the change.
    pub at: Timestamp,
}

impl ResumeToken {
    /// Returns the successor record the token describes.
    pub fn successor_record(&self) -> CoreVersionRecord {
        CoreVersionRecord::current(
            self.successor.clone(),
            self.entity.clone(),
            self.kind.clone(),
            self.tenant.clone(),
            self.attributes.clone(),
            self.at,
        )
    }
}

/// A completed transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The demoted version.
    pub previous: CoreVersionRecord,
    /// The new current version.
    pub current: CoreVersionRecord,
    /// Instant of the change.
    pub at: Timestamp,
    /// Promotion attempts made, across the original call and any resume.
    pub attempts: u32,
}

impl Transition {
    /// Key of the new current version.
    pub fn new_key(&self) -> &RecordKey {
        &self.current.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_keys_are_deterministic() {
        let e = EntityKey::new("E1");
        assert_eq!(version_key(&e, Timestamp::from_millis(10)).as_str(), "E1@10");
        assert_eq!(
            version_key(&e, Timestamp::from_millis(10)),
            version_key(&e, Timestamp::from_millis(10))
        );
        assert_ne!(
            version_key(&e, Timestamp::from_millis(10)),
            version_key(&e, Timestamp::from_millis(11))
        );
    }

    #[test]
    fn change_request_builder() {
        let req = ChangeRequest::new(
            EntityKind::device(),
            EntityKey::new("E1"),
            Value::record([("config", "B")]),
            Timestamp::from_millis(10),
        )
        .with_retention(Duration::from_millis(30))
        .expecting(RecordKey::new("E1@0"));
        assert_eq!(req.retention, Some(Duration::from_millis(30)));
        assert_eq!(req.expected_current, Some(RecordKey::new("E1@0")));
    }

    #[test]
    fn token_rebuilds_successor() {
        let token = ResumeToken {
            tenant: TenantKey::new("acme"),
            kind: EntityKind::device(),
            entity: EntityKey::new("E1"),
            demoted: RecordKey::new("E1@0"),
            successor: RecordKey::new("E1@10"),
            attributes: Value::record([("config", "B")]),
            at: Timestamp::from_millis(10),
        };
        let record = token.successor_record();
        assert!(record.is_current());
        assert_eq!(record.key.as_str(), "E1@10");
        assert_eq!(record.created_at, Timestamp::from_millis(10));
    }
}
