//! Core version records and their validity windows.

use crate::error::{CoreError, CoreResult};
use crate::types::{EntityKey, EntityKind, RecordKey, TenantKey, Timestamp};
use lineage_codec::Value;
use std::fmt;
use std::time::Duration;

/// Upper bound of a validity window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expiry {
    /// Open-ended; the record is current.
    Never,
    /// Closed at the given instant (exclusive).
    At(Timestamp),
}

impl Expiry {
    /// Returns true for an open-ended window.
    pub fn is_never(self) -> bool {
        matches!(self, Self::Never)
    }

    /// Returns the closing instant, if any.
    pub fn at(self) -> Option<Timestamp> {
        match self {
            Self::Never => None,
            Self::At(t) => Some(t),
        }
    }

    /// Returns true if the window is still open at `instant`.
    pub fn is_after(self, instant: Timestamp) -> bool {
        match self {
            Self::Never => true,
            Self::At(t) => t > instant,
        }
    }
}

impl fmt::Display for Expiry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Never => f.write_str("never"),
            Self::At(t) => t.fmt(f),
        }
    }
}

/// Where a record sits in its entity's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    /// The one version valid now.
    Current,
    /// A superseded version awaiting TTL removal.
    Historical,
}

/// One immutable snapshot of an entity's attributes over a validity window.
///
/// The window is `[created_at, expires_at)`. A record is mutated exactly
/// once, when it is demoted: `expires_at` closes, `ttl_deadline` is set and
/// `superseded_by` names the successor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreVersionRecord {
    /// Record key, unique per tenant within the kind's collection.
    pub key: RecordKey,
    /// The logical entity this record versions.
    pub entity: EntityKey,
    /// The entity kind.
    pub kind: EntityKind,
    /// Owning tenant.
    pub tenant: TenantKey,
    /// Attribute map.
    pub attributes: Value,
    /// Inclusive start of the validity window.
    pub created_at: Timestamp,
    /// Exclusive end of the validity window.
    pub expires_at: Expiry,
    /// When the store may remove the record. Set only on historical records.
    pub ttl_deadline: Option<Timestamp>,
    /// Key of the record that replaced this one.
    pub superseded_by: Option<RecordKey>,
}

impl CoreVersionRecord {
    /// Creates a current record.
    pub fn current(
        key: RecordKey,
        entity: EntityKey,
        kind: EntityKind,
        tenant: TenantKey,
        attributes: Value,
        created_at: Timestamp,
    ) -> Self {
        Self {
            key,
            entity,
            kind,
            tenant,
            attributes,
            created_at,
            expires_at: Expiry::Never,
            ttl_deadline: None,
            superseded_by: None,
        }
    }

    /// Returns the demoted form of this record.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTemporalRecord` if the record is already historical,
    /// `at` does not fall after `created_at`, or the TTL deadline overflows.
    pub fn demoted(
        &self,
        at: Timestamp,
        retention: Duration,
        successor: RecordKey,
    ) -> CoreResult<Self> {
        if !self.is_current() {
            return Err(CoreError::invalid_record(
                &self.key,
                "only a current record can be demoted",
            ));
        }
        let demoted = Self {
            expires_at: Expiry::At(at),
            ttl_deadline: Some(ttl_deadline_for(&self.key, at, retention)?),
            superseded_by: Some(successor),
            ..self.clone()
        };
        validate(&demoted)?;
        Ok(demoted)
    }

    /// Returns true if the record has no closing instant.
    pub fn is_current(&self) -> bool {
        is_current(self)
    }

    /// Returns the record's lifecycle stage.
    pub fn lifecycle(&self) -> Lifecycle {
        if self.is_current() {
            Lifecycle::Current
        } else {
            Lifecycle::Historical
        }
    }

    /// Returns true if the record is valid at `instant`.
    ///
    /// The lower bound is inclusive and the upper bound exclusive, so at a
    /// change instant the successor is valid and the predecessor is not.
    pub fn contains(&self, instant: Timestamp) -> bool {
        self.created_at <= instant && self.expires_at.is_after(instant)
    }
}

/// Returns true if the record is the current version of its entity.
pub fn is_current(record: &CoreVersionRecord) -> bool {
    record.expires_at.is_never()
}

/// Computes the TTL deadline of a record demoted at `expires_at`.
///
/// # Errors
///
/// Returns `InvalidTemporalRecord` if the deadline is not representable.
pub fn ttl_deadline_for(
    key: &RecordKey,
    expires_at: Timestamp,
    retention: Duration,
) -> CoreResult<Timestamp> {
    expires_at
        .checked_add(retention)
        .filter(|t| t.as_millis() < i64::MAX)
        .ok_or_else(|| CoreError::invalid_record(key, "ttlDeadline overflows"))
}

/// Checks a record's window and TTL fields.
///
/// # Errors
///
/// Returns `InvalidTemporalRecord` describing the first rule broken.
pub fn validate(record: &CoreVersionRecord) -> CoreResult<()> {
    if record.attributes.as_map().is_none() {
        return Err(CoreError::invalid_record(
            &record.key,
            "attributes must be a map",
        ));
    }
    match record.expires_at {
        Expiry::Never => {
            if record.ttl_deadline.is_some() {
                return Err(CoreError::invalid_record(
                    &record.key,
                    "current record carries a ttlDeadline",
                ));
            }
            if record.superseded_by.is_some() {
                return Err(CoreError::invalid_record(
                    &record.key,
                    "current record names a successor",
                ));
            }
        }
        Expiry::At(expires_at) => {
            if record.created_at >= expires_at {
                return Err(CoreError::invalid_record(
                    &record.key,
                    format!(
                        "createdAt {} is not before expiresAt {}",
                        record.created_at, expires_at
                    ),
                ));
            }
            if expires_at.as_millis() == i64::MAX {
                return Err(CoreError::invalid_record(
                    &record.key,
                    "expiresAt collides with the open-ended sentinel",
                ));
            }
            match record.ttl_deadline {
                None => {
                    return Err(CoreError::invalid_record(
                        &record.key,
                        "historical record lacks a ttlDeadline",
                    ))
                }
                Some(deadline) if deadline < expires_at => {
                    return Err(CoreError::invalid_record(
                        &record.key,
                        format!("ttlDeadline {deadline} precedes expiresAt {expires_at}"),
                    ))
                }
                Some(_) => {}
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(created_at: i64) -> CoreVersionRecord {
        CoreVersionRecord::current(
            RecordKey::new(format!("E1@{created_at}")),
            EntityKey::new("E1"),
            EntityKind::device(),
            TenantKey::new("acme"),
            Value::record([("config", "A")]),
            Timestamp::from_millis(created_at),
        )
    }

    #[test]
    fn current_record_is_valid() {
        let r = record(0);
        assert!(validate(&r).is_ok());
        assert!(r.is_current());
        assert_eq!(r.lifecycle(), Lifecycle::Current);
    }

    #[test]
    fn demotion_sets_ttl_and_successor() {
        let r = record(0);
        let d = r
            .demoted(
                Timestamp::from_millis(10),
                Duration::from_millis(30),
                RecordKey::new("E1@10"),
            )
            .unwrap();
        assert_eq!(d.expires_at, Expiry::At(Timestamp::from_millis(10)));
        assert_eq!(d.ttl_deadline, Some(Timestamp::from_millis(40)));
        assert_eq!(d.superseded_by, Some(RecordKey::new("E1@10")));
        assert_eq!(d.lifecycle(), Lifecycle::Historical);
        assert_eq!(d.attributes, r.attributes);
    }

    #[test]
    fn demotion_at_creation_instant_is_rejected() {
        let r = record(10);
        let err = r
            .demoted(
                Timestamp::from_millis(10),
                Duration::from_millis(30),
                RecordKey::new("E1@10b"),
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidTemporalRecord { .. }));
    }

    #[test]
    fn historical_record_cannot_be_demoted_again() {
        let d = record(0)
            .demoted(
                Timestamp::from_millis(10),
                Duration::ZERO,
                RecordKey::new("E1@10"),
            )
            .unwrap();
        assert!(d
            .demoted(
                Timestamp::from_millis(20),
                Duration::ZERO,
                RecordKey::new("E1@20")
            )
            .is_err());
    }

    #[test]
    fn validation_rules() {
        let mut r = record(0);
        r.ttl_deadline = Some(Timestamp::from_millis(5));
        assert!(validate(&r).is_err(), "current with ttl");

        let mut r = record(0);
        r.expires_at = Expiry::At(Timestamp::from_millis(10));
        assert!(validate(&r).is_err(), "historical without ttl");

        r.ttl_deadline = Some(Timestamp::from_millis(9));
        assert!(validate(&r).is_err(), "ttl before expiry");

        r.ttl_deadline = Some(Timestamp::from_millis(10));
        assert!(validate(&r).is_ok(), "zero retention");

        r.expires_at = Expiry::At(Timestamp::from_millis(0));
        assert!(validate(&r).is_err(), "empty window");

        let mut r = record(0);
        r.attributes = Value::Text("A".into());
        assert!(validate(&r).is_err(), "attributes not a map");

        let mut r = record(0);
        r.superseded_by = Some(RecordKey::new("E1@10"));
        assert!(validate(&r).is_err(), "current with successor");
    }

    #[test]
    fn window_bounds() {
        let d = record(0)
            .demoted(
                Timestamp::from_millis(10),
                Duration::from_millis(30),
                RecordKey::new("E1@10"),
            )
            .unwrap();
        assert!(d.contains(Timestamp::from_millis(0)));
        assert!(d.contains(Timestamp::from_millis(9)));
        assert!(!d.contains(Timestamp::from_millis(10)));
        assert!(!d.contains(Timestamp::from_millis(-1)));

        let next = record(10);
        assert!(next.contains(Timestamp::from_millis(10)));
        assert!(next.contains(Timestamp::from_millis(i64::MAX - 1)));
    }

    #[test]
    fn ttl_deadline_overflow() {
        let key = RecordKey::new("k");
        assert_eq!(
            ttl_deadline_for(&key, Timestamp::from_millis(10), Duration::from_millis(30)).unwrap(),
            Timestamp::from_millis(40)
        );
        assert!(ttl_deadline_for(
            &key,
            Timestamp::from_millis(i64::MAX - 10),
            Duration::from_millis(30)
        )
        .is_err());
    }
}
