//! Error types for Lineage core.

use crate::lifecycle::ResumeToken;
use crate::types::{EntityKey, RecordKey, Timestamp};
use std::fmt;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Lineage core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Store error.
    #[error("store error: {0}")]
    Store(#[from] lineage_store::StoreError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] lineage_codec::CodecError),

    /// A record's validity window or TTL fields are malformed.
    ///
    /// Raised before any write is attempted.
    #[error("invalid temporal record {key}: {reason}")]
    InvalidTemporalRecord {
        /// Key of the offending record.
        key: RecordKey,
        /// What is wrong with it.
        reason: String,
    },

    /// The entity has no current version.
    #[error("entity {entity} has no current version")]
    NoCurrentVersion {
        /// The logical entity.
        entity: EntityKey,
    },

    /// The entity has more than one current version.
    ///
    /// This is a consistency alarm; it is never repaired automatically.
    #[error("entity {entity} has {} current versions: {}", keys.len(), join(keys))]
    MultipleCurrentVersions {
        /// The logical entity.
        entity: EntityKey,
        /// Keys of every record claiming to be current.
        keys: Vec<RecordKey>,
    },

    /// More than one version of an entity is valid at the queried instant.
    #[error("ambiguous versions at {}: {}", at.map_or_else(|| "now".to_string(), |t| t.to_string()), join(conflicts))]
    AmbiguousVersions {
        /// The queried instant; `None` for "now".
        at: Option<Timestamp>,
        /// Every entity with overlapping versions.
        conflicts: Vec<VersionConflict>,
    },

    /// Another transition touched the entity first. Retry the whole change.
    #[error("concurrent modification of entity {entity}: {conflict}")]
    ConcurrentModification {
        /// The logical entity.
        entity: EntityKey,
        /// What was observed.
        conflict: Conflict,
    },

    /// An operation would read or write outside the caller's tenant.
    ///
    /// Always fatal; never retried.
    #[error("tenant isolation violation in {context}: scope {scope}, found {found}")]
    TenantIsolationViolation {
        /// The caller's declared tenant.
        scope: String,
        /// The tenant actually encountered.
        found: String,
        /// Which operation tripped the guard.
        context: String,
    },

    /// The current version was demoted but its successor could not be written.
    ///
    /// The entity has no current version until [`ResumeToken`] is passed to
    /// `resume`, which re-runs only the promote and rewire steps.
    #[error("transition of entity {} interrupted after demotion: {source}", token.entity)]
    PartialTransition {
        /// Everything needed to finish the transition.
        token: Box<ResumeToken>,
        /// The failure that stopped promotion.
        #[source]
        source: Box<CoreError>,
    },

    /// The entity already has a version history.
    #[error("entity {entity} is already onboarded")]
    AlreadyOnboarded {
        /// The logical entity.
        entity: EntityKey,
    },

    /// The entity's proxy vertices do not exist.
    #[error("entity {entity} not found")]
    EntityNotFound {
        /// The logical entity.
        entity: EntityKey,
    },

    /// A stored document could not be mapped to a record.
    #[error("malformed document {collection}/{key}: {reason}")]
    MalformedDocument {
        /// Collection name.
        collection: String,
        /// Document key.
        key: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A name or identifier failed validation.
    #[error("invalid identifier {value:?}: {reason}")]
    InvalidIdentifier {
        /// The rejected value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Engine configuration could not be loaded.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the problem.
        message: String,
    },
}

/// How a concurrent change was detected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
    /// The caller expected one current version but another is current.
    StaleCurrent {
        /// The key the caller expected.
        expected: RecordKey,
        /// The key actually current.
        found: RecordKey,
    },
    /// Another transaction demoted the observed record first.
    LostRace {
        /// The record both transactions observed.
        observed: RecordKey,
    },
    /// The latest version was demoted and its successor is not yet written
    /// or not yet linked to the proxies.
    PromotionPending {
        /// The demoted record.
        demoted: RecordKey,
        /// The successor still being promoted.
        successor: RecordKey,
    },
    /// The first version exists but its edges are not written.
    OnboardingPending {
        /// The first version.
        first: RecordKey,
    },
    /// A deterministic key is already taken by a different document.
    KeyTaken {
        /// The contested key.
        key: RecordKey,
    },
    /// The demoted record no longer matches a resume token.
    ResumeMismatch {
        /// The demoted record named by the token.
        demoted: RecordKey,
    },
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleCurrent { expected, found } => {
                write!(f, "expected current {expected}, found {found}")
            }
            Self::LostRace { observed } => write!(f, "{observed} was demoted by another transition"),
            Self::PromotionPending { demoted, successor } => {
                write!(f, "{demoted} demoted, successor {successor} not yet promoted")
            }
            Self::OnboardingPending { first } => write!(f, "onboarding of {first} is incomplete"),
            Self::KeyTaken { key } => write!(f, "key {key} holds a different document"),
            Self::ResumeMismatch { demoted } => {
                write!(f, "{demoted} does not match the resume token")
            }
        }
    }
}

/// One entity with more than one version valid at the same instant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionConflict {
    /// The logical entity.
    pub entity: EntityKey,
    /// Keys of the overlapping versions.
    pub keys: Vec<RecordKey>,
}

impl fmt::Display for VersionConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.entity, join(&self.keys))
    }
}

fn join<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl CoreError {
    /// Creates an invalid temporal record error.
    pub fn invalid_record(key: &RecordKey, reason: impl Into<String>) -> Self {
        Self::InvalidTemporalRecord {
            key: key.clone(),
            reason: reason.into(),
        }
    }

    /// Creates a malformed document error.
    pub fn malformed(
        collection: impl Into<String>,
        key: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::MalformedDocument {
            collection: collection.into(),
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a concurrent modification error.
    pub fn concurrent(entity: &EntityKey, conflict: Conflict) -> Self {
        Self::ConcurrentModification {
            entity: entity.clone(),
            conflict,
        }
    }

    /// Creates an invalid identifier error.
    pub fn invalid_identifier(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the store reported a transient failure.
    ///
    /// Transient failures are retried in place by the engine.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Store(e) if e.is_transient())
    }

    /// Returns true if the caller may retry the whole operation.
    pub fn is_retryable(&self) -> bool {
        self.is_transient() || matches!(self, Self::ConcurrentModification { .. })
    }

    /// Returns the resume token of an interrupted transition.
    pub fn resume_token(&self) -> Option<&ResumeToken> {
        match self {
            Self::PartialTransition { token, .. } => Some(token),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_store::StoreError;

    #[test]
    fn retry_classification() {
        let transient = CoreError::from(StoreError::Unavailable("down".into()));
        assert!(transient.is_transient());
        assert!(transient.is_retryable());

        let race = CoreError::concurrent(
            &EntityKey::new("E1"),
            Conflict::LostRace {
                observed: RecordKey::new("E1@0"),
            },
        );
        assert!(!race.is_transient());
        assert!(race.is_retryable());

        let isolation = CoreError::TenantIsolationViolation {
            scope: "acme".into(),
            found: "globex".into(),
            context: "read".into(),
        };
        assert!(!isolation.is_retryable());
    }

    #[test]
    fn multiple_current_message_lists_keys() {
        let err = CoreError::MultipleCurrentVersions {
            entity: EntityKey::new("E1"),
            keys: vec![RecordKey::new("E1@0"), RecordKey::new("E1@10")],
        };
        assert_eq!(
            err.to_string(),
            "entity E1 has 2 current versions: E1@0, E1@10"
        );
    }
}
