//! Core identifier and time types.

use crate::error::{CoreError, CoreResult};
use chrono::{DateTime, SecondsFormat, Utc};
use lineage_store::PartitionKey;
use std::fmt;
use std::time::Duration;

/// A tenant, the unit of data isolation.
///
/// Maps one-to-one onto the store's partition key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TenantKey(String);

impl TenantKey {
    /// Creates a tenant key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the store partition holding this tenant's documents.
    pub fn as_partition(&self) -> PartitionKey {
        PartitionKey::new(self.0.clone())
    }
}

impl fmt::Display for TenantKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TenantKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TenantKey {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Stable identity of a logical entity across all of its versions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey(String);

impl EntityKey {
    /// Creates an entity key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Generates a random entity key.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Returns the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Key of one stored vertex or edge.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey(String);

impl RecordKey {
    /// Creates a record key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the raw key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Name of a versioned entity kind, such as `device` or `software`.
///
/// Kind names become collection names, so they are restricted to
/// `[a-z][a-z0-9_]*` and may not collide with the edge collection or the
/// proxy suffixes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKind(String);

impl EntityKind {
    /// Validates and creates a kind name.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` for names that cannot be used as
    /// collection names.
    pub fn new(name: impl Into<String>) -> CoreResult<Self> {
        let name = name.into();
        let mut chars = name.chars();
        let valid = chars.next().is_some_and(|c| c.is_ascii_lowercase())
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
        if !valid {
            return Err(CoreError::invalid_identifier(
                name,
                "kind names must match [a-z][a-z0-9_]*",
            ));
        }
        if name == crate::schema::VERSION_EDGES {
            return Err(CoreError::invalid_identifier(name, "reserved for edges"));
        }
        if name.ends_with("_in") || name.ends_with("_out") {
            return Err(CoreError::invalid_identifier(
                name,
                "suffix is reserved for proxy collections",
            ));
        }
        Ok(Self(name))
    }

    /// The `device` kind.
    #[must_use]
    pub fn device() -> Self {
        Self("device".to_string())
    }

    /// The `software` kind.
    #[must_use]
    pub fn software() -> Self {
        Self("software".to_string())
    }

    /// Returns the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point in time, in milliseconds since the Unix epoch.
///
/// Validity windows compare timestamps; wall-clock time is only read when a
/// caller asks for [`Timestamp::now`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    /// The epoch.
    pub const EPOCH: Self = Self(0);

    /// Creates a timestamp from epoch milliseconds.
    #[must_use]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns epoch milliseconds.
    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Reads the wall clock.
    #[must_use]
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Adds a duration, returning `None` on overflow.
    #[must_use]
    pub fn checked_add(self, duration: Duration) -> Option<Self> {
        let millis = i64::try_from(duration.as_millis()).ok()?;
        self.0.checked_add(millis).map(Self)
    }

    /// Parses an RFC 3339 string or a plain integer of epoch milliseconds.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` if neither form parses.
    pub fn parse(input: &str) -> CoreResult<Self> {
        if let Ok(millis) = input.parse::<i64>() {
            return Ok(Self(millis));
        }
        DateTime::parse_from_rfc3339(input)
            .map(|dt| Self(dt.timestamp_millis()))
            .map_err(|e| CoreError::invalid_identifier(input, e.to_string()))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match DateTime::<Utc>::from_timestamp_millis(self.0) {
            Some(dt) => f.write_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => write!(f, "{}ms", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_validation() {
        assert!(EntityKind::new("device").is_ok());
        assert!(EntityKind::new("network_zone2").is_ok());
        assert!(EntityKind::new("").is_err());
        assert!(EntityKind::new("Device").is_err());
        assert!(EntityKind::new("2fa").is_err());
        assert!(EntityKind::new("dev-ice").is_err());
        assert!(EntityKind::new("version").is_err());
        assert!(EntityKind::new("device_in").is_err());
        assert!(EntityKind::new("device_out").is_err());
    }

    #[test]
    fn generated_entity_keys_are_unique() {
        let a = EntityKey::generate();
        let b = EntityKey::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }

    #[test]
    fn timestamp_arithmetic() {
        let t = Timestamp::from_millis(10);
        assert_eq!(
            t.checked_add(Duration::from_millis(30)),
            Some(Timestamp::from_millis(40))
        );
        assert_eq!(
            Timestamp::from_millis(i64::MAX - 1).checked_add(Duration::from_millis(2)),
            None
        );
    }

    #[test]
    fn timestamp_display_and_parse() {
        let t = Timestamp::from_millis(1_700_000_000_123);
        let shown = t.to_string();
        assert_eq!(shown, "2023-11-14T22:13:20.123Z");
        assert_eq!(Timestamp::parse(&shown).unwrap(), t);
        assert_eq!(Timestamp::parse("42").unwrap(), Timestamp::from_millis(42));
        assert!(Timestamp::parse("yesterday").is_err());
    }

    #[test]
    fn tenant_maps_to_partition() {
        let tenant = TenantKey::new("acme");
        assert_eq!(tenant.as_partition().as_str(), "acme");
    }
}
