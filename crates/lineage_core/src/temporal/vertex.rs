//! Proxy vertices and vertex addressing.

use crate::error::{CoreError, CoreResult};
use crate::types::{EntityKey, EntityKind, RecordKey, TenantKey};
use std::fmt;

/// The three vertex roles of a versioned entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VertexRole {
    /// Stable inbound anchor.
    ProxyIn,
    /// A versioned core record.
    Core,
    /// Stable outbound anchor.
    ProxyOut,
}

/// A kind tag: entity kind plus vertex role.
///
/// Edges carry these as `fromKind`/`toKind` so the edge collection can be
/// filtered by role without reading endpoints. Tags render as `device.in`,
/// `device` and `device.out`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexKind {
    /// Entity kind.
    pub kind: EntityKind,
    /// Vertex role.
    pub role: VertexRole,
}

impl VertexKind {
    /// Creates a kind tag.
    pub fn new(kind: EntityKind, role: VertexRole) -> Self {
        Self { kind, role }
    }

    /// Returns the tag string.
    pub fn tag(&self) -> String {
        match self.role {
            VertexRole::ProxyIn => format!("{}.in", self.kind),
            VertexRole::Core => self.kind.to_string(),
            VertexRole::ProxyOut => format!("{}.out", self.kind),
        }
    }

    /// Parses a tag string.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` for unknown suffixes or invalid kinds.
    pub fn parse(tag: &str) -> CoreResult<Self> {
        let (name, role) = match tag.split_once('.') {
            None => (tag, VertexRole::Core),
            Some((name, "in")) => (name, VertexRole::ProxyIn),
            Some((name, "out")) => (name, VertexRole::ProxyOut),
            Some(_) => return Err(CoreError::invalid_identifier(tag, "unknown vertex role")),
        };
        Ok(Self::new(EntityKind::new(name)?, role))
    }

    /// Returns the collection holding vertices of this kind.
    pub fn collection(&self) -> String {
        crate::schema::collection_for(&self.kind, self.role)
    }
}

impl fmt::Display for VertexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.tag())
    }
}

/// Address of a vertex: collection plus key, rendered `collection/key`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VertexRef {
    /// Collection name.
    pub collection: String,
    /// Record key.
    pub key: RecordKey,
}

impl VertexRef {
    /// Creates a reference.
    pub fn new(collection: impl Into<String>, key: RecordKey) -> Self {
        Self {
            collection: collection.into(),
            key,
        }
    }

    /// Parses `collection/key`. Keys may themselves contain `/`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidIdentifier` if there is no separator.
    pub fn parse(s: &str) -> CoreResult<Self> {
        match s.split_once('/') {
            Some((collection, key)) if !collection.is_empty() && !key.is_empty() => {
                Ok(Self::new(collection, RecordKey::new(key)))
            }
            _ => Err(CoreError::invalid_identifier(s, "expected collection/key")),
        }
    }
}

impl fmt::Display for VertexRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.key)
    }
}

/// Stable anchor of an entity. Never versioned, never expires.
///
/// Relationship edges from other entities attach here, so the structural
/// graph survives every configuration change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyVertex {
    /// Record key; equal to the entity key.
    pub key: RecordKey,
    /// The logical entity.
    pub entity: EntityKey,
    /// Entity kind.
    pub kind: EntityKind,
    /// Owning tenant.
    pub tenant: TenantKey,
    /// Either [`VertexRole::ProxyIn`] or [`VertexRole::ProxyOut`].
    pub role: VertexRole,
}

impl ProxyVertex {
    /// Creates the inbound proxy of an entity.
    pub fn inbound(entity: &EntityKey, kind: &EntityKind, tenant: &TenantKey) -> Self {
        Self::with_role(entity, kind, tenant, VertexRole::ProxyIn)
    }

    /// Creates the outbound proxy of an entity.
    pub fn outbound(entity: &EntityKey, kind: &EntityKind, tenant: &TenantKey) -> Self {
        Self::with_role(entity, kind, tenant, VertexRole::ProxyOut)
    }

    fn with_role(
        entity: &EntityKey,
        kind: &EntityKind,
        tenant: &TenantKey,
        role: VertexRole,
    ) -> Self {
        Self {
            key: RecordKey::new(entity.as_str()),
            entity: entity.clone(),
            kind: kind.clone(),
            tenant: tenant.clone(),
            role,
        }
    }

    /// Returns the vertex's kind tag.
    pub fn vertex_kind(&self) -> VertexKind {
        VertexKind::new(self.kind.clone(), self.role)
    }

    /// Returns the vertex's address.
    pub fn vertex_ref(&self) -> VertexRef {
        VertexRef::new(self.vertex_kind().collection(), self.key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags() {
        let device = EntityKind::device();
        let tags: Vec<String> = [VertexRole::ProxyIn, VertexRole::Core, VertexRole::ProxyOut]
            .into_iter()
            .map(|role| VertexKind::new(device.clone(), role).tag())
            .collect();
        assert_eq!(tags, ["device.in", "device", "device.out"]);

        for tag in &tags {
            assert_eq!(&VertexKind::parse(tag).unwrap().tag(), tag);
        }
        assert!(VertexKind::parse("device.sideways").is_err());
    }

    #[test]
    fn collections_follow_roles() {
        let software = EntityKind::software();
        assert_eq!(
            VertexKind::new(software.clone(), VertexRole::ProxyIn).collection(),
            "software_in"
        );
        assert_eq!(
            VertexKind::new(software.clone(), VertexRole::Core).collection(),
            "software"
        );
        assert_eq!(
            VertexKind::new(software, VertexRole::ProxyOut).collection(),
            "software_out"
        );
    }

    #[test]
    fn refs() {
        let r = VertexRef::parse("device/E1@10").unwrap();
        assert_eq!(r.collection, "device");
        assert_eq!(r.key.as_str(), "E1@10");
        assert_eq!(r.to_string(), "device/E1@10");

        let nested = VertexRef::parse("device/a/b").unwrap();
        assert_eq!(nested.key.as_str(), "a/b");

        assert!(VertexRef::parse("device").is_err());
        assert!(VertexRef::parse("/E1").is_err());
    }

    #[test]
    fn proxy_key_is_entity_key() {
        let p = ProxyVertex::inbound(
            &EntityKey::new("E1"),
            &EntityKind::device(),
            &TenantKey::new("acme"),
        );
        assert_eq!(p.key.as_str(), "E1");
        assert_eq!(p.vertex_ref().to_string(), "device_in/E1");
    }
}
