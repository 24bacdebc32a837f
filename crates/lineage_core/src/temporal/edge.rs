//! Version edges linking proxies to core records.

use crate::error::{CoreError, CoreResult};
use crate::temporal::record::CoreVersionRecord;
use crate::temporal::vertex::{ProxyVertex, VertexKind, VertexRef, VertexRole};
use crate::types::{EntityKey, RecordKey, TenantKey, Timestamp};

/// A directed edge `ProxyIn → Core` or `Core → ProxyOut`.
///
/// Edges are written once and never mutated. An edge is live exactly while
/// its core record is valid; the stored `expiresAt` stays open-ended and
/// readers resolve the window through the core endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEdge {
    /// Edge key, derived from the core record key and direction.
    pub key: RecordKey,
    /// Owning tenant; equal to both endpoints' tenant.
    pub tenant: TenantKey,
    /// The logical entity.
    pub entity: EntityKey,
    /// Source vertex.
    pub from: VertexRef,
    /// Target vertex.
    pub to: VertexRef,
    /// Source kind tag.
    pub from_kind: VertexKind,
    /// Target kind tag.
    pub to_kind: VertexKind,
    /// Creation instant; equal to the core record's `created_at`.
    pub created_at: Timestamp,
}

impl VersionEdge {
    /// Links an inbound proxy to a core record.
    ///
    /// # Errors
    ///
    /// Returns `TenantIsolationViolation` if the endpoints belong to
    /// different tenants and `InvalidIdentifier` if they do not describe the
    /// same entity in the expected roles.
    pub fn inbound(proxy: &ProxyVertex, core: &CoreVersionRecord) -> CoreResult<Self> {
        check_endpoints(proxy, core, VertexRole::ProxyIn)?;
        let core_kind = VertexKind::new(core.kind.clone(), VertexRole::Core);
        let core_ref = VertexRef::new(core_kind.collection(), core.key.clone());
        Ok(Self {
            key: edge_key(&core_ref, VertexRole::ProxyIn),
            tenant: core.tenant.clone(),
            entity: core.entity.clone(),
            from: proxy.vertex_ref(),
            to: core_ref,
            from_kind: proxy.vertex_kind(),
            to_kind: core_kind,
            created_at: core.created_at,
        })
    }

    /// Links a core record to an outbound proxy.
    ///
    /// # Errors
    ///
    /// Same as [`VersionEdge::inbound`].
    pub fn outbound(core: &CoreVersionRecord, proxy: &ProxyVertex) -> CoreResult<Self> {
        check_endpoints(proxy, core, VertexRole::ProxyOut)?;
        let core_kind = VertexKind::new(core.kind.clone(), VertexRole::Core);
        let core_ref = VertexRef::new(core_kind.collection(), core.key.clone());
        Ok(Self {
            key: edge_key(&core_ref, VertexRole::ProxyOut),
            tenant: core.tenant.clone(),
            entity: core.entity.clone(),
            from: core_ref,
            to: proxy.vertex_ref(),
            from_kind: core_kind,
            to_kind: proxy.vertex_kind(),
            created_at: core.created_at,
        })
    }

    /// Returns the core endpoint.
    pub fn core_ref(&self) -> &VertexRef {
        if self.to_kind.role == VertexRole::Core {
            &self.to
        } else {
            &self.from
        }
    }
}

/// Derives the key of the edge joining a core record to one of its proxies.
///
/// The key carries the core collection, so kinds sharing the edge
/// collection never collide: `device/E1@0:in`.
pub fn edge_key(core: &VertexRef, proxy_role: VertexRole) -> RecordKey {
    let suffix = match proxy_role {
        VertexRole::ProxyOut => "out",
        VertexRole::ProxyIn | VertexRole::Core => "in",
    };
    RecordKey::new(format!("{core}:{suffix}"))
}

fn check_endpoints(
    proxy: &ProxyVertex,
    core: &CoreVersionRecord,
    role: VertexRole,
) -> CoreResult<()> {
    if proxy.tenant != core.tenant {
        return Err(CoreError::TenantIsolationViolation {
            scope: core.tenant.to_string(),
            found: proxy.tenant.to_string(),
            context: format!("edge {} -> {}", proxy.key, core.key),
        });
    }
    if proxy.role != role {
        return Err(CoreError::invalid_identifier(
            proxy.vertex_kind().tag(),
            "proxy has the wrong role for this edge",
        ));
    }
    if proxy.entity != core.entity || proxy.kind != core.kind {
        return Err(CoreError::invalid_identifier(
            core.key.as_str(),
            format!("core record does not version entity {}", proxy.entity),
        ));
    }
    Ok(())
}
