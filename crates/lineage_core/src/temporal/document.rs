//! Mapping between records and stored documents.
//!
//! This is the only place that knows the persisted field names and the
//! open-ended expiry sentinel. Everything above it works with [`Expiry`].

use crate::error::{CoreError, CoreResult};
use crate::temporal::edge::VersionEdge;
use crate::temporal::record::{CoreVersionRecord, Expiry};
use crate::temporal::vertex::{ProxyVertex, VertexKind, VertexRef, VertexRole};
use crate::types::{EntityKey, RecordKey, TenantKey, Timestamp};
use lineage_codec::Value;
use lineage_store::{Document, Filter};

/// Persisted field names.
pub mod fields {
    /// Logical entity key.
    pub const ENTITY: &str = "entity";
    /// Kind tag.
    pub const KIND: &str = "kind";
    /// Owning tenant.
    pub const TENANT: &str = "tenant";
    /// Attribute map of a core record.
    pub const ATTRIBUTES: &str = "attributes";
    /// Inclusive window start.
    pub const CREATED_AT: &str = "createdAt";
    /// Exclusive window end.
    pub const EXPIRES_AT: &str = "expiresAt";
    /// TTL removal deadline.
    pub const TTL_DEADLINE: &str = "ttlDeadline";
    /// Successor record key.
    pub const SUPERSEDED_BY: &str = "supersededBy";
    /// Edge source.
    pub const FROM: &str = "from";
    /// Edge target.
    pub const TO: &str = "to";
    /// Edge source kind tag.
    pub const FROM_KIND: &str = "fromKind";
    /// Edge target kind tag.
    pub const TO_KIND: &str = "toKind";
}

/// Stored `expiresAt` of an open-ended window.
///
/// Keeps "current" lookups on the `(entity, expiresAt)` index a plain
/// equality match.
pub const OPEN_ENDED: i64 = i64::MAX;

/// A record that maps onto a stored document.
///
/// The mapping must be deterministic: equal records produce equal bodies, so
/// idempotent retries can compare what they find with what they would write.
pub trait RecordDocument: Sized {
    /// Returns the document key.
    fn record_key(&self) -> &RecordKey;

    /// Returns the owning tenant.
    fn tenant(&self) -> &TenantKey;

    /// Returns the collection the record is stored in.
    fn collection(&self) -> String;

    /// Builds the document body.
    fn to_body(&self) -> Value;

    /// Reads a record back from a stored document.
    ///
    /// # Errors
    ///
    /// Returns `MalformedDocument` for missing or mistyped fields and
    /// `TenantIsolationViolation` if the body's tenant differs from the
    /// partition it was read from.
    fn from_document(collection: &str, document: &Document) -> CoreResult<Self>;
}

/// Encodes an expiry for storage.
pub fn encode_expiry(expiry: Expiry) -> Value {
    Value::Integer(expiry.at().map_or(OPEN_ENDED, Timestamp::as_millis))
}

/// Decodes a stored expiry.
pub fn decode_expiry(millis: i64) -> Expiry {
    if millis == OPEN_ENDED {
        Expiry::Never
    } else {
        Expiry::At(Timestamp::from_millis(millis))
    }
}

/// Filter selecting every version of an entity.
pub fn entity_filter(entity: &EntityKey) -> Filter {
    Filter::all().eq(fields::ENTITY, entity.as_str())
}

/// Filter selecting the current versions of an entity.
///
/// Served by the `(entity, expiresAt)` index.
pub fn current_filter(entity: &EntityKey) -> Filter {
    entity_filter(entity).eq(fields::EXPIRES_AT, OPEN_ENDED)
}

/// Filter selecting edges between two kind tags.
///
/// Served by the `(fromKind, toKind)` index.
pub fn edge_filter(from: &VertexKind, to: &VertexKind) -> Filter {
    Filter::all()
        .eq(fields::FROM_KIND, from.tag())
        .eq(fields::TO_KIND, to.tag())
}

struct Fields<'a> {
    collection: &'a str,
    document: &'a Document,
}

impl<'a> Fields<'a> {
    fn new(collection: &'a str, document: &'a Document) -> CoreResult<Self> {
        let this = Self {
            collection,
            document,
        };
        let tenant = this.text(fields::TENANT)?;
        if tenant != document.partition.as_str() {
            return Err(CoreError::TenantIsolationViolation {
                scope: document.partition.to_string(),
                found: tenant.to_string(),
                context: format!("decode {}/{}", collection, document.key),
            });
        }
        Ok(this)
    }

    fn malformed(&self, reason: String) -> CoreError {
        CoreError::malformed(self.collection, &self.document.key, reason)
    }

    fn value(&self, name: &str) -> CoreResult<&'a Value> {
        self.document
            .field(name)
            .ok_or_else(|| self.malformed(format!("missing field {name}")))
    }

    fn text(&self, name: &str) -> CoreResult<&'a str> {
        self.value(name)?
            .as_text()
            .ok_or_else(|| self.malformed(format!("field {name} is not text")))
    }

    fn integer(&self, name: &str) -> CoreResult<i64> {
        self.value(name)?
            .as_integer()
            .ok_or_else(|| self.malformed(format!("field {name} is not an integer")))
    }

    fn optional_integer(&self, name: &str) -> CoreResult<Option<i64>> {
        match self.document.field(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.integer(name).map(Some),
        }
    }

    fn optional_text(&self, name: &str) -> CoreResult<Option<&'a str>> {
        match self.document.field(name) {
            None | Some(Value::Null) => Ok(None),
            Some(_) => self.text(name).map(Some),
        }
    }

    fn tenant(&self) -> TenantKey {
        TenantKey::new(self.document.partition.as_str())
    }

    fn vertex_kind(&self, name: &str, role: VertexRole) -> CoreResult<VertexKind> {
        let tag = self.text(name)?;
        let kind = VertexKind::parse(tag).map_err(|e| self.malformed(e.to_string()))?;
        if kind.role != role {
            return Err(self.malformed(format!("field {name} has role {tag}")));
        }
        Ok(kind)
    }

    fn vertex_ref(&self, name: &str) -> CoreResult<VertexRef> {
        VertexRef::parse(self.text(name)?).map_err(|e| self.malformed(e.to_string()))
    }
}

impl RecordDocument for CoreVersionRecord {
    fn record_key(&self) -> &RecordKey {
        &self.key
    }

    fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    fn collection(&self) -> String {
        VertexKind::new(self.kind.clone(), VertexRole::Core).collection()
    }

    fn to_body(&self) -> Value {
        let mut body = Value::record([
            (fields::ENTITY, Value::from(self.entity.as_str())),
            (fields::KIND, Value::from(self.kind.as_str())),
            (fields::TENANT, Value::from(self.tenant.as_str())),
            (fields::ATTRIBUTES, self.attributes.clone()),
            (fields::CREATED_AT, Value::Integer(self.created_at.as_millis())),
            (fields::EXPIRES_AT, encode_expiry(self.expires_at)),
        ]);
        if let Some(deadline) = self.ttl_deadline {
            body.set(fields::TTL_DEADLINE, deadline.as_millis());
        }
        if let Some(successor) = &self.superseded_by {
            body.set(fields::SUPERSEDED_BY, successor.as_str());
        }
        body
    }

    fn from_document(collection: &str, document: &Document) -> CoreResult<Self> {
        let f = Fields::new(collection, document)?;
        let kind = f.vertex_kind(fields::KIND, VertexRole::Core)?;
        Ok(Self {
            key: RecordKey::new(document.key.as_str()),
            entity: EntityKey::new(f.text(fields::ENTITY)?),
            kind: kind.kind,
            tenant: f.tenant(),
            attributes: f.value(fields::ATTRIBUTES)?.clone(),
            created_at: Timestamp::from_millis(f.integer(fields::CREATED_AT)?),
            expires_at: decode_expiry(f.integer(fields::EXPIRES_AT)?),
            ttl_deadline: f
                .optional_integer(fields::TTL_DEADLINE)?
                .map(Timestamp::from_millis),
            superseded_by: f.optional_text(fields::SUPERSEDED_BY)?.map(RecordKey::new),
        })
    }
}

impl RecordDocument for ProxyVertex {
    fn record_key(&self) -> &RecordKey {
        &self.key
    }

    fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    fn collection(&self) -> String {
        self.vertex_kind().collection()
    }

    fn to_body(&self) -> Value {
        Value::record([
            (fields::ENTITY, self.entity.as_str().to_string()),
            (fields::KIND, self.vertex_kind().tag()),
            (fields::TENANT, self.tenant.as_str().to_string()),
        ])
    }

    fn from_document(collection: &str, document: &Document) -> CoreResult<Self> {
        let f = Fields::new(collection, document)?;
        let tag = VertexKind::parse(f.text(fields::KIND)?).map_err(|e| f.malformed(e.to_string()))?;
        if tag.role == VertexRole::Core {
            return Err(f.malformed("proxy document tagged as core".to_string()));
        }
        Ok(Self {
            key: RecordKey::new(document.key.as_str()),
            entity: EntityKey::new(f.text(fields::ENTITY)?),
            kind: tag.kind,
            tenant: f.tenant(),
            role: tag.role,
        })
    }
}

impl RecordDocument for VersionEdge {
    fn record_key(&self) -> &RecordKey {
        &self.key
    }

    fn tenant(&self) -> &TenantKey {
        &self.tenant
    }

    fn collection(&self) -> String {
        crate::schema::VERSION_EDGES.to_string()
    }

    fn to_body(&self) -> Value {
        Value::record([
            (fields::ENTITY, Value::from(self.entity.as_str())),
            (fields::TENANT, Value::from(self.tenant.as_str())),
            (fields::FROM, Value::from(self.from.to_string())),
            (fields::TO, Value::from(self.to.to_string())),
            (fields::FROM_KIND, Value::from(self.from_kind.tag())),
            (fields::TO_KIND, Value::from(self.to_kind.tag())),
            (fields::CREATED_AT, Value::Integer(self.created_at.as_millis())),
            (fields::EXPIRES_AT, encode_expiry(Expiry::Never)),
        ])
    }

    fn from_document(collection: &str, document: &Document) -> CoreResult<Self> {
        let f = Fields::new(collection, document)?;
        let parse = |name: &str| {
            f.text(name)
                .and_then(|tag| VertexKind::parse(tag).map_err(|e| f.malformed(e.to_string())))
        };
        Ok(Self {
            key: RecordKey::new(document.key.as_str()),
            tenant: f.tenant(),
            entity: EntityKey::new(f.text(fields::ENTITY)?),
            from: f.vertex_ref(fields::FROM)?,
            to: f.vertex_ref(fields::TO)?,
            from_kind: parse(fields::FROM_KIND)?,
            to_kind: parse(fields::TO_KIND)?,
            created_at: Timestamp::from_millis(f.integer(fields::CREATED_AT)?),
        })
    }
}
