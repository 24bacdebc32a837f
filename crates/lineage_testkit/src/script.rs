//! JSON scripts of lifecycle steps.
//!
//! A script is a list of onboardings and configuration changes, applied in
//! order:
//!
//! ```json
//! [
//!   {"op": "onboard", "tenant": "acme", "entity": "E1", "attributes": {"config": "A"}, "at": 0},
//!   {"op": "change", "tenant": "acme", "entity": "E1", "attributes": {"config": "B"}, "at": 10}
//! ]
//! ```

use lineage_codec::Value;
use lineage_core::{
    ChangeRequest, CoreError, CoreResult, EntityKey, EntityKind, Lineage, Onboarding, TenantScope,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;

fn default_kind() -> String {
    "device".to_string()
}

/// One scripted step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Onboard an entity.
    Onboard {
        /// Tenant key.
        tenant: String,
        /// Entity kind; defaults to `device`.
        #[serde(default = "default_kind")]
        kind: String,
        /// Entity key.
        entity: String,
        /// Attribute map.
        attributes: serde_json::Value,
        /// Instant in milliseconds.
        at: i64,
    },
    /// Change an entity's configuration.
    Change {
        /// Tenant key.
        tenant: String,
        /// Entity kind; defaults to `device`.
        #[serde(default = "default_kind")]
        kind: String,
        /// Entity key.
        entity: String,
        /// Attribute map.
        attributes: serde_json::Value,
        /// Instant in milliseconds.
        at: i64,
        /// Retention override in milliseconds.
        #[serde(default)]
        retention_ms: Option<u64>,
    },
}

/// An ordered list of steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Script {
    /// The steps, applied in order.
    pub steps: Vec<Step>,
}

impl Script {
    /// Parses a script from JSON.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the JSON is not a valid script.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::Config {
            message: format!("invalid script: {e}"),
        })
    }

    /// Applies every step, stopping at the first failure.
    ///
    /// # Errors
    ///
    /// Returns the first step's error.
    pub fn apply(&self, lineage: &Lineage) -> CoreResult<usize> {
        for step in &self.steps {
            match step {
                Step::Onboard {
                    tenant,
                    kind,
                    entity,
                    attributes,
                    at,
                } => {
                    lineage.onboard(
                        &TenantScope::new(tenant.as_str()),
                        Onboarding::new(
                            EntityKind::new(kind.as_str())?,
                            EntityKey::new(entity.as_str()),
                            json_to_value(attributes)?,
                            Timestamp::from_millis(*at),
                        ),
                    )?;
                }
                Step::Change {
                    tenant,
                    kind,
                    entity,
                    attributes,
                    at,
                    retention_ms,
                } => {
                    let mut request = ChangeRequest::new(
                        EntityKind::new(kind.as_str())?,
                        EntityKey::new(entity.as_str()),
                        json_to_value(attributes)?,
                        Timestamp::from_millis(*at),
                    );
                    if let Some(ms) = retention_ms {
                        request = request.with_retention(Duration::from_millis(*ms));
                    }
                    lineage.change_configuration(&TenantScope::new(tenant.as_str()), request)?;
                }
            }
        }
        Ok(self.steps.len())
    }
}

/// Converts JSON to an attribute value.
///
/// # Errors
///
/// Returns `Config` for numbers that are not 64-bit integers.
pub fn json_to_value(json: &serde_json::Value) -> CoreResult<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Integer(n.as_i64().ok_or_else(|| {
            CoreError::Config {
                message: format!("attribute number {n} is not an integer"),
            }
        })?),
        serde_json::Value::String(s) => Value::Text(s.clone()),
        serde_json::Value::Array(items) => Value::Array(
            items
                .iter()
                .map(json_to_value)
                .collect::<CoreResult<Vec<_>>>()?,
        ),
        serde_json::Value::Object(fields) => Value::record(
            fields
                .iter()
                .map(|(k, v)| Ok((k.clone(), json_to_value(v)?)))
                .collect::<CoreResult<Vec<(String, Value)>>>()?,
        ),
    })
}
