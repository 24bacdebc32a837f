//! Engine configuration.
//!
//! All durations serialize as integer milliseconds so configurations can be
//! written by hand:
//!
//! ```json
//! {
//!   "default_retention_ms": 2592000000,
//!   "tenants": { "acme": { "retention_ms": 86400000 } },
//!   "retry": { "max_attempts": 5, "initial_delay_ms": 10, "max_delay_ms": 500, "backoff_multiplier": 2 }
//! }
//! ```

use crate::error::{CoreError, CoreResult};
use crate::types::TenantKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Configuration for a lifecycle engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retention applied to demoted versions of tenants without a policy.
    #[serde(rename = "default_retention_ms", with = "millis")]
    pub default_retention: Duration,
    /// Per-tenant overrides, keyed by tenant key.
    pub tenants: BTreeMap<String, TenantPolicy>,
    /// Retry behavior for the promote and rewire steps.
    pub retry: RetryPolicy,
}

impl EngineConfig {
    /// Default retention for demoted versions: 30 days.
    pub const DEFAULT_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default retention.
    #[must_use]
    pub fn with_default_retention(mut self, retention: Duration) -> Self {
        self.default_retention = retention;
        self
    }

    /// Sets a tenant's policy.
    #[must_use]
    pub fn with_tenant_policy(mut self, tenant: &TenantKey, policy: TenantPolicy) -> Self {
        self.tenants.insert(tenant.as_str().to_string(), policy);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Returns the retention to apply when demoting a tenant's versions.
    pub fn retention_for(&self, tenant: &TenantKey) -> Duration {
        self.tenants
            .get(tenant.as_str())
            .map_or(self.default_retention, |p| p.retention)
    }

    /// Parses a JSON configuration. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `Config` if the document is not valid JSON or has fields of
    /// the wrong type.
    pub fn from_json(json: &str) -> CoreResult<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::Config {
            message: e.to_string(),
        })
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_retention: Self::DEFAULT_RETENTION,
            tenants: BTreeMap::new(),
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-tenant policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantPolicy {
    /// How long demoted versions stay queryable before TTL removal.
    #[serde(rename = "retention_ms", with = "millis")]
    pub retention: Duration,
}

impl TenantPolicy {
    /// Creates a policy with the given retention.
    #[must_use]
    pub const fn new(retention: Duration) -> Self {
        Self { retention }
    }
}

/// Retry behavior for promote and rewire after a successful demotion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    #[serde(rename = "initial_delay_ms", with = "millis")]
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    #[serde(rename = "max_delay_ms", with = "millis")]
    pub max_delay: Duration,
    /// Factor applied to the delay after each attempt.
    pub backoff_multiplier: u32,
}

impl RetryPolicy {
    /// Creates a policy with the given number of attempts.
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub const fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Returns the delay before `attempt` (1-indexed; the first attempt
    /// never waits).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = self
            .backoff_multiplier
            .max(1)
            .saturating_pow(attempt.saturating_sub(2));
        self.initial_delay
            .saturating_mul(factor)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        serializer.serialize_u64(millis)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
