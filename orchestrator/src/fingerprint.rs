use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Probe results keyed by public field name. `null` marks a probe that
/// failed, timed out or was skipped.
pub type Components = BTreeMap<String, Value>;

/// Aggregated, hashed result of one collection cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeFingerprint {
    components: Components,
    hash: String,
    timestamp_millis: i64,
    cached: bool,
    cache_key: Option<String>,
}

impl CompositeFingerprint {
    pub(crate) fn fresh(components: Components, hash: String, timestamp_millis: i64, cache_key: Option<String>) -> Self {
        Self {
            components,
            hash,
            timestamp_millis,
            cached: false,
            cache_key,
        }
    }

    pub(crate) fn from_cache(cached: CachedFingerprint, cache_key: String) -> Self {
        Self {
            components: cached.components,
            hash: cached.hash,
            timestamp_millis: cached.timestamp,
            cached: true,
            cache_key: Some(cache_key),
        }
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn component(&self, name: &str) -> Option<&Value> {
        self.components.get(name)
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn timestamp_millis(&self) -> i64 {
        self.timestamp_millis
    }

    pub fn is_cached(&self) -> bool {
        self.cached
    }

    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }
}

/// Payload stored in the result cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedFingerprint {
    pub components: Components,
    pub hash: String,
    pub timestamp: i64,
    /// Crate version that produced the entry.
    pub version: String,
}

impl CachedFingerprint {
    pub fn new(components: Components, hash: impl ToString, timestamp: i64) -> Self {
        Self {
            components,
            hash: hash.to_string(),
            timestamp,
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
