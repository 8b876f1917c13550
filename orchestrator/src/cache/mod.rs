//! Two-tier cache of composite fingerprints.
//!
//! The memory tier is always present. The durable tier is opened on first use
//! and only when `cache.storage` asks for it; if opening fails the cache stays
//! memory-only for the rest of its life. Policy values (`cache.ttl`,
//! `cache.maxSize`, `cache.storage`) are read from the configuration on every
//! operation.

mod durable;
mod memory;

use crate::{
    fingerprint::CachedFingerprint,
    hashing::{
        canonical_json,
        FingerprintHasher,
    },
};
pub use durable::{
    DurableTier,
    FileTier,
};
use envprint_config::ConfigStore;
use eyre::Result;
use memory::MemoryTier;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use std::{
    path::PathBuf,
    sync::{
        Arc,
        Mutex,
        PoisonError,
    },
};
use strum::{
    Display,
    EnumIter,
    EnumString,
};

pub const DEFAULT_TTL_MS: u64 = 3_600_000;
pub const DEFAULT_MAX_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub key: String,
    pub payload: CachedFingerprint,
    pub inserted_at_millis: i64,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: i64, ttl_ms: u64) -> bool {
        now.saturating_sub(self.inserted_at_millis) < i64::try_from(ttl_ms).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Default, Clone, Copy, Display, EnumIter, EnumString, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum StorageMode {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CachePolicy {
    pub enabled: bool,
    pub ttl_ms: u64,
    pub max_size: usize,
    pub storage: StorageMode,
}

impl CachePolicy {
    pub fn from_config(config: &ConfigStore) -> Self {
        let storage_name = config.get("cache.storage", StorageMode::Memory.to_string());
        let storage = storage_name.parse().unwrap_or_else(|_| {
            warn!(storage = %storage_name, "unsupported cache storage mode, using memory only");
            StorageMode::Memory
        });
        Self {
            enabled: config.get("cache.enabled", true),
            ttl_ms: config.get("cache.ttl", DEFAULT_TTL_MS),
            max_size: config.get("cache.maxSize", DEFAULT_MAX_SIZE),
            storage,
        }
    }
}

/// Read-only diagnostic view.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub memory_entries: usize,
    pub durable_ready: bool,
    pub policy: CachePolicy,
}

#[derive(Debug)]
enum DurableState {
    Pending,
    Ready(Arc<dyn DurableTier>),
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct ResultCache {
    config: ConfigStore,
    hasher: Arc<dyn FingerprintHasher>,
    data_dir: PathBuf,
    memory: Arc<Mutex<MemoryTier>>,
    durable: Arc<Mutex<DurableState>>,
}

impl ResultCache {
    /// `data_dir` is where the file tier lives if `cache.storage` is `file`.
    pub fn new(config: ConfigStore, hasher: Arc<dyn FingerprintHasher>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            config,
            hasher,
            data_dir: data_dir.into(),
            memory: Default::default(),
            durable: Arc::new(Mutex::new(DurableState::Pending)),
        }
    }

    /// Uses `tier` as the durable tier whenever `cache.storage` is not
    /// `memory`.
    pub fn with_durable_tier(
        config: ConfigStore,
        hasher: Arc<dyn FingerprintHasher>,
        tier: Arc<dyn DurableTier>,
    ) -> Self {
        let cache = Self::new(config, hasher, PathBuf::new());
        *cache.durable.lock().unwrap_or_else(PoisonError::into_inner) = DurableState::Ready(tier);
        cache
    }

    pub fn policy(&self) -> CachePolicy {
        CachePolicy::from_config(&self.config)
    }

    /// Canonical serialization of `stable_components` run through the hasher.
    pub fn generate_cache_key(&self, stable_components: &Value) -> Result<String> {
        self.hasher.hash(&canonical_json(stable_components)?)
    }

    pub fn get(&self, key: &str) -> Option<CachedFingerprint> {
        let policy = self.policy();
        let now = now_millis();

        if let Some(entry) = self.memory().get_fresh(key, now, policy.ttl_ms) {
            trace!(key, "memory cache hit");
            return Some(entry.payload.clone());
        }

        let tier = self.durable_tier(&policy)?;
        match tier.get(key) {
            Ok(Some(entry)) if entry.is_fresh(now, policy.ttl_ms) => {
                debug!(key, "durable cache hit, promoting to memory");
                let payload = entry.payload.clone();
                self.memory().insert(entry, policy.max_size);
                Some(payload)
            }
            Ok(Some(_)) => {
                debug!(key, "durable cache entry expired");
                if let Err(err) = tier.delete(key) {
                    warn!(key, "failed to delete expired durable cache entry: {err}");
                }
                None
            }
            Ok(None) => None,
            Err(err) => {
                warn!(key, "durable cache read failed: {err}");
                None
            }
        }
    }

    pub fn set(&self, key: &str, payload: CachedFingerprint) {
        let policy = self.policy();
        let entry = CacheEntry {
            key: key.to_string(),
            payload,
            inserted_at_millis: now_millis(),
        };

        let evicted = self.memory().insert(entry.clone(), policy.max_size);
        if !evicted.is_empty() {
            debug!(?evicted, "evicted oldest cache entries");
        }

        if let Some(tier) = self.durable_tier(&policy) {
            prune_durable(tier.as_ref(), entry.inserted_at_millis, policy.ttl_ms);
            if let Err(err) = tier.put(&entry) {
                warn!(key, "durable cache write failed: {err}");
            }
        }
    }

    pub fn delete(&self, key: &str) {
        self.memory().remove(key);
        if let Some(tier) = self.durable_tier(&self.policy()) {
            if let Err(err) = tier.delete(key) {
                warn!(key, "durable cache delete failed: {err}");
            }
        }
    }

    pub fn clear(&self) {
        self.memory().clear();
        if let Some(tier) = self.durable_tier(&self.policy()) {
            if let Err(err) = tier.clear() {
                warn!("durable cache clear failed: {err}");
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        let durable_ready = matches!(
            *self.durable.lock().unwrap_or_else(PoisonError::into_inner),
            DurableState::Ready(_)
        );
        CacheStats {
            memory_entries: self.memory().len(),
            durable_ready,
            policy: self.policy(),
        }
    }

    /// Memory-tier keys in insertion order.
    pub fn memory_keys(&self) -> Vec<String> {
        self.memory().keys()
    }

    fn memory(&self) -> std::sync::MutexGuard<'_, MemoryTier> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn durable_tier(&self, policy: &CachePolicy) -> Option<Arc<dyn DurableTier>> {
        if policy.storage == StorageMode::Memory {
            return None;
        }

        let mut state = self.durable.lock().unwrap_or_else(PoisonError::into_inner);
        if let DurableState::Pending = *state {
            *state = match open_durable_tier(policy.storage, &self.data_dir) {
                Ok(tier) => {
                    info!(storage = %policy.storage, "durable cache tier ready");
                    prune_durable(tier.as_ref(), now_millis(), policy.ttl_ms);
                    DurableState::Ready(tier)
                }
                Err(err) => {
                    warn!(storage = %policy.storage, "durable cache tier unavailable, using memory only: {err}");
                    DurableState::Unavailable
                }
            };
        }

        match &*state {
            DurableState::Ready(tier) => Some(tier.clone()),
            _ => None,
        }
    }
}

fn open_durable_tier(storage: StorageMode, data_dir: &std::path::Path) -> Result<Arc<dyn DurableTier>> {
    match storage {
        StorageMode::File => Ok(Arc::new(FileTier::open(data_dir)?)),
        StorageMode::Memory => Err(eyre::eyre!("memory storage has no durable tier")),
    }
}

fn prune_durable(tier: &dyn DurableTier, now: i64, ttl_ms: u64) {
    match tier.prune(now, ttl_ms) {
        Ok(0) => {}
        Ok(removed) => debug!(removed, "pruned expired durable cache entries"),
        Err(err) => warn!("durable cache prune failed: {err}"),
    }
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
