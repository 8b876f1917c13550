//! Hierarchical settings tree shared by the registry, the cache and the
//! collection orchestrator.
//!
//! The tree is a `serde_json::Value` built from the embedded defaults with
//! caller overrides merged on top. Paths are dot-delimited
//! (`cache.maxSize`, `features.hostname`). No schema is enforced: unknown keys
//! are kept and can be read back like any other.

use serde::de::DeserializeOwned;
use serde_json::{
    Map,
    Value,
};
use std::{
    sync::{
        Arc,
        PoisonError,
        RwLock,
    },
    time::Duration,
};

const DEFAULT_CONFIG: &str = include_str!("default-config.yaml");

fn default_tree() -> Value {
    serde_yml::from_str(DEFAULT_CONFIG).expect("Failed to parse default config")
}

/// Shared handle to the settings tree. Clones point at the same tree.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    tree: Arc<RwLock<Value>>,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self {
            tree: Arc::new(RwLock::new(default_tree())),
        }
    }
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_overrides(overrides: &Value) -> Self {
        let store = Self::default();
        store.init(overrides);
        store
    }

    /// Replaces the whole tree with the defaults merged with `overrides`.
    /// Earlier `init` or `update` calls are discarded.
    pub fn init(&self, overrides: &Value) {
        let mut tree = default_tree();
        merge(&mut tree, overrides);
        *self.tree.write().unwrap_or_else(PoisonError::into_inner) = tree;
        debug!("configuration re-initialized");
    }

    /// Resolves `path` to a raw value. `None` as soon as a segment is missing
    /// or the walk hits a non-mapping value before the path is exhausted.
    pub fn get_value(&self, path: &str) -> Option<Value> {
        let tree = self.tree.read().unwrap_or_else(PoisonError::into_inner);
        let mut current = &*tree;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current.clone())
    }

    /// Resolves `path` and converts it to `T`, falling back to `default` when
    /// the path does not resolve or the value has a different shape.
    pub fn get<T: DeserializeOwned>(&self, path: &str, default: T) -> T {
        match self.get_value(path) {
            Some(value) => serde_json::from_value(value).unwrap_or_else(|err| {
                debug!(path, "config value has unexpected shape, using default: {err}");
                default
            }),
            None => default,
        }
    }

    /// Writes a leaf, creating (or replacing non-mapping) intermediate nodes.
    pub fn update(&self, path: &str, value: impl Into<Value>) {
        let mut tree = self.tree.write().unwrap_or_else(PoisonError::into_inner);
        let mut segments = path.split('.').peekable();
        let mut current = &mut *tree;

        while let Some(segment) = segments.next() {
            if !current.is_object() {
                *current = Value::Object(Map::new());
            }
            let Value::Object(map) = current else {
                unreachable!("node was just replaced by a mapping");
            };
            if segments.peek().is_none() {
                map.insert(segment.to_string(), value.into());
                return;
            }
            current = map.entry(segment.to_string()).or_insert_with(|| Value::Object(Map::new()));
        }
    }

    pub fn snapshot(&self) -> Value {
        self.tree.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn performance(&self) -> PerformanceHints {
        PerformanceHints {
            batch_size: self.get("performance.batchSize", 10usize).max(1),
            idle_timeout: Duration::from_millis(self.get("performance.idleTimeoutMs", 50u64)),
            yield_between_batches: self.get("performance.yieldBetweenBatches", true),
        }
    }
}

/// Scheduling hints for synchronous probes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerformanceHints {
    /// Number of synchronous probes launched before yielding to the runtime.
    pub batch_size: usize,
    /// Pause inserted between batches when yielding.
    pub idle_timeout: Duration,
    pub yield_between_batches: bool,
}

/// Deep-merges `overrides` into `base`. Mappings merge key by key, every other
/// value (scalars, sequences, null) replaces the target leaf.
pub fn merge(base: &mut Value, overrides: &Value) {
    match (base, overrides) {
        (Value::Object(base), Value::Object(overrides)) => {
            for (key, value) in overrides {
                match base.get_mut(key) {
                    Some(existing) if existing.is_object() && value.is_object() => merge(existing, value),
                    Some(existing) => *existing = value.clone(),
                    None => {
                        base.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (base, overrides) => *base = overrides.clone(),
    }
}
