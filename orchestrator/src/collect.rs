//! One collection cycle: cache lookup, concurrent probe execution with
//! per-probe deadlines, aggregation, hashing and cache population.

use crate::{
    cache::{
        now_millis,
        ResultCache,
    },
    error::CollectError,
    fingerprint::{
        CachedFingerprint,
        Components,
        CompositeFingerprint,
    },
    hashing::{
        canonical_json,
        FingerprintHasher,
        HashAlgorithm,
    },
    probe::ProbeDescriptor,
    registry::{
        ProbeRegistry,
        RegisteredProbe,
    },
    timeout::{
        Launched,
        Settled,
        TimeoutGuard,
    },
};
use envprint_config::ConfigStore;
use futures::future::join_all;
use serde_json::{
    json,
    Map,
    Value,
};
use std::{
    collections::HashSet,
    panic::AssertUnwindSafe,
    path::PathBuf,
    sync::Arc,
    time::{
        Duration,
        Instant,
    },
};

/// Probe names whose public field name differs from the internal one.
const PUBLIC_FIELD_NAMES: &[(&str, &str)] = &[
    ("cpu", "hardwareConcurrency"),
    ("machine_id", "machineId"),
    ("shell", "loginShell"),
    ("timezone", "timeZone"),
];

pub fn public_field_name(probe_name: &str) -> &str {
    PUBLIC_FIELD_NAMES
        .iter()
        .find(|(internal, _)| *internal == probe_name)
        .map(|(_, public)| *public)
        .unwrap_or(probe_name)
}

/// Terminal state of one probe within a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum ProbeOutcome {
    Completed(Value),
    Failed(String),
    TimedOut(Duration),
    /// Disabled between selection and execution; never ran.
    Disabled,
}

impl ProbeOutcome {
    pub fn value(&self) -> Option<&Value> {
        match self {
            ProbeOutcome::Completed(value) => Some(value),
            _ => None,
        }
    }
}

enum Launch {
    Skipped,
    Running(Launched<eyre::Result<Value>>),
}

#[derive(Debug, Clone)]
pub struct CollectionOrchestrator {
    config: ConfigStore,
    registry: ProbeRegistry,
    cache: ResultCache,
    hasher: Arc<dyn FingerprintHasher>,
}

impl CollectionOrchestrator {
    pub fn new(
        config: ConfigStore,
        registry: ProbeRegistry,
        cache: ResultCache,
        hasher: Arc<dyn FingerprintHasher>,
    ) -> Self {
        Self {
            config,
            registry,
            cache,
            hasher,
        }
    }

    /// Wires an empty registry, a cache rooted at `data_dir` and the hasher
    /// named by `hashing.algorithm` around `config`.
    pub fn from_config(config: ConfigStore, data_dir: impl Into<PathBuf>) -> Self {
        let algorithm = HashAlgorithm::from_config_name(&config.get("hashing.algorithm", HashAlgorithm::default().to_string()));
        let hasher = algorithm.hasher();
        let registry = ProbeRegistry::new(config.clone());
        let cache = ResultCache::new(config.clone(), hasher.clone(), data_dir);
        Self::new(config, registry, cache, hasher)
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }

    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ResultCache {
        &self.cache
    }

    /// Runs one collection cycle. A non-empty `overrides` mapping
    /// re-initializes the configuration first.
    #[instrument(level = "debug", skip_all)]
    pub async fn collect(&self, overrides: Option<&Value>) -> Result<CompositeFingerprint, CollectError> {
        match overrides {
            Some(Value::Object(map)) if !map.is_empty() => self.config.init(&Value::Object(map.clone())),
            Some(Value::Object(_)) | Some(Value::Null) | None => {}
            Some(other) => warn!(%other, "ignoring configuration overrides that are not a mapping"),
        }

        let caching = self.cache.policy().enabled;
        let mut cache_key = None;

        if caching {
            if let Some(stable) = self.quick_stable_components().await {
                let enabled = self.registry.get_enabled_sorted();
                match self.cache.generate_cache_key(&key_payload(&enabled, stable)) {
                    Ok(key) => {
                        if let Some(cached) = self.cache.get(&key) {
                            info!(key = %key, "fingerprint served from cache");
                            return Ok(CompositeFingerprint::from_cache(cached, key));
                        }
                        debug!(key = %key, "fingerprint cache miss");
                        cache_key = Some(key);
                    }
                    Err(err) => warn!("failed to derive cache key: {err}"),
                }
            }
        }

        let selected = self.registry.get_enabled_sorted();
        let started = Instant::now();
        let outcomes = self.run_all(&selected).await;

        let components = field_names(&selected)
            .into_iter()
            .zip(&outcomes)
            .map(|(field, outcome)| (field, outcome.value().cloned().unwrap_or(Value::Null)))
            .collect::<Components>();

        let serialized = canonical_json(&serde_json::to_value(&components)?)?;
        let hash = self.hasher.hash(&serialized).map_err(CollectError::Hashing)?;
        let timestamp = now_millis();

        if caching {
            if cache_key.is_none() {
                cache_key = self.key_from_results(&selected, &outcomes);
            }
            if let Some(key) = &cache_key {
                self.cache
                    .set(key, CachedFingerprint::new(components.clone(), &hash, timestamp));
            }
        }

        let failed = outcomes.iter().filter(|o| o.value().is_none()).count();
        info!(
            probes = selected.len(),
            failed,
            elapsed = ?started.elapsed(),
            hash = %hash,
            "fingerprint collected"
        );

        Ok(CompositeFingerprint::fresh(components, hash, timestamp, cache_key))
    }

    /// Stable components of the cheap, synchronous, high-priority probes.
    async fn quick_stable_components(&self) -> Option<Value> {
        let max_priority: i32 = self.config.get("collection.stableMaxPriority", 10);
        let limit: usize = self.config.get("collection.stableProbeLimit", 5);

        let candidates = self
            .registry
            .get_enabled_sorted()
            .into_iter()
            .filter(|p| !p.descriptor().requires_async && p.descriptor().priority <= max_priority)
            .take(limit);

        let mut stable = Map::new();
        for probe in candidates {
            let guard = TimeoutGuard::new(self.deadline_for(probe.descriptor()));
            let executing = probe.probe().clone();
            let settled = guard.run(async move { executing.execute().await }).await;
            cleanup(&probe);

            match settled {
                Settled::Completed(Ok(value)) => {
                    if let Some(reduced) = probe.probe().stable_components(&value) {
                        stable.insert(probe.name().to_string(), reduced);
                    }
                }
                _ => debug!(probe = %probe.name(), "no stable components"),
            }
        }

        (!stable.is_empty()).then_some(Value::Object(stable))
    }

    fn key_from_results(&self, selected: &[RegisteredProbe], outcomes: &[ProbeOutcome]) -> Option<String> {
        let stable = selected
            .iter()
            .zip(outcomes)
            .filter_map(|(probe, outcome)| {
                let reduced = probe.probe().stable_components(outcome.value()?)?;
                Some((probe.name().to_string(), reduced))
            })
            .collect::<Map<_, _>>();

        if stable.is_empty() {
            debug!("no stable components, result is not cached");
            return None;
        }

        self.cache
            .generate_cache_key(&key_payload(selected, Value::Object(stable)))
            .inspect_err(|err| warn!("failed to derive cache key: {err}"))
            .ok()
    }

    /// Launches every probe, then waits for all of them to settle.
    async fn run_all(&self, selected: &[RegisteredProbe]) -> Vec<ProbeOutcome> {
        let hints = self.config.performance();
        let mut launches = Vec::with_capacity(selected.len());
        let mut sync_launched = 0;

        for (index, probe) in selected.iter().enumerate() {
            launches.push(self.launch(probe));

            if !probe.descriptor().requires_async {
                sync_launched += 1;
                let more_to_launch = index + 1 < selected.len();
                if hints.yield_between_batches && more_to_launch && sync_launched % hints.batch_size == 0 {
                    trace!(sync_launched, "yielding between probe batches");
                    tokio::time::sleep(hints.idle_timeout).await;
                }
            }
        }

        join_all(selected.iter().zip(launches).map(|(probe, launch)| settle(probe, launch))).await
    }

    fn launch(&self, probe: &RegisteredProbe) -> Launch {
        if !probe.is_enabled(&self.config) {
            debug!(probe = %probe.name(), "probe disabled after selection, skipping");
            return Launch::Skipped;
        }

        let guard = TimeoutGuard::new(self.deadline_for(probe.descriptor()));
        let executing = probe.probe().clone();
        Launch::Running(guard.launch(async move { executing.execute().await }))
    }

    /// Explicit probe timeout, else the `timeouts.<group>` budget, else none.
    fn deadline_for(&self, descriptor: &ProbeDescriptor) -> Option<Duration> {
        descriptor.timeout.or_else(|| {
            let group = descriptor.timeout_group.as_ref()?;
            self.config
                .get_value(&format!("timeouts.{group}"))?
                .as_u64()
                .map(Duration::from_millis)
        })
    }
}

/// Cache key input: the enabled probe names plus their stable components, so
/// a different enabled set never shares a key.
fn key_payload(enabled: &[RegisteredProbe], stable: Value) -> Value {
    let mut names = enabled.iter().map(|p| p.name().to_string()).collect::<Vec<_>>();
    names.sort();
    json!({ "enabled": names, "stable": stable })
}

/// Field name per selected probe. A probe's own name beats another probe's
/// public alias; the aliased probe is then reported under its own name.
fn field_names(selected: &[RegisteredProbe]) -> Vec<String> {
    let internal = selected.iter().map(|p| p.name()).collect::<HashSet<_>>();
    selected
        .iter()
        .map(|probe| {
            let name = probe.name();
            let public = public_field_name(name);
            if public != name && internal.contains(public) {
                warn!(probe = %name, field = %public, "field name taken by another probe, reporting under the probe name");
                name.to_string()
            } else {
                public.to_string()
            }
        })
        .collect()
}

async fn settle(probe: &RegisteredProbe, launch: Launch) -> ProbeOutcome {
    let Launch::Running(launched) = launch else {
        return ProbeOutcome::Disabled;
    };

    let name = probe.name();
    let outcome = match launched.settle().await {
        Settled::Completed(Ok(value)) => ProbeOutcome::Completed(value),
        Settled::Completed(Err(err)) => {
            warn!(probe = %name, "probe failed: {err:#}");
            ProbeOutcome::Failed(err.to_string())
        }
        Settled::Panicked(panic) => {
            warn!(probe = %name, "probe panicked: {panic}");
            ProbeOutcome::Failed(panic)
        }
        Settled::TimedOut(deadline) => {
            warn!(probe = %name, ?deadline, "probe timed out, abandoning it");
            ProbeOutcome::TimedOut(deadline)
        }
    };

    cleanup(probe);
    outcome
}

fn cleanup(probe: &RegisteredProbe) {
    if std::panic::catch_unwind(AssertUnwindSafe(|| probe.probe().cleanup())).is_err() {
        error!(probe = %probe.name(), "probe cleanup panicked");
    }
}
