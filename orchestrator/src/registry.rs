use crate::probe::{
    Probe,
    ProbeDescriptor,
};
use envprint_config::ConfigStore;
use std::{
    collections::HashMap,
    sync::{
        atomic::{
            AtomicBool,
            Ordering,
        },
        Arc,
        PoisonError,
        RwLock,
    },
};

/// A probe together with its live enable toggle. Clones share the toggle, so
/// a handle taken before a `disable` observes it.
#[derive(Clone)]
pub struct RegisteredProbe {
    probe: Arc<dyn Probe>,
    toggle: Arc<AtomicBool>,
}

impl std::fmt::Debug for RegisteredProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredProbe")
            .field("name", &self.name())
            .field("toggled_on", &self.is_toggled_on())
            .finish()
    }
}

impl RegisteredProbe {
    fn new(probe: Arc<dyn Probe>) -> Self {
        let toggle = Arc::new(AtomicBool::new(probe.descriptor().enabled));
        Self { probe, toggle }
    }

    pub fn probe(&self) -> &Arc<dyn Probe> {
        &self.probe
    }

    pub fn descriptor(&self) -> &ProbeDescriptor {
        self.probe.descriptor()
    }

    pub fn name(&self) -> &str {
        &self.descriptor().name
    }

    pub fn is_toggled_on(&self) -> bool {
        self.toggle.load(Ordering::SeqCst)
    }

    /// Enabled iff the toggle is on and `features.<feature_key>` is not false.
    pub fn is_enabled(&self, config: &ConfigStore) -> bool {
        self.is_toggled_on() && config.get(&format!("features.{}", self.descriptor().feature_key), true)
    }

    fn set_toggle(&self, enabled: bool) {
        self.toggle.store(enabled, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct RegistryInner {
    entries: HashMap<String, (u64, RegisteredProbe)>,
    next_slot: u64,
}

impl RegistryInner {
    fn in_registration_order(&self) -> Vec<(u64, RegisteredProbe)> {
        let mut entries = self.entries.values().cloned().collect::<Vec<_>>();
        entries.sort_by_key(|(slot, _)| *slot);
        entries
    }
}

/// Named probe instances. Duplicate names follow last-registered-wins: the
/// new probe replaces the old one but keeps its registration slot.
#[derive(Clone)]
pub struct ProbeRegistry {
    config: ConfigStore,
    inner: Arc<RwLock<RegistryInner>>,
}

impl std::fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeRegistry")
            .field("probes", &self.names())
            .finish_non_exhaustive()
    }
}

impl ProbeRegistry {
    pub fn new(config: ConfigStore) -> Self {
        Self {
            config,
            inner: Default::default(),
        }
    }

    pub fn register<P: Probe>(&self, probe: P) -> Option<Arc<dyn Probe>> {
        self.register_arc(Arc::new(probe))
    }

    /// Registers `probe`, returning the probe it replaced if the name was
    /// already taken.
    pub fn register_arc(&self, probe: Arc<dyn Probe>) -> Option<Arc<dyn Probe>> {
        let name = probe.name().to_string();
        let registered = RegisteredProbe::new(probe);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        if let Some((slot, previous)) = inner.entries.remove(&name) {
            warn!(probe = %name, "probe registered twice, replacing the previous instance");
            inner.entries.insert(name, (slot, registered));
            return Some(previous.probe);
        }

        let slot = inner.next_slot;
        inner.next_slot += 1;
        debug!(probe = %name, slot, "probe registered");
        inner.entries.insert(name, (slot, registered));
        None
    }

    pub fn register_all(&self, probes: impl IntoIterator<Item = Arc<dyn Probe>>) {
        for probe in probes {
            self.register_arc(probe);
        }
    }

    pub fn get(&self, name: &str) -> Option<RegisteredProbe> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner.entries.get(name).map(|(_, registered)| registered.clone())
    }

    /// Enabled probes by ascending priority, ties broken by registration order.
    pub fn get_enabled_sorted(&self) -> Vec<RegisteredProbe> {
        let mut enabled = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .in_registration_order()
            .into_iter()
            .filter(|(_, registered)| registered.is_enabled(&self.config))
            .collect::<Vec<_>>();
        enabled.sort_by_key(|(slot, registered)| (registered.descriptor().priority, *slot));
        enabled.into_iter().map(|(_, registered)| registered).collect()
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.get(name).is_some_and(|registered| registered.is_enabled(&self.config))
    }

    /// No-op for unknown names.
    pub fn enable(&self, name: &str) {
        if let Some(registered) = self.get(name) {
            registered.set_toggle(true);
        }
    }

    /// No-op for unknown names.
    pub fn disable(&self, name: &str) {
        if let Some(registered) = self.get(name) {
            registered.set_toggle(false);
        }
    }

    /// Every probe in registration order, enabled or not.
    pub fn get_all(&self) -> Vec<RegisteredProbe> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        inner
            .in_registration_order()
            .into_iter()
            .map(|(_, registered)| registered)
            .collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.get_all().iter().map(|registered| registered.name().to_string()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        inner.entries.clear();
        inner.next_slot = 0;
    }

    pub fn config(&self) -> &ConfigStore {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::ProbeFuture;
    use pretty_assertions::assert_eq;
    use serde_json::{
        json,
        Value,
    };

    struct Fixed {
        descriptor: ProbeDescriptor,
        value: Value,
    }

    impl Fixed {
        fn new(name: &str, priority: i32) -> Self {
            Self {
                descriptor: ProbeDescriptor::new(name, priority),
                value: json!(name),
            }
        }
    }

    impl Probe for Fixed {
        fn descriptor(&self) -> &ProbeDescriptor {
            &self.descriptor
        }

        fn execute(&self) -> ProbeFuture<'_> {
            let value = self.value.clone();
            Box::pin(async move { Ok(value) })
        }
    }

    fn names(probes: &[RegisteredProbe]) -> Vec<&str> {
        probes.iter().map(|p| p.name()).collect()
    }

    #[test]
    fn sorted_by_priority_then_registration() {
        let registry = ProbeRegistry::new(ConfigStore::new());
        registry.register(Fixed::new("c", 2));
        registry.register(Fixed::new("a", 1));
        registry.register(Fixed::new("b", 2));
        registry.register(Fixed::new("d", 0));

        assert_eq!(names(&registry.get_enabled_sorted()), vec!["d", "a", "c", "b"]);
        assert_eq!(registry.names(), vec!["c", "a", "b", "d"]);
    }

    #[test]
    fn duplicate_names_keep_the_last_probe_in_the_first_slot() {
        let registry = ProbeRegistry::new(ConfigStore::new());
        registry.register(Fixed::new("x", 1));
        registry.register(Fixed::new("y", 1));
        let replaced = registry.register(Fixed {
            descriptor: ProbeDescriptor::new("x", 1),
            value: json!("second"),
        });

        assert_eq!(replaced.map(|p| p.name().to_string()), Some("x".to_string()));
        assert_eq!(registry.len(), 2);
        assert_eq!(names(&registry.get_enabled_sorted()), vec!["x", "y"]);
    }

    #[test]
    fn toggles_and_feature_flags() {
        let config = ConfigStore::new();
        let registry = ProbeRegistry::new(config.clone());
        registry.register(Fixed::new("a", 1));
        registry.register(Fixed {
            descriptor: ProbeDescriptor::new("b", 2).feature_key("b_feature"),
            value: json!(null),
        });
        registry.register(Fixed {
            descriptor: ProbeDescriptor::new("c", 3).enabled(false),
            value: json!(null),
        });

        assert_eq!(names(&registry.get_enabled_sorted()), vec!["a", "b"]);

        config.update("features.b_feature", false);
        assert!(!registry.is_enabled("b"));
        assert_eq!(names(&registry.get_enabled_sorted()), vec!["a"]);

        registry.enable("c");
        registry.disable("a");
        registry.disable("unknown");
        registry.enable("unknown");
        assert_eq!(names(&registry.get_enabled_sorted()), vec!["c"]);
    }

    #[test]
    fn handles_observe_later_toggles() {
        let registry = ProbeRegistry::new(ConfigStore::new());
        registry.register(Fixed::new("a", 1));
        let handle = registry.get("a").unwrap();
        registry.disable("a");
        assert!(!handle.is_toggled_on());
    }

    #[test]
    fn clear_removes_everything() {
        let registry = ProbeRegistry::new(ConfigStore::new());
        registry.register_all([
            Arc::new(Fixed::new("a", 1)) as Arc<dyn Probe>,
            Arc::new(Fixed::new("b", 1)) as Arc<dyn Probe>,
        ]);
        assert_eq!(registry.len(), 2);
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.get("a").is_none());
        assert!(registry.get_all().is_empty());
    }
}
