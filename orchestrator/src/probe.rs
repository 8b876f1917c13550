//! The contract every probe implements.
//!
//! Probes are independent collaborators: each reads one ambient signal and
//! reports it as a JSON value. The orchestrator only relies on the
//! [`ProbeDescriptor`] identity and the three operations of [`Probe`].

use eyre::Result;
use serde_json::Value;
use std::{
    future::Future,
    pin::Pin,
    time::Duration,
};

pub type ProbeFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// Immutable identity of a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeDescriptor {
    /// Unique within a registry.
    pub name: String,
    /// Lower runs and ranks earlier.
    pub priority: i32,
    /// Looked up as `features.<feature_key>` in the configuration.
    pub feature_key: String,
    pub requires_async: bool,
    /// Explicit execution budget. Takes precedence over `timeout_group`.
    pub timeout: Option<Duration>,
    /// Category whose `timeouts.<group>` budget applies without an explicit
    /// timeout.
    pub timeout_group: Option<String>,
    /// Initial state of the registry-owned toggle.
    pub enabled: bool,
}

impl ProbeDescriptor {
    /// A synchronous probe whose feature key is its name.
    pub fn new(name: impl ToString, priority: i32) -> Self {
        let name = name.to_string();
        Self {
            feature_key: name.clone(),
            name,
            priority,
            requires_async: false,
            timeout: None,
            timeout_group: None,
            enabled: true,
        }
    }

    pub fn feature_key(mut self, feature_key: impl ToString) -> Self {
        self.feature_key = feature_key.to_string();
        self
    }

    pub fn requires_async(mut self, requires_async: bool) -> Self {
        self.requires_async = requires_async;
        self
    }

    pub fn timeout_ms(mut self, millis: u64) -> Self {
        self.timeout = Some(Duration::from_millis(millis));
        self
    }

    pub fn timeout_group(mut self, group: impl ToString) -> Self {
        self.timeout_group = Some(group.to_string());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// A unit of independent data collection.
pub trait Probe: Send + Sync + 'static {
    fn descriptor(&self) -> &ProbeDescriptor;

    /// Produces the probe's value. Synchronous probes return an already
    /// resolved future.
    fn execute(&self) -> ProbeFuture<'_>;

    /// Reduced, order-insensitive payload used to derive cache keys. `None`
    /// keeps this probe out of the key.
    fn stable_components(&self, _result: &Value) -> Option<Value> {
        None
    }

    /// Releases whatever `execute` acquired. Called exactly once per
    /// execution, whether it completed, failed or was abandoned by a timeout,
    /// in which case `execute` may still be running.
    fn cleanup(&self) {}

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}

impl std::fmt::Debug for dyn Probe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Probe").field("descriptor", self.descriptor()).finish_non_exhaustive()
    }
}
