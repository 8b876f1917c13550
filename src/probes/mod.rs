//! Built-in probes. Cheap synchronous ones are plain functions wrapped in
//! [`FnProbe`]; probes that touch the filesystem are asynchronous and run
//! under the `system` timeout budget.

mod host;
mod local;

use envprint_orchestrator::{
    Probe,
    ProbeDescriptor,
    ProbeFuture,
};
use eyre::Result;
use serde_json::Value;
use std::sync::Arc;

pub use host::{
    HostnameProbe,
    MachineIdProbe,
};

pub fn builtin() -> Vec<Arc<dyn Probe>> {
    vec![
        Arc::new(local::platform()),
        Arc::new(local::cpu()),
        Arc::new(local::locale()),
        Arc::new(local::timezone()),
        Arc::new(local::shell()),
        Arc::new(HostnameProbe::default()),
        Arc::new(MachineIdProbe::default()),
    ]
}

/// A synchronous probe backed by plain functions.
pub struct FnProbe {
    descriptor: ProbeDescriptor,
    read: fn() -> Result<Value>,
    stable: fn(&Value) -> Option<Value>,
}

impl FnProbe {
    pub fn new(descriptor: ProbeDescriptor, read: fn() -> Result<Value>) -> Self {
        Self {
            descriptor,
            read,
            stable: |_| None,
        }
    }

    pub fn with_stable(mut self, stable: fn(&Value) -> Option<Value>) -> Self {
        self.stable = stable;
        self
    }
}

impl Probe for FnProbe {
    fn descriptor(&self) -> &ProbeDescriptor {
        &self.descriptor
    }

    fn execute(&self) -> ProbeFuture<'_> {
        Box::pin(std::future::ready((self.read)()))
    }

    fn stable_components(&self, result: &Value) -> Option<Value> {
        (self.stable)(result)
    }
}
