#[macro_use]
extern crate tracing;

pub mod cache;
mod collect;
mod error;
mod fingerprint;
pub mod hashing;
mod probe;
mod registry;
pub mod timeout;

pub use cache::{
    CachePolicy,
    CacheStats,
    ResultCache,
    StorageMode,
};
pub use collect::{
    public_field_name,
    CollectionOrchestrator,
    ProbeOutcome,
};
pub use error::CollectError;
pub use fingerprint::{
    CachedFingerprint,
    Components,
    CompositeFingerprint,
};
pub use hashing::{
    FingerprintHasher,
    HashAlgorithm,
};
pub use probe::{
    Probe,
    ProbeDescriptor,
    ProbeFuture,
};
pub use registry::{
    ProbeRegistry,
    RegisteredProbe,
};
pub use timeout::{
    Settled,
    TimeoutGuard,
};
