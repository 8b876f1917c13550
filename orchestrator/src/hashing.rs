//! Hashing collaborators used for cache keys and the composite hash.

use eyre::Result;
use serde::Serialize;
use serde_json::Value;
use sha1::{
    Digest,
    Sha1,
};
use std::{
    collections::BTreeMap,
    fmt::Debug,
    sync::Arc,
};
use strum::{
    Display,
    EnumIter,
    EnumString,
};

/// Deterministic `string -> string` digest. Identical input must always
/// produce identical output within a process.
pub trait FingerprintHasher: Send + Sync + Debug {
    fn hash(&self, input: &str) -> Result<String>;
}

/// Fast non-cryptographic 128-bit xxh3.
#[derive(Debug, Default, Clone, Copy)]
pub struct Xxh3Hasher;

impl FingerprintHasher for Xxh3Hasher {
    fn hash(&self, input: &str) -> Result<String> {
        Ok(format!("{:032x}", xxhash_rust::xxh3::xxh3_128(input.as_bytes())))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Sha1Hasher;

impl FingerprintHasher for Sha1Hasher {
    fn hash(&self, input: &str) -> Result<String> {
        let mut hasher = Sha1::new();
        hasher.update(input.as_bytes());
        let bytes = hasher.finalize();
        Ok(bytes.iter().fold(String::new(), |mut acc, b| {
            acc.push_str(&format!("{:02x}", b));
            acc
        }))
    }
}

#[derive(Debug, Default, Clone, Copy, Display, EnumIter, EnumString, PartialEq, Eq)]
#[strum(serialize_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Xxh3,
    Sha1,
}

impl HashAlgorithm {
    /// Parses a configured algorithm name, falling back to the default for
    /// names that are not known.
    pub fn from_config_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            warn!(name, "unknown hashing algorithm, falling back to {}", Self::default());
            Self::default()
        })
    }

    pub fn hasher(self) -> Arc<dyn FingerprintHasher> {
        match self {
            HashAlgorithm::Xxh3 => Arc::new(Xxh3Hasher),
            HashAlgorithm::Sha1 => Arc::new(Sha1Hasher),
        }
    }
}

/// Compact JSON with every mapping's keys sorted, so the output only depends
/// on content and never on insertion order.
pub fn canonical_json(value: &Value) -> serde_json::Result<String> {
    serde_json::to_string(&Canonical(value))
}

struct Canonical<'a>(&'a Value);

impl Serialize for Canonical<'_> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Value::Object(map) => {
                let sorted: BTreeMap<&String, Canonical<'_>> = map.iter().map(|(k, v)| (k, Canonical(v))).collect();
                sorted.serialize(serializer)
            }
            Value::Array(items) => serializer.collect_seq(items.iter().map(Canonical)),
            other => other.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn canonical_json_ignores_insertion_order() {
        let mut a = serde_json::Map::new();
        a.insert("zeta".into(), json!(1));
        a.insert("alpha".into(), json!({ "y": 2, "x": [ { "b": 1, "a": 2 } ] }));
        let mut b = serde_json::Map::new();
        b.insert("alpha".into(), json!({ "x": [ { "a": 2, "b": 1 } ], "y": 2 }));
        b.insert("zeta".into(), json!(1));

        let a = canonical_json(&Value::Object(a)).unwrap();
        let b = canonical_json(&Value::Object(b)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, r#"{"alpha":{"x":[{"a":2,"b":1}],"y":2},"zeta":1}"#);
    }

    #[test]
    fn hashers_are_deterministic() {
        for algorithm in [HashAlgorithm::Xxh3, HashAlgorithm::Sha1] {
            let hasher = algorithm.hasher();
            assert_eq!(hasher.hash("input").unwrap(), hasher.hash("input").unwrap());
            assert_ne!(hasher.hash("input").unwrap(), hasher.hash("other").unwrap());
        }
    }

    #[test]
    fn digest_lengths() {
        assert_eq!(Xxh3Hasher.hash("").unwrap().len(), 32);
        assert_eq!(
            Sha1Hasher.hash("abc").unwrap(),
            "a9993e364706816aba3e25717850c26c9cd0d89d"
        );
    }

    #[test]
    fn algorithm_names() {
        assert_eq!(HashAlgorithm::from_config_name("sha1"), HashAlgorithm::Sha1);
        assert_eq!(HashAlgorithm::from_config_name("md5"), HashAlgorithm::Xxh3);
        assert_eq!(HashAlgorithm::Xxh3.to_string(), "xxh3");
    }
}
