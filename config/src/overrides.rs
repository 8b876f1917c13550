use crate::ConfigStore;
use eyre::{
    Context as _,
    OptionExt as _,
    Result,
};
use serde_json::Value;
use std::path::Path;

/// Reads a YAML override tree from `path`. The document must be a mapping.
pub fn load_overrides_file(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).wrap_err_with(|| format!("Failed to read config file {path:?}"))?;
    let overrides: Value =
        serde_yml::from_str(&content).wrap_err_with(|| format!("Failed to parse config file {path:?}"))?;

    match overrides {
        Value::Object(_) => {
            debug!(?path, "loaded config overrides");
            Ok(overrides)
        }
        Value::Null => Ok(Value::Object(Default::default())),
        _ => Err(eyre::eyre!("Config file {path:?} must contain a mapping at the top level")),
    }
}

/// Parses a `path=value` assignment. The value is read as a YAML scalar so
/// `true`, `250` and `memory` keep their natural types.
pub fn parse_assignment(input: &str) -> Result<(String, Value)> {
    let (path, raw) = input
        .split_once('=')
        .ok_or_eyre("expected an assignment of the form path=value")?;
    let path = path.trim();
    if path.is_empty() || path.split('.').any(str::is_empty) {
        eyre::bail!("invalid config path in assignment {input:?}");
    }
    let value: Value = serde_yml::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.trim().to_string()));
    Ok((path.to_string(), value))
}

pub fn apply_assignment(config: &ConfigStore, input: &str) -> Result<()> {
    let (path, value) = parse_assignment(input)?;
    debug!(path, %value, "config override");
    config.update(&path, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use temp_dir::TempDir;

    #[test]
    fn assignments_keep_scalar_types() {
        assert_eq!(parse_assignment("cache.maxSize=2").unwrap(), ("cache.maxSize".to_string(), json!(2)));
        assert_eq!(
            parse_assignment("features.hostname = false").unwrap(),
            ("features.hostname".to_string(), json!(false))
        );
        assert_eq!(
            parse_assignment("cache.storage=file").unwrap(),
            ("cache.storage".to_string(), json!("file"))
        );
    }

    #[test]
    fn malformed_assignments_are_rejected() {
        assert!(parse_assignment("no-equals-sign").is_err());
        assert!(parse_assignment("=1").is_err());
        assert!(parse_assignment("a..b=1").is_err());
    }

    #[test]
    fn override_file_is_merged_by_init() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("config.yaml");
        std::fs::write(&file, "cache:\n  ttl: 10\nfeatures:\n  hostname: false\n").unwrap();

        let overrides = load_overrides_file(&file).unwrap();
        let config = ConfigStore::with_overrides(&overrides);
        assert_eq!(config.get("cache.ttl", 0u64), 10);
        assert_eq!(config.get("cache.maxSize", 0u64), 100);
        assert!(!config.get("features.hostname", true));
    }

    #[test]
    fn scalar_override_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("config.yaml");
        std::fs::write(&file, "just a string").unwrap();
        assert!(load_overrides_file(&file).is_err());
    }
}
