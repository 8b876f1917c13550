use super::FnProbe;
use chrono::Local;
use envprint_orchestrator::ProbeDescriptor;
use eyre::{
    OptionExt as _,
    Result,
};
use serde_json::{
    json,
    Value,
};
use std::path::Path;

const LOCALE_VARIABLES: [&str; 3] = ["LC_ALL", "LC_MESSAGES", "LANG"];

pub fn platform() -> FnProbe {
    FnProbe::new(ProbeDescriptor::new("platform", 0), || {
        Ok(json!({
            "os": std::env::consts::OS,
            "family": std::env::consts::FAMILY,
            "arch": std::env::consts::ARCH,
        }))
    })
    .with_stable(|result| Some(result.clone()))
}

pub fn cpu() -> FnProbe {
    FnProbe::new(ProbeDescriptor::new("cpu", 1), || {
        Ok(json!(std::thread::available_parallelism()?.get()))
    })
    .with_stable(|result| Some(result.clone()))
}

pub fn locale() -> FnProbe {
    FnProbe::new(ProbeDescriptor::new("locale", 2), || {
        let raw = LOCALE_VARIABLES
            .iter()
            .filter_map(|name| std::env::var(name).ok())
            .find(|value| !value.is_empty())
            .ok_or_eyre("no locale variable is set")?;
        Ok(json!(normalize_locale(&raw)))
    })
    .with_stable(|result| Some(result.clone()))
}

pub fn timezone() -> FnProbe {
    FnProbe::new(ProbeDescriptor::new("timezone", 3), || {
        let offset_minutes = Local::now().offset().local_minus_utc() / 60;
        Ok(json!({
            "offsetMinutes": offset_minutes,
            "name": std::env::var("TZ").ok(),
        }))
    })
    .with_stable(|result| result.get("offsetMinutes").cloned())
}

/// Login shell. Users switch shells, so it stays out of the cache key.
pub fn shell() -> FnProbe {
    FnProbe::new(ProbeDescriptor::new("shell", 20), || {
        let shell = std::env::var("SHELL")?;
        let name = Path::new(&shell)
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_eyre("SHELL is not a path")?;
        Ok(json!(name))
    })
}

/// `en_US.UTF-8@euro` -> `en-US`. `C` and `POSIX` are kept as they are.
fn normalize_locale(raw: &str) -> String {
    let tag = raw.split(['.', '@']).next().unwrap_or(raw);
    tag.replace('_', "-")
}
