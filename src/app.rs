use crate::{
    args::Args,
    probes,
};
use color_eyre::Result;
use envprint_config::{
    apply_assignment,
    get_config_dir,
    get_data_dir,
    load_overrides_file,
    ConfigStore,
};
use envprint_orchestrator::{
    public_field_name,
    CollectionOrchestrator,
};
use eyre::Context as _;
use serde::Serialize;
use serde_json::{
    json,
    Value,
};

const DEFAULT_CONFIG_FILE: &str = "config.yaml";

pub async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let orchestrator = CollectionOrchestrator::from_config(config, get_data_dir());
    orchestrator.registry().register_all(probes::builtin());

    if args.list_probes {
        return print_json(&list_probes(&orchestrator), args.pretty);
    }

    for cycle in 1..=args.repeat {
        let fingerprint = orchestrator
            .collect(None)
            .await
            .wrap_err_with(|| format!("Collection cycle {cycle} failed"))?;
        print_json(&fingerprint, args.pretty)?;

        if cycle < args.repeat {
            tokio::select! {
                _ = tokio::time::sleep(args.interval) => {}
                _ = tokio::signal::ctrl_c() => {
                    info!(cycle, "interrupted, stopping");
                    break;
                }
            }
        }
    }

    debug!(stats = ?orchestrator.cache().stats(), "done");
    Ok(())
}

/// Defaults, then the override file, then `--set` assignments in order.
fn load_config(args: &Args) -> Result<ConfigStore> {
    let overrides = match &args.config {
        Some(path) => load_overrides_file(path)?,
        None => {
            let path = get_config_dir().join(DEFAULT_CONFIG_FILE);
            if path.exists() {
                debug!(?path, "loading configuration file");
                load_overrides_file(&path)?
            } else {
                Value::Object(Default::default())
            }
        }
    };

    let config = ConfigStore::with_overrides(&overrides);
    for assignment in &args.assignments {
        apply_assignment(&config, assignment)?;
    }
    Ok(config)
}

fn list_probes(orchestrator: &CollectionOrchestrator) -> Value {
    orchestrator
        .registry()
        .get_enabled_sorted()
        .iter()
        .map(|registered| {
            let descriptor = registered.descriptor();
            json!({
                "name": descriptor.name,
                "field": public_field_name(&descriptor.name),
                "priority": descriptor.priority,
                "async": descriptor.requires_async,
                "timeoutMs": descriptor.timeout.map(|t| t.as_millis() as u64),
                "timeoutGroup": descriptor.timeout_group,
            })
        })
        .collect()
}

fn print_json(value: &impl Serialize, pretty: bool) -> Result<()> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .context("Failed to render output")?;
    println!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;
    use temp_dir::TempDir;

    #[test]
    fn assignments_apply_over_the_config_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.child("envprint.yaml");
        std::fs::write(&file, "cache:\n  ttl: 10\n  maxSize: 3\n").unwrap();

        let args = Args::parse_from([
            "envprint",
            "--config",
            file.to_str().unwrap(),
            "--set",
            "cache.ttl=99",
        ]);
        let config = load_config(&args).unwrap();
        assert_eq!(config.get("cache.ttl", 0u64), 99);
        assert_eq!(config.get("cache.maxSize", 0usize), 3);
        assert_eq!(config.get("cache.storage", String::new()), "memory");
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let args = Args::parse_from(["envprint", "--config", dir.child("absent.yaml").to_str().unwrap()]);
        assert!(load_config(&args).is_err());
    }

    #[test]
    fn listed_probes_follow_priority_order() {
        let config = ConfigStore::with_overrides(&json!({ "features": { "shell": false } }));
        let orchestrator = CollectionOrchestrator::from_config(config, std::env::temp_dir());
        orchestrator.registry().register_all(probes::builtin());

        let listed = list_probes(&orchestrator);
        let names = listed
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(
            names,
            vec!["platform", "cpu", "locale", "timezone", "hostname", "machine_id"]
        );
        assert_eq!(listed[1]["field"], json!("hardwareConcurrency"));
    }
}
