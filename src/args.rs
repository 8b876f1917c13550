use clap::Parser;
use std::{
    path::PathBuf,
    time::Duration,
};

/// Collects environment probes and prints the composite fingerprint as JSON.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// YAML file merged over the built-in defaults. Defaults to
    /// `config.yaml` in the configuration directory, if present.
    #[arg(long, env = "ENVPRINT_CONFIG_FILE")]
    pub config: Option<PathBuf>,

    /// Overrides a single configuration value, e.g. `--set cache.ttl=5000`.
    /// May be repeated.
    #[arg(long = "set", value_name = "PATH=VALUE")]
    pub assignments: Vec<String>,

    /// Number of collection cycles to run.
    #[arg(long, default_value_t = 1)]
    pub repeat: u32,

    /// Pause between cycles, e.g. `500ms` or `2s`.
    #[arg(long, default_value = "1s", value_parser = humantime::parse_duration)]
    pub interval: Duration,

    /// Pretty-print the JSON output.
    #[arg(long, action)]
    pub pretty: bool,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, action)]
    pub debug: bool,

    /// Print the enabled probes in execution order and exit.
    #[arg(long, action)]
    pub list_probes: bool,
}
