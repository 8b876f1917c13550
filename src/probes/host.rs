use envprint_orchestrator::{
    hashing::{
        FingerprintHasher,
        Sha1Hasher,
    },
    Probe,
    ProbeDescriptor,
    ProbeFuture,
};
use eyre::{
    Context as _,
    Result,
};
use serde_json::{
    json,
    Value,
};
use std::path::PathBuf;

/// First non-empty trimmed line of the first readable file in `candidates`.
async fn read_first_line(candidates: &[PathBuf]) -> Result<String> {
    let mut last_error = None;
    for path in candidates {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => {
                if let Some(line) = content.lines().map(str::trim).find(|line| !line.is_empty()) {
                    return Ok(line.to_string());
                }
                trace!(?path, "file is empty");
            }
            Err(err) => last_error = Some(eyre::Report::new(err).wrap_err(format!("Failed to read {path:?}"))),
        }
    }
    Err(last_error.unwrap_or_else(|| eyre::eyre!("none of {candidates:?} has any content")))
}

#[derive(Debug)]
pub struct HostnameProbe {
    descriptor: ProbeDescriptor,
    sources: Vec<PathBuf>,
}

impl Default for HostnameProbe {
    fn default() -> Self {
        Self::with_sources(vec!["/etc/hostname".into(), "/proc/sys/kernel/hostname".into()])
    }
}

impl HostnameProbe {
    pub fn with_sources(sources: Vec<PathBuf>) -> Self {
        Self {
            descriptor: ProbeDescriptor::new("hostname", 30)
                .requires_async(true)
                .timeout_group("system"),
            sources,
        }
    }
}

impl Probe for HostnameProbe {
    fn descriptor(&self) -> &ProbeDescriptor {
        &self.descriptor
    }

    fn execute(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            match read_first_line(&self.sources).await {
                Ok(hostname) => Ok(json!(hostname)),
                Err(err) => {
                    debug!("hostname files unavailable, trying HOSTNAME: {err}");
                    let hostname = std::env::var("HOSTNAME").context("no hostname source available")?;
                    Ok(json!(hostname))
                }
            }
        })
    }
}

/// Reports a digest of the machine id, never the id itself.
#[derive(Debug)]
pub struct MachineIdProbe {
    descriptor: ProbeDescriptor,
    sources: Vec<PathBuf>,
}

impl Default for MachineIdProbe {
    fn default() -> Self {
        Self::with_sources(vec!["/etc/machine-id".into(), "/var/lib/dbus/machine-id".into()])
    }
}

impl MachineIdProbe {
    pub fn with_sources(sources: Vec<PathBuf>) -> Self {
        Self {
            descriptor: ProbeDescriptor::new("machine_id", 31)
                .requires_async(true)
                .timeout_group("system"),
            sources,
        }
    }
}

impl Probe for MachineIdProbe {
    fn descriptor(&self) -> &ProbeDescriptor {
        &self.descriptor
    }

    fn execute(&self) -> ProbeFuture<'_> {
        Box::pin(async move {
            let id = read_first_line(&self.sources).await?;
            Ok(json!(Sha1Hasher.hash(&id)?))
        })
    }

    fn stable_components(&self, result: &Value) -> Option<Value> {
        Some(result.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use temp_dir::TempDir;

    #[tokio::test]
    async fn first_readable_source_wins() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.child("second"), "\n  builder-07  \n").unwrap();

        let probe = HostnameProbe::with_sources(vec![dir.child("missing"), dir.child("second")]);
        assert_eq!(probe.execute().await.unwrap(), json!("builder-07"));
    }

    #[tokio::test]
    async fn machine_id_is_digested() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.child("machine-id"), "abc\n").unwrap();

        let probe = MachineIdProbe::with_sources(vec![dir.child("machine-id")]);
        let value = probe.execute().await.unwrap();
        assert_eq!(value, json!("a9993e364706816aba3e25717850c26c9cd0d89d"));
        assert_eq!(probe.stable_components(&value), Some(value));
    }

    #[tokio::test]
    async fn missing_machine_id_fails() {
        let dir = TempDir::new().unwrap();
        let probe = MachineIdProbe::with_sources(vec![dir.child("absent")]);
        assert!(probe.execute().await.is_err());
    }
}
