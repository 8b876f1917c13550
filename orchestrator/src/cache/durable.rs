//! Durable cache tier.

use super::CacheEntry;
use eyre::{
    Context as _,
    OptionExt as _,
    Result,
};
use std::{
    collections::HashMap,
    fmt::Debug,
    io::Write as _,
    path::{
        Path,
        PathBuf,
    },
    sync::{
        Mutex,
        PoisonError,
    },
};

/// Storage that outlives the process. Every operation may fail; the result
/// cache treats failures as misses and keeps going.
pub trait DurableTier: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>>;
    fn put(&self, entry: &CacheEntry) -> Result<()>;
    fn delete(&self, key: &str) -> Result<()>;
    fn clear(&self) -> Result<()>;

    /// Drops entries older than `ttl_ms` at `now`, returning how many went.
    fn prune(&self, _now: i64, _ttl_ms: u64) -> Result<usize> {
        Ok(0)
    }
}

/// All entries in one JSON document, rewritten atomically on every change.
#[derive(Debug)]
pub struct FileTier {
    file: PathBuf,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl FileTier {
    pub const FILE_NAME: &'static str = "fingerprint_cache.json";

    /// Opens the tier in `dir`, creating the directory. An unreadable or
    /// corrupt document starts the tier empty.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir).wrap_err_with(|| format!("Failed to create cache directory {dir:?}"))?;
        let file = dir.join(Self::FILE_NAME);
        let entries = Self::load(&file);
        Ok(Self {
            file,
            entries: Mutex::new(entries),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    fn load(file: &Path) -> HashMap<String, CacheEntry> {
        file.exists()
            .then(|| {
                std::fs::File::open(file)
                    .ok()
                    .and_then(|f| serde_json::from_reader(std::io::BufReader::new(f)).ok())
            })
            .flatten()
            .inspect(|entries: &HashMap<String, CacheEntry>| {
                debug!(?file, entries = entries.len(), "loaded durable cache");
            })
            .unwrap_or_else(|| {
                debug!(?file, "no durable cache found");
                HashMap::new()
            })
    }

    fn save(&self, entries: &HashMap<String, CacheEntry>) -> Result<()> {
        let dir = self.file.parent().ok_or_eyre("failed to get parent directory")?;
        std::fs::create_dir_all(dir)?;

        let tmp = self.file.with_extension("json.tmp");
        let mut file = std::fs::File::create(&tmp).wrap_err_with(|| format!("Failed to create {tmp:?}"))?;
        serde_json::to_writer(&mut file, entries).context("Failed to serialize durable cache")?;
        file.flush()?;
        file.sync_all()?;
        drop(file);

        std::fs::rename(&tmp, &self.file).wrap_err_with(|| format!("Failed to replace {:?}", self.file))
    }

    fn modify(&self, f: impl FnOnce(&mut HashMap<String, CacheEntry>) -> bool) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if f(&mut entries) {
            self.save(&entries)?;
        }
        Ok(())
    }
}

impl DurableTier for FileTier {
    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn put(&self, entry: &CacheEntry) -> Result<()> {
        self.modify(|entries| {
            entries.insert(entry.key.clone(), entry.clone());
            true
        })
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.modify(|entries| entries.remove(key).is_some())
    }

    fn clear(&self) -> Result<()> {
        self.modify(|entries| {
            entries.clear();
            true
        })
    }

    fn prune(&self, now: i64, ttl_ms: u64) -> Result<usize> {
        let mut removed = 0;
        self.modify(|entries| {
            let before = entries.len();
            entries.retain(|_, entry| entry.is_fresh(now, ttl_ms));
            removed = before - entries.len();
            removed > 0
        })?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::CachedFingerprint;
    use pretty_assertions::assert_eq;
    use temp_dir::TempDir;

    fn entry(key: &str) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            payload: CachedFingerprint::new(Default::default(), format!("hash-{key}"), 10),
            inserted_at_millis: 10,
        }
    }

    #[test]
    fn entries_survive_reopening() {
        let dir = TempDir::new().unwrap();
        let tier = FileTier::open(dir.path()).unwrap();
        tier.put(&entry("a")).unwrap();
        tier.put(&entry("b")).unwrap();
        tier.delete("b").unwrap();
        drop(tier);

        let reopened = FileTier::open(dir.path()).unwrap();
        assert_eq!(reopened.get("a").unwrap(), Some(entry("a")));
        assert_eq!(reopened.get("b").unwrap(), None);

        reopened.clear().unwrap();
        assert_eq!(FileTier::open(dir.path()).unwrap().get("a").unwrap(), None);
    }

    #[test]
    fn prune_rewrites_only_when_something_expired() {
        let dir = TempDir::new().unwrap();
        let tier = FileTier::open(dir.path()).unwrap();
        tier.put(&entry("a")).unwrap();
        let mut fresh = entry("b");
        fresh.inserted_at_millis = 1_000;
        tier.put(&fresh).unwrap();

        assert_eq!(tier.prune(1_005, 100).unwrap(), 1);
        assert_eq!(tier.prune(1_005, 100).unwrap(), 0);

        let reopened = FileTier::open(dir.path()).unwrap();
        assert_eq!(reopened.get("a").unwrap(), None);
        assert_eq!(reopened.get("b").unwrap(), Some(fresh));
    }

    #[test]
    fn corrupt_document_starts_empty() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.child(FileTier::FILE_NAME), "{ not json").unwrap();
        let tier = FileTier::open(dir.path()).unwrap();
        assert_eq!(tier.get("a").unwrap(), None);
        tier.put(&entry("a")).unwrap();
        assert!(tier.get("a").unwrap().is_some());
    }

    #[test]
    fn open_fails_when_directory_cannot_be_created() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.child("blocker");
        std::fs::write(&blocker, "file, not a directory").unwrap();
        assert!(FileTier::open(blocker.join("nested")).is_err());
    }
}
