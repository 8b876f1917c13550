use super::CacheEntry;
use std::collections::{
    HashMap,
    VecDeque,
};

/// In-memory tier. Evicts in first-insertion order; reads do not refresh an
/// entry's position.
#[derive(Debug, Default)]
pub(crate) struct MemoryTier {
    entries: HashMap<String, CacheEntry>,
    order: VecDeque<String>,
}

impl MemoryTier {
    /// Returns the entry if it is younger than `ttl_ms`. An expired entry is
    /// removed and reported as a miss.
    pub(crate) fn get_fresh(&mut self, key: &str, now: i64, ttl_ms: u64) -> Option<&CacheEntry> {
        let expired = !self.entries.get(key)?.is_fresh(now, ttl_ms);
        if expired {
            debug!(key, "memory cache entry expired");
            self.remove(key);
            return None;
        }
        self.entries.get(key)
    }

    /// Inserts `entry`, then evicts the oldest insertions until at most
    /// `max_size` entries remain. Overwriting a key keeps its original position.
    pub(crate) fn insert(&mut self, entry: CacheEntry, max_size: usize) -> Vec<String> {
        if !self.entries.contains_key(&entry.key) {
            self.order.push_back(entry.key.clone());
        }
        self.entries.insert(entry.key.clone(), entry);

        let mut evicted = Vec::new();
        while self.entries.len() > max_size {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
            evicted.push(oldest);
        }
        evicted
    }

    pub(crate) fn remove(&mut self, key: &str) -> Option<CacheEntry> {
        let removed = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        Some(removed)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn keys(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::CachedFingerprint;
    use pretty_assertions::assert_eq;

    fn entry(key: &str, inserted_at_millis: i64) -> CacheEntry {
        CacheEntry {
            key: key.to_string(),
            payload: CachedFingerprint::new(Default::default(), key, inserted_at_millis),
            inserted_at_millis,
        }
    }

    #[test]
    fn evicts_first_inserted() {
        let mut tier = MemoryTier::default();
        assert!(tier.insert(entry("A", 0), 2).is_empty());
        assert!(tier.insert(entry("B", 0), 2).is_empty());
        // reading A does not protect it
        assert!(tier.get_fresh("A", 1, 1000).is_some());
        assert_eq!(tier.insert(entry("C", 0), 2), vec!["A".to_string()]);
        assert_eq!(tier.keys(), vec!["B".to_string(), "C".to_string()]);
    }

    #[test]
    fn overwrite_keeps_position() {
        let mut tier = MemoryTier::default();
        tier.insert(entry("A", 0), 2);
        tier.insert(entry("B", 0), 2);
        tier.insert(entry("A", 5), 2);
        assert_eq!(tier.insert(entry("C", 0), 2), vec!["A".to_string()]);
    }

    #[test]
    fn expired_entries_are_removed_on_read() {
        let mut tier = MemoryTier::default();
        tier.insert(entry("A", 100), 10);
        assert!(tier.get_fresh("A", 149, 50).is_some());
        assert!(tier.get_fresh("A", 150, 50).is_none());
        assert_eq!(tier.len(), 0);
        assert!(tier.keys().is_empty());
    }

    #[test]
    fn shrinking_limit_evicts_down_to_it() {
        let mut tier = MemoryTier::default();
        for key in ["A", "B", "C", "D"] {
            tier.insert(entry(key, 0), 10);
        }
        assert_eq!(tier.insert(entry("E", 0), 2).len(), 3);
        assert_eq!(tier.keys(), vec!["D".to_string(), "E".to_string()]);
    }
}
