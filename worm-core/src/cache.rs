//! Bounded per-context cache of previously generated text.
//!
//! Every successful generation is recorded here so the orchestrator can
//! serve something real when every provider is down. Reads are
//! uniform-random rather than FIFO so degraded output still looks varied
//! to the player.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::collections::VecDeque;

/// Maximum number of entries retained per context.
pub const MAX_PER_CONTEXT: usize = 50;

/// One cached generation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub context: String,
    pub content: String,
    /// Unix milliseconds at insertion.
    pub created_at: u64,
}

/// Per-context multiset of cached text, capped at [`MAX_PER_CONTEXT`]
/// entries each; inserting past the cap evicts the oldest entry.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ContentCache {
    entries: HashMap<String, VecDeque<CacheEntry>>,
}

impl ContentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a generation result under `context`.
    pub fn insert(&mut self, context: &str, content: impl Into<String>) {
        let bucket = self.entries.entry(context.to_string()).or_default();
        if bucket.len() >= MAX_PER_CONTEXT {
            bucket.pop_front();
        }
        bucket.push_back(CacheEntry {
            context: context.to_string(),
            content: content.into(),
            created_at: unix_millis(),
        });
    }

    /// Pick one cached entry for `context` uniformly at random.
    pub fn random(&self, context: &str) -> Option<String> {
        let bucket = self.entries.get(context)?;
        if bucket.is_empty() {
            return None;
        }
        let index = rand::thread_rng().gen_range(0..bucket.len());
        bucket.get(index).map(|e| e.content.clone())
    }

    /// Number of entries currently held for `context`.
    pub fn len(&self, context: &str) -> usize {
        self.entries.get(context).map(|b| b.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|b| b.is_empty())
    }

    /// Entries for `context`, oldest first. Used by tests and the store.
    pub fn entries(&self, context: &str) -> impl Iterator<Item = &CacheEntry> {
        self.entries.get(context).into_iter().flatten()
    }

    /// Drop everything. Invoked by the external full-reset operation.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Current time as unix milliseconds.
pub fn unix_millis() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_random_read() {
        let mut cache = ContentCache::new();
        cache.insert("thought", "a passing idea");

        assert_eq!(cache.len("thought"), 1);
        assert_eq!(cache.random("thought").as_deref(), Some("a passing idea"));
        assert!(cache.random("name").is_none());
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let mut cache = ContentCache::new();
        for i in 0..100 {
            cache.insert("thought", format!("entry-{i}"));
        }

        assert_eq!(cache.len("thought"), MAX_PER_CONTEXT);

        // The survivors are the 50 most recent by insertion order.
        let contents: Vec<_> = cache
            .entries("thought")
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(contents.first(), Some(&"entry-50"));
        assert_eq!(contents.last(), Some(&"entry-99"));
    }

    #[test]
    fn test_contexts_are_independent() {
        let mut cache = ContentCache::new();
        for i in 0..60 {
            cache.insert("thought", format!("t-{i}"));
        }
        cache.insert("name", "flux");

        assert_eq!(cache.len("thought"), MAX_PER_CONTEXT);
        assert_eq!(cache.len("name"), 1);
        assert_eq!(cache.random("name").as_deref(), Some("flux"));
    }

    #[test]
    fn test_random_read_draws_from_whole_bucket() {
        let mut cache = ContentCache::new();
        cache.insert("thought", "alpha");
        cache.insert("thought", "beta");

        let mut seen = std::collections::HashSet::new();
        for _ in 0..200 {
            seen.insert(cache.random("thought").unwrap());
        }
        assert!(seen.contains("alpha"));
        assert!(seen.contains("beta"));
    }

    #[test]
    fn test_clear() {
        let mut cache = ContentCache::new();
        cache.insert("thought", "x");
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.random("thought").is_none());
    }
}
