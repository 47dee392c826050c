//! Shared coverage-result cache.
//!
//! Keyed by `(requirement id, corpus id set, top_k)`. The cache is an
//! explicit object handed to each [`CoverageEvaluator`](crate::evaluator::CoverageEvaluator);
//! cloning it shares the same underlying map. Writes are last-writer-wins and
//! nothing is evicted. Whether re-indexing a corpus drops its entries is
//! decided by [`CachePolicy`].

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::CachePolicy;
use crate::models::CoverageResult;

/// Identity of one evaluation context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub requirement_id: String,
    /// Corpus ids, sorted and deduplicated.
    pub corpora: Vec<String>,
    pub top_k: usize,
}

impl CacheKey {
    pub fn new(requirement_id: &str, corpus_ids: &[String], top_k: usize) -> Self {
        Self {
            requirement_id: requirement_id.to_string(),
            corpora: corpus_set(corpus_ids),
            top_k,
        }
    }

    fn touches(&self, corpus_id: &str) -> bool {
        self.corpora.iter().any(|c| c == corpus_id)
    }
}

/// Canonical form of a set of corpus ids: sorted, without duplicates.
pub fn corpus_set(corpus_ids: &[String]) -> Vec<String> {
    let mut ids = corpus_ids.to_vec();
    ids.sort_unstable();
    ids.dedup();
    ids
}

#[derive(Clone, Default)]
pub struct CoverageCache {
    entries: Arc<RwLock<HashMap<CacheKey, Arc<CoverageResult>>>>,
    policy: CachePolicy,
}

impl CoverageCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            entries: Arc::default(),
            policy,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<CoverageResult>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    pub fn insert(&self, key: CacheKey, result: Arc<CoverageResult>) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, result);
    }

    /// Record that `corpus_id` was re-indexed.
    ///
    /// Returns the number of entries dropped (always 0 under
    /// [`CachePolicy::Persistent`]).
    pub fn note_reindex(&self, corpus_id: &str) -> usize {
        if self.policy != CachePolicy::InvalidateOnReindex {
            return 0;
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|key, _| !key.touches(corpus_id));
        let dropped = before - entries.len();
        if dropped > 0 {
            tracing::info!(corpus_id, dropped, "invalidated cached coverage results");
        }
        dropped
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_key_ignores_corpus_order() {
        assert_eq!(
            CacheKey::new("r1", &ids(&["b", "a"]), 5),
            CacheKey::new("r1", &ids(&["a", "b"]), 5)
        );
        assert_ne!(
            CacheKey::new("r1", &ids(&["a"]), 5),
            CacheKey::new("r1", &ids(&["a"]), 10)
        );
    }

    #[test]
    fn test_key_keeps_corpus_ids_apart() {
        assert_ne!(
            CacheKey::new("r1", &ids(&["a,b"]), 5),
            CacheKey::new("r1", &ids(&["a", "b"]), 5)
        );
        assert_eq!(corpus_set(&ids(&["b", "a", "b"])), ids(&["a", "b"]));
    }

    #[test]
    fn test_reindex_matches_whole_corpus_ids() {
        let cache = CoverageCache::new(CachePolicy::InvalidateOnReindex);
        cache.insert(
            CacheKey::new("r1", &ids(&["a,b"]), 5),
            Arc::new(CoverageResult::error("r1", "x")),
        );
        assert_eq!(cache.note_reindex("a"), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clones_share_entries() {
        let cache = CoverageCache::new(CachePolicy::Persistent);
        let other = cache.clone();
        let key = CacheKey::new("r1", &ids(&["a"]), 5);
        cache.insert(key.clone(), Arc::new(CoverageResult::error("r1", "x")));
        let hit = other.get(&key).unwrap();
        assert!(Arc::ptr_eq(&hit, &cache.get(&key).unwrap()));
    }

    #[test]
    fn test_persistent_policy_keeps_entries_on_reindex() {
        let cache = CoverageCache::new(CachePolicy::Persistent);
        cache.insert(
            CacheKey::new("r1", &ids(&["a"]), 5),
            Arc::new(CoverageResult::error("r1", "x")),
        );
        assert_eq!(cache.note_reindex("a"), 0);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_policy_drops_touching_entries() {
        let cache = CoverageCache::new(CachePolicy::InvalidateOnReindex);
        cache.insert(
            CacheKey::new("r1", &ids(&["a", "b"]), 5),
            Arc::new(CoverageResult::error("r1", "x")),
        );
        cache.insert(
            CacheKey::new("r2", &ids(&["c"]), 5),
            Arc::new(CoverageResult::error("r2", "x")),
        );
        assert_eq!(cache.note_reindex("b"), 1);
        assert!(cache.get(&CacheKey::new("r2", &ids(&["c"]), 5)).is_some());
    }
}
