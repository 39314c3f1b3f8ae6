// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Bounded in-memory model cache, least recently used brook evicted first.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;

use brook_kernel::{BrookKey, BrookPosition, ReducerSetFingerprint};

pub struct CachedModel<M> {
    pub fingerprint: ReducerSetFingerprint,
    pub position: BrookPosition,
    pub model: Arc<M>,
}

impl<M> Clone for CachedModel<M> {
    fn clone(&self) -> Self {
        Self {
            fingerprint: self.fingerprint,
            position: self.position,
            model: Arc::clone(&self.model),
        }
    }
}

/// One entry per brook: the newest model built for it.
pub struct ModelCache<M> {
    entries: Mutex<LruCache<BrookKey, CachedModel<M>>>,
}

impl<M> ModelCache<M> {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn get(&self, key: &BrookKey) -> Option<CachedModel<M>> {
        self.entries.lock().get(key).cloned()
    }

    /// Keep the newest model per brook. An entry from another reducer set is
    /// always replaced.
    pub fn offer(&self, key: &BrookKey, entry: CachedModel<M>) {
        let mut entries = self.entries.lock();
        let replace = match entries.peek(key) {
            Some(existing) => {
                existing.fingerprint != entry.fingerprint
                    || !existing.position.is_newer_than(entry.position)
            }
            None => true,
        };
        if replace {
            entries.put(key.clone(), entry);
        }
    }

    pub fn invalidate(&self, key: &BrookKey) {
        self.entries.lock().pop(key);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(fp: u8, position: i64, value: u32) -> CachedModel<u32> {
        CachedModel {
            fingerprint: ReducerSetFingerprint::from_bytes([fp; 32]),
            position: BrookPosition::new(position).unwrap(),
            model: Arc::new(value),
        }
    }

    fn key(id: &str) -> BrookKey {
        BrookKey::new("cache", id).unwrap()
    }

    #[test]
    fn test_older_entry_does_not_replace_newer() {
        let cache = ModelCache::new(4);
        cache.offer(&key("a"), entry(1, 5, 50));
        cache.offer(&key("a"), entry(1, 3, 30));

        assert_eq!(*cache.get(&key("a")).unwrap().model, 50);
    }

    #[test]
    fn test_new_fingerprint_always_replaces() {
        let cache = ModelCache::new(4);
        cache.offer(&key("a"), entry(1, 5, 50));
        cache.offer(&key("a"), entry(2, 1, 10));

        let cached = cache.get(&key("a")).unwrap();
        assert_eq!(cached.fingerprint, ReducerSetFingerprint::from_bytes([2; 32]));
    }

    #[test]
    fn test_least_recently_used_is_evicted() {
        let cache = ModelCache::new(2);
        cache.offer(&key("a"), entry(1, 0, 1));
        cache.offer(&key("b"), entry(1, 0, 2));
        cache.get(&key("a"));
        cache.offer(&key("c"), entry(1, 0, 3));

        assert!(cache.get(&key("a")).is_some());
        assert!(cache.get(&key("b")).is_none());
        assert_eq!(cache.len(), 2);
    }
}
