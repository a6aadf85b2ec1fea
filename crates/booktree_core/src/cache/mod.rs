//! Tag-invalidated key/value cache used for built trees.
//!
//! # Responsibility
//! - Define the cache backend contract (`get`, `set`, `invalidate_by_tag`).
//! - Provide a request-scoped in-memory backend.
//!
//! # Invariants
//! - Cached values are disposable; clearing them only costs a rebuild.
//! - Invalidating a tag removes every entry carrying it.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

pub mod tree_cache;

/// Key/value store with tag-based invalidation.
pub trait CacheBackend {
    fn get(&self, key: &str) -> Option<Vec<u8>>;
    fn set(&self, key: &str, value: Vec<u8>, tags: &[String]);
    fn invalidate_by_tag(&self, tag: &str);
}

impl<T: CacheBackend + ?Sized> CacheBackend for &T {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: Vec<u8>, tags: &[String]) {
        (**self).set(key, value, tags)
    }

    fn invalidate_by_tag(&self, tag: &str) {
        (**self).invalidate_by_tag(tag)
    }
}

#[derive(Debug, Default)]
struct MemoryCacheState {
    entries: HashMap<String, Vec<u8>>,
    keys_by_tag: HashMap<String, HashSet<String>>,
}

/// Single-threaded in-memory cache backend.
#[derive(Debug, Default)]
pub struct MemoryCacheBackend {
    state: RefCell<MemoryCacheState>,
}

impl MemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.borrow().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.state.borrow().entries.contains_key(key)
    }

    /// Removes one entry, leaving tag bookkeeping untouched.
    pub fn remove(&self, key: &str) -> Option<Vec<u8>> {
        self.state.borrow_mut().entries.remove(key)
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.state.borrow().entries.get(key).cloned()
    }

    fn set(&self, key: &str, value: Vec<u8>, tags: &[String]) {
        let mut state = self.state.borrow_mut();
        state.entries.insert(key.to_string(), value);
        for tag in tags {
            state
                .keys_by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    fn invalidate_by_tag(&self, tag: &str) {
        let mut state = self.state.borrow_mut();
        let Some(keys) = state.keys_by_tag.remove(tag) else {
            return;
        };
        for key in keys {
            state.entries.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheBackend, MemoryCacheBackend};

    #[test]
    fn invalidate_by_tag_removes_only_tagged_entries() {
        let cache = MemoryCacheBackend::new();
        cache.set("a", b"1".to_vec(), &["bid:1".to_string()]);
        cache.set("b", b"2".to_vec(), &["bid:2".to_string()]);
        cache.set("c", b"3".to_vec(), &["bid:1".to_string(), "bid:2".to_string()]);

        cache.invalidate_by_tag("bid:1");

        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_none());
        assert_eq!(cache.get("b"), Some(b"2".to_vec()));
    }

    #[test]
    fn invalidating_unknown_tag_is_noop() {
        let cache = MemoryCacheBackend::new();
        cache.set("a", b"1".to_vec(), &[]);
        cache.invalidate_by_tag("bid:9");
        assert_eq!(cache.len(), 1);
    }
}
