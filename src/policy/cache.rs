use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use super::rule::Policy;

/// A policy document plus the instant it was fetched, keyed by `(tag, arch)`.
/// Cloned out of the cache on read so the lock is never held across the
/// evaluation step.
#[derive(Clone)]
pub struct CachedPolicy {
    pub policy: Policy,
    pub fetched_at: DateTime<Utc>,
}

pub struct PolicyCache {
    entries: Mutex<HashMap<(String, String), CachedPolicy>>,
}

impl PolicyCache {
    pub fn new() -> Self {
        Self { entries: Mutex::new(HashMap::new()) }
    }

    /// Returns the cached policy for `(tag, arch)` if present and younger
    /// than `ttl_secs`. Expired entries are left in place; `insert` will
    /// overwrite them on the next successful fetch.
    pub fn get(&self, tag: &str, arch: &str, ttl_secs: i64) -> Option<Policy> {
        let entries = self.entries.lock();
        let cached = entries.get(&(tag.to_string(), arch.to_string()))?;
        let age = Utc::now() - cached.fetched_at;
        if age < chrono::Duration::seconds(ttl_secs) {
            Some(cached.policy.clone())
        } else {
            None
        }
    }

    pub fn insert(&self, tag: &str, arch: &str, policy: Policy) {
        self.entries.lock().insert(
            (tag.to_string(), arch.to_string()),
            CachedPolicy { policy, fetched_at: Utc::now() },
        );
    }

    pub fn invalidate(&self, tag: &str, arch: &str) {
        self.entries.lock().remove(&(tag.to_string(), arch.to_string()));
    }

    pub fn invalidate_tag(&self, tag: &str) {
        self.entries.lock().retain(|(t, _), _| t != tag);
    }

    pub fn invalidate_all(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::rule::PolicyRule;

    fn sample_policy() -> Policy {
        Policy { rules: vec![PolicyRule::Default { image: "x".into() }] }
    }

    #[test]
    fn expired_entries_are_not_returned() {
        let cache = PolicyCache::new();
        cache.insert("f39", "x86_64", sample_policy());
        assert!(cache.get("f39", "x86_64", 0).is_none());
        assert!(cache.get("f39", "x86_64", 300).is_some());
    }

    #[test]
    fn invalidate_tag_clears_all_arches() {
        let cache = PolicyCache::new();
        cache.insert("f39", "x86_64", sample_policy());
        cache.insert("f39", "aarch64", sample_policy());
        cache.insert("f38", "x86_64", sample_policy());

        cache.invalidate_tag("f39");

        assert!(cache.get("f39", "x86_64", 300).is_none());
        assert!(cache.get("f39", "aarch64", 300).is_none());
        assert!(cache.get("f38", "x86_64", 300).is_some());
    }
}
